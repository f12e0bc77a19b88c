use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use climate_panel_common::{
    protocol::{ack_path, fetch_path, report_path},
    CommandFrame, DeviceConfig, ProtocolError, ACK_REPLY,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("panel request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected panel reply {0:?}")]
    UnexpectedReply(String),
    #[error("unreadable command frame: {0}")]
    Frame(#[from] ProtocolError),
}

/// HTTP side of the polling protocol. Every attempt gets a fresh message id.
pub struct PanelClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
    retry_delay: Duration,
    msg_counter: AtomicU64,
}

impl PanelClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.clone(),
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            msg_counter: AtomicU64::new(0),
        })
    }

    pub async fn report(&self, temp_c: f64) -> Result<(), ClientError> {
        self.with_retries("report", |msg_id| report_path(temp_c, msg_id), expect_ack)
            .await
    }

    pub async fn fetch_command(&self) -> Result<CommandFrame, ClientError> {
        self.with_retries("fetch", fetch_path, |body| {
            Ok(body.parse::<CommandFrame>()?)
        })
        .await
    }

    pub async fn ack_command(&self) -> Result<(), ClientError> {
        self.with_retries("ack", ack_path, expect_ack).await
    }

    fn next_msg_id(&self) -> u64 {
        self.msg_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn with_retries<T>(
        &self,
        label: &str,
        path_for: impl Fn(u64) -> String,
        accept: impl Fn(String) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut attempt = 1;
        loop {
            let msg_id = self.next_msg_id();
            let result = match self.get_text(&path_for(msg_id)).await {
                Ok(body) => accept(body),
                Err(err) => Err(err),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.retries => return Err(err),
                Err(err) => {
                    warn!("{label} {{#{msg_id}}} attempt {attempt} failed: {err}");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

fn expect_ack(body: String) -> Result<(), ClientError> {
    if body.trim() == ACK_REPLY {
        Ok(())
    } else {
        Err(ClientError::UnexpectedReply(body))
    }
}
