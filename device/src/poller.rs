use std::time::Duration;

use anyhow::Context;
use climate_panel_common::DeviceConfig;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    client::{ClientError, PanelClient},
    remote::{AcRemote, RemoteButton},
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = DeviceConfig::default();
    if let Ok(url) = std::env::var("DEVICE_SERVER_URL") {
        config.server_url = url;
    }
    if let Some(secs) = env_u64("DEVICE_REPORT_PERIOD") {
        config.report_period_secs = secs;
    }
    if let Some(secs) = env_u64("DEVICE_FETCH_PERIOD") {
        config.fetch_period_secs = secs;
    }
    config.sanitize();

    let client = PanelClient::new(&config).context("failed to build panel client")?;
    let mut device = Device::new(client, Duration::from_millis(config.button_pause_ms));

    info!("device polling {} started", config.server_url);

    let mut report_interval = tokio::time::interval(Duration::from_secs(config.report_period_secs));
    let mut fetch_interval = tokio::time::interval(Duration::from_secs(config.fetch_period_secs));
    report_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    fetch_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = report_interval.tick() => {
                if let Err(err) = device.report_reading().await {
                    warn!("temperature report failed: {err}");
                }
            }
            _ = fetch_interval.tick() => {
                if let Err(err) = device.poll_command().await {
                    warn!("command poll failed: {err}");
                }
            }
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
}

pub struct Device {
    client: PanelClient,
    remote: AcRemote,
    sensor: SimulatedSensor,
    button_pause: Duration,
}

impl Device {
    pub fn new(client: PanelClient, button_pause: Duration) -> Self {
        Self {
            client,
            remote: AcRemote::default(),
            sensor: SimulatedSensor::default(),
            button_pause,
        }
    }

    pub async fn report_reading(&mut self) -> Result<(), ClientError> {
        let temp_c = self.sensor.sample();
        self.client.report(temp_c).await?;
        debug!("reported {temp_c:.1}C");
        Ok(())
    }

    /// Fetches the command frame, applies it when new and acknowledges it.
    /// Returns whether a command was applied.
    pub async fn poll_command(&mut self) -> Result<bool, ClientError> {
        let frame = self.client.fetch_command().await?;
        if !frame.pending {
            debug!("no new command ({frame})");
            return Ok(false);
        }

        info!("new command: {frame}");
        let presses = self.remote.apply(&frame);
        self.press(presses).await;
        info!(
            "remote now {} at {}C, fan {}",
            self.remote.power(),
            self.remote.temp_c(),
            self.remote.fan().label()
        );
        self.client.ack_command().await?;
        Ok(true)
    }

    async fn press(&self, presses: Vec<RemoteButton>) {
        for button in presses {
            // IR/relay output hooks in here on real hardware.
            info!("remote button: {button:?}");
            tokio::time::sleep(self.button_pause).await;
        }
    }

    #[cfg(test)]
    pub fn remote(&self) -> &AcRemote {
        &self.remote
    }
}

/// Stand-in for the TMP36 reading on host builds.
#[derive(Debug, Default)]
struct SimulatedSensor {
    tick: u64,
}

impl SimulatedSensor {
    fn sample(&mut self) -> f64 {
        self.tick = self.tick.saturating_add(1);
        24.0 + (self.tick % 8) as f64 * 0.3
    }
}

#[cfg(test)]
mod tests {
    use climate_panel_common::{FanLevel, PowerState};
    use mockito::{Matcher, Server};

    use super::*;

    fn device_for(server: &Server) -> Device {
        let client = PanelClient::new(&DeviceConfig {
            server_url: server.url(),
            retry_delay_ms: 0,
            ..DeviceConfig::default()
        })
        .unwrap();
        Device::new(client, Duration::ZERO)
    }

    #[tokio::test]
    async fn pending_command_is_applied_and_acked_once() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/extget/\d+$".to_string()))
            .with_body("1#ON#21#3")
            .create_async()
            .await;
        let ack = server
            .mock("GET", Matcher::Regex(r"^/getack/\d+$".to_string()))
            .with_body("Posted.")
            .expect(1)
            .create_async()
            .await;

        let mut device = device_for(&server);
        assert!(device.poll_command().await.unwrap());

        assert_eq!(device.remote().power(), PowerState::On);
        assert_eq!(device.remote().temp_c(), 21);
        assert_eq!(device.remote().fan(), FanLevel::Auto);
        ack.assert_async().await;
    }

    #[tokio::test]
    async fn idle_frame_is_not_acked() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/extget/\d+$".to_string()))
            .with_body("0#ON#21#3")
            .create_async()
            .await;
        let ack = server
            .mock("GET", Matcher::Regex(r"^/getack/\d+$".to_string()))
            .expect(0)
            .create_async()
            .await;

        let mut device = device_for(&server);
        assert!(!device.poll_command().await.unwrap());

        assert_eq!(device.remote().power(), PowerState::Off);
        ack.assert_async().await;
    }

    #[tokio::test]
    async fn report_posts_simulated_reading() {
        let mut server = Server::new_async().await;
        let report = server
            .mock("GET", "/extpost/24.3/1")
            .with_body("Posted.")
            .create_async()
            .await;

        device_for(&server).report_reading().await.unwrap();
        report.assert_async().await;
    }

    #[test]
    fn simulated_sensor_cycles() {
        let mut sensor = SimulatedSensor::default();
        let first = sensor.sample();
        for _ in 0..7 {
            sensor.sample();
        }
        assert_eq!(sensor.sample(), first);
    }
}
