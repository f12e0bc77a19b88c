use std::{fmt::Write as _, sync::Arc};

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const SESSION_COOKIE: &str = "session";

const HMAC_BLOCK_LEN: usize = 64;

/// Browser session carried in a signed cookie: the login flag plus one-shot
/// flash messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    flashes: Vec<String>,
}

impl Session {
    pub fn flash(&mut self, message: impl Into<String>) {
        self.flashes.push(message.into());
    }

    pub fn take_flashes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flashes)
    }
}

#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<[u8]>,
}

impl SessionKeys {
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret: Arc::from(secret_key.as_bytes()),
        }
    }

    /// Missing, malformed or forged cookies all yield an anonymous session.
    pub fn read(&self, headers: &HeaderMap) -> Session {
        let Some(raw) = find_cookie(headers, SESSION_COOKIE) else {
            return Session::default();
        };
        self.decode(raw).unwrap_or_else(|| {
            debug!("discarding session cookie with bad signature or payload");
            Session::default()
        })
    }

    pub fn encode(&self, session: &Session) -> String {
        let payload = serde_json::to_vec(session).unwrap_or_default();
        let mac = hmac_sha256(&self.secret, &payload);
        format!("{}.{}", to_hex(&payload), to_hex(&mac))
    }

    fn decode(&self, raw: &str) -> Option<Session> {
        let (payload_hex, mac_hex) = raw.split_once('.')?;
        let payload = from_hex(payload_hex)?;
        let mac = from_hex(mac_hex)?;
        let expected = hmac_sha256(&self.secret, &payload);
        if !constant_time_eq(&mac, &expected) {
            return None;
        }
        serde_json::from_slice(&payload).ok()
    }

    pub fn set_cookie(&self, session: &Session) -> (axum::http::HeaderName, HeaderValue) {
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.encode(session)
        );
        // Hex and ASCII attributes only, always a valid header value.
        let value = HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""));
        (SET_COOKIE, value)
    }
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block_key = [0_u8; HMAC_BLOCK_LEN];
    if key.len() > HMAC_BLOCK_LEN {
        let digest = Sha256::digest(key);
        block_key[..digest.len()].copy_from_slice(&digest);
    } else {
        block_key[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block_key.map(|byte| byte ^ 0x36));
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block_key.map(|byte| byte ^ 0x5c));
    outer.update(inner_hash);

    let mut mac = [0_u8; 32];
    mac.copy_from_slice(&outer.finalize());
    mac
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

fn from_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 || !raw.is_ascii() {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&raw[index..index + 2], 16).ok())
        .collect()
}
