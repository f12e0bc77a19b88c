use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::FanLevel;

pub const MIN_AC_TEMP_C: i32 = 10;
pub const MAX_AC_TEMP_C: i32 = 29;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub database: PathBuf,
    pub secret_key: String,
    pub username: String,
    pub password: String,
    pub timezone: String,
    pub http_port: u16,
    pub initial_target: i32,
    pub fan_level: FanLevel,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("acpage.db"),
            secret_key: "development key".to_string(),
            username: "lola".to_string(),
            password: "thecat".to_string(),
            timezone: "Etc/GMT-3".to_string(),
            http_port: 8080,
            initial_target: 15,
            fan_level: FanLevel::Auto,
        }
    }
}

impl PanelConfig {
    pub fn sanitize(&mut self) {
        if self.secret_key.is_empty() {
            self.secret_key = Self::default().secret_key;
        }
        if self.http_port == 0 {
            self.http_port = 8080;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub server_url: String,
    pub report_period_secs: u64,
    pub fetch_period_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub button_pause_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            report_period_secs: 301,
            fetch_period_secs: 22,
            retries: 3,
            retry_delay_ms: 500,
            button_pause_ms: 500,
        }
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        self.report_period_secs = self.report_period_secs.max(1);
        self.fetch_period_secs = self.fetch_period_secs.max(1);
        self.retries = self.retries.clamp(1, 10);
        while self.server_url.ends_with('/') {
            self.server_url.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let config: PanelConfig =
            serde_json::from_str(r#"{"username":"admin","fan_level":1}"#).unwrap();
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "thecat");
        assert_eq!(config.fan_level, FanLevel::Medium);
        assert_eq!(config.timezone, "Etc/GMT-3");
    }

    #[test]
    fn device_sanitize_bounds_values() {
        let mut config = DeviceConfig {
            server_url: "http://panel.local//".to_string(),
            report_period_secs: 0,
            fetch_period_secs: 0,
            retries: 0,
            retry_delay_ms: 0,
            button_pause_ms: 0,
        };
        config.sanitize();

        assert_eq!(config.server_url, "http://panel.local");
        assert_eq!(config.report_period_secs, 1);
        assert_eq!(config.fetch_period_secs, 1);
        assert_eq!(config.retries, 1);
    }
}
