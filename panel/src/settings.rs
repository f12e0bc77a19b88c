use std::path::PathBuf;

use anyhow::Context;
use climate_panel_common::PanelConfig;

/// Reads the JSON settings file named by `PANEL_SETTINGS` (if any), then
/// applies `PANEL_*` environment overrides.
pub async fn load() -> anyhow::Result<PanelConfig> {
    let mut config = match std::env::var("PANEL_SETTINGS") {
        Ok(path) => {
            let raw = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read panel settings from {path}"))?;
            serde_json::from_slice::<PanelConfig>(&raw)
                .with_context(|| format!("invalid panel settings in {path}"))?
        }
        Err(_) => PanelConfig::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();
    Ok(config)
}

fn apply_overrides(config: &mut PanelConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(database) = lookup("PANEL_DATABASE") {
        config.database = PathBuf::from(database);
    }
    if let Some(secret_key) = lookup("PANEL_SECRET_KEY") {
        config.secret_key = secret_key;
    }
    if let Some(username) = lookup("PANEL_USERNAME") {
        config.username = username;
    }
    if let Some(password) = lookup("PANEL_PASSWORD") {
        config.password = password;
    }
    if let Some(timezone) = lookup("PANEL_TIMEZONE") {
        config.timezone = timezone;
    }
    if let Some(port) = lookup("PANEL_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.http_port = port;
    }
}
