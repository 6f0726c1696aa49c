use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const TOKEN_SLOT: &str = "jwt_access_token";

const SETTINGS_FILE: &str = "console.toml";
const DATA_DIR_NAME: &str = "storage-console";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub server_url: String,
    pub api_prefix: String,
    pub sign_in_path: String,
    pub token_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub logout_timeout_secs: u64,
    pub default_rows_per_page: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            api_prefix: "/api/v1".into(),
            sign_in_path: "/auth/jwt/sign-in".into(),
            token_path: None,
            request_timeout_secs: None,
            logout_timeout_secs: 5,
            default_rows_per_page: 5,
        }
    }
}

impl ClientSettings {
    pub fn for_server(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_secs(self.logout_timeout_secs.max(1))
    }

    pub fn resolved_token_path(&self) -> PathBuf {
        if let Some(path) = &self.token_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DATA_DIR_NAME)
            .join(TOKEN_SLOT)
    }
}

pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("config: ignoring unreadable {SETTINGS_FILE}: {err}");
            return;
        }
    };
    let text = |key: &str| -> Option<String> {
        match file_cfg.get(key)? {
            toml::Value::String(v) => Some(v.clone()),
            toml::Value::Integer(v) => Some(v.to_string()),
            _ => None,
        }
    };

    if let Some(v) = text("server_url") {
        settings.server_url = v;
    }
    if let Some(v) = text("api_prefix") {
        settings.api_prefix = v;
    }
    if let Some(v) = text("sign_in_path") {
        settings.sign_in_path = v;
    }
    if let Some(v) = text("token_path") {
        settings.token_path = Some(PathBuf::from(v));
    }
    if let Some(v) = text("request_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = Some(v);
    }
    if let Some(v) = text("logout_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.logout_timeout_secs = v;
    }
    if let Some(v) = text("default_rows_per_page").and_then(|v| v.parse().ok()) {
        settings.default_rows_per_page = v;
    }
}

pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("CONSOLE_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__API_PREFIX") {
        settings.api_prefix = v;
    }
    if let Some(v) = lookup("APP__SIGN_IN_PATH") {
        settings.sign_in_path = v;
    }
    if let Some(v) = lookup("APP__TOKEN_PATH") {
        settings.token_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = Some(parsed);
        }
    }
    if let Some(v) = lookup("APP__LOGOUT_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.logout_timeout_secs = parsed;
        }
    }
    if let Some(v) = lookup("APP__DEFAULT_ROWS_PER_PAGE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.default_rows_per_page = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
