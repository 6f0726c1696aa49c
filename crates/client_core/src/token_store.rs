use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

pub trait TokenStore: Send + Sync {
    fn save(&self, token: &str);
    fn load(&self) -> Option<String>;
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, token: &str) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(token.to_string());
    }

    fn load(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn clear(&self) {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, token: &str) {
        if let Err(err) = self.write(token) {
            warn!(
                path = %self.path.display(),
                "token_store: failed to persist token: {err}"
            );
        }
    }

    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    "token_store: failed to read token: {err}"
                );
                None
            }
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "token_store: cleared"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                "token_store: failed to clear token: {err}"
            ),
        }
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<f64>,
}

pub fn decode_expiry(token: &str) -> Option<f64> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    claim.exp.filter(|exp| exp.is_finite())
}

/// A token is valid only when present, decodable, and expiring strictly after `now`.
pub fn is_valid_at(token: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return false;
    };
    let Some(exp) = decode_expiry(token) else {
        return false;
    };
    let now_secs = now.timestamp_millis() as f64 / 1000.0;
    exp > now_secs
}

pub fn is_valid(token: Option<&str>) -> bool {
    is_valid_at(token, Utc::now())
}

pub fn valid_token(store: &dyn TokenStore) -> Option<String> {
    store
        .load()
        .map(|token| token.trim().to_string())
        .filter(|token| is_valid(Some(token.as_str())))
}

#[cfg(test)]
#[path = "tests/token_store_tests.rs"]
mod tests;
