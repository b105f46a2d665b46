use std::path::PathBuf;

use crate::{Error, Result};

pub const DEFAULT_APP_ID: &str = "17349";
pub const DEFAULT_APP_HASH: &str = "344583e45741c457fe1862106095a5eb";
pub const DEFAULT_DOWNLOAD_PATH: &str = "./downloads";
pub const DEFAULT_SESSION_FILE: &str = "telegram.session";

pub const ENV_PHONE: &str = "TELEGRAM_PHONE";
pub const ENV_PHONE_FALLBACK: &str = "PHONE_NUMBER";
pub const ENV_APP_ID: &str = "TELEGRAM_APP_ID";
pub const ENV_APP_HASH: &str = "TELEGRAM_APP_HASH";
pub const ENV_DOWNLOAD_PATH: &str = "DOWNLOAD_PATH";
pub const ENV_SESSION_FILE: &str = "TELEGRAM_SESSION_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub phone_number: String,
    pub app_id: i32,
    pub app_hash: String,
    pub download_path: PathBuf,
    pub session_path: PathBuf,
}

impl RunConfig {
    pub fn require_phone_number(&self) -> Result<&str> {
        let phone = self.phone_number.trim();
        if phone.is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("{ENV_PHONE} environment variable is required"),
            });
        }
        Ok(phone)
    }
}

pub fn load_config() -> Result<RunConfig> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Builds a [`RunConfig`] from an arbitrary key lookup. Empty values count as unset.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<RunConfig> {
    let get = |key: &str, default: &str| -> String {
        match lookup(key) {
            Some(v) if !v.is_empty() => v,
            _ => default.to_string(),
        }
    };

    let mut phone_number = get(ENV_PHONE, "");
    if phone_number.is_empty() {
        phone_number = get(ENV_PHONE_FALLBACK, "");
    }

    let app_id_raw = get(ENV_APP_ID, DEFAULT_APP_ID);
    let app_id = app_id_raw
        .trim()
        .parse::<i32>()
        .map_err(|e| Error::InvalidConfig {
            message: format!("{ENV_APP_ID} must be an integer (got {app_id_raw:?}): {e}"),
        })?;
    if app_id <= 0 {
        return Err(Error::InvalidConfig {
            message: format!("{ENV_APP_ID} must be positive (got {app_id})"),
        });
    }

    Ok(RunConfig {
        phone_number,
        app_id,
        app_hash: get(ENV_APP_HASH, DEFAULT_APP_HASH),
        download_path: PathBuf::from(get(ENV_DOWNLOAD_PATH, DEFAULT_DOWNLOAD_PATH)),
        session_path: PathBuf::from(get(ENV_SESSION_FILE, DEFAULT_SESSION_FILE)),
    })
}
