use std::path::{Path, PathBuf};
use std::time::Duration;

use cc_sync::{HttpDeliveryConfig, Url};

pub const DEFAULT_API_URL: &str = "http://localhost:9095";
const DATA_DIR_NAME: &str = "citizen-connect";

/// Explicit flag (or `CC_DB_PATH`, which clap folds into the flag), then the
/// platform data directory, then the working directory.
pub fn resolve_db_path(flag: Option<&Path>) -> PathBuf {
    db_path_with(flag, dirs::data_dir())
}

fn db_path_with(flag: Option<&Path>, data_dir: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        if !path.as_os_str().is_empty() {
            return path.to_path_buf();
        }
    }
    match data_dir {
        Some(dir) => dir.join(DATA_DIR_NAME).join(cc_core::DATABASE_FILE_NAME),
        None => PathBuf::from(cc_core::DATABASE_FILE_NAME),
    }
}

pub fn resolve_log_dir(flag: &str) -> Option<PathBuf> {
    log_dir_with(flag, std::env::var("CC_LOG_DIR").ok())
}

fn log_dir_with(flag: &str, env_value: Option<String>) -> Option<PathBuf> {
    if !flag.trim().is_empty() {
        return Some(PathBuf::from(flag));
    }
    env_value
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn delivery_config(api_url: Url, timeout_secs: u64) -> HttpDeliveryConfig {
    let mut config = HttpDeliveryConfig::new(api_url);
    config.timeout = Duration::from_secs(timeout_secs.max(1));
    config
}
