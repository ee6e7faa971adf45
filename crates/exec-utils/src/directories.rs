use std::path::PathBuf;

use directories::BaseDirs;
use tracing::warn;

const APP_NAME: &str = "exec";

fn local_config_dir() -> PathBuf {
    let Some(base_dirs) = BaseDirs::new() else {
        warn!("couldn't find basedirs, storing config in /tmp/{APP_NAME}");
        return PathBuf::from(format!("/tmp/{APP_NAME}"));
    };
    base_dirs.config_dir().join(APP_NAME)
}

/// Default location for the executive's JSON config file.
pub fn default_config_path() -> PathBuf {
    local_config_dir().join("config.json")
}

/// Default location for the 128-byte shared secret (§6).
pub fn default_key_path() -> PathBuf {
    local_config_dir().join("authkey")
}

/// Default log file location, used when `LogMode::File` is configured
/// without an explicit path.
pub fn default_log_path() -> PathBuf {
    let Some(base_dirs) = BaseDirs::new() else {
        return PathBuf::from(format!("/tmp/{APP_NAME}.log"));
    };
    base_dirs.data_dir().join(APP_NAME).join("exec.log")
}
