//! On-disk configuration (spec §4.J step "read config"; SPEC_FULL
//! Expansion: Configuration). A small `serde_json`-backed struct, loaded
//! once at bootstrap and never reloaded while running — a config change
//! means a restart, same as the reference daemon's own `objdb` read path.

use std::{net::IpAddr, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    Stderr,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmfConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Name of the abstract-namespace (or, off Linux, path-backed) local
    /// IPC socket (§4.D).
    #[serde(default = "default_socket_name")]
    pub socket_name: String,

    /// Interfaces the totem transport would bind, in priority order. Left
    /// empty for single-node/loopback operation.
    #[serde(default)]
    pub interfaces: Vec<IpAddr>,

    /// Group name a non-root local client must present to pass the IPC
    /// credential policy (§4.E step 4). Empty means "uid 0 only".
    #[serde(default = "default_group")]
    pub expected_group: String,

    /// Path to the shared authorization key (§4.J step "keyread").
    #[serde(default = "exec_utils::directories::default_key_path")]
    pub key_path: PathBuf,

    #[serde(default = "default_log_mode")]
    pub log_mode: LogMode,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub amf: Option<AmfConfig>,

    /// Realtime priority requested via `sched_setscheduler(SCHED_RR, ...)`
    /// (§4.J step "setscheduler"). `0` skips the call entirely.
    #[serde(default)]
    pub realtime_priority: i32,

    /// Unprivileged account to drop into after bootstrap (§4.J step
    /// "priv_drop"). `None` skips the drop, e.g. when already unprivileged.
    #[serde(default)]
    pub run_as_user: Option<String>,

    /// Byte budget backing the loopback transport's `send_ok` admission
    /// test (§4.E step 6, §6 "a `send_ok(size)` admission test"). The real
    /// TOTEMPG sizes this off actual ring throughput; single-node operation
    /// has nothing comparable to measure, so this is a plain configured
    /// ceiling.
    #[serde(default = "default_send_ok_budget")]
    pub transport_send_ok_budget: usize,
}

fn default_socket_name() -> String {
    "exec-ipc".to_owned()
}

fn default_group() -> String {
    String::new()
}

fn default_log_mode() -> LogMode {
    LogMode::Stderr
}

fn default_send_ok_budget() -> usize {
    256 * 1024
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            interfaces: Vec::new(),
            expected_group: default_group(),
            key_path: exec_utils::directories::default_key_path(),
            log_mode: default_log_mode(),
            log_file: None,
            amf: None,
            realtime_priority: 0,
            run_as_user: None,
            transport_send_ok_budget: default_send_ok_budget(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
}

impl ExecConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_file() {
        let config = ExecConfig::default();
        assert_eq!(config.socket_name, "exec-ipc");
        assert!(config.interfaces.is_empty());
    }

    #[test]
    fn parses_a_minimal_document() {
        let config: ExecConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.expected_group, "");
        assert_eq!(config.realtime_priority, 0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ExecConfig::load(std::path::Path::new("/nonexistent/exec.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
