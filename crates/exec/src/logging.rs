//! Tracing subscriber setup (SPEC_FULL Expansion: Logging; §4.J step
//! "logging setup"). Stderr by default; `LogMode::File` appends to a single
//! file instead, matching the reference daemon's "foreground vs daemonized"
//! split without actually forking — this executive never detaches from its
//! controlling terminal.

use std::{fs::OpenOptions, sync::Mutex};

use tracing_subscriber::EnvFilter;

use crate::config::{ExecConfig, LogMode};

pub fn init(config: &ExecConfig, foreground: bool) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_mode {
        LogMode::Stderr => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
        LogMode::File => {
            let path = config.log_file.clone().unwrap_or_else(exec_utils::directories::default_log_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let file =
                OpenOptions::new().create(true).append(true).open(&path).map_err(|e| e.to_string())?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
    }

    if foreground {
        tracing::debug!("running in foreground");
    }
    Ok(())
}
