mod bootstrap;
mod config;
mod identity;
mod key;
mod logging;
mod privdrop;
mod services;
mod signals;

use clap::Parser;

/// Availability-management executive: the single-process, event-driven core
/// that local clients talk to over IPC and that would, in a real cluster,
/// multicast coordination traffic to its ring peers.
#[derive(Parser)]
#[command(name = "exec", version, about)]
struct Cli {
    /// Path to the JSON config file. Defaults to the platform config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Stay attached to the controlling terminal (this executive never
    /// daemonizes on its own either way; the flag only affects log framing).
    #[arg(long)]
    foreground: bool,
}

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(exec_utils::directories::default_config_path);

    if let Err(err) = bootstrap::run(&config_path, cli.foreground) {
        eprintln!("exec: {err}");
        std::process::exit(err.exit_sentinel());
    }
}
