mod bootstrap;
mod supervisor;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use clockbridge_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use tokio_util::sync::CancellationToken;

use crate::supervisor::{ExecutableRelauncher, SupervisorExit};

#[derive(Debug, Parser)]
#[command(name = "clockbridge", about = "Slack clock-in/clock-out bridge", version)]
struct Cli {
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                log_level: self.debug.then(|| "debug".to_owned()),
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use clockbridge_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.load_options())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    tracing::info!(event_name = "system.server.started", "clockbridge started");
    let result = app.runner.run(cancel).await;

    let relauncher = ExecutableRelauncher::current(app.config.supervisor.forward_args);
    match supervisor::supervise(result, &relauncher, &app.config.supervisor)? {
        SupervisorExit::Shutdown => {
            tracing::info!(event_name = "system.server.stopping", "clockbridge stopping");
            Ok(())
        }
        SupervisorExit::Restarted { pid } => {
            tracing::info!(
                event_name = "system.server.handoff",
                pid,
                "handing over to replacement process"
            );
            std::process::exit(0);
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!(event_name = "system.server.interrupt", "interrupt received");
            cancel.cancel();
        }
        Err(error) => {
            tracing::warn!(
                event_name = "system.server.signal_failed",
                error = %error,
                "could not listen for interrupt"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn debug_flag_forces_debug_level() {
        let cli = Cli::parse_from(["clockbridge", "--debug"]);

        let options = cli.load_options();

        assert_eq!(options.overrides.log_level.as_deref(), Some("debug"));
        assert!(!options.require_file);
    }

    #[test]
    fn explicit_config_path_is_required_to_exist() {
        let cli = Cli::parse_from(["clockbridge", "--config", "/etc/clockbridge.toml"]);

        let options = cli.load_options();

        assert!(options.require_file);
        assert!(options.overrides.log_level.is_none());
    }
}
