use std::sync::Arc;

use clockbridge_core::config::{AppConfig, ConfigError};
use clockbridge_core::outbound::{HttpOutboundClient, OutboundError};
use clockbridge_slack::commands::{ClockCommandDispatcher, DispatchSettings};
use clockbridge_slack::socket::{SlackSocketTransport, SocketModeRunner, TransportError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("outbound client construction failed: {0}")]
    Outbound(#[from] OutboundError),
    #[error("socket transport construction failed: {0}")]
    Transport(#[from] TransportError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let settings = DispatchSettings::from_config(&config)?;
    let client = Arc::new(HttpOutboundClient::from_config(&config.outbound)?);
    let dispatcher = Arc::new(ClockCommandDispatcher::new(client, settings));
    let transport = Arc::new(SlackSocketTransport::from_config(&config.slack)?);

    info!(
        event_name = "system.bootstrap.ready",
        time_zone = %config.notification.time_zone,
        timeout_ms = config.outbound.timeout_ms,
        skip_tls_verify = config.outbound.skip_tls_verify,
        "clock command bridge assembled"
    );

    Ok(Application { config, runner: SocketModeRunner::new(transport, dispatcher) })
}
