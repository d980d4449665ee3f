use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use clockbridge_core::{
    clock::{failure_notice, format_timestamp},
    config::ConfigError,
    AppConfig, ClockAction, ClockEventPayload, OutboundClient, OutboundRequest,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::events::SlashCommandPayload;

/// Argument text that is logged separately. It does not suppress the action.
pub const TEST_ARGUMENT: &str = "test";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored,
    Delivered(ClockAction),
    Failed { action: ClockAction, notified: bool },
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: SlashCommandPayload) -> DispatchOutcome;
}

/// Read-only values the dispatcher needs, extracted once from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub proxy_endpoint: String,
    pub proxy_token: SecretString,
    pub proxy_skip_tls_verify: bool,
    pub channel_url: String,
    pub bot_token: SecretString,
    pub channel_skip_tls_verify: bool,
    pub time_zone: Tz,
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            proxy_endpoint: config.proxy.endpoint.clone(),
            proxy_token: config.proxy.token.clone(),
            proxy_skip_tls_verify: config.outbound.skip_tls_verify,
            channel_url: config.slack.channel_url.clone(),
            bot_token: config.slack.bot_token.clone(),
            channel_skip_tls_verify: config.outbound.notify_skip_tls_verify,
            time_zone: config.time_zone()?,
        })
    }

    fn channel_auth_header(&self) -> String {
        format!("Bearer {}", self.bot_token.expose_secret())
    }
}

pub struct ClockCommandDispatcher<C> {
    client: Arc<C>,
    settings: DispatchSettings,
}

impl<C> ClockCommandDispatcher<C>
where
    C: OutboundClient,
{
    pub fn new(client: Arc<C>, settings: DispatchSettings) -> Self {
        Self { client, settings }
    }

    async fn forward(
        &self,
        action: ClockAction,
        command: &SlashCommandPayload,
    ) -> DispatchOutcome {
        let timestamp = format_timestamp(Utc::now(), self.settings.time_zone);
        info!(
            event_name = "dispatch.command.received",
            action = %action.tag(),
            user_name = %command.user_name,
            user_id = %command.user_id,
            timestamp = %timestamp,
            "forwarding clock command to proxy"
        );

        let payload = ClockEventPayload::new(action, command.user_id.clone());
        let delivered = match OutboundRequest::json(
            self.settings.proxy_endpoint.clone(),
            self.settings.proxy_token.expose_secret(),
            &payload,
            self.settings.proxy_skip_tls_verify,
        ) {
            Ok(request) => self.client.send(request).await,
            Err(error) => {
                warn!(
                    event_name = "dispatch.command.encode_failed",
                    error = %error,
                    "could not encode proxy payload"
                );
                false
            }
        };

        if delivered {
            debug!(
                event_name = "dispatch.command.delivered",
                action = %action.tag(),
                user_id = %command.user_id,
                "proxy accepted clock command"
            );
            return DispatchOutcome::Delivered(action);
        }

        let notice = failure_notice(&timestamp, &command.user_name, action);
        let notified = match OutboundRequest::json(
            self.settings.channel_url.clone(),
            self.settings.channel_auth_header(),
            &notice,
            self.settings.channel_skip_tls_verify,
        ) {
            Ok(request) => self.client.send(request).await,
            Err(error) => {
                warn!(
                    event_name = "dispatch.notify.encode_failed",
                    error = %error,
                    "could not encode failure notice"
                );
                false
            }
        };

        warn!(
            event_name = "dispatch.command.failed",
            action = %action.tag(),
            user_name = %command.user_name,
            user_id = %command.user_id,
            timestamp = %timestamp,
            notified,
            "clock command was not accepted by proxy"
        );
        DispatchOutcome::Failed { action, notified }
    }
}

#[async_trait]
impl<C> CommandHandler for ClockCommandDispatcher<C>
where
    C: OutboundClient + 'static,
{
    async fn handle(&self, command: SlashCommandPayload) -> DispatchOutcome {
        let Some(action) = ClockAction::from_command(&command.command) else {
            info!(
                event_name = "dispatch.command.ignored",
                command = %command.command,
                "ignored unrecognized slash command"
            );
            return DispatchOutcome::Ignored;
        };

        if command.text == TEST_ARGUMENT {
            info!(
                event_name = "dispatch.command.test_argument",
                command = %command.command,
                text = %command.text,
                "received test argument; forwarding anyway"
            );
        }

        self.forward(action, &command).await
    }
}
