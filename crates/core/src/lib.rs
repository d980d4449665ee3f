//! Core building blocks for clockbridge: configuration, the clock-action
//! vocabulary shared with the downstream proxy, and the outbound HTTP client.
//!
//! Failure notices posted to the channel name the action that failed
//! (`clock in` or `clock out`); see [`clock::failure_notice`].

pub mod clock;
pub mod config;
pub mod outbound;

pub use clock::{ClockAction, ClockEventPayload, NotificationPayload};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use outbound::{HttpOutboundClient, OutboundClient, OutboundError, OutboundRequest};
