//! Slack Integration - Socket Mode clock-in/clock-out bridge
//!
//! This crate provides the Slack side of clockbridge:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - Frame classification and acknowledgment bodies
//! - **Slash Commands** (`commands`) - `/clock-in` and `/clock-out` forwarding
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and add the `/clock-in` and `/clock-out` slash commands
//! 3. Set env vars: `CLOCKBRIDGE_SLACK_APP_TOKEN`, `CLOCKBRIDGE_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack → SocketModeRunner → ack → spawned CommandHandler → proxy endpoint
//!                                              ↓ (on failure)
//!                                        channel notification
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - Event loop; a disconnect ends the run instead of reconnecting
//! - `ClockCommandDispatcher` - Forwards recognized commands downstream
//! - `CommandHandler` - Trait for command handlers

pub mod commands;
pub mod events;
pub mod socket;
