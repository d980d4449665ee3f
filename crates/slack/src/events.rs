use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Envelope id that must be echoed back to acknowledge a Socket Mode delivery.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AckHandle(String);

impl AckHandle {
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self(envelope_id.into())
    }

    pub fn envelope_id(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Connecting,
    Connected,
    Disconnect { reason: String },
    Interactive { ack: AckHandle, callback: InteractionCallback },
    SlashCommand { ack: AckHandle, command: SlashCommandPayload },
    Unsupported { event_type: String },
}

impl InboundEvent {
    pub fn event_type(&self) -> InboundEventType {
        match self {
            Self::Connecting => InboundEventType::Connecting,
            Self::Connected => InboundEventType::Connected,
            Self::Disconnect { .. } => InboundEventType::Disconnect,
            Self::Interactive { .. } => InboundEventType::Interactive,
            Self::SlashCommand { .. } => InboundEventType::SlashCommand,
            Self::Unsupported { .. } => InboundEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundEventType {
    Connecting,
    Connected,
    Disconnect,
    Interactive,
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_name: String,
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    BlockActions,
    ViewSubmission,
    Shortcut,
    Other(String),
}

impl InteractionKind {
    fn from_wire(value: &str) -> Self {
        match value {
            "block_actions" => Self::BlockActions,
            "view_submission" => Self::ViewSubmission,
            "shortcut" | "message_action" => Self::Shortcut,
            other => Self::Other(other.to_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionCallback {
    pub kind: InteractionKind,
    pub user_id: Option<String>,
    pub action_ids: Vec<String>,
}

/// Body attached to a slash command acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AckPayload {
    pub text: String,
}

impl AckPayload {
    pub fn processing(command: &SlashCommandPayload) -> Self {
        Self { text: format!("Processing {} {}...", command.user_name, command.command) }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("socket frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("socket frame of type `{frame_type}` is missing `{field}`")]
    MissingField { frame_type: String, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawInteraction {
    #[serde(rename = "type", default)]
    interaction_type: String,
    user: Option<RawUser>,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_id: String,
}

/// Classifies one Socket Mode text frame.
pub fn parse_frame(text: &str) -> Result<InboundEvent, FrameError> {
    let frame: RawFrame = serde_json::from_str(text)?;

    match frame.frame_type.as_str() {
        "hello" => Ok(InboundEvent::Connected),
        "disconnect" => Ok(InboundEvent::Disconnect {
            reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
        }),
        "slash_commands" => {
            let ack = envelope_handle(&frame)?;
            let command = serde_json::from_value::<SlashCommandPayload>(frame.payload)?;
            Ok(InboundEvent::SlashCommand { ack, command })
        }
        "interactive" => {
            let ack = envelope_handle(&frame)?;
            let raw = serde_json::from_value::<RawInteraction>(frame.payload)?;
            Ok(InboundEvent::Interactive {
                ack,
                callback: InteractionCallback {
                    kind: InteractionKind::from_wire(&raw.interaction_type),
                    user_id: raw.user.map(|user| user.id),
                    action_ids: raw.actions.into_iter().map(|action| action.action_id).collect(),
                },
            })
        }
        other => Ok(InboundEvent::Unsupported { event_type: other.to_owned() }),
    }
}

fn envelope_handle(frame: &RawFrame) -> Result<AckHandle, FrameError> {
    frame.envelope_id.as_deref().map(AckHandle::new).ok_or_else(|| FrameError::MissingField {
        frame_type: frame.frame_type.clone(),
        field: "envelope_id",
    })
}

/// Envelope id of a frame that may not parse as a known event.
pub fn envelope_of(text: &str) -> Option<AckHandle> {
    let value = serde_json::from_str::<Value>(text).ok()?;
    value.get("envelope_id")?.as_str().map(AckHandle::new)
}

/// Wire form of an acknowledgment frame.
pub fn ack_frame(handle: &AckHandle, payload: Option<&AckPayload>) -> Value {
    match payload {
        Some(payload) => serde_json::json!({
            "envelope_id": handle.envelope_id(),
            "payload": payload,
        }),
        None => serde_json::json!({ "envelope_id": handle.envelope_id() }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ack_frame, envelope_of, parse_frame, AckHandle, AckPayload, FrameError, InboundEvent,
        InboundEventType, InteractionKind, SlashCommandPayload,
    };

    #[test]
    fn hello_frame_marks_connection_established() {
        let event = parse_frame(r#"{"type":"hello","num_connections":1}"#).expect("parse");
        assert_eq!(event, InboundEvent::Connected);
    }

    #[test]
    fn disconnect_frame_keeps_reason() {
        let event = parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#)
            .expect("parse");
        assert_eq!(event, InboundEvent::Disconnect { reason: "refresh_requested".to_owned() });
        assert_eq!(event.event_type(), InboundEventType::Disconnect);
    }

    #[test]
    fn slash_command_frame_carries_ack_handle_and_user() {
        let event = parse_frame(
            r#"{
                "envelope_id": "env-1",
                "type": "slash_commands",
                "accepts_response_payload": true,
                "payload": {
                    "command": "/clock-in",
                    "text": "",
                    "user_name": "Alice",
                    "user_id": "U123",
                    "channel_id": "C1",
                    "team_id": "T1"
                }
            }"#,
        )
        .expect("parse");

        let InboundEvent::SlashCommand { ack, command } = event else {
            panic!("expected slash command");
        };
        assert_eq!(ack.envelope_id(), "env-1");
        assert_eq!(command.command, "/clock-in");
        assert_eq!(command.user_name, "Alice");
        assert_eq!(command.user_id, "U123");
    }

    #[test]
    fn slash_command_without_envelope_id_is_rejected() {
        let error = parse_frame(
            r#"{"type":"slash_commands","payload":{"command":"/clock-in","user_id":"U1"}}"#,
        )
        .expect_err("missing envelope id");

        assert!(matches!(error, FrameError::MissingField { field: "envelope_id", .. }));
    }

    #[test]
    fn interactive_frame_is_classified_by_subtype() {
        let event = parse_frame(
            r#"{
                "envelope_id": "env-2",
                "type": "interactive",
                "payload": {
                    "type": "block_actions",
                    "user": {"id": "U9"},
                    "actions": [{"action_id": "approve"}, {"action_id": "reject"}]
                }
            }"#,
        )
        .expect("parse");

        let InboundEvent::Interactive { ack, callback } = event else {
            panic!("expected interactive callback");
        };
        assert_eq!(ack, AckHandle::new("env-2"));
        assert_eq!(callback.kind, InteractionKind::BlockActions);
        assert_eq!(callback.user_id.as_deref(), Some("U9"));
        assert_eq!(callback.action_ids, vec!["approve", "reject"]);
    }

    #[test]
    fn unknown_frame_types_are_unsupported() {
        let event = parse_frame(r#"{"envelope_id":"env-3","type":"events_api","payload":{}}"#)
            .expect("parse");
        assert_eq!(event, InboundEvent::Unsupported { event_type: "events_api".to_owned() });
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(parse_frame("not json"), Err(FrameError::Json(_))));
        assert_eq!(envelope_of("not json"), None);
    }

    #[test]
    fn envelope_survives_a_payload_that_does_not_parse() {
        let frame = r#"{"envelope_id":"env-6","type":"slash_commands","payload":{"command":"/clock-in"}}"#;

        assert!(matches!(parse_frame(frame), Err(FrameError::Json(_))), "user_id is required");
        assert_eq!(envelope_of(frame), Some(AckHandle::new("env-6")));
        assert_eq!(envelope_of(r#"{"type":"hello"}"#), None);
    }

    #[test]
    fn processing_ack_mentions_user_and_command() {
        let command = SlashCommandPayload {
            command: "/clock-out".to_owned(),
            text: String::new(),
            user_name: "Bob".to_owned(),
            user_id: "U456".to_owned(),
            channel_id: "C1".to_owned(),
        };
        let payload = AckPayload::processing(&command);
        assert_eq!(payload.text, "Processing Bob /clock-out...");

        let frame = ack_frame(&AckHandle::new("env-4"), Some(&payload));
        assert_eq!(frame["envelope_id"], "env-4");
        assert_eq!(frame["payload"]["text"], "Processing Bob /clock-out...");
        assert!(ack_frame(&AckHandle::new("env-5"), None).get("payload").is_none());
    }
}
