use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub const CLOCK_IN_COMMAND: &str = "/clock-in";
pub const CLOCK_OUT_COMMAND: &str = "/clock-out";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

impl ClockAction {
    /// Case-sensitive exact match on the slash command name.
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            CLOCK_IN_COMMAND => Some(Self::ClockIn),
            CLOCK_OUT_COMMAND => Some(Self::ClockOut),
            _ => None,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::ClockIn => CLOCK_IN_COMMAND,
            Self::ClockOut => CLOCK_OUT_COMMAND,
        }
    }

    /// Downstream vocabulary word (`clockin` / `clockout`).
    pub fn tag(&self) -> String {
        action_tag(self.command())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ClockIn => "clock in",
            Self::ClockOut => "clock out",
        }
    }
}

/// Removes the first `/` and then the first `-` from a command name.
///
/// The proxy matches the resulting words exactly; later hyphens are kept.
pub fn action_tag(command: &str) -> String {
    let without_slash = command.replacen('/', "", 1);
    without_slash.replacen('-', "", 1)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClockEventPayload {
    pub event: String,
    pub slack_uid: String,
}

impl ClockEventPayload {
    pub fn new(action: ClockAction, user_id: impl Into<String>) -> Self {
        Self { event: action.tag(), slack_uid: user_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub text: String,
}

/// Channel text posted when the proxy rejects an action.
///
/// The verb names the action that failed, so a failed clock-out reads
/// "clock out `failed`" rather than always "clock in". Channel filters that
/// match on the literal text should expect both forms.
pub fn failure_notice(timestamp: &str, user_name: &str, action: ClockAction) -> NotificationPayload {
    NotificationPayload {
        text: format!("{timestamp}:{user_name} {} `failed`, please try again", action.label()),
    }
}

pub fn format_timestamp(instant: DateTime<Utc>, time_zone: Tz) -> String {
    time_zone.from_utc_datetime(&instant.naive_utc()).format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{action_tag, failure_notice, format_timestamp, ClockAction, ClockEventPayload};

    #[test]
    fn recognises_only_exact_command_names() {
        assert_eq!(ClockAction::from_command("/clock-in"), Some(ClockAction::ClockIn));
        assert_eq!(ClockAction::from_command("/clock-out"), Some(ClockAction::ClockOut));
        assert_eq!(ClockAction::from_command("/Clock-In"), None);
        assert_eq!(ClockAction::from_command("/clock-in "), None);
        assert_eq!(ClockAction::from_command("/unknown-cmd"), None);
    }

    #[test]
    fn action_tag_strips_first_slash_and_first_hyphen() {
        assert_eq!(action_tag("/clock-in"), "clockin");
        assert_eq!(action_tag("/clock-out"), "clockout");
        assert_eq!(action_tag("/clock-in-late"), "clockin-late");
        assert_eq!(ClockAction::ClockIn.tag(), "clockin");
        assert_eq!(ClockAction::ClockOut.tag(), "clockout");
    }

    #[test]
    fn clock_event_payload_matches_proxy_wire_shape() {
        let payload = ClockEventPayload::new(ClockAction::ClockIn, "U123");
        let value = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(value, serde_json::json!({"event": "clockin", "slack_uid": "U123"}));
    }

    #[test]
    fn failure_notice_names_user_and_failure() {
        let notice = failure_notice("2026-03-02 09:15:00", "Bob", ClockAction::ClockOut);

        assert_eq!(notice.text, "2026-03-02 09:15:00:Bob clock out `failed`, please try again");
        let value = serde_json::to_value(&notice).expect("serialize");
        assert_eq!(value["text"], notice.text);
    }

    #[test]
    fn timestamps_render_in_configured_zone() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 15, 0, 30, 0).single().expect("valid instant");
        let sydney: Tz = "Australia/Sydney".parse().expect("known zone");

        // January is daylight-saving time in Sydney (UTC+11).
        assert_eq!(format_timestamp(instant, sydney), "2026-01-15 11:30:00");
        assert_eq!(format_timestamp(instant, Tz::UTC), "2026-01-15 00:30:00");
    }
}
