//! Events published to observers of the monitor.
//!
//! Presentation layers subscribe to these to drive on-screen text; nothing
//! else couples the engine to presentation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a session returned to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The user cancelled monitoring.
    Cancelled,
    /// The alarm fired.
    Triggered,
    /// A new session was started in its place.
    Replaced,
}

/// Every state change and distance update of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A session was armed.
    Started {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Name of the monitored target.
        target_name: String,
        /// Whether the simulated feed drives the session.
        simulated: bool,
        /// When the event happened.
        at: DateTime<Utc>,
    },
    /// The displayed distance changed.
    Distance {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Name of the monitored target.
        target_name: String,
        /// Distance as displayed, e.g. `"1113m"` or `"--"`.
        distance_label: String,
        /// Distance in meters, if known.
        distance_m: Option<f64>,
        /// When the event happened.
        at: DateTime<Utc>,
    },
    /// The target came within range and the alarm fired.
    Triggered {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Name of the monitored target.
        target_name: String,
        /// Distance as displayed, e.g. `"1113m"` or `"--"`.
        distance_label: String,
        /// When the event happened.
        at: DateTime<Utc>,
    },
    /// The source reported an acquisition failure; monitoring continues.
    SourceError {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Name of the monitored target.
        target_name: String,
        /// Description of the failure.
        message: String,
        /// When the event happened.
        at: DateTime<Utc>,
    },
    /// The session ended and released its resources.
    Stopped {
        /// Session the event belongs to.
        session_id: Uuid,
        /// Name of the monitored target.
        target_name: String,
        /// Why the session ended.
        reason: StopReason,
        /// When the event happened.
        at: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// The session this event belongs to.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        match self {
            Self::Started { session_id, .. }
            | Self::Distance { session_id, .. }
            | Self::Triggered { session_id, .. }
            | Self::SourceError { session_id, .. }
            | Self::Stopped { session_id, .. } => *session_id,
        }
    }

    /// Name of the monitored target.
    #[must_use]
    pub fn target_name(&self) -> &str {
        match self {
            Self::Started { target_name, .. }
            | Self::Distance { target_name, .. }
            | Self::Triggered { target_name, .. }
            | Self::SourceError { target_name, .. }
            | Self::Stopped { target_name, .. } => target_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MonitorEvent::Stopped {
            session_id: Uuid::nil(),
            target_name: "Shibuya".to_string(),
            reason: StopReason::Triggered,
            at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"stopped\""));
        assert!(json.contains("\"reason\":\"triggered\""));
        assert_eq!(event.target_name(), "Shibuya");
        assert_eq!(event.session_id(), Uuid::nil());
    }
}
