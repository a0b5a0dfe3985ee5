use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::CoordinatorState;

/// Why a session was forcibly terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// User answered "no" to the warning prompt.
    Declined,
    /// Response window elapsed with no answer.
    TimedOut,
    /// Session budget was already spent when checked.
    Expired,
    /// Owner requested termination directly.
    Forced,
}

/// Why the coordinator was stopped without terminating the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    Requested,
    /// Every handle to a running driver was dropped.
    OwnerDropped,
}

/// Every state change of the session coordinator produces an Event.
/// The CLI prints them; the SQLite store keeps them as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStarted {
        started_at: DateTime<Utc>,
        warning_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    WarningShown {
        /// Length of the response window.
        remaining_ms: u64,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SessionExtended {
        started_at: DateTime<Utc>,
        warning_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SessionStopped {
        cause: StopCause,
        at: DateTime<Utc>,
    },
    LoggedOut {
        reason: LogoutReason,
        destination: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: CoordinatorState,
        prompt_visible: bool,
        started_at: Option<DateTime<Utc>>,
        remaining_ms: u64,
        armed_timers: usize,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Variant name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "SessionStarted",
            SessionEvent::WarningShown { .. } => "WarningShown",
            SessionEvent::SessionExtended { .. } => "SessionExtended",
            SessionEvent::SessionStopped { .. } => "SessionStopped",
            SessionEvent::LoggedOut { .. } => "LoggedOut",
            SessionEvent::StateSnapshot { .. } => "StateSnapshot",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::SessionStarted { at, .. }
            | SessionEvent::WarningShown { at, .. }
            | SessionEvent::SessionExtended { at, .. }
            | SessionEvent::SessionStopped { at, .. }
            | SessionEvent::LoggedOut { at, .. }
            | SessionEvent::StateSnapshot { at, .. } => *at,
        }
    }
}
