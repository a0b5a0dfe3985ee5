//! Session-timeout coordination.
//!
//! - [`SessionClock`]: how much of the session budget is left at an instant
//! - [`SessionTimeout`]: the warning / response-window state machine
//! - [`LogoutGate`]: single-path forced logout and redirect
//! - [`driver`]: runs a coordinator on a tokio task with real timers

mod clock;
pub mod driver;
mod gate;
mod scheduler;

pub use clock::{Clock, ManualClock, SessionClock, SessionRecord, SystemClock};
pub use gate::{BrowserNavigator, LogoutDestination, LogoutGate, Navigator};
pub use scheduler::{CoordinatorState, PromptState, SessionTimeout, SessionTimeoutOptions};

use chrono::Duration;

use crate::error::ValidationError;

/// Longest budget, lead or window accepted (100 years of 365 days).
const MAX_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Validated timing parameters for a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    duration_budget: Duration,
    warning_lead: Duration,
    response_window: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration_budget: Duration::hours(1),
            warning_lead: Duration::seconds(60),
            response_window: Duration::seconds(60),
        }
    }
}

impl TimeoutConfig {
    /// # Errors
    /// Rejects non-positive or longer-than-a-century durations, and a lead
    /// time that is not strictly shorter than the budget (the prompt must
    /// appear before expiry).
    pub fn new(
        duration_budget: Duration,
        warning_lead: Duration,
        response_window: Duration,
    ) -> Result<Self, ValidationError> {
        check_range(duration_budget, "duration_budget")?;
        check_range(response_window, "response_window")?;
        check_range(warning_lead, "warning_lead")?;
        if warning_lead >= duration_budget {
            return Err(ValidationError::LeadExceedsBudget {
                lead_secs: warning_lead.num_seconds().max(0) as u64,
                budget_secs: duration_budget.num_seconds().max(0) as u64,
            });
        }
        Ok(Self {
            duration_budget,
            warning_lead,
            response_window,
        })
    }

    pub fn from_secs(
        duration_budget_secs: u64,
        warning_lead_secs: u64,
        response_window_secs: u64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            secs(duration_budget_secs, "duration_budget")?,
            secs(warning_lead_secs, "warning_lead")?,
            secs(response_window_secs, "response_window")?,
        )
    }

    pub fn duration_budget(&self) -> Duration {
        self.duration_budget
    }

    pub fn warning_lead(&self) -> Duration {
        self.warning_lead
    }

    pub fn response_window(&self) -> Duration {
        self.response_window
    }
}

fn check_range(value: Duration, field: &str) -> Result<(), ValidationError> {
    if value <= Duration::zero() {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            message: "must be positive".into(),
        });
    }
    if value.num_seconds() > MAX_SECS {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            message: format!("must be at most {MAX_SECS} seconds"),
        });
    }
    Ok(())
}

fn secs(value: u64, field: &str) -> Result<Duration, ValidationError> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ValidationError::InvalidValue {
            field: field.into(),
            message: format!("{value} seconds is out of range"),
        })
}
