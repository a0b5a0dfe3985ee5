//! Session clock and wall-clock sources.
//!
//! Remaining time is always recomputed from wall-clock time and the persisted
//! session start, never from accumulated timer ticks. A late timer (suspended
//! process, backgrounded tab) therefore self-corrects on the next evaluation,
//! and a reload does not hand the user a fresh budget.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::credentials::{CredentialStore, SESSION_STARTED_AT};
use crate::error::CredentialError;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Start of the current session and the total time it may last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    pub duration_budget: Duration,
}

/// Answers "how much session time is left".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    record: SessionRecord,
}

impl SessionClock {
    pub fn new(started_at: DateTime<Utc>, duration_budget: Duration) -> Self {
        Self {
            record: SessionRecord {
                started_at,
                duration_budget,
            },
        }
    }

    /// Restore the clock persisted by a previous run of the same session.
    ///
    /// Returns `Ok(None)` when no session start has been recorded.
    pub fn load(
        store: &dyn CredentialStore,
        duration_budget: Duration,
    ) -> Result<Option<Self>, CredentialError> {
        let Some(raw) = store.get_credential(SESSION_STARTED_AT)? else {
            return Ok(None);
        };
        let started_at = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| CredentialError::Malformed {
                key: SESSION_STARTED_AT.to_string(),
                message: e.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Some(Self::new(started_at, duration_budget)))
    }

    /// Start a new session at `now` and persist the start.
    pub fn begin(
        store: &mut dyn CredentialStore,
        duration_budget: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, CredentialError> {
        let clock = Self::new(now, duration_budget);
        clock.persist(store)?;
        Ok(clock)
    }

    pub fn persist(&self, store: &mut dyn CredentialStore) -> Result<(), CredentialError> {
        store.set_credential(SESSION_STARTED_AT, &self.record.started_at.to_rfc3339())
    }

    /// Move the session start forward to `now`. Never moves it backward.
    pub fn reset_to(&mut self, now: DateTime<Utc>) {
        if now > self.record.started_at {
            self.record.started_at = now;
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.record.started_at
    }

    pub fn duration_budget(&self) -> Duration {
        self.record.duration_budget
    }

    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.record
            .started_at
            .checked_add_signed(self.record.duration_budget)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.record.started_at).max(Duration::zero())
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.record.duration_budget - self.elapsed(now)).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) == Duration::zero()
    }
}
