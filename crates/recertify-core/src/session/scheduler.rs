//! Session timeout state machine.
//!
//! Like a wall-clock timer engine, the coordinator owns no threads: timers are
//! deadline handles, and whoever drives it calls `tick()` once a deadline has
//! passed (see [`super::driver`] for a tokio loop that does this).
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running -> Warning -> Running      (extend)
//!               |          |
//!               |          +-----> Terminated   (decline / response window elapsed)
//!               +-> Stopped                     (stop)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let gate = LogoutGate::new(Box::new(BrowserNavigator::new(true)), "/signout");
//! let mut session = SessionTimeout::new(config, clock, store, gate);
//! session.start(options);
//! // When session.next_deadline() passes:
//! session.tick(); // Some(SessionEvent) when a timer fired
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SessionClock};
use super::gate::LogoutGate;
use super::TimeoutConfig;
use crate::credentials::CredentialStore;
use crate::events::{LogoutReason, SessionEvent, StopCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    /// Nothing armed. Initial state, and the state after `stop()`.
    Stopped,
    /// Warning timer armed.
    Running,
    /// Prompt visible, response timer armed.
    Warning,
    /// Forced logout happened. Terminal.
    Terminated,
}

/// Whether the "are you still working?" prompt is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Hidden,
    Visible {
        /// Response window granted when the prompt was shown.
        remaining: Duration,
        armed_at: DateTime<Utc>,
    },
}

impl PromptState {
    pub fn is_visible(&self) -> bool {
        matches!(self, PromptState::Visible { .. })
    }

    /// Countdown left on a visible prompt at `now`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            PromptState::Hidden => None,
            PromptState::Visible {
                remaining,
                armed_at,
            } => Some((*remaining - (now - *armed_at)).max(Duration::zero())),
        }
    }
}

type Hook = Box<dyn FnMut() + Send>;

/// Callbacks supplied by the owning UI surface.
#[derive(Default)]
pub struct SessionTimeoutOptions {
    on_show_popup: Option<Box<dyn FnMut(Duration) + Send>>,
    on_hide_popup: Option<Hook>,
    on_logout: Option<Hook>,
    on_extend_session: Option<Hook>,
}

impl fmt::Debug for SessionTimeoutOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTimeoutOptions")
            .field("on_show_popup", &self.on_show_popup.is_some())
            .field("on_hide_popup", &self.on_hide_popup.is_some())
            .field("on_logout", &self.on_logout.is_some())
            .field("on_extend_session", &self.on_extend_session.is_some())
            .finish()
    }
}

impl SessionTimeoutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the response window length when the warning threshold is reached.
    pub fn on_show_popup(mut self, f: impl FnMut(Duration) + Send + 'static) -> Self {
        self.on_show_popup = Some(Box::new(f));
        self
    }

    pub fn on_hide_popup(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_hide_popup = Some(Box::new(f));
        self
    }

    /// Called once, before the redirect, on forced termination.
    pub fn on_logout(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_logout = Some(Box::new(f));
        self
    }

    /// Called when the user confirms, before the next warning is armed.
    pub fn on_extend_session(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_extend_session = Some(Box::new(f));
        self
    }

    fn show_popup(&mut self, window: Duration) {
        if let Some(f) = self.on_show_popup.as_mut() {
            f(window);
        }
    }

    fn hide_popup(&mut self) {
        if let Some(f) = self.on_hide_popup.as_mut() {
            f();
        }
    }

    fn notify_logout(&mut self) {
        if let Some(f) = self.on_logout.as_mut() {
            f();
        }
    }

    fn extend_session(&mut self) {
        if let Some(f) = self.on_extend_session.as_mut() {
            f();
        }
    }
}

/// Session-timeout coordinator for one signed-in session.
pub struct SessionTimeout {
    config: TimeoutConfig,
    clock: Arc<dyn Clock>,
    store: Box<dyn CredentialStore>,
    gate: LogoutGate,
    options: SessionTimeoutOptions,
    state: CoordinatorState,
    prompt: PromptState,
    session: Option<SessionClock>,
    /// Deadline of the pending warning, if armed.
    warning_timer: Option<DateTime<Utc>>,
    /// Deadline of the pending forced logout, if armed.
    response_timer: Option<DateTime<Utc>>,
}

impl fmt::Debug for SessionTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTimeout")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("prompt", &self.prompt)
            .field("session", &self.session)
            .field("warning_timer", &self.warning_timer)
            .field("response_timer", &self.response_timer)
            .finish_non_exhaustive()
    }
}

impl SessionTimeout {
    pub fn new(
        config: TimeoutConfig,
        clock: Arc<dyn Clock>,
        store: Box<dyn CredentialStore>,
        gate: LogoutGate,
    ) -> Self {
        Self {
            config,
            clock,
            store,
            gate,
            options: SessionTimeoutOptions::default(),
            state: CoordinatorState::Stopped,
            prompt: PromptState::Hidden,
            session: None,
            warning_timer: None,
            response_timer: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn prompt(&self) -> &PromptState {
        &self.prompt
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CoordinatorState::Running | CoordinatorState::Warning)
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&SessionClock> {
        self.session.as_ref()
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Session time left right now, if a session is loaded.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.session.map(|s| s.remaining(now))
    }

    /// Number of live timer handles (0, 1 or 2).
    pub fn armed_timers(&self) -> usize {
        self.warning_timer.is_some() as usize + self.response_timer.is_some() as usize
    }

    /// Earliest armed deadline; a driver should call `tick()` once it passes.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.warning_timer, self.response_timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> SessionEvent {
        let now = self.clock.now();
        SessionEvent::StateSnapshot {
            state: self.state,
            prompt_visible: self.prompt.is_visible(),
            started_at: self.session.map(|s| s.started_at()),
            remaining_ms: self
                .session
                .map(|s| s.remaining(now).num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            armed_timers: self.armed_timers(),
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm the warning timer for the current session.
    ///
    /// No-op while already running or after termination. Logs out at once if
    /// the session budget is already spent; shows the warning at once if less
    /// than the warning lead time remains.
    pub fn start(&mut self, options: SessionTimeoutOptions) -> Option<SessionEvent> {
        match self.state {
            CoordinatorState::Running | CoordinatorState::Warning => {
                warn!("session timeout coordinator is already running");
                return None;
            }
            CoordinatorState::Terminated => {
                warn!("session already terminated; start ignored");
                return None;
            }
            CoordinatorState::Stopped => {}
        }
        self.options = options;
        let now = self.clock.now();
        self.arm(now)
    }

    /// Cancel every armed timer. Safe to call at any time.
    pub fn stop(&mut self) -> Option<SessionEvent> {
        self.stop_with(StopCause::Requested)
    }

    /// User confirmed continued activity.
    pub fn extend(&mut self) -> Option<SessionEvent> {
        if self.state != CoordinatorState::Warning {
            debug!(state = ?self.state, "extend ignored: no prompt visible");
            return None;
        }
        let now = self.clock.now();
        self.response_timer = None;

        if let Some(session) = self.session.as_mut() {
            session.reset_to(now);
            if let Err(e) = session.persist(self.store.as_mut()) {
                warn!(error = %e, "failed to persist extended session start");
            }
        }
        info!("session extended by user");
        self.options.extend_session();
        self.prompt = PromptState::Hidden;
        self.options.hide_popup();

        match self.arm(now)? {
            SessionEvent::SessionStarted {
                started_at,
                warning_at,
                ..
            } => Some(SessionEvent::SessionExtended {
                started_at,
                warning_at,
                at: now,
            }),
            other => Some(other),
        }
    }

    /// User declined to continue.
    pub fn decline(&mut self) -> Option<SessionEvent> {
        if self.state != CoordinatorState::Warning {
            debug!(state = ?self.state, "decline ignored: no prompt visible");
            return None;
        }
        let now = self.clock.now();
        self.response_timer = None;
        info!("user chose to log out");
        self.prompt = PromptState::Hidden;
        self.options.hide_popup();
        self.force_logout(LogoutReason::Declined, now)
    }

    /// Terminate the session now, from any non-terminal state.
    pub fn logout(&mut self) -> Option<SessionEvent> {
        let now = self.clock.now();
        if self.prompt.is_visible() {
            self.prompt = PromptState::Hidden;
            self.options.hide_popup();
        }
        self.force_logout(LogoutReason::Forced, now)
    }

    /// Fire whichever timer is due. Returns `Some(event)` when one fired.
    pub fn tick(&mut self) -> Option<SessionEvent> {
        let now = self.clock.now();

        if self.response_timer.is_some_and(|deadline| now >= deadline) {
            self.response_timer = None;
            info!("no response to session warning; logging out");
            self.prompt = PromptState::Hidden;
            self.options.hide_popup();
            return self.force_logout(LogoutReason::TimedOut, now);
        }

        if self.warning_timer.is_some_and(|deadline| now >= deadline) {
            self.warning_timer = None;
            return self.fire_warning(now);
        }

        None
    }

    // ── Internal ─────────────────────────────────────────────────────

    pub(crate) fn stop_with(&mut self, cause: StopCause) -> Option<SessionEvent> {
        self.cancel_timers();
        if !self.is_running() {
            debug!(state = ?self.state, "stop ignored: coordinator not running");
            return None;
        }
        self.state = CoordinatorState::Stopped;
        self.prompt = PromptState::Hidden;
        info!(?cause, "session timeout coordinator stopped");
        Some(SessionEvent::SessionStopped {
            cause,
            at: self.clock.now(),
        })
    }

    fn cancel_timers(&mut self) {
        self.warning_timer = None;
        self.response_timer = None;
    }

    /// Loaded session, restoring or beginning one on first use.
    fn ensure_session(&mut self, now: DateTime<Utc>) -> Option<SessionClock> {
        if let Some(session) = self.session {
            return Some(session);
        }
        let budget = self.config.duration_budget();
        let session = match SessionClock::load(self.store.as_ref(), budget) {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("no recorded session start; starting the clock now");
                SessionClock::begin(self.store.as_mut(), budget, now).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to persist session start");
                    SessionClock::new(now, budget)
                })
            }
            Err(e) => {
                error!(error = %e, "cannot read session start");
                return None;
            }
        };
        self.session = Some(session);
        Some(session)
    }

    fn arm(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.cancel_timers();

        let Some(session) = self.ensure_session(now) else {
            return self.force_logout(LogoutReason::Expired, now);
        };
        let remaining = session.remaining(now);
        if remaining <= Duration::zero() {
            info!("session budget already spent");
            return self.force_logout(LogoutReason::Expired, now);
        }

        self.state = CoordinatorState::Running;
        let delay = remaining - self.config.warning_lead();
        if delay <= Duration::zero() {
            debug!("less than the warning lead time remains; warning now");
            return self.fire_warning(now);
        }

        let warning_at = later(now, delay);
        self.warning_timer = Some(warning_at);
        info!(%warning_at, expires_at = %session.expires_at(), "session timeout armed");
        Some(SessionEvent::SessionStarted {
            started_at: session.started_at(),
            warning_at,
            expires_at: session.expires_at(),
            at: now,
        })
    }

    fn fire_warning(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        let session = match self.session {
            Some(session) if !session.is_expired(now) => session,
            _ => {
                info!("warning fired after session expiry");
                return self.force_logout(LogoutReason::Expired, now);
            }
        };

        let window = self.config.response_window();
        self.state = CoordinatorState::Warning;
        self.prompt = PromptState::Visible {
            remaining: window,
            armed_at: now,
        };
        info!("showing session timeout warning");
        self.options.show_popup(window);
        self.response_timer = Some(later(now, window));

        Some(SessionEvent::WarningShown {
            remaining_ms: window.num_milliseconds().max(0) as u64,
            expires_at: session.expires_at(),
            at: now,
        })
    }

    fn force_logout(&mut self, reason: LogoutReason, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.cancel_timers();
        if self.state == CoordinatorState::Terminated {
            debug!(?reason, "already terminated; logout ignored");
            return None;
        }
        self.state = CoordinatorState::Terminated;
        self.prompt = PromptState::Hidden;
        self.session = None;

        let options = &mut self.options;
        let destination =
            self.gate
                .force_logout(self.store.as_mut(), reason, || options.notify_logout())?;

        Some(SessionEvent::LoggedOut {
            reason,
            destination: destination.to_string(),
            at: now,
        })
    }
}

fn later(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
