//! Tokio driver for a [`SessionTimeout`].
//!
//! The coordinator is moved into a single task. Owner calls arrive as
//! commands on a channel, and the task sleeps until the coordinator's next
//! deadline in between. All mutation happens on that one task, so the
//! coordinator never sees two transitions at once.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::scheduler::{CoordinatorState, SessionTimeout, SessionTimeoutOptions};
use crate::events::{SessionEvent, StopCause};

#[derive(Debug)]
enum Command {
    Start(SessionTimeoutOptions),
    Stop,
    Extend,
    Decline,
    Logout,
    Snapshot(oneshot::Sender<SessionEvent>),
}

/// Cloneable handle to a running coordinator task.
///
/// Every method returns immediately. Calls made after the session has
/// terminated are ignored.
#[derive(Debug, Clone)]
pub struct SessionTimeoutHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionTimeoutHandle {
    pub fn start(&self, options: SessionTimeoutOptions) {
        self.send(Command::Start(options));
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// User clicked "yes".
    pub fn extend(&self) {
        self.send(Command::Extend);
    }

    /// User clicked "no", or the prompt's own countdown ran out.
    pub fn decline(&self) {
        self.send(Command::Decline);
    }

    pub fn logout(&self) {
        self.send(Command::Logout);
    }

    /// Current state, or `None` once the task has finished.
    pub async fn snapshot(&self) -> Option<SessionEvent> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.ok()
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!(command = ?e.0, "session coordinator has finished; command ignored");
        }
    }
}

/// Move `coordinator` onto a tokio task.
///
/// Returns the command handle, a stream of every transition event, and the
/// task's join handle. The task ends after forced logout, or after the last
/// handle is dropped (stopping the coordinator first); it yields the
/// coordinator back for inspection.
pub fn spawn(
    coordinator: SessionTimeout,
) -> (
    SessionTimeoutHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    JoinHandle<SessionTimeout>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(coordinator, command_rx, event_tx));
    (
        SessionTimeoutHandle {
            commands: command_tx,
        },
        event_rx,
        task,
    )
}

async fn run(
    mut coordinator: SessionTimeout,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> SessionTimeout {
    let emit = |event: Option<SessionEvent>| {
        if let Some(event) = event {
            // Nobody listening is fine; the coordinator keeps running.
            let _ = events.send(event);
        }
    };

    loop {
        let wake = coordinator
            .next_deadline()
            .map(|deadline| to_instant(deadline, coordinator.now()));

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start(options)) => emit(coordinator.start(options)),
                Some(Command::Stop) => emit(coordinator.stop()),
                Some(Command::Extend) => emit(coordinator.extend()),
                Some(Command::Decline) => emit(coordinator.decline()),
                Some(Command::Logout) => emit(coordinator.logout()),
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(coordinator.snapshot());
                }
                None => {
                    emit(coordinator.stop_with(StopCause::OwnerDropped));
                    break;
                }
            },
            _ = sleep_until(wake) => {
                while let Some(event) = coordinator.tick() {
                    emit(Some(event));
                }
            }
        }

        if coordinator.state() == CoordinatorState::Terminated {
            debug!("session terminated; driver exiting");
            break;
        }
    }

    coordinator
}

/// Map a wall-clock deadline onto the runtime's monotonic timer.
fn to_instant(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Instant {
    let delay = (deadline - now).to_std().unwrap_or_default();
    Instant::now() + delay
}

async fn sleep_until(wake: Option<Instant>) {
    match wake {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::events::LogoutReason;
    use crate::session::{Clock, LogoutDestination, LogoutGate, TimeoutConfig};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Wall clock that follows the runtime's (pausable) time source.
    struct RuntimeClock {
        wall: DateTime<Utc>,
        base: Instant,
    }

    impl RuntimeClock {
        fn new() -> Self {
            Self {
                wall: Utc::now(),
                base: Instant::now(),
            }
        }
    }

    impl Clock for RuntimeClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = chrono::Duration::from_std(self.base.elapsed()).unwrap();
            self.wall + elapsed
        }
    }

    fn spawn_session() -> (
        SessionTimeoutHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<SessionTimeout>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = log.clone();
        let gate = LogoutGate::new(
            Box::new(move |d: &LogoutDestination| sink.lock().unwrap().push(format!("goto:{d}"))),
            "/signout",
        );
        let coordinator = SessionTimeout::new(
            TimeoutConfig::from_secs(300, 60, 60).unwrap(),
            Arc::new(RuntimeClock::new()),
            Box::new(MemoryCredentialStore::new()),
            gate,
        );
        let (handle, events, task) = spawn(coordinator);
        (handle, events, task, log)
    }

    fn options(log: &Arc<Mutex<Vec<String>>>) -> SessionTimeoutOptions {
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        SessionTimeoutOptions::new()
            .on_show_popup(move |_| a.lock().unwrap().push("show".into()))
            .on_hide_popup(move || b.lock().unwrap().push("hide".into()))
            .on_logout(move || c.lock().unwrap().push("logout".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn warning_fires_at_lead_time() {
        let (handle, mut events, _task, log) = spawn_session();
        handle.start(options(&log));
        assert!(matches!(events.recv().await, Some(SessionEvent::SessionStarted { .. })));

        tokio::time::sleep(Duration::from_secs(239)).await;
        assert!(log.lock().unwrap().is_empty());

        assert!(matches!(events.recv().await, Some(SessionEvent::WarningShown { .. })));
        assert_eq!(*log.lock().unwrap(), vec!["show"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_warning_terminates_task() {
        let (handle, mut events, task, log) = spawn_session();
        handle.start(options(&log));

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(SessionEvent::LoggedOut { reason: LogoutReason::TimedOut, .. })
        ));

        let coordinator = task.await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Terminated);
        assert_eq!(coordinator.armed_timers(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["show", "hide", "logout", "goto:/signout"]);

        handle.extend();
        assert!(handle.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn extend_defers_next_warning() {
        let (handle, mut events, _task, log) = spawn_session();
        handle.start(options(&log));
        events.recv().await;
        assert!(matches!(events.recv().await, Some(SessionEvent::WarningShown { .. })));

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.extend();
        assert!(matches!(events.recv().await, Some(SessionEvent::SessionExtended { .. })));

        tokio::time::sleep(Duration::from_secs(239)).await;
        match handle.snapshot().await.unwrap() {
            SessionEvent::StateSnapshot { state, prompt_visible, .. } => {
                assert_eq!(state, CoordinatorState::Running);
                assert!(!prompt_visible);
            }
            other => panic!("Expected StateSnapshot, got {other:?}"),
        }

        assert!(matches!(events.recv().await, Some(SessionEvent::WarningShown { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_stops_coordinator() {
        let (handle, mut events, task, log) = spawn_session();
        handle.start(options(&log));
        events.recv().await;
        drop(handle);

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::SessionStopped { cause: StopCause::OwnerDropped, .. })
        ));
        let coordinator = task.await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(log.lock().unwrap().is_empty());
    }
}
