use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use recertify_core::session::driver;
use recertify_core::storage::StorageBackend;
use recertify_core::{
    capture_login, current_user, is_authenticated, BrowserNavigator, Config, CredentialStore,
    Database, KeyringCredentialStore, LoginCredentials, LogoutDestination, LogoutGate,
    MemoryCredentialStore, Navigator, SessionEvent, SessionTimeout, SessionTimeoutOptions,
    SystemClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Record a successful identity-provider login and start the session clock
    Login {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        user_name: String,
        #[arg(long)]
        auth_code: String,
        /// Identity-provider page that ends the provider-side session
        #[arg(long)]
        logout_url: Option<String>,
    },
    /// Show current session state
    Status,
    /// Watch the session and answer the timeout prompt (y/n on stdin)
    Watch,
    /// Log out now
    Logout,
    /// Show recent session events
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: SessionAction, store: Option<StorageBackend>) -> CmdResult {
    let config = Config::load()?;
    let backend = store.unwrap_or(config.storage.backend);

    match action {
        SessionAction::Login {
            user_id,
            user_name,
            auth_code,
            logout_url,
        } => {
            let mut store = open_store(backend)?;
            let credentials = LoginCredentials {
                user_id,
                user_name,
                auth_code,
                logout_url,
            };
            let budget = config.timeout_config()?.duration_budget();
            let clock = capture_login(store.as_mut(), &credentials, budget, Utc::now())?;
            let user = current_user(store.as_ref(), &config.identity.admin_user_ids)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "user": user,
                    "started_at": clock.started_at(),
                    "expires_at": clock.expires_at(),
                }))?
            );
        }
        SessionAction::Status => {
            let store = open_store(backend)?;
            require_authenticated(store.as_ref())?;
            let user = current_user(store.as_ref(), &config.identity.admin_user_ids)?;
            let db = Database::open()?;
            // A status query never opens the browser; the destination is reported instead.
            let quiet: Box<dyn Navigator> = Box::new(|_: &LogoutDestination| {});
            let mut coordinator = build_coordinator(store, quiet, &config)?;

            // Arming evaluates the stored start time; a spent session is
            // logged out here rather than reported as running.
            let mut logout_destination = None;
            if let Some(event) = coordinator.start(SessionTimeoutOptions::new()) {
                if let SessionEvent::LoggedOut { destination, .. } = &event {
                    logout_destination = Some(destination.clone());
                    db.record_event(&event)?;
                }
            }

            let mut status = serde_json::to_value(coordinator.snapshot())?;
            status["user"] = serde_json::to_value(&user)?;
            if let Some(destination) = logout_destination {
                status["logout_destination"] = destination.into();
            }
            println!("{}", serde_json::to_string_pretty(&status)?);
            coordinator.stop();
        }
        SessionAction::Watch => {
            let store = open_store(backend)?;
            require_authenticated(store.as_ref())?;
            let db = Database::open()?;
            let coordinator = build_coordinator(store, browser(&config), &config)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(watch(coordinator, &db));
            // A pending stdin read must not hold the process open after logout.
            runtime.shutdown_background();
            result?;
        }
        SessionAction::Logout => {
            let store = open_store(backend)?;
            let db = Database::open()?;
            let mut coordinator = build_coordinator(store, browser(&config), &config)?;
            if let Some(event) = coordinator.logout() {
                report(&db, &event)?;
            }
        }
        SessionAction::History { limit } => {
            let db = Database::open()?;
            let events = db.recent_events(limit)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn open_store(backend: StorageBackend) -> Result<Box<dyn CredentialStore>, Box<dyn std::error::Error>> {
    let store: Box<dyn CredentialStore> = match backend {
        StorageBackend::Sqlite => Box::new(Database::open()?),
        StorageBackend::Keyring => Box::new(KeyringCredentialStore::default()),
        StorageBackend::Memory => {
            warn!("memory credential store does not outlive this process");
            Box::new(MemoryCredentialStore::new())
        }
    };
    Ok(store)
}

fn require_authenticated(store: &dyn CredentialStore) -> CmdResult {
    if is_authenticated(store)? {
        Ok(())
    } else {
        Err("not signed in (run `recertify session login` first)".into())
    }
}

fn browser(config: &Config) -> Box<dyn Navigator> {
    Box::new(BrowserNavigator::new(config.identity.open_browser))
}

fn build_coordinator(
    store: Box<dyn CredentialStore>,
    navigator: Box<dyn Navigator>,
    config: &Config,
) -> Result<SessionTimeout, Box<dyn std::error::Error>> {
    let gate = LogoutGate::new(navigator, config.identity.signout_page.clone());
    Ok(SessionTimeout::new(
        config.timeout_config()?,
        Arc::new(SystemClock),
        store,
        gate,
    ))
}

/// Print an event as JSON and append it to the history log.
fn report(db: &Database, event: &SessionEvent) -> CmdResult {
    println!("{}", serde_json::to_string(event)?);
    if let SessionEvent::LoggedOut { destination, .. } = event {
        eprintln!("Signed out. Continue at {destination}");
    }
    db.record_event(event)?;
    Ok(())
}

async fn watch(coordinator: SessionTimeout, db: &Database) -> CmdResult {
    let (handle, mut events, task) = driver::spawn(coordinator);

    handle.start(
        SessionTimeoutOptions::new()
            .on_show_popup(|window| {
                eprintln!(
                    "Your session is about to expire. Are you still working? [y/n] ({}s to answer)",
                    window.num_seconds()
                );
            })
            .on_extend_session(|| eprintln!("Session extended.")),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => report(db, &event)?,
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match line.trim().to_ascii_lowercase().as_str() {
                    "y" | "yes" => handle.extend(),
                    "n" | "no" => handle.decline(),
                    "s" | "status" => {
                        if let Some(snapshot) = handle.snapshot().await {
                            println!("{}", serde_json::to_string(&snapshot)?);
                        }
                    }
                    "q" | "quit" => {
                        handle.stop();
                        break;
                    }
                    "" => {}
                    other => eprintln!("unrecognized input: {other} (y, n, s or q)"),
                },
                None => {
                    debug!("stdin closed; waiting on timers only");
                    stdin_open = false;
                }
            },
        }
    }

    drop(handle);
    while let Some(event) = events.recv().await {
        report(db, &event)?;
    }
    task.await?;
    Ok(())
}
