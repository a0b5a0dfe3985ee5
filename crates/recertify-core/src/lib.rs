//! # Recertify Core Library
//!
//! Session lifecycle for the container recertification console. A signed-in
//! session has a fixed time budget; shortly before it runs out the user is
//! asked whether they are still working, and if they say no (or say nothing)
//! the session is terminated: credentials are cleared and the browser is sent
//! to the identity provider's logout page.
//!
//! ## Architecture
//!
//! - **Session Clock**: remaining budget derived from a persisted start time
//! - **Timeout Scheduler**: a deadline-based state machine; the caller
//!   invokes `tick()` (or lets [`session::driver`] do it on a tokio task)
//! - **Logout Gate**: single-path, idempotent forced logout
//! - **Credentials**: pluggable store (memory, OS keyring, SQLite)
//!
//! ## Key Components
//!
//! - [`SessionTimeout`]: session-timeout coordinator
//! - [`CredentialStore`]: where identity markers live
//! - [`Config`]: application configuration
//! - [`Database`]: SQLite credential store and event history

pub mod auth;
pub mod credentials;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;

pub use auth::{
    capture_login, current_user, is_admin_user, is_authenticated, LoginCredentials, User,
};
pub use credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use error::{ConfigError, CoreError, CredentialError, DatabaseError, ValidationError};
pub use events::{LogoutReason, SessionEvent, StopCause};
pub use session::{
    BrowserNavigator, Clock, CoordinatorState, LogoutDestination, LogoutGate, ManualClock,
    Navigator, PromptState, SessionClock, SessionTimeout, SessionTimeoutOptions, SystemClock,
    TimeoutConfig,
};
pub use storage::{Config, Database};
