//! Login capture and authentication gating.
//!
//! After the identity provider's authorization-code exchange succeeds, the
//! identity markers and the provider's logout URL are written to the
//! credential store and the session clock starts. A session counts as
//! authenticated for as long as its authorization code is stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::credentials::{CredentialStore, AUTH_CODE, LOGOUT_URL, USER_ID, USER_NAME};
use crate::error::{Result, ValidationError};
use crate::session::SessionClock;

/// What the identity provider hands back on a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub user_id: String,
    pub user_name: String,
    pub auth_code: String,
    /// Provider page that ends the provider-side session.
    #[serde(default)]
    pub logout_url: Option<String>,
}

/// Signed-in user as known to the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Member of the configured admin list; unlocks the admin views.
    pub is_admin: bool,
}

/// True when `user_id` (ignoring surrounding whitespace) is on the admin list.
pub fn is_admin_user(user_id: &str, admin_user_ids: &[String]) -> bool {
    let user_id = user_id.trim();
    !user_id.is_empty() && admin_user_ids.iter().any(|id| id.trim() == user_id)
}

/// Record a successful login and start a fresh session clock.
///
/// Any previous session's credentials are cleared first, so a new login
/// always starts a full budget.
///
/// # Errors
/// Returns a validation error for a blank user id or authorization code,
/// or a credential error if the store rejects a write.
pub fn capture_login(
    store: &mut dyn CredentialStore,
    credentials: &LoginCredentials,
    duration_budget: Duration,
    now: DateTime<Utc>,
) -> Result<SessionClock> {
    if credentials.user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id".into()).into());
    }
    if credentials.auth_code.trim().is_empty() {
        return Err(ValidationError::MissingField("auth_code".into()).into());
    }

    store.clear_credentials()?;
    store.set_credential(AUTH_CODE, &credentials.auth_code)?;
    store.set_credential(USER_ID, &credentials.user_id)?;
    store.set_credential(USER_NAME, &credentials.user_name)?;

    match credentials.logout_url.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            if Url::parse(raw).is_err() {
                warn!("logout URL does not parse; forced logout will use the sign-out page");
            }
            store.set_credential(LOGOUT_URL, raw)?;
        }
        _ => {}
    }

    let clock = SessionClock::begin(store, duration_budget, now)?;
    info!(user_id = %credentials.user_id, expires_at = %clock.expires_at(), "login captured");
    Ok(clock)
}

/// True while an authorization code is stored.
pub fn is_authenticated(store: &dyn CredentialStore) -> Result<bool> {
    Ok(store
        .get_credential(AUTH_CODE)?
        .is_some_and(|code| !code.is_empty()))
}

/// The signed-in user, if any, with admin membership resolved against
/// `admin_user_ids`.
pub fn current_user(
    store: &dyn CredentialStore,
    admin_user_ids: &[String],
) -> Result<Option<User>> {
    let Some(id) = store.get_credential(USER_ID)? else {
        return Ok(None);
    };
    let name = store.get_credential(USER_NAME)?.unwrap_or_default();
    let is_admin = is_admin_user(&id, admin_user_ids);
    Ok(Some(User { id, name, is_admin }))
}
