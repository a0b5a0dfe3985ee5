//! Forced logout.
//!
//! Every termination path (decline, silent timeout, expired clock, owner
//! request) ends here: clear credentials, notify the owner, redirect. The
//! redirect is terminal and happens at most once per gate.

use std::fmt;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::credentials::{CredentialStore, LOGOUT_URL};
use crate::events::LogoutReason;

/// Where the user is sent after forced logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutDestination {
    /// Logout URL handed over by the identity provider at login.
    IdentityProvider(Url),
    /// Local sign-out page.
    SignOutPage(String),
}

impl fmt::Display for LogoutDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoutDestination::IdentityProvider(url) => write!(f, "{url}"),
            LogoutDestination::SignOutPage(page) => write!(f, "{page}"),
        }
    }
}

impl LogoutDestination {
    /// Use the captured logout URL when it is a usable http(s) URL, else the sign-out page.
    pub fn resolve(logout_url: Option<&str>, signout_page: &str) -> Self {
        let fallback = || LogoutDestination::SignOutPage(signout_page.to_string());
        let Some(raw) = logout_url.map(str::trim).filter(|s| !s.is_empty()) else {
            debug!("no identity-provider logout URL captured; using sign-out page");
            return fallback();
        };
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                LogoutDestination::IdentityProvider(url)
            }
            Ok(url) => {
                warn!(scheme = url.scheme(), "logout URL has unsupported scheme; using sign-out page");
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "logout URL is not a valid URL; using sign-out page");
                fallback()
            }
        }
    }
}

/// Performs the hard redirect.
pub trait Navigator: Send {
    fn navigate(&mut self, destination: &LogoutDestination);
}

impl<F> Navigator for F
where
    F: FnMut(&LogoutDestination) + Send,
{
    fn navigate(&mut self, destination: &LogoutDestination) {
        self(destination)
    }
}

/// Opens the identity-provider logout page in the system browser.
#[derive(Debug, Clone, Copy)]
pub struct BrowserNavigator {
    open_browser: bool,
}

impl BrowserNavigator {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl Navigator for BrowserNavigator {
    fn navigate(&mut self, destination: &LogoutDestination) {
        match destination {
            LogoutDestination::IdentityProvider(url) if self.open_browser => {
                if let Err(e) = open::that(url.as_str()) {
                    error!(error = %e, %url, "failed to open logout page");
                }
            }
            _ => info!(%destination, "signed out"),
        }
    }
}

/// Single-path terminator for a session.
pub struct LogoutGate {
    navigator: Box<dyn Navigator>,
    signout_page: String,
    terminated: bool,
}

impl fmt::Debug for LogoutGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutGate")
            .field("signout_page", &self.signout_page)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl LogoutGate {
    pub fn new(navigator: Box<dyn Navigator>, signout_page: impl Into<String>) -> Self {
        Self {
            navigator,
            signout_page: signout_page.into(),
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Clear credentials, run `on_logout`, redirect.
    ///
    /// Returns `None` without side effects if this gate already fired.
    /// A store that cannot be read or cleared does not stop the redirect.
    pub fn force_logout(
        &mut self,
        store: &mut dyn CredentialStore,
        reason: LogoutReason,
        on_logout: impl FnOnce(),
    ) -> Option<LogoutDestination> {
        if self.terminated {
            debug!(?reason, "forced logout already performed; ignoring");
            return None;
        }
        self.terminated = true;

        // The logout URL is itself session material; read it before clearing.
        let logout_url = store.get_credential(LOGOUT_URL).unwrap_or_else(|e| {
            error!(error = %e, "failed to read logout URL");
            None
        });
        let destination = LogoutDestination::resolve(logout_url.as_deref(), &self.signout_page);

        if let Err(e) = store.clear_credentials() {
            error!(error = %e, "failed to clear credentials during logout");
        }

        info!(?reason, %destination, "session terminated");
        on_logout();
        self.navigator.navigate(&destination);
        Some(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryCredentialStore, AUTH_CODE};
    use std::sync::{Arc, Mutex};

    fn recording_gate() -> (LogoutGate, Arc<Mutex<Vec<LogoutDestination>>>) {
        let visited = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&visited);
        let gate = LogoutGate::new(
            Box::new(move |d: &LogoutDestination| sink.lock().unwrap().push(d.clone())),
            "/signout",
        );
        (gate, visited)
    }

    #[test]
    fn redirects_to_captured_logout_url() {
        let (mut gate, visited) = recording_gate();
        let mut store = MemoryCredentialStore::new();
        store.set_credential(LOGOUT_URL, "https://app.box.com/logout").unwrap();
        store.set_credential(AUTH_CODE, "code").unwrap();

        let mut logged_out = 0;
        let dest = gate
            .force_logout(&mut store, LogoutReason::Declined, || logged_out += 1)
            .unwrap();

        assert_eq!(dest.to_string(), "https://app.box.com/logout");
        assert_eq!(logged_out, 1);
        assert!(store.get_credential(AUTH_CODE).unwrap().is_none());
        assert!(store.get_credential(LOGOUT_URL).unwrap().is_none());
        assert_eq!(visited.lock().unwrap().len(), 1);
    }

    #[test]
    fn falls_back_to_signout_page() {
        let (mut gate, visited) = recording_gate();
        let mut store = MemoryCredentialStore::new();

        let dest = gate
            .force_logout(&mut store, LogoutReason::TimedOut, || {})
            .unwrap();

        assert_eq!(dest, LogoutDestination::SignOutPage("/signout".into()));
        assert_eq!(visited.lock().unwrap()[0], dest);
    }

    #[test]
    fn second_logout_is_a_no_op() {
        let (mut gate, visited) = recording_gate();
        let mut store = MemoryCredentialStore::new();
        let mut calls = 0;

        assert!(gate.force_logout(&mut store, LogoutReason::TimedOut, || calls += 1).is_some());
        assert!(gate.force_logout(&mut store, LogoutReason::Forced, || calls += 1).is_none());

        assert_eq!(calls, 1);
        assert_eq!(visited.lock().unwrap().len(), 1);
        assert!(gate.is_terminated());
    }

    #[test]
    fn resolve_rejects_unusable_urls() {
        assert_eq!(
            LogoutDestination::resolve(Some("not a url"), "/signout"),
            LogoutDestination::SignOutPage("/signout".into())
        );
        assert_eq!(
            LogoutDestination::resolve(Some("javascript:alert(1)"), "/signout"),
            LogoutDestination::SignOutPage("/signout".into())
        );
        assert_eq!(
            LogoutDestination::resolve(Some("   "), "/bye"),
            LogoutDestination::SignOutPage("/bye".into())
        );
        assert!(matches!(
            LogoutDestination::resolve(Some("https://account.box.com/logout?x=1"), "/signout"),
            LogoutDestination::IdentityProvider(_)
        ));
    }
}
