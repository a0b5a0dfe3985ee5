//! Credential storage behind one narrow interface.
//!
//! The coordinator never cares where identity markers live. Anything that can
//! get, set and clear string values by key can back a session: an in-memory
//! map scoped to one tab/process, the OS keyring, or the SQLite `kv` table.

mod keyring_store;

pub use keyring_store::KeyringCredentialStore;

use std::collections::HashMap;

use crate::error::CredentialError;

/// Authorization code returned by the identity provider at login.
pub const AUTH_CODE: &str = "auth_code";
/// Identity-provider user id.
pub const USER_ID: &str = "user_id";
/// Identity-provider display name.
pub const USER_NAME: &str = "user_name";
/// Identity-provider logout URL captured at login.
pub const LOGOUT_URL: &str = "redirect_to_box_url";
/// RFC 3339 timestamp of the current session start.
pub const SESSION_STARTED_AT: &str = "session_started_at";

/// Every key written on login. `clear_credentials` removes exactly these.
pub const SESSION_KEYS: [&str; 5] = [AUTH_CODE, USER_ID, USER_NAME, LOGOUT_URL, SESSION_STARTED_AT];

/// Pluggable key-value store scoped to one session.
pub trait CredentialStore: Send {
    fn get_credential(&self, key: &str) -> Result<Option<String>, CredentialError>;

    fn set_credential(&mut self, key: &str, value: &str) -> Result<(), CredentialError>;

    /// Remove all session credential material. Clearing an empty store is not an error.
    fn clear_credentials(&mut self) -> Result<(), CredentialError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn get_credential(&self, key: &str) -> Result<Option<String>, CredentialError> {
        (**self).get_credential(key)
    }

    fn set_credential(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        (**self).set_credential(key, value)
    }

    fn clear_credentials(&mut self) -> Result<(), CredentialError> {
        (**self).clear_credentials()
    }
}

/// Process-local store; lives exactly as long as the owning tab/process.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    values: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credential(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.values.get(key).cloned())
    }

    fn set_credential(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear_credentials(&mut self) -> Result<(), CredentialError> {
        for key in SESSION_KEYS {
            self.values.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip_and_clear() {
        let mut store = MemoryCredentialStore::new();
        store.set_credential(USER_ID, "42").unwrap();
        store.set_credential(LOGOUT_URL, "https://app.box.com/logout").unwrap();
        store.set_credential("unrelated", "kept").unwrap();

        assert_eq!(store.get_credential(USER_ID).unwrap().as_deref(), Some("42"));

        store.clear_credentials().unwrap();
        assert!(store.get_credential(USER_ID).unwrap().is_none());
        assert!(store.get_credential(LOGOUT_URL).unwrap().is_none());
        assert_eq!(store.get_credential("unrelated").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn clearing_empty_store_is_ok() {
        let mut store = MemoryCredentialStore::new();
        store.clear_credentials().unwrap();
        store.clear_credentials().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn boxed_store_delegates() {
        let mut store: Box<dyn CredentialStore> = Box::new(MemoryCredentialStore::new());
        store.set_credential(AUTH_CODE, "abc").unwrap();
        assert_eq!(store.get_credential(AUTH_CODE).unwrap().as_deref(), Some("abc"));
    }
}
