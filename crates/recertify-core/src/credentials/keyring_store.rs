//! OS keyring backend.

use super::{CredentialStore, SESSION_KEYS};
use crate::error::CredentialError;

const SERVICE: &str = "recertify";

/// Thin wrapper around the OS keyring for credential storage.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(SERVICE)
    }
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, key).map_err(|source| CredentialError::Keyring {
            key: key.to_string(),
            source,
        })
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get_credential(&self, key: &str) -> Result<Option<String>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(source) => Err(CredentialError::Keyring {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set_credential(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|source| CredentialError::Keyring {
                key: key.to_string(),
                source,
            })
    }

    fn clear_credentials(&mut self) -> Result<(), CredentialError> {
        for key in SESSION_KEYS {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(source) => {
                    return Err(CredentialError::Keyring {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}
