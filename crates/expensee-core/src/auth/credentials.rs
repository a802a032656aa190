//! Persistent key-value storage for tokens and the cached user profile.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use keyring::Entry;
use thiserror::Error;
use tracing::warn;

use crate::models::TokenPair;

/// Keychain service name for stored credentials
pub const SERVICE_NAME: &str = "expensee";

/// Storage key for the bearer access token
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key for the cached user profile (JSON)
pub const USER_INFO_KEY: &str = "user_info";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Keychain error for '{key}': {message}")]
    Backend { key: String, message: String },
}

impl StoreError {
    pub fn backend(key: &str, message: impl ToString) -> Self {
        StoreError::Backend {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Key-value capability the request pipeline reads credentials from.
///
/// Removing a key that does not exist is not an error.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Credential store backed by the OS keychain.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key).map_err(|e| StoreError::backend(key, e))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::backend(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::backend(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::backend(key, e)),
        }
    }
}

/// In-process credential store for tests and for hosts without a keychain.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a key/value pair
    pub fn with(self, key: &str, value: &str) -> Self {
        self.lock().insert(key.to_string(), value.to_string());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Typed access to the three credential keys.
#[derive(Clone)]
pub struct TokenVault {
    store: Arc<dyn CredentialStore>,
}

impl TokenVault {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.store.get(AUTH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(AUTH_TOKEN_KEY, token)
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(REFRESH_TOKEN_KEY, token)
    }

    pub fn remove_refresh_token(&self) -> Result<(), StoreError> {
        self.store.remove(REFRESH_TOKEN_KEY)
    }

    /// Write both tokens. If the second write fails the access token is put
    /// back to its previous value, so readers never see a mixed pair.
    pub fn store_pair(&self, pair: &TokenPair) -> Result<(), StoreError> {
        let previous_access = self.store.get(AUTH_TOKEN_KEY)?;
        self.store.set(AUTH_TOKEN_KEY, &pair.access_token)?;

        if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token) {
            let rollback = match previous_access {
                Some(ref old) => self.store.set(AUTH_TOKEN_KEY, old),
                None => self.store.remove(AUTH_TOKEN_KEY),
            };
            if let Err(rollback_err) = rollback {
                warn!(error = %rollback_err, "Failed to roll back access token after partial write");
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn cached_user(&self) -> Result<Option<String>, StoreError> {
        self.store.get(USER_INFO_KEY)
    }

    pub fn cache_user(&self, json: &str) -> Result<(), StoreError> {
        self.store.set(USER_INFO_KEY, json)
    }

    /// Remove access token, refresh token and cached profile, in that order.
    /// Every removal is attempted; failures are returned after all have run.
    pub fn clear(&self) -> Vec<StoreError> {
        [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY]
            .iter()
            .filter_map(|key| self.store.remove(key).err())
            .collect()
    }
}
