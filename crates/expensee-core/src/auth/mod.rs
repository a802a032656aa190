//! Authentication module for credential storage and session state.
//!
//! This module provides:
//! - `CredentialStore`: key-value capability for tokens, with an OS keychain
//!   backend (`KeyringCredentialStore`) and an in-memory one
//! - `TokenVault`: typed access to the access/refresh token pair
//! - `SessionStore`: the auth state container that receives `SessionEvent`s

pub mod credentials;
pub mod session;

pub use credentials::{
    CredentialStore, KeyringCredentialStore, MemoryCredentialStore, StoreError, TokenVault,
};
pub use session::{AuthState, SessionEvent, SessionEvents, SessionStore};
