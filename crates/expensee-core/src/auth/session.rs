use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::User;

/// Events the application auth state reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoginStarted,
    LoginSucceeded(User),
    LoginFailed(String),
    /// Credentials were invalidated; the user must sign in again.
    Logout,
    UserUpdated(User),
    /// The pipeline obtained a fresh token pair.
    TokensRefreshed,
    AuthCheckComplete { is_authenticated: bool },
}

/// Sink for session events. The request pipeline only ever talks to the
/// application state through this.
pub trait SessionEvents: Send + Sync {
    fn dispatch(&self, event: SessionEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Set once the startup credential check has finished
    pub initial_check_done: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
            error: None,
            initial_check_done: false,
        }
    }
}

impl AuthState {
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::LoginStarted => {
                self.is_loading = true;
                self.error = None;
            }
            SessionEvent::LoginSucceeded(user) => {
                self.user = Some(user.clone());
                self.is_authenticated = true;
                self.is_loading = false;
                self.error = None;
                self.initial_check_done = true;
            }
            SessionEvent::LoginFailed(message) => {
                self.is_authenticated = false;
                self.is_loading = false;
                self.error = Some(message.clone());
                self.initial_check_done = true;
            }
            SessionEvent::Logout => {
                self.user = None;
                self.is_authenticated = false;
                self.is_loading = false;
                self.initial_check_done = true;
            }
            SessionEvent::UserUpdated(user) => {
                self.user = Some(user.clone());
            }
            SessionEvent::TokensRefreshed => {}
            SessionEvent::AuthCheckComplete { is_authenticated } => {
                self.is_authenticated = *is_authenticated;
                self.is_loading = false;
                self.initial_check_done = true;
            }
        }
    }
}

/// Process-wide auth state container.
///
/// Cloning shares the same state. Observers call [`SessionStore::subscribe`]
/// and are woken on every change.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<AuthState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self { state: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents for SessionStore {
    fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::Logout => info!("Session ended"),
            _ => debug!(?event, "Session event"),
        }
        self.state.send_modify(|state| state.apply(&event));
    }
}
