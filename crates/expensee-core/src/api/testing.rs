//! Scripted transport, recording event sink and a faulty credential store
//! for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::error::TransportError;
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::auth::{
    CredentialStore, MemoryCredentialStore, SessionEvent, SessionEvents, StoreError,
};

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// Transport that answers every request with a closure and records what it saw.
pub struct FakeTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<ApiRequest>>,
    yield_before_reply: bool,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            yield_before_reply: false,
        })
    }

    /// Like `new`, but every call suspends once before answering so
    /// concurrent requests interleave.
    pub fn interleaving<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            yield_before_reply: true,
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn base_url(&self) -> &str {
        "https://api.test"
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.yield_before_reply {
            tokio::task::yield_now().await;
        }
        (self.responder)(request)
    }
}

pub fn json_response(status: u16, body: Value) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::new(
        StatusCode::from_u16(status).unwrap(),
        serde_json::to_vec(&body).unwrap(),
    ))
}

/// Event sink that remembers everything dispatched to it.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<SessionEvent>>,
    logouts: AtomicUsize,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

impl SessionEvents for RecordingEvents {
    fn dispatch(&self, event: SessionEvent) {
        if event == SessionEvent::Logout {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().unwrap().push(event);
    }
}

/// Credential store whose removal of one key always fails.
pub struct FailingRemoveStore {
    pub inner: MemoryCredentialStore,
    pub failing_key: &'static str,
}

impl CredentialStore for FailingRemoveStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if key == self.failing_key {
            return Err(StoreError::backend(key, "delete refused"));
        }
        self.inner.remove(key)
    }
}
