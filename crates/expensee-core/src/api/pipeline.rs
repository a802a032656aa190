//! Authenticated request pipeline.
//!
//! Every bearer request is sent with the stored access token. A `401` on the
//! first attempt triggers one token refresh and one retry; `403`, a second
//! `401`, an explicit token-invalidation body, or a failed refresh tear the
//! session down (all three stored keys removed, then a single
//! `SessionEvent::Logout`) and surface an [`AuthenticationError`].

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::endpoints;
use super::error::{ApiError, AuthFailure, AuthenticationError, TransportError};
use super::transport::{ApiRequest, ApiResponse, AuthMode, RequestBody, Transport};
use crate::auth::{CredentialStore, SessionEvent, SessionEvents, TokenVault};
use crate::models::TokenPair;
use crate::utils::{redact_header, redact_json, truncate_body};

/// User agent reported to the refresh endpoint.
pub const DEFAULT_USER_AGENT: &str = "ExpenseeApp";

/// Bodies longer than this are cut short in log events.
pub const DEFAULT_MAX_LOGGED_BODY: usize = 2000;

/// `error` codes the server uses for a dead token.
const INVALID_TOKEN_CODES: &[&str] = &["invalid_token", "token_expired", "token_revoked"];

/// How concurrent `401`s share a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Each failing request refreshes on its own; simultaneous `401`s race.
    #[default]
    Independent,
    /// One refresh at a time. A request that waited reuses the token the
    /// previous holder stored instead of refreshing again.
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub user_agent: String,
    pub refresh_policy: RefreshPolicy,
    pub max_logged_body: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            refresh_policy: RefreshPolicy::default(),
            max_logged_body: DEFAULT_MAX_LOGGED_BODY,
        }
    }
}

/// Which send of a request this is. Only `Initial` may trigger a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Retry,
}

/// Classification of a completed exchange.
#[derive(Debug)]
enum Outcome {
    Success(ApiResponse),
    NeedsRefresh,
    Fatal(AuthFailure),
    Other(ApiError),
}

#[derive(Clone)]
pub struct AuthPipeline {
    transport: Arc<dyn Transport>,
    vault: TokenVault,
    events: Arc<dyn SessionEvents>,
    options: PipelineOptions,
    refresh_lock: Arc<Mutex<()>>,
}

impl AuthPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        events: Arc<dyn SessionEvents>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            transport,
            vault: TokenVault::new(store),
            events,
            options,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    pub fn events(&self) -> &Arc<dyn SessionEvents> {
        &self.events
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Send a request. Bearer requests go through credential injection and
    /// recovery; anonymous ones are sent as given.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.auth == AuthMode::Anonymous {
            return self.send_anonymous(request).await;
        }

        let sent_token = self.stored_access_token();
        match self.dispatch(request, sent_token.as_deref(), Attempt::Initial).await? {
            Outcome::Success(response) => Ok(response),
            Outcome::NeedsRefresh => self.recover(request, sent_token).await,
            Outcome::Fatal(failure) => Err(self.fail(failure)),
            Outcome::Other(err) => Err(err),
        }
    }

    /// Clear all stored credentials, then tell the application the session
    /// is over. Safe to call repeatedly.
    pub fn force_logout(&self) {
        info!("Logging out user due to authentication failure");
        self.end_session();
    }

    /// Remove all three stored keys, attempting each even if an earlier one
    /// fails, then emit a single `SessionEvent::Logout`.
    pub fn end_session(&self) {
        for err in self.vault.clear() {
            warn!(error = %err, "Failed to remove stored credential");
        }
        self.events.dispatch(SessionEvent::Logout);
    }

    async fn send_anonymous(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.exchange(request, Attempt::Initial).await?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.text()))
        }
    }

    fn stored_access_token(&self) -> Option<String> {
        match self.vault.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read access token, sending without credentials");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        attempt: Attempt,
    ) -> Result<Outcome, ApiError> {
        let outgoing = match token {
            Some(token) => request.with_bearer(token),
            None => request.clone(),
        };
        let response = self.exchange(&outgoing, attempt).await?;
        Ok(classify(response, attempt))
    }

    async fn recover(
        &self,
        request: &ApiRequest,
        sent_token: Option<String>,
    ) -> Result<ApiResponse, ApiError> {
        let new_token = {
            let _guard = match self.options.refresh_policy {
                RefreshPolicy::Coalesced => Some(self.refresh_lock.lock().await),
                RefreshPolicy::Independent => None,
            };

            match self.refreshed_by_another(&sent_token) {
                Some(token) => {
                    debug!("Access token already refreshed by a concurrent request");
                    token
                }
                None => self.refresh_and_store().await?,
            }
        };

        info!(method = %request.method, path = %request.path, "Retrying original request");
        match self.dispatch(request, Some(&new_token), Attempt::Retry).await? {
            Outcome::Success(response) => Ok(response),
            // classify never asks for a second refresh on a retry
            Outcome::NeedsRefresh => Err(self.fail(AuthFailure::TokenInvalidated)),
            Outcome::Fatal(failure) => Err(self.fail(failure)),
            Outcome::Other(err) => Err(err),
        }
    }

    /// Under the coalesced policy, the token another request stored while
    /// this one waited for the refresh lock.
    fn refreshed_by_another(&self, sent_token: &Option<String>) -> Option<String> {
        if self.options.refresh_policy != RefreshPolicy::Coalesced {
            return None;
        }
        match self.stored_access_token() {
            Some(current) if Some(&current) != sent_token.as_ref() => Some(current),
            _ => None,
        }
    }

    async fn refresh_and_store(&self) -> Result<String, ApiError> {
        let refresh_token = match self.vault.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("No refresh token available");
                return Err(self.fail(AuthFailure::NoRefreshToken));
            }
            Err(e) => {
                warn!(error = %e, "Could not read refresh token");
                return Err(self.fail(AuthFailure::NoRefreshToken));
            }
        };

        info!("Attempting token refresh");
        let pair = match self.request_new_tokens(&refresh_token).await {
            Ok(pair) => pair,
            Err(reason) => {
                warn!(reason = %reason, "Token refresh failed");
                return Err(self.fail(AuthFailure::RefreshRejected));
            }
        };

        if let Err(e) = self.vault.store_pair(&pair) {
            warn!(error = %e, "Could not persist refreshed tokens");
            return Err(self.fail(AuthFailure::RefreshRejected));
        }

        info!("Token refresh successful");
        self.events.dispatch(SessionEvent::TokensRefreshed);
        Ok(pair.access_token)
    }

    /// Call the refresh endpoint directly. Any failure is reported as a
    /// reason string; callers never see it.
    async fn request_new_tokens(&self, refresh_token: &str) -> Result<TokenPair, String> {
        let request = ApiRequest::post(endpoints::AUTH_REFRESH)
            .json_value(json!({
                "request": { "refresh_token": refresh_token },
                "user_agent": self.options.user_agent,
            }))
            .anonymous();

        let response = self
            .exchange(&request, Attempt::Initial)
            .await
            .map_err(|e| e.to_string())?;

        if !response.status.is_success() {
            return Err(format!("refresh endpoint returned {}", response.status));
        }
        response.json::<TokenPair>().map_err(|e| e.to_string())
    }

    fn fail(&self, failure: AuthFailure) -> ApiError {
        warn!(reason = failure.message(), "Authentication error detected");
        self.force_logout();
        AuthenticationError::new(failure).into()
    }

    /// Send through the transport with request/response logging.
    async fn exchange(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<ApiResponse, TransportError> {
        let url = request.url(self.transport.base_url());
        let started = Instant::now();

        debug!(
            method = %request.method,
            url = %url,
            headers = ?self.describe_headers(request),
            body = %self.describe_body(&request.body),
            attempt = ?attempt,
            "API request"
        );

        let result = self.transport.execute(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) if response.status.is_success() => {
                debug!(
                    method = %request.method,
                    url = %url,
                    status = response.status.as_u16(),
                    duration_ms,
                    body = %truncate_body(&response.text(), self.options.max_logged_body),
                    "API response"
                );
            }
            Ok(response) => {
                warn!(
                    method = %request.method,
                    url = %url,
                    status = response.status.as_u16(),
                    duration_ms,
                    body = %truncate_body(&response.text(), self.options.max_logged_body),
                    "API error response"
                );
            }
            Err(e) => {
                warn!(
                    method = %request.method,
                    url = %url,
                    duration_ms,
                    error = %e,
                    "API request failed"
                );
            }
        }
        result
    }

    fn describe_headers(&self, request: &ApiRequest) -> Vec<String> {
        request
            .headers
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<binary>");
                format!("{}: {}", name, redact_header(name, value))
            })
            .collect()
    }

    fn describe_body(&self, body: &RequestBody) -> String {
        let max = self.options.max_logged_body;
        match body {
            RequestBody::Empty => String::new(),
            RequestBody::Json(value) => truncate_body(&redact_json(value).to_string(), max),
            RequestBody::Form(fields) => {
                let map: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                truncate_body(&redact_json(&Value::Object(map)).to_string(), max)
            }
            RequestBody::Multipart(parts) => {
                let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
                format!("multipart [{}]", names.join(", "))
            }
        }
    }
}

fn classify(response: ApiResponse, attempt: Attempt) -> Outcome {
    let status = response.status.as_u16();

    if status == 401 && attempt == Attempt::Initial {
        return Outcome::NeedsRefresh;
    }
    if status == 403 {
        return Outcome::Fatal(AuthFailure::Forbidden);
    }
    if status == 401 || signals_invalidation(&response) {
        return Outcome::Fatal(AuthFailure::TokenInvalidated);
    }
    if response.status.is_success() {
        Outcome::Success(response)
    } else {
        Outcome::Other(ApiError::from_status(response.status, &response.text()))
    }
}

/// True when the body says the credential is dead, whatever the status.
fn signals_invalidation(response: &ApiResponse) -> bool {
    let Some(body) = response.json_value() else {
        return false;
    };

    let code_marks_token = body
        .get("error")
        .and_then(Value::as_str)
        .map(|code| INVALID_TOKEN_CODES.contains(&code))
        .unwrap_or(false);

    let message_mentions_auth = body
        .get("message")
        .and_then(Value::as_str)
        .map(|message| {
            let lower = message.to_lowercase();
            lower.contains("token") || lower.contains("auth")
        })
        .unwrap_or(false);

    code_marks_token || message_mentions_auth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{json_response, FailingRemoveStore, FakeTransport, RecordingEvents};
    use crate::auth::credentials::{AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY};
    use crate::auth::MemoryCredentialStore;
    use reqwest::StatusCode;

    const EXPENSES: &str = "/api/v1/expenses";

    fn seeded_store(access: Option<&str>, refresh: Option<&str>) -> Arc<MemoryCredentialStore> {
        let mut store = MemoryCredentialStore::new().with(USER_INFO_KEY, r#"{"email":"a@b.co"}"#);
        if let Some(a) = access {
            store = store.with(AUTH_TOKEN_KEY, a);
        }
        if let Some(r) = refresh {
            store = store.with(REFRESH_TOKEN_KEY, r);
        }
        Arc::new(store)
    }

    fn pipeline(
        transport: Arc<FakeTransport>,
        store: Arc<MemoryCredentialStore>,
        events: Arc<RecordingEvents>,
    ) -> AuthPipeline {
        AuthPipeline::new(transport, store, events, PipelineOptions::default())
    }

    fn assert_logged_out(store: &MemoryCredentialStore, events: &RecordingEvents) {
        assert!(!store.contains(AUTH_TOKEN_KEY));
        assert!(!store.contains(REFRESH_TOKEN_KEY));
        assert!(!store.contains(USER_INFO_KEY));
        assert_eq!(events.logout_count(), 1);
    }

    fn auth_failure(err: ApiError) -> AuthFailure {
        match err {
            ApiError::Authentication(e) => e.failure(),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attaches_stored_access_token() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"expenses": []})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store, events);

        pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap();

        assert_eq!(transport.requests()[0].bearer(), Some("A1"));
    }

    #[tokio::test]
    async fn test_missing_access_token_sends_without_credentials() {
        let transport = FakeTransport::new(|_| json_response(200, json!({})));
        let store = seeded_store(None, None);
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store, events.clone());

        pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap();

        let sent = &transport.requests()[0];
        assert!(sent.headers.get(reqwest::header::AUTHORIZATION).is_none());
        assert_eq!(events.logout_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_retry_after_401() {
        let transport = FakeTransport::new(|req| match (req.path.as_str(), req.bearer()) {
            (endpoints::AUTH_REFRESH, _) => {
                json_response(200, json!({"access_token": "A2", "refresh_token": "R2"}))
            }
            (_, Some("A2")) => json_response(200, json!({"ok": true})),
            _ => json_response(401, json!({"detail": "Not authenticated"})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let response = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        // Store now holds the new pair
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("A2"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R2"));

        // Exactly one refresh, carrying the stored refresh token
        let refreshes = transport.calls_to(endpoints::AUTH_REFRESH);
        assert_eq!(refreshes.len(), 1);
        assert_eq!(
            refreshes[0].body,
            RequestBody::Json(json!({
                "request": {"refresh_token": "R1"},
                "user_agent": "ExpenseeApp"
            }))
        );
        assert_eq!(refreshes[0].bearer(), None);

        // Original then one retry with the new credential
        let calls = transport.calls_to(EXPENSES);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bearer(), Some("A1"));
        assert_eq!(calls[1].bearer(), Some("A2"));

        assert_eq!(events.events(), vec![SessionEvent::TokensRefreshed]);
    }

    #[tokio::test]
    async fn test_retry_failure_is_passed_through() {
        let transport = FakeTransport::new(|req| match (req.path.as_str(), req.bearer()) {
            (endpoints::AUTH_REFRESH, _) => {
                json_response(200, json!({"access_token": "A2", "refresh_token": "R2"}))
            }
            (_, Some("A2")) => json_response(404, json!({"detail": "Expense not found"})),
            _ => json_response(401, json!({})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(transport.calls_to(endpoints::AUTH_REFRESH).len(), 1);
        assert_eq!(events.logout_count(), 0);
        assert!(store.contains(AUTH_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_second_401_forces_logout_without_second_refresh() {
        let transport = FakeTransport::new(|req| match req.path.as_str() {
            endpoints::AUTH_REFRESH => {
                json_response(200, json!({"access_token": "A2", "refresh_token": "R2"}))
            }
            _ => json_response(401, json!({})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::TokenInvalidated);
        assert_eq!(transport.calls_to(endpoints::AUTH_REFRESH).len(), 1);
        assert_eq!(transport.calls_to(EXPENSES).len(), 2);
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_no_refresh_token_forces_logout() {
        let transport = FakeTransport::new(|_| json_response(401, json!({})));
        let store = seeded_store(Some("A1"), None);
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(err.to_string(), "No refresh token available");
        assert_eq!(auth_failure(err), AuthFailure::NoRefreshToken);
        assert!(transport.calls_to(endpoints::AUTH_REFRESH).is_empty());
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_rejected_refresh_forces_logout() {
        let transport = FakeTransport::new(|req| match req.path.as_str() {
            endpoints::AUTH_REFRESH => json_response(401, json!({"detail": "Refresh token expired"})),
            _ => json_response(401, json!({})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(err.to_string(), "Token refresh failed");
        assert_eq!(transport.calls_to(endpoints::AUTH_REFRESH).len(), 1);
        assert_eq!(transport.calls_to(EXPENSES).len(), 1);
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_refresh_transport_error_forces_logout() {
        let transport = FakeTransport::new(|req| match req.path.as_str() {
            endpoints::AUTH_REFRESH => Err(TransportError::Other("connection reset".into())),
            _ => json_response(401, json!({})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport, store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::RefreshRejected);
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_unparsable_refresh_body_forces_logout() {
        let transport = FakeTransport::new(|req| match req.path.as_str() {
            endpoints::AUTH_REFRESH => json_response(200, json!({"access_token": "A2"})),
            _ => json_response(401, json!({})),
        });
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport, store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::RefreshRejected);
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_403_forces_logout_without_refresh() {
        let transport = FakeTransport::new(|_| json_response(403, json!({"detail": "Forbidden"})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::Forbidden);
        assert!(transport.calls_to(endpoints::AUTH_REFRESH).is_empty());
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_invalidation_message_on_success_status_forces_logout() {
        let transport =
            FakeTransport::new(|_| json_response(200, json!({"message": "invalid auth token"})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::TokenInvalidated);
        assert!(transport.calls_to(endpoints::AUTH_REFRESH).is_empty());
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_invalidation_code_on_error_status_forces_logout() {
        let transport =
            FakeTransport::new(|_| json_response(400, json!({"error": "token_revoked"})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport, store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::TokenInvalidated);
        assert_logged_out(&store, &events);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_untouched() {
        let transport =
            FakeTransport::new(|_| json_response(422, json!({"detail": "total_amount required"})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::post(EXPENSES)).await.unwrap_err();

        assert!(matches!(err, ApiError::Http { status: 422, .. }));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(events.logout_count(), 0);
        assert!(store.contains(AUTH_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_transport_error_never_triggers_refresh() {
        let transport = FakeTransport::new(|_| Err(TransportError::Other("timed out".into())));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(events.logout_count(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_requests_skip_recovery() {
        let transport = FakeTransport::new(|_| json_response(401, json!({"detail": "Incorrect password"})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store.clone(), events.clone());

        let request = ApiRequest::post(endpoints::AUTH_LOGIN).anonymous();
        let err = pipeline.send(&request).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(transport.requests()[0].bearer(), None);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(events.logout_count(), 0);
        assert!(store.contains(AUTH_TOKEN_KEY));
    }

    /// Sink that checks the store is already empty when logout arrives.
    struct StoreCheckingEvents {
        store: Arc<MemoryCredentialStore>,
        saw_clean_store: std::sync::Mutex<Option<bool>>,
    }

    impl SessionEvents for StoreCheckingEvents {
        fn dispatch(&self, event: SessionEvent) {
            if event == SessionEvent::Logout {
                let clean = !self.store.contains(AUTH_TOKEN_KEY)
                    && !self.store.contains(REFRESH_TOKEN_KEY)
                    && !self.store.contains(USER_INFO_KEY);
                *self.saw_clean_store.lock().unwrap() = Some(clean);
            }
        }
    }

    #[tokio::test]
    async fn test_logout_notification_follows_clearing() {
        let transport = FakeTransport::new(|_| json_response(403, json!({})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = Arc::new(StoreCheckingEvents {
            store: store.clone(),
            saw_clean_store: std::sync::Mutex::new(None),
        });
        let pipeline = AuthPipeline::new(transport, store, events.clone(), PipelineOptions::default());

        let _ = pipeline.send(&ApiRequest::get(EXPENSES)).await;

        assert_eq!(*events.saw_clean_store.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_forced_logout_survives_failed_removal() {
        let transport = FakeTransport::new(|_| json_response(403, json!({})));
        let store = Arc::new(FailingRemoveStore {
            inner: MemoryCredentialStore::new()
                .with(AUTH_TOKEN_KEY, "A1")
                .with(REFRESH_TOKEN_KEY, "R1")
                .with(USER_INFO_KEY, "{}"),
            failing_key: AUTH_TOKEN_KEY,
        });
        let events = RecordingEvents::new();
        let pipeline = AuthPipeline::new(
            transport,
            store.clone(),
            events.clone(),
            PipelineOptions::default(),
        );

        let err = pipeline.send(&ApiRequest::get(EXPENSES)).await.unwrap_err();

        assert_eq!(auth_failure(err), AuthFailure::Forbidden);
        assert!(!store.inner.contains(REFRESH_TOKEN_KEY));
        assert!(!store.inner.contains(USER_INFO_KEY));
        assert_eq!(events.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_force_logout_is_idempotent() {
        let transport = FakeTransport::new(|_| json_response(200, json!({})));
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport, store.clone(), events.clone());

        pipeline.force_logout();
        pipeline.force_logout();

        assert!(!store.contains(AUTH_TOKEN_KEY));
        assert_eq!(events.logout_count(), 2);
    }

    fn concurrent_401_transport() -> Arc<FakeTransport> {
        FakeTransport::interleaving(|req| match (req.path.as_str(), req.bearer()) {
            (endpoints::AUTH_REFRESH, _) => {
                json_response(200, json!({"access_token": "A2", "refresh_token": "R2"}))
            }
            (_, Some("A2")) => json_response(200, json!({"ok": true})),
            _ => json_response(401, json!({})),
        })
    }

    #[tokio::test]
    async fn test_coalesced_policy_shares_one_refresh() {
        let transport = concurrent_401_transport();
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let options = PipelineOptions {
            refresh_policy: RefreshPolicy::Coalesced,
            ..Default::default()
        };
        let pipeline = AuthPipeline::new(transport.clone(), store, events, options);

        let first = ApiRequest::get(EXPENSES);
        let second = ApiRequest::get("/api/v1/budgets");
        let (a, b) = futures::join!(pipeline.send(&first), pipeline.send(&second));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.calls_to(endpoints::AUTH_REFRESH).len(), 1);
    }

    #[tokio::test]
    async fn test_independent_policy_refreshes_per_request() {
        let transport = concurrent_401_transport();
        let store = seeded_store(Some("A1"), Some("R1"));
        let events = RecordingEvents::new();
        let pipeline = pipeline(transport.clone(), store, events);

        let first = ApiRequest::get(EXPENSES);
        let second = ApiRequest::get("/api/v1/budgets");
        let (a, b) = futures::join!(pipeline.send(&first), pipeline.send(&second));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.calls_to(endpoints::AUTH_REFRESH).len(), 2);
    }

    #[test]
    fn test_signals_invalidation_markers() {
        let body = |v: Value| ApiResponse::new(StatusCode::OK, serde_json::to_vec(&v).unwrap());

        assert!(signals_invalidation(&body(json!({"error": "invalid_token"}))));
        assert!(signals_invalidation(&body(json!({"error": "token_expired"}))));
        assert!(signals_invalidation(&body(json!({"message": "Auth session ended"}))));
        assert!(!signals_invalidation(&body(json!({"error": "validation_failed"}))));
        assert!(!signals_invalidation(&body(json!({"message": "Expense created"}))));
        assert!(!signals_invalidation(&body(json!([1, 2, 3]))));
        assert!(!signals_invalidation(&ApiResponse::new(StatusCode::OK, "not json")));
    }
}
