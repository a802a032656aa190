//! Typed client for the Expensee REST API.
//!
//! Every call goes through the [`AuthPipeline`], so an expired access token
//! is refreshed transparently and a dead session ends in a forced logout.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::endpoints;
use super::error::ApiError;
use super::pipeline::{AuthPipeline, PipelineOptions};
use super::transport::{ApiRequest, MultipartPart, ReqwestTransport, Transport};
use crate::auth::{CredentialStore, SessionEvent, SessionEvents, TokenVault};
use crate::config::Config;
use crate::models::{
    AcceptOcrRequest, Budget, BudgetRequest, BudgetsResponse, CategoriesResponse, Category,
    CategoryDistribution, CategoryRequest, CreateExpense, DistributionParams, ExpenseDetail,
    ExpenseFilters, ExpenseList, ForgotPasswordRequest, LoginResponse, MerchantAnalysis,
    MerchantParams, MessageResponse, OcrFeedbackRequest, OcrResult, ProfileUpdate, ReceiptImage,
    ReceiptStatus, ReceiptUploadResponse, RegisterRequest, ResetPasswordRequest, TrendsParams,
    TrendsResponse, UpdateExpense, User,
};

/// Multipart field name the server expects for receipt images.
const RECEIPT_IMAGE_FIELD: &str = "receipt_image";

/// Delay between receipt status polls.
/// OCR usually finishes within a few seconds; 2s keeps the wait responsive.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of receipt status polls before giving up.
pub const RECEIPT_POLL_MAX_ATTEMPTS: u32 = 30;

/// API client for Expensee.
/// Clone is cheap - the pipeline and its collaborators are shared.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: AuthPipeline,
}

impl ApiClient {
    /// Create a client talking to the configured server over HTTP
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::with_transport(
            Arc::new(transport),
            store,
            events,
            config.pipeline_options(),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        events: Arc<dyn SessionEvents>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            pipeline: AuthPipeline::new(transport, store, events, options),
        }
    }

    pub fn pipeline(&self) -> &AuthPipeline {
        &self.pipeline
    }

    fn vault(&self) -> &TokenVault {
        self.pipeline.vault()
    }

    fn emit(&self, event: SessionEvent) {
        self.pipeline.events().dispatch(event);
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.pipeline.send(&request).await?;
        response.json()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T, ApiError> {
        self.fetch(ApiRequest::get(path).query(query)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.fetch(ApiRequest::post(path).json(body)?).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.fetch(ApiRequest::put(path).json(body)?).await
    }

    /// Delete responses carry nothing we use; the body is ignored.
    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.pipeline.send(&ApiRequest::delete(path)).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Exchange username and password for tokens and store them.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(endpoints::AUTH_LOGIN)
            .form(vec![
                ("username".to_string(), username.to_string()),
                ("password".to_string(), password.to_string()),
            ])
            .anonymous();

        let tokens: LoginResponse = self.fetch(request).await?;

        self.vault().set_access_token(&tokens.access_token)?;
        match tokens.refresh_token {
            Some(ref refresh) => self.vault().set_refresh_token(refresh)?,
            None => {
                // A refresh token from an earlier session must not outlive it
                warn!("Login response carried no refresh token");
                if let Err(e) = self.vault().remove_refresh_token() {
                    warn!(error = %e, "Failed to remove stale refresh token");
                }
            }
        }
        info!(username = username, "Logged in");
        Ok(tokens)
    }

    /// Log in, load the profile, and mark the session authenticated.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, ApiError> {
        self.emit(SessionEvent::LoginStarted);
        let result = match self.login(username, password).await {
            Ok(_) => self.current_user().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(user) => {
                self.emit(SessionEvent::LoginSucceeded(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.emit(SessionEvent::LoginFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        self.fetch(ApiRequest::post(endpoints::AUTH_REGISTER).json(request)?.anonymous())
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        self.fetch(ApiRequest::post(endpoints::AUTH_FORGOT_PASSWORD).json(&body)?.anonymous())
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let body = ResetPasswordRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        self.fetch(ApiRequest::post(endpoints::AUTH_RESET_PASSWORD).json(&body)?.anonymous())
            .await
    }

    /// Revoke the refresh token on the server (best effort), then clear all
    /// local credentials and end the session.
    pub async fn logout(&self) {
        match self.vault().refresh_token() {
            Ok(Some(refresh)) => {
                let mut request = ApiRequest::post(endpoints::AUTH_LOGOUT)
                    .json_value(json!({ "token": refresh }))
                    .anonymous();
                if let Ok(Some(access)) = self.vault().access_token() {
                    request = request.with_bearer(&access);
                }
                if let Err(e) = self.pipeline.send(&request).await {
                    warn!(error = %e, "Logout request failed");
                }
            }
            Ok(None) => debug!("No refresh token to revoke"),
            Err(e) => warn!(error = %e, "Could not read refresh token"),
        }

        self.pipeline.end_session();
    }

    /// Startup check: is there a stored session to resume?
    pub async fn restore_session(&self) -> Result<bool, ApiError> {
        let has_token = self.vault().access_token()?.is_some();
        if has_token {
            if let Some(json) = self.vault().cached_user()? {
                match serde_json::from_str::<User>(&json) {
                    Ok(user) => self.emit(SessionEvent::UserUpdated(user)),
                    Err(e) => warn!(error = %e, "Ignoring unreadable cached profile"),
                }
            }
        }
        self.emit(SessionEvent::AuthCheckComplete {
            is_authenticated: has_token,
        });
        Ok(has_token)
    }

    /// Fetch the signed-in user and cache the profile locally.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let response = self.pipeline.send(&ApiRequest::get(endpoints::USER_ME)).await?;
        let user: User = response.json()?;
        if let Err(e) = self.vault().cache_user(&response.text()) {
            warn!(error = %e, "Failed to cache user profile");
        }
        Ok(user)
    }

    pub async fn user_profile(&self) -> Result<User, ApiError> {
        self.get(endpoints::USER_PROFILE, Vec::new()).await
    }

    pub async fn update_user_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let user: User = self
            .fetch(ApiRequest::patch(endpoints::USER_PROFILE).json(update)?)
            .await?;
        self.emit(SessionEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    // ===== Expenses =====

    pub async fn list_expenses(&self, filters: &ExpenseFilters) -> Result<ExpenseList, ApiError> {
        self.get(endpoints::EXPENSES, filters.to_query()).await
    }

    pub async fn expense(&self, expense_id: &str) -> Result<ExpenseDetail, ApiError> {
        self.get(&endpoints::expense(expense_id), Vec::new()).await
    }

    pub async fn create_expense(&self, expense: &CreateExpense) -> Result<ExpenseDetail, ApiError> {
        self.post(endpoints::EXPENSES, expense).await
    }

    pub async fn update_expense(
        &self,
        expense_id: &str,
        update: &UpdateExpense,
    ) -> Result<ExpenseDetail, ApiError> {
        self.put(&endpoints::expense(expense_id), update).await
    }

    pub async fn delete_expense(&self, expense_id: &str) -> Result<(), ApiError> {
        self.delete(&endpoints::expense(expense_id)).await
    }

    /// Attach a receipt image to an existing expense
    pub async fn attach_receipt(
        &self,
        expense_id: &str,
        image: &ReceiptImage,
    ) -> Result<ExpenseDetail, ApiError> {
        let request = ApiRequest::post(endpoints::expense_receipt(expense_id))
            .multipart(vec![image_part(image)]);
        self.fetch(request).await
    }

    /// Legacy synchronous scan endpoint; its payload differs between server
    /// versions, so it is returned untyped.
    pub async fn scan_receipt(&self, image: &ReceiptImage) -> Result<Value, ApiError> {
        let request =
            ApiRequest::post(endpoints::EXPENSES_SCAN_RECEIPT).multipart(vec![image_part(image)]);
        self.fetch(request).await
    }

    // ===== Categories =====

    pub async fn categories(&self) -> Result<CategoriesResponse, ApiError> {
        self.get(endpoints::CATEGORIES, Vec::new()).await
    }

    pub async fn create_category(&self, category: &CategoryRequest) -> Result<Category, ApiError> {
        self.post(endpoints::CATEGORIES, category).await
    }

    pub async fn update_category(
        &self,
        category_id: &str,
        category: &CategoryRequest,
    ) -> Result<Category, ApiError> {
        self.put(&endpoints::category(category_id), category).await
    }

    pub async fn delete_category(&self, category_id: &str) -> Result<(), ApiError> {
        self.delete(&endpoints::category(category_id)).await
    }

    // ===== Budgets =====

    pub async fn budgets(&self, month: Option<u32>, year: Option<i32>) -> Result<BudgetsResponse, ApiError> {
        let mut query = Vec::new();
        crate::models::push_param(&mut query, "month", month);
        crate::models::push_param(&mut query, "year", year);
        self.get(endpoints::BUDGETS, query).await
    }

    pub async fn budget(&self, budget_id: &str) -> Result<Budget, ApiError> {
        self.get(&endpoints::budget(budget_id), Vec::new()).await
    }

    pub async fn create_budget(&self, budget: &BudgetRequest) -> Result<Budget, ApiError> {
        self.post(endpoints::BUDGETS, budget).await
    }

    pub async fn update_budget(&self, budget_id: &str, budget: &BudgetRequest) -> Result<Budget, ApiError> {
        self.put(&endpoints::budget(budget_id), budget).await
    }

    pub async fn delete_budget(&self, budget_id: &str) -> Result<(), ApiError> {
        self.delete(&endpoints::budget(budget_id)).await
    }

    // ===== Receipts =====

    /// Upload a receipt image for OCR. Returns the id to poll with.
    pub async fn upload_receipt(
        &self,
        image: &ReceiptImage,
        user_notes: Option<&str>,
    ) -> Result<ReceiptUploadResponse, ApiError> {
        let mut parts = vec![image_part(image)];
        if let Some(notes) = user_notes {
            parts.push(MultipartPart::text("user_notes", notes));
        }
        let request = ApiRequest::post(endpoints::RECEIPTS_UPLOAD).multipart(parts);
        let response: ReceiptUploadResponse = self.fetch(request).await?;
        info!(ocr_id = %response.ocr_id, bytes = image.bytes.len(), "Receipt uploaded");
        Ok(response)
    }

    pub async fn receipt_status(&self, ocr_id: &str) -> Result<ReceiptStatus, ApiError> {
        self.get(&endpoints::receipt_status(ocr_id), Vec::new()).await
    }

    /// Poll until OCR processing reaches a terminal state.
    pub async fn wait_for_receipt(
        &self,
        ocr_id: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<ReceiptStatus, ApiError> {
        let mut attempts = 0;
        loop {
            let status = self.receipt_status(ocr_id).await?;
            attempts += 1;
            if status.status.is_terminal() {
                return Ok(status);
            }
            if attempts >= max_attempts {
                return Err(ApiError::InvalidResponse(format!(
                    "Receipt {} still {:?} after {} status checks",
                    ocr_id, status.status, attempts
                )));
            }
            debug!(ocr_id = ocr_id, attempt = attempts, "Receipt still processing");
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn ocr_results(&self, ocr_id: &str) -> Result<OcrResult, ApiError> {
        self.get(&endpoints::receipt_ocr_results(ocr_id), Vec::new()).await
    }

    pub async fn submit_ocr_feedback(
        &self,
        ocr_id: &str,
        feedback: &OcrFeedbackRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.post(&endpoints::receipt_feedback(ocr_id), feedback).await
    }

    /// Turn reviewed OCR fields into an expense.
    pub async fn accept_ocr_results(
        &self,
        ocr_id: &str,
        accepted: &AcceptOcrRequest,
    ) -> Result<ExpenseDetail, ApiError> {
        self.post(&endpoints::receipt_accept(ocr_id), accepted).await
    }

    // ===== Analytics =====

    pub async fn expense_trends(&self, params: &TrendsParams) -> Result<TrendsResponse, ApiError> {
        self.get(endpoints::ANALYTICS_TRENDS, params.to_query()).await
    }

    pub async fn category_distribution(
        &self,
        params: &DistributionParams,
    ) -> Result<CategoryDistribution, ApiError> {
        self.get(endpoints::ANALYTICS_CATEGORY_DISTRIBUTION, params.to_query())
            .await
    }

    pub async fn merchant_analysis(&self, params: &MerchantParams) -> Result<MerchantAnalysis, ApiError> {
        self.get(endpoints::ANALYTICS_MERCHANTS, params.to_query()).await
    }
}

fn image_part(image: &ReceiptImage) -> MultipartPart {
    MultipartPart::file(
        RECEIPT_IMAGE_FIELD,
        &image.file_name,
        &image.mime_type,
        image.bytes.clone(),
    )
}
