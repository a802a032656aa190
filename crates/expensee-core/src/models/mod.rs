//! Wire types for the Expensee API.
//!
//! Monetary amounts are kept as the decimal strings the server sends, so no
//! precision is lost between fetching and re-submitting a record.
//!
//! - `User`, `TokenPair`, `LoginResponse`: accounts and credentials
//! - `Expense`, `ExpenseDetail`, `ExpenseFilters`: expense records and queries
//! - `Category`, `CategoriesResponse`: default and user-defined categories
//! - `BudgetWithSpending`, `BudgetsResponse`: monthly budgets and progress
//! - `OcrResult`, `ReceiptStatus`: receipt scanning and OCR review
//! - `TrendsResponse`, `CategoryDistribution`, `MerchantAnalysis`: analytics

pub mod analytics;
pub mod budget;
pub mod category;
pub mod expense;
pub mod receipt;
pub mod user;

pub use analytics::{
    CategoryDistribution, CategoryShare, DistributionParams, MerchantAnalysis, MerchantParams,
    MerchantSummary, TrendPeriod, TrendPoint, TrendsParams, TrendsResponse,
};
pub use budget::{
    Budget, BudgetCategory, BudgetRequest, BudgetWithSpending, BudgetsResponse, OverallBudget,
};
pub use category::{CategoriesResponse, Category, CategoryRequest};
pub use expense::{
    CreateExpense, Expense, ExpenseDetail, ExpenseFilters, ExpenseItem, ExpenseList,
    ExpenseSummary, Pagination, SortOrder, UpdateExpense,
};
pub use receipt::{
    AcceptOcrRequest, OcrConfidence, OcrCorrection, OcrFeedbackRequest, OcrItem, OcrResult,
    ProcessingStatus, ReceiptImage, ReceiptStatus, ReceiptUploadResponse,
};
pub use user::{
    ForgotPasswordRequest, LoginResponse, MessageResponse, ProfileUpdate, RegisterRequest,
    ResetPasswordRequest, TokenPair, User, UserStatus,
};

/// Append `key=value` to a query list when the value is present.
pub(crate) fn push_param<T: ToString>(query: &mut Vec<(String, String)>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        query.push((key.to_string(), v.to_string()));
    }
}
