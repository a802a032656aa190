//! Paths of the Expensee REST API, relative to the configured base URL.

pub const AUTH_LOGIN: &str = "/api/v1/auth/login";
pub const AUTH_REGISTER: &str = "/api/v1/auth/register";
pub const AUTH_REFRESH: &str = "/api/v1/auth/refresh";
pub const AUTH_LOGOUT: &str = "/api/v1/auth/logout";
pub const AUTH_FORGOT_PASSWORD: &str = "/api/v1/auth/forgot-password";
pub const AUTH_RESET_PASSWORD: &str = "/api/v1/auth/reset-password";

pub const USER_PROFILE: &str = "/api/v1/users/profile";
pub const USER_ME: &str = "/api/v1/users/me";

pub const EXPENSES: &str = "/api/v1/expenses";
pub const EXPENSES_SCAN_RECEIPT: &str = "/api/v1/expenses/scan-receipt";

pub const CATEGORIES: &str = "/api/v1/categories";

pub const BUDGETS: &str = "/api/v1/budgets";

pub const RECEIPTS_UPLOAD: &str = "/api/v1/receipts/gemini/upload";

pub const ANALYTICS_TRENDS: &str = "/api/v1/analytics/trends";
pub const ANALYTICS_CATEGORY_DISTRIBUTION: &str = "/api/v1/analytics/category-distribution";
pub const ANALYTICS_MERCHANTS: &str = "/api/v1/analytics/merchants";

pub fn expense(expense_id: &str) -> String {
    format!("{}/{}", EXPENSES, expense_id)
}

pub fn expense_receipt(expense_id: &str) -> String {
    format!("{}/{}/receipt", EXPENSES, expense_id)
}

pub fn category(category_id: &str) -> String {
    format!("{}/{}", CATEGORIES, category_id)
}

pub fn budget(budget_id: &str) -> String {
    format!("{}/{}", BUDGETS, budget_id)
}

pub fn receipt_status(ocr_id: &str) -> String {
    format!("/api/v1/receipts/{}/status", ocr_id)
}

pub fn receipt_ocr_results(ocr_id: &str) -> String {
    format!("/api/v1/receipts/{}", ocr_id)
}

pub fn receipt_feedback(ocr_id: &str) -> String {
    format!("/api/v1/receipts/{}/feedback", ocr_id)
}

pub fn receipt_accept(ocr_id: &str) -> String {
    format!("/api/v1/receipts/{}/accept", ocr_id)
}
