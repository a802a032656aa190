use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{push_param, Category};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ExpenseItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: String,
    pub total_price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Expense {
    pub expense_id: String,
    pub merchant_name: String,
    pub total_amount: String,
    pub transaction_date: String,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub user_category: Option<Category>,
    pub notes: Option<String>,
    #[serde(default)]
    pub has_receipt_image: bool,
    pub created_at: String,
}

impl Expense {
    /// The user's own category wins over the built-in one.
    pub fn category_name(&self) -> Option<&str> {
        self.user_category
            .as_ref()
            .or(self.category.as_ref())
            .map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ExpenseDetail {
    #[serde(flatten)]
    pub expense: Expense,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub ocr_id: Option<String>,
    #[serde(default)]
    pub receipt_image_url: Option<String>,
    #[serde(default)]
    pub items: Vec<ExpenseItem>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub is_manual_entry: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total_count: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseSummary {
    pub total_expenses: String,
    pub avg_expense: String,
    pub max_expense: String,
    pub min_expense: String,
    #[serde(default)]
    pub expense_by_category: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseList {
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub summary: Option<ExpenseSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// Filters for listing expenses. Unset fields are left out of the query.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilters {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl ExpenseFilters {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_param(&mut query, "from_date", self.from_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "to_date", self.to_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "category", self.category.as_ref());
        push_param(&mut query, "merchant", self.merchant.as_ref());
        push_param(&mut query, "min_amount", self.min_amount);
        push_param(&mut query, "max_amount", self.max_amount);
        push_param(&mut query, "page", self.page);
        push_param(&mut query, "limit", self.limit);
        push_param(&mut query, "sort_by", self.sort_by.as_ref());
        push_param(&mut query, "sort_order", self.sort_order);
        query
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateExpense {
    pub merchant_name: String,
    pub total_amount: String,
    pub transaction_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ExpenseItem>,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateExpense {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ExpenseItem>>,
}
