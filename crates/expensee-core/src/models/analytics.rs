use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{push_param, Category};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendPeriod::Weekly => "weekly",
            TrendPeriod::Monthly => "monthly",
            TrendPeriod::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendsParams {
    pub period: Option<TrendPeriod>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category_id: Option<String>,
}

impl TrendsParams {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_param(&mut query, "period", self.period);
        push_param(&mut query, "start_date", self.start_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "end_date", self.end_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "category_id", self.category_id.as_ref());
        query
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistributionParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DistributionParams {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_param(&mut query, "start_date", self.start_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "end_date", self.end_date.map(|d| d.format("%Y-%m-%d")));
        query
    }
}

#[derive(Debug, Clone, Default)]
pub struct MerchantParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<u32>,
}

impl MerchantParams {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_param(&mut query, "start_date", self.start_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "end_date", self.end_date.map(|d| d.format("%Y-%m-%d")));
        push_param(&mut query, "limit", self.limit);
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TrendPoint {
    pub date: String,
    pub total_amount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendsResponse {
    #[serde(default)]
    pub period: Option<TrendPeriod>,
    #[serde(default)]
    pub data_points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CategoryShare {
    pub category: Category,
    pub amount: String,
    pub percentage: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDistribution {
    #[serde(default)]
    pub total_amount: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MerchantSummary {
    pub merchant_name: String,
    pub total_amount: String,
    #[serde(default)]
    pub percentage: Option<String>,
    #[serde(default)]
    pub transaction_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantAnalysis {
    #[serde(default)]
    pub top_merchants: Vec<MerchantSummary>,
}
