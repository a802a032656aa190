use serde::{Deserialize, Serialize};

/// Category summary embedded in budget payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BudgetCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Budget {
    pub budget_id: String,
    pub amount: String,
    pub month: u32,
    pub year: i32,
    #[serde(default)]
    pub budget_name: Option<String>,
    #[serde(default)]
    pub category: Option<BudgetCategory>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BudgetWithSpending {
    pub budget_id: String,
    pub amount: String,
    pub month: u32,
    pub year: i32,
    #[serde(default)]
    pub budget_name: Option<String>,
    #[serde(default)]
    pub category: Option<BudgetCategory>,
    pub created_at: String,
    pub current_spending: String,
    pub remaining: String,
    pub percentage_used: String,
}

impl BudgetWithSpending {
    pub fn percentage(&self) -> Option<f64> {
        self.percentage_used.parse().ok()
    }

    pub fn is_over_budget(&self) -> bool {
        self.percentage().map(|p| p > 100.0).unwrap_or(false)
    }

    pub fn display_name(&self) -> &str {
        self.budget_name
            .as_deref()
            .or(self.category.as_ref().map(|c| c.name.as_str()))
            .unwrap_or("Overall")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallBudget {
    pub amount: String,
    pub current_spending: String,
    pub remaining: String,
    pub percentage_used: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetsResponse {
    #[serde(default)]
    pub budgets: Vec<BudgetWithSpending>,
    #[serde(default)]
    pub overall_budget: Option<OverallBudget>,
}

/// Body for creating or replacing a budget. A budget without a category
/// applies to all spending in the month.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetRequest {
    pub amount: String,
    pub month: u32,
    pub year: i32,
    pub category_id: Option<String>,
    pub user_category_id: Option<String>,
    pub budget_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_budgets_response() {
        let json = r##"{
            "budgets": [{
                "budget_id": "b-1", "amount": "400.00", "month": 7, "year": 2024,
                "budget_name": "Groceries", "category": {"id": "c-1", "name": "Groceries", "color": "#2ecc71"},
                "created_at": "2024-07-01T00:00:00Z", "current_spending": "432.10",
                "remaining": "-32.10", "percentage_used": "108.03"
            }],
            "overall_budget": {"amount": "2000.00", "current_spending": "900.00",
                               "remaining": "1100.00", "percentage_used": "45.00"}
        }"##;
        let resp: BudgetsResponse = serde_json::from_str(json).unwrap();
        let budget = &resp.budgets[0];
        assert!(budget.is_over_budget());
        assert_eq!(budget.display_name(), "Groceries");
        assert_eq!(resp.overall_budget.unwrap().remaining, "1100.00");
    }

    #[test]
    fn test_unparsable_percentage_is_not_over_budget() {
        let budget = BudgetWithSpending {
            budget_id: "b-2".into(),
            amount: "10".into(),
            month: 1,
            year: 2025,
            budget_name: None,
            category: None,
            created_at: String::new(),
            current_spending: "0".into(),
            remaining: "10".into(),
            percentage_used: "n/a".into(),
        };
        assert!(!budget.is_over_budget());
        assert_eq!(budget.display_name(), "Overall");
    }
}
