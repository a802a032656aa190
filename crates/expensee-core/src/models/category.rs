use serde::{Deserialize, Serialize};

/// A spending category. Built-in categories carry `category_id`, user-defined
/// ones carry `user_category_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Category {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub user_category_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
}

impl Category {
    pub fn id(&self) -> Option<&str> {
        self.user_category_id
            .as_deref()
            .or(self.category_id.as_deref())
    }

    pub fn is_user_defined(&self) -> bool {
        self.is_custom || self.user_category_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoriesResponse {
    #[serde(default)]
    pub default_categories: Vec<Category>,
    #[serde(default)]
    pub user_categories: Vec<Category>,
}

impl CategoriesResponse {
    /// Built-in categories first, then the user's own.
    pub fn all(&self) -> impl Iterator<Item = &Category> {
        self.default_categories.iter().chain(self.user_categories.iter())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.all().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRequest {
    pub name: String,
    pub icon: String,
    pub color: String,
}
