//! Product search types

use serde::{Deserialize, Serialize};

/// A product as returned by the search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u32>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

/// Result ordering requested by a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    Rating,
    Newest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::Rating => "rating",
            Self::Newest => "newest",
        }
    }
}

/// A product search with filters and paging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub sort_by: SortOrder,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            min_price: None,
            max_price: None,
            sort_by: SortOrder::default(),
            page: default_page(),
            page_size: default_page_size(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn sort_by(mut self, order: SortOrder) -> Self {
        self.sort_by = order;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Cache key identifying this search.
    ///
    /// The free-text query and category are trimmed, lowercased and
    /// whitespace-collapsed so trivially different spellings of the same
    /// search share an entry. Fields are encoded as a JSON array, so text
    /// containing separators cannot make two searches collide.
    pub fn cache_key(&self) -> String {
        let key = serde_json::json!([
            normalize(&self.query),
            self.category.as_deref().map(normalize),
            self.min_price,
            self.max_price,
            self.sort_by.as_str(),
            self.page,
            self.page_size,
        ]);
        format!("search:{key}")
    }

    /// Check the bounds a search backend can rely on.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: &str| Err(crate::ConciergeError::InvalidInput(msg.to_string()));
        if self.query.trim().is_empty() {
            return invalid("search query must not be empty");
        }
        if self.page == 0 {
            return invalid("page starts at 1");
        }
        if !(1..=100).contains(&self.page_size) {
            return invalid("page_size must be between 1 and 100");
        }
        if self.min_price.is_some_and(|p| p < 0.0) || self.max_price.is_some_and(|p| p < 0.0) {
            return invalid("prices must not be negative");
        }
        Ok(())
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
