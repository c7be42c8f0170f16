//! Collaborator traits.
//!
//! The concierge never talks to a language model or a product catalogue
//! directly. It is handed implementations of [`ChatModel`] and
//! [`ProductSearch`] and only coordinates them: throttling callers,
//! memoizing searches and keeping conversation history.
//!
//! Errors returned by implementations are passed through to the caller
//! unchanged, so they should pick the closest [`ConciergeError`] variant
//! (`Llm`, `Search`, `Http`, `Api`).
//!
//! # Example
//!
//! ```ignore
//! #[async_trait]
//! impl ProductSearch for Catalogue {
//!     fn name(&self) -> &str { "catalogue" }
//!
//!     async fn search(&self, query: &SearchQuery) -> Result<Vec<Product>> {
//!         self.client.find(query).await.map_err(|e| ConciergeError::Search(e.to_string()))
//!     }
//! }
//! ```
//!
//! [`ConciergeError`]: crate::ConciergeError

use async_trait::async_trait;

use crate::Result;
use crate::types::{ModelReply, Product, SearchQuery, Turn};

/// Produces assistant replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name for logging/debugging.
    fn name(&self) -> &str;

    /// Decide whether answering `message` needs a product lookup.
    ///
    /// Default: never.
    fn wants_products(&self, _message: &str) -> Option<SearchQuery> {
        None
    }

    /// Reply to `message` given the prior `history` (oldest first) and any
    /// products found for it.
    async fn reply(
        &self,
        history: &[Turn],
        message: &str,
        products: &[Product],
    ) -> Result<ModelReply>;
}

/// Looks products up in a catalogue.
#[async_trait]
pub trait ProductSearch: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Product>>;
}
