//! Builder for assembling a [`Concierge`]

use std::sync::Arc;

use super::Concierge;
use crate::cache::TtlCache;
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::Config;
use crate::limiter::SlidingWindowLimiter;
use crate::session::SessionStore;
use crate::traits::{ChatModel, ProductSearch};
use crate::{ConciergeError, Result};

/// Metrics and janitor label of the product search cache.
pub(super) const PRODUCT_CACHE_LABEL: &str = "products";

/// Builder for configuring [`Concierge`] instances.
#[derive(Default)]
pub struct ConciergeBuilder {
    config: Option<Config>,
    clock: Option<SharedClock>,
    chat_model: Option<Arc<dyn ChatModel>>,
    product_search: Option<Arc<dyn ProductSearch>>,
}

impl ConciergeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the built-in defaults.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Time source for every component (default: [`MonotonicClock`]).
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Model that writes the assistant's replies. Required.
    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    /// Catalogue backing product lookups. Required.
    pub fn product_search(mut self, search: Arc<dyn ProductSearch>) -> Self {
        self.product_search = Some(search);
        self
    }

    /// Validate the configuration and wire the components together.
    pub fn build(self) -> Result<Concierge> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let chat_model = self.chat_model.ok_or_else(|| {
            ConciergeError::Configuration("a chat model is required".to_string())
        })?;
        let product_search = self.product_search.ok_or_else(|| {
            ConciergeError::Configuration("a product search backend is required".to_string())
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));

        let limiter = SlidingWindowLimiter::from_config(&config.limiter, Arc::clone(&clock))?;
        let products = TtlCache::from_config(&config.cache, Arc::clone(&clock))?
            .with_label(PRODUCT_CACHE_LABEL);
        let sessions = SessionStore::from_config(&config.session, Arc::clone(&clock))?;

        tracing::info!(
            chat_model = chat_model.name(),
            product_search = product_search.name(),
            throttling = config.limiter.enabled,
            caching = config.cache.enabled,
            "concierge ready"
        );

        Ok(Concierge {
            config,
            clock,
            limiter: Arc::new(limiter),
            products: Arc::new(products),
            sessions: Arc::new(sessions),
            chat_model,
            product_search,
        })
    }
}
