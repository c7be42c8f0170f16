//! The composition root.
//!
//! [`Concierge`] wires the throttle, the product search cache and the
//! session store around the injected [`ChatModel`] and [`ProductSearch`]
//! collaborators. It is what a request-handling layer calls into.

mod builder;

pub use builder::ConciergeBuilder;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::cache::TtlCache;
use crate::clock::SharedClock;
use crate::config::Config;
use crate::janitor::{Janitor, JanitorHandle, Sweep};
use crate::limiter::{Admission, SlidingWindowLimiter};
use crate::session::SessionStore;
use crate::traits::{ChatModel, ProductSearch};
use crate::types::{ChatReply, ChatRequest, Product, SearchQuery, Turn};
use crate::{ConciergeError, Result};

/// Cached product search results, shared between every caller that hit them.
pub type ProductCache = TtlCache<String, Arc<Vec<Product>>>;

/// Shopping assistant front door.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Concierge {
    config: Config,
    clock: SharedClock,
    limiter: Arc<SlidingWindowLimiter>,
    products: Arc<ProductCache>,
    sessions: Arc<SessionStore>,
    chat_model: Arc<dyn ChatModel>,
    product_search: Arc<dyn ProductSearch>,
}

impl std::fmt::Debug for Concierge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Concierge")
            .field("chat_model", &self.chat_model.name())
            .field("product_search", &self.product_search.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Concierge {
    pub fn builder() -> ConciergeBuilder {
        ConciergeBuilder::new()
    }

    /// Answer one chat message.
    ///
    /// Throttles `client_key`, resolves (or starts) the session, looks up
    /// products when the chat model asks for them, and records both the user
    /// turn and the reply in the session history.
    ///
    /// The request deadline bounds the product wait and the model call
    /// separately. The model call is also capped at the session idle timeout;
    /// exceeding either yields [`ConciergeError::Timeout`] and records nothing.
    #[instrument(skip(self, request), fields(operation = "chat"))]
    pub async fn chat(&self, client_key: &str, request: ChatRequest) -> Result<ChatReply> {
        let admission = self.throttle(client_key)?;
        request.validate()?;

        let ChatRequest {
            session_id,
            message,
            context,
            deadline,
        } = request;

        let (session_id, history) = self.sessions.get_or_create(session_id.as_deref());
        if !context.is_empty() {
            self.sessions.update_context(&session_id, context)?;
        }

        let products = match self.chat_model.wants_products(&message) {
            Some(query) => {
                let deadline = deadline.unwrap_or_else(|| self.config.cache.wait_timeout());
                self.find_products(query, deadline).await?
            }
            None => Arc::new(Vec::new()),
        };

        // Bounded by the idle timeout so the session is still live when the
        // turns are recorded.
        self.sessions.touch(&session_id)?;
        let timeout = self.sessions.timeout();
        let budget = deadline.map_or(timeout, |d| d.min(timeout));
        let reply = tokio::time::timeout(
            budget,
            self.chat_model.reply(&history, &message, &products),
        )
        .await
        .map_err(|_| ConciergeError::Timeout(budget))??;
        debug!(
            model = self.chat_model.name(),
            intent = reply.intent.as_deref(),
            products = products.len(),
            "reply generated"
        );

        let user_turn = match &reply.intent {
            Some(intent) => Turn::user(message).with_intent(intent.clone()),
            None => Turn::user(message),
        };
        self.sessions.append_turns(
            &session_id,
            [user_turn, Turn::assistant(reply.content.clone())],
        )?;

        Ok(ChatReply {
            session_id,
            message: reply.content,
            intent: reply.intent,
            suggested_actions: reply.suggested_actions,
            products: products.as_ref().clone(),
            remaining: admission.remaining,
        })
    }

    /// Throttled, cached product search.
    #[instrument(skip(self, query), fields(operation = "search"))]
    pub async fn search(&self, client_key: &str, query: SearchQuery) -> Result<Vec<Product>> {
        self.throttle(client_key)?;
        let found = self
            .find_products(query, self.config.cache.wait_timeout())
            .await?;
        Ok(found.as_ref().clone())
    }

    /// History of a live session, oldest turn first.
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.sessions.history(session_id)
    }

    /// Forget a session and its history.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        if self.sessions.delete(session_id) {
            Ok(())
        } else {
            Err(ConciergeError::SessionNotFound(session_id.to_owned()))
        }
    }

    /// A janitor watching the limiter, the product cache and the sessions.
    pub fn janitor(&self) -> Result<Janitor> {
        let limiter: Arc<dyn Sweep> = self.limiter.clone();
        let products: Arc<dyn Sweep> = self.products.clone();
        let sessions: Arc<dyn Sweep> = self.sessions.clone();
        Ok(Janitor::new(Arc::clone(&self.clock), self.config.janitor.interval())?
            .watch(limiter)
            .watch(products)
            .watch(sessions))
    }

    /// Start the background janitor on the current tokio runtime.
    pub fn start_janitor(&self) -> Result<JanitorHandle> {
        Ok(self.janitor()?.spawn())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub fn product_cache(&self) -> &Arc<ProductCache> {
        &self.products
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn throttle(&self, client_key: &str) -> Result<Admission> {
        if !self.config.limiter.enabled {
            return Ok(Admission::unlimited(self.limiter.max_requests()));
        }
        let admission = self.limiter.check(client_key);
        if admission.allowed {
            Ok(admission)
        } else {
            Err(ConciergeError::RateLimited {
                retry_after: admission.retry_after,
            })
        }
    }

    async fn find_products(
        &self,
        query: SearchQuery,
        deadline: Duration,
    ) -> Result<Arc<Vec<Product>>> {
        query.validate()?;
        let key = query.cache_key();
        let search = Arc::clone(&self.product_search);
        self.products
            .get_or_compute_within(key, self.products.default_ttl(), deadline, move || {
                async move {
                    let found = search.search(&query).await?;
                    debug!(
                        backend = search.name(),
                        query = %query.query,
                        results = found.len(),
                        "product search completed"
                    );
                    Ok::<_, ConciergeError>(Arc::new(found))
                }
            })
            .await
    }
}
