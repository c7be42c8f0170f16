//! Concierge - stateful control layer for a conversational shopping assistant
//!
//! This crate sits between a request-handling layer and the expensive
//! collaborators behind it (a chat model and a product catalogue). It owns
//! the shared in-memory state those requests need:
//!
//! - a per-client sliding-window throttle ([`SlidingWindowLimiter`]),
//! - a single-flight TTL cache for product searches ([`TtlCache`]),
//! - per-conversation history with idle expiry ([`SessionStore`]),
//! - a background [`Janitor`] that evicts whatever has expired.
//!
//! [`Concierge`] wires them together around caller-supplied [`ChatModel`]
//! and [`ProductSearch`] implementations.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use concierge::{ChatModel, ChatRequest, Concierge, Config, ProductSearch};
//!
//! # async fn run(model: Arc<dyn ChatModel>, catalogue: Arc<dyn ProductSearch>) -> concierge::Result<()> {
//! let concierge = Concierge::builder()
//!     .config(Config::load(None).unwrap_or_default())
//!     .chat_model(model)
//!     .product_search(catalogue)
//!     .build()?;
//! let janitor = concierge.start_janitor()?;
//!
//! let reply = concierge
//!     .chat("203.0.113.7", ChatRequest::new("I need a phone under 300"))
//!     .await?;
//! println!("{} ({} requests left)", reply.message, reply.remaining);
//!
//! let follow_up = concierge
//!     .chat("203.0.113.7", ChatRequest::new("Any in blue?").session(&reply.session_id))
//!     .await?;
//! println!("{}", follow_up.message);
//!
//! janitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod concierge;
pub mod config;
pub mod error;
pub mod janitor;
pub mod limiter;
pub mod session;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use concierge::{Concierge, ConciergeBuilder, ProductCache};
pub use config::Config;
pub use error::{ConciergeError, Result};
pub use janitor::{Janitor, JanitorHandle, Sweep, SweepReport};
pub use limiter::{Admission, SlidingWindowLimiter};
pub use session::{SessionSnapshot, SessionStore};
pub use traits::{ChatModel, ProductSearch};

pub use types::{
    ChatReply, ChatRequest, MAX_MESSAGE_CHARS, ModelReply, Product, Role, SearchQuery, SortOrder,
    Turn,
};
