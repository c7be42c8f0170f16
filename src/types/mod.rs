//! Public types for the Concierge API.

mod chat;
mod message;
mod product;

pub use chat::{ChatReply, ChatRequest, MAX_MESSAGE_CHARS, ModelReply};
pub use message::{Role, Turn};
pub use product::{Product, SearchQuery, SortOrder};
