//! Async client for the Pagewise API.
//!
//! [`api::ApiClient`] wraps the HTTP endpoints, [`cache::MessageCache`]
//! holds a file's chat history locally, and [`chat::send_message`] ties the
//! two together with optimistic updates.

pub mod api;
pub mod cache;
pub mod chat;
pub mod error;

pub use api::{ApiClient, MessageSender};
pub use cache::MessageCache;
pub use error::{ClientError, Result};
