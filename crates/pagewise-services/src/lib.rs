//! Clients for the managed services Pagewise is glued together from:
//! the LLM and embeddings API, the vector index, the payment processor,
//! and the upload service. Each client sits behind a trait so handlers can
//! be exercised without network access.

pub mod billing;
pub mod error;
pub mod llm;
pub mod pdf;
pub mod signature;
pub mod storage;
pub mod streaming;
pub mod vector;

pub use error::{Result, ServiceError};
