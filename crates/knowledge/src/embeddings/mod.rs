//! Embedding providers for passages and queries.
//!
//! The store embeds passages at load time and questions at query time with
//! the same provider, so both must agree on model and dimensions.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
