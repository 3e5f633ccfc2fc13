//! Long-term memory: a keyword-scored, recency-weighted store — no
//! embedding model or vector index, by design.

pub mod store;

pub use store::{Memory, MemorySearchResult, MemorySource, MemoryStore};
