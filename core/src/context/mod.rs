//! Tool-result caching (store) and final-answer budgeting (compactor).

pub mod compactor;
pub mod store;

pub use compactor::{build_context, estimate_tokens, summarize_result, CompactableResult, TOKEN_BUDGET};
pub use store::{hash_query, ContextData, ContextPointer, ToolContextStore};
