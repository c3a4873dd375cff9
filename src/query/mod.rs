//! Query scope resolution and safety
//!
//! This module never executes queries. It determines, from query text alone,
//! which catalog tables a query may load, and applies a best-effort keyword
//! denylist before anything is opened.

mod scope;

pub use scope::{QueryScope, ScopeResolver};
