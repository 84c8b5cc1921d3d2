//! identity-core: Shared infrastructure for the identity data store.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use tracing;
pub use validator;
