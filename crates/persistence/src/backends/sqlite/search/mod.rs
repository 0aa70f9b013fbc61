//! SQLite search implementation.
//!
//! - [`query_builder`] - Translates access-controlled searches into SQL clauses
//! - [`access_filter`] - Compiles a caller identity into a correlated read access predicate

pub mod access_filter;
pub mod query_builder;

pub use access_filter::AccessFilterCompiler;
pub use query_builder::{QueryBuilder, RESOURCE_ALIAS, SqlFragment, SqlParam};
