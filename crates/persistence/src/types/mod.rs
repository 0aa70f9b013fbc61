//! Core types for the persistence layer.
//!
//! - [`StoredResource`] - A FHIR resource with persistence metadata
//! - [`SearchQuery`], [`SortDirective`] - Access-controlled search input
//! - [`Page`] - Offset-paginated search output
//!
//! # Examples
//!
//! ```
//! use fhir_access_persistence::types::{SearchQuery, SortDirective};
//!
//! let query = SearchQuery::new("Task")
//!     .with_sort(SortDirective::parse("-_lastUpdated"))
//!     .with_count(20);
//! assert_eq!(query.count, Some(20));
//! ```

mod pagination;
mod search;
mod stored_resource;

pub use pagination::Page;
pub use search::{SORTABLE_PARAMETERS, SearchQuery, SortDirection, SortDirective};
pub use stored_resource::StoredResource;
