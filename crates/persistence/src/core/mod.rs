//! Core storage traits and abstractions.
//!
//! - [`Backend`] - Database driver abstraction
//! - [`ResourceStorage`] - CRUD with transactional access index maintenance
//! - [`AccessControlledSearch`] - Reads and searches on behalf of a caller
//! - [`AccessIndexProvider`] - Inspection and audit of the access index
//!
//! ```text
//! ResourceStorage
//!     └── AccessControlledSearch
//!
//! AccessIndexProvider
//! ```

pub mod access_index;
pub mod backend;
pub mod search;
pub mod storage;

pub use access_index::AccessIndexProvider;
pub use backend::{Backend, BackendCapability, BackendKind};
pub use search::AccessControlledSearch;
pub use storage::ResourceStorage;
