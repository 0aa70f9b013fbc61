//! Backend abstraction for database drivers.
//!
//! This module defines the [`Backend`] trait implemented by every storage
//! driver. It covers connection handling and schema setup; data operations
//! live in the storage and search traits.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::BackendError;

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Capabilities that a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCapability {
    /// Basic CRUD operations.
    Crud,
    /// Resource versioning.
    Versioning,
    /// ACID transactions.
    Transactions,
    /// Optimistic locking (If-Match).
    OptimisticLocking,
    /// Offset-based pagination.
    OffsetPagination,
    /// Sorting results.
    Sorting,
    /// A transactionally maintained read access index.
    ReadAccessIndex,
    /// Read access enforced inside the database query.
    AccessFilteredSearch,
}

impl std::fmt::Display for BackendCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendCapability::Crud => "crud",
            BackendCapability::Versioning => "versioning",
            BackendCapability::Transactions => "transactions",
            BackendCapability::OptimisticLocking => "optimistic-locking",
            BackendCapability::OffsetPagination => "offset-pagination",
            BackendCapability::Sorting => "sorting",
            BackendCapability::ReadAccessIndex => "read-access-index",
            BackendCapability::AccessFilteredSearch => "access-filtered-search",
        };
        write!(f, "{}", name)
    }
}

/// A database backend that can execute storage operations.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Checks if this backend supports the given capability.
    fn supports(&self, capability: BackendCapability) -> bool;

    /// Returns all capabilities supported by this backend.
    fn capabilities(&self) -> Vec<BackendCapability>;

    /// Checks if the backend is healthy and accepting connections.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Initializes the database schema if needed.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Runs any pending migrations.
    async fn migrate(&self) -> Result<(), BackendError>;
}
