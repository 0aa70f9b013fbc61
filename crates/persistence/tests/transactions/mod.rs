//! Transaction tests for the SQLite backend.
//!
//! This module contains tests for rollback of failed index maintenance and
//! for concurrent writers on a file-backed database.

pub mod concurrency_tests;
pub mod rollback_tests;
