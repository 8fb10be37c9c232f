//! SQLite storage for reconstructed tables and compile watermarks.
//!
//! This module provides:
//! - Pool setup with WAL and a versioned schema
//! - The `Repository` used by the incremental compiler

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
