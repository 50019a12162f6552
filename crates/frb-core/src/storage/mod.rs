//! # Storage
//!
//! Persistent catalog backends.

mod redb_catalog;

pub use redb_catalog::RedbCatalog;
