//! # Formats
//!
//! Byte-level encodings of a catalog. File I/O lives in the app layer.

mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, catalog_from_bytes, catalog_to_bytes,
};
