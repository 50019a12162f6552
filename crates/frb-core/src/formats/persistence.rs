//! # Persistence Format
//!
//! Binary serialization for catalog snapshots.
//!
//! Format: Header (5 bytes) + postcard-serialized catalog.
//! - 4 bytes: Magic ("FRBC")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded, and the
//! decoded catalog must pass [`Catalog::validate`].

use crate::catalog::Catalog;
use crate::{FrbError, primitives};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum accepted snapshot size.
///
/// Checked before deserialization so corrupted input cannot drive allocation.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 256 * 1024 * 1024; // 256 MB

/// Header length.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all catalog data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), FrbError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FrbError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FrbError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrbError> {
        match bytes {
            [m0, m1, m2, m3, version, ..] => Ok(Self {
                magic: [*m0, *m1, *m2, *m3],
                version: *version,
            }),
            _ => Err(FrbError::SerializationError(
                "Header too short".to_string(),
            )),
        }
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a catalog to bytes (header + payload).
pub fn catalog_to_bytes(catalog: &Catalog) -> Result<Vec<u8>, FrbError> {
    let header = PersistenceHeader::new();
    let payload = postcard::to_stdvec(catalog)
        .map_err(|e| FrbError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a catalog from bytes.
///
/// Validates, in order: minimum size, maximum size, header, payload decoding,
/// catalog references.
pub fn catalog_from_bytes(bytes: &[u8]) -> Result<Catalog, FrbError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrbError::SerializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }

    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(FrbError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let catalog: Catalog = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        FrbError::SerializationError(format!("Failed to deserialize catalog data: {}", e))
    })?;
    catalog.validate()?;

    Ok(catalog)
}

// =============================================================================
// TESTS
// =============================================================================
