//! # Pipeline Primitives
//!
//! Hardcoded constants for the FRB follow-up engine.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Per-sample thresholds live in [`SampleCriteria`](crate::SampleCriteria);
//! everything here applies to every sample.

/// Redshift sources trusted for a spectroscopic redshift.
///
/// A galaxy's redshift counts only if its source string contains one of these
/// entries (substring match, case-sensitive).
pub const GOOD_REDSHIFT_SOURCES: [&str; 5] = ["FFFF", "Keck", "Lick", "Gemini", "MMT"];

/// Instruments whose photometry comes from a public survey.
///
/// A primary candidate whose best filter belongs to one of these has only been
/// through public-data PATH.
pub const PUBLIC_SURVEY_INSTRUMENTS: [&str; 3] = ["Blanco", "DECam", "Pan-STARRS"];

/// Limiting magnitude of public Blanco/DECam imaging.
pub const DECAM_PUBLIC_DEPTH: f64 = 23.0;

/// Limiting magnitude of public Pan-STARRS imaging.
pub const PANSTARRS_PUBLIC_DEPTH: f64 = 21.0;

/// Maximum redshift difference for two candidates to count as one system.
pub const REDSHIFT_CONSISTENCY_TOLERANCE: f64 = 0.003;

/// Magic bytes for the catalog snapshot header.
///
/// - File Header = Magic Bytes ("FRBC") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FRBC";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for names (transients, galaxies, resources, tags).
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length for free-text fields such as observing conditions.
pub const MAX_TEXT_LENGTH: usize = 256;

/// Maximum number of rows in a single ingestion batch.
pub const MAX_INGEST_ROWS: usize = 10_000;
