//! # Seed Configuration
//!
//! A TOML file declaring the sample criteria and follow-up resources a
//! catalog is seeded with.
//!
//! ```toml
//! [[samples]]
//! name = "CRAFT-ICS"
//! min_pox = 0.9
//! max_ebv = 0.3
//! max_mr = 23.5
//! run_public_path = true
//!
//! [[resources]]
//! name = "Keck-LRIS-2024A"
//! instrument = "Keck-LRIS"
//! valid_start = "2024-02-01T00:00:00Z"
//! valid_stop = "2024-07-31T23:59:59Z"
//! ```
//!
//! Timestamps are RFC 3339 strings, not bare TOML datetimes.

use frb_core::{FollowUpResource, FrbError, SampleCriteria, Seeded, Session};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Parsed seed configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrbConfig {
    #[serde(default)]
    pub samples: Vec<SampleCriteria>,
    #[serde(default)]
    pub resources: Vec<FollowUpResource>,
}

/// What seeding changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub samples_created: usize,
    pub samples_unchanged: usize,
    pub resources_created: usize,
    pub resources_unchanged: usize,
}

impl FrbConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, FrbError> {
        toml::from_str(text).map_err(|e| FrbError::SerializationError(format!("Config: {}", e)))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, FrbError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            FrbError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FrbError::InvalidInput(format!(
                "Config size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| FrbError::IoError(format!("Read config: {}", e)))?;
        Self::from_toml(&text)
    }

    /// Seed every sample and resource; re-seeding identical entries is a no-op.
    pub fn seed(&self, session: &mut Session) -> Result<SeedReport, FrbError> {
        let mut report = SeedReport::default();

        for sample in &self.samples {
            match session.ensure_sample_criteria(sample.clone())? {
                Seeded::Created => {
                    tracing::info!(sample = %sample.name, "Seeded sample criteria");
                    report.samples_created += 1;
                }
                Seeded::Unchanged => report.samples_unchanged += 1,
            }
        }

        for resource in &self.resources {
            match session.ensure_resource(resource.clone())?.1 {
                Seeded::Created => {
                    tracing::info!(resource = %resource.name, "Seeded follow-up resource");
                    report.resources_created += 1;
                }
                Seeded::Unchanged => report.resources_unchanged += 1,
            }
        }

        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
