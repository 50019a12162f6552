//! # Core Type Definitions
//!
//! This module contains the core types for the FRB follow-up engine:
//! - Store identifiers (`TransientId`, `GalaxyId`, `ResourceId`)
//! - The closed status enumeration (`StatusLabel`)
//! - Observing modes (`ObservingMode`)
//! - Records held by the object store (see [`records`])
//! - Error types (`FrbError`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers and enums implement `Ord` so every collection keyed by them can
//! live in a `BTreeMap`/`BTreeSet` and iterate in a stable order.

mod records;

pub use records::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// STORE IDENTIFIERS
// =============================================================================

/// Identifier of an FRB transient inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransientId(pub u64);

/// Identifier of a candidate (or host) galaxy inside the store.
///
/// Also the tie-break key when two PATH candidates share the same `P(O|x)`:
/// the lower id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GalaxyId(pub u64);

/// Identifier of a follow-up resource (an observing program on an instrument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for TransientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl fmt::Display for GalaxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

// =============================================================================
// STATUS LABEL
// =============================================================================

/// The pipeline state of an FRB transient.
///
/// Exactly one label is current for each transient. The set is closed: the
/// state machine can only ever produce one of these variants, and every
/// variant has a stable small-integer code and name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum StatusLabel {
    /// Does not meet the criteria for follow-up.
    #[default]
    Unassigned,
    /// Localization is too close to a very bright star.
    BrightStar,
    /// Sightline exceeds the E(B-V) threshold.
    TooDusty,
    /// Needs a PATH run with public data.
    #[serde(rename = "RunPublicPATH")]
    RunPublicPath,
    /// Needs deeper imaging.
    NeedImage,
    /// Needs spectroscopy for a redshift.
    NeedSpectrum,
    /// Primary has a redshift; a secondary candidate still needs one.
    NeedSecondary,
    /// Needs PATH on the deeper (typically private) imaging.
    #[serde(rename = "RunDeepPATH")]
    RunDeepPath,
    /// Deeper imaging requested and pending.
    ImagePending,
    /// Spectroscopy requested and pending.
    SpectrumPending,
    /// Spectroscopy obtained successfully.
    GoodSpectrum,
    /// Host is too faint for spectroscopy.
    TooFaint,
    /// Host association too uncertain for further follow-up.
    AmbiguousHost,
    /// Even deep imaging found no compelling host.
    UnseenHost,
    /// Redshift measured.
    Redshift,
}

impl StatusLabel {
    /// Every label, ordered by code.
    pub const ALL: [StatusLabel; 15] = [
        StatusLabel::Unassigned,
        StatusLabel::BrightStar,
        StatusLabel::TooDusty,
        StatusLabel::RunPublicPath,
        StatusLabel::NeedImage,
        StatusLabel::NeedSpectrum,
        StatusLabel::NeedSecondary,
        StatusLabel::RunDeepPath,
        StatusLabel::ImagePending,
        StatusLabel::SpectrumPending,
        StatusLabel::GoodSpectrum,
        StatusLabel::TooFaint,
        StatusLabel::AmbiguousHost,
        StatusLabel::UnseenHost,
        StatusLabel::Redshift,
    ];

    /// Stable integer code, used by persistent storage.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`StatusLabel::code`].
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Canonical display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            StatusLabel::Unassigned => "Unassigned",
            StatusLabel::BrightStar => "BrightStar",
            StatusLabel::TooDusty => "TooDusty",
            StatusLabel::RunPublicPath => "RunPublicPATH",
            StatusLabel::NeedImage => "NeedImage",
            StatusLabel::NeedSpectrum => "NeedSpectrum",
            StatusLabel::NeedSecondary => "NeedSecondary",
            StatusLabel::RunDeepPath => "RunDeepPATH",
            StatusLabel::ImagePending => "ImagePending",
            StatusLabel::SpectrumPending => "SpectrumPending",
            StatusLabel::GoodSpectrum => "GoodSpectrum",
            StatusLabel::TooFaint => "TooFaint",
            StatusLabel::AmbiguousHost => "AmbiguousHost",
            StatusLabel::UnseenHost => "UnseenHost",
            StatusLabel::Redshift => "Redshift",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatusLabel {
    type Err = FrbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.name() == s)
            .ok_or_else(|| FrbError::InvalidInput(format!("unknown status label '{}'", s)))
    }
}

// =============================================================================
// OBSERVING MODE
// =============================================================================

/// How a follow-up resource observes a transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservingMode {
    Imaging,
    Longslit,
    Mask,
}

impl ObservingMode {
    /// Stable integer code, used as part of storage keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            ObservingMode::Imaging => 0,
            ObservingMode::Longslit => 1,
            ObservingMode::Mask => 2,
        }
    }

    /// Inverse of [`ObservingMode::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ObservingMode::Imaging),
            1 => Some(ObservingMode::Longslit),
            2 => Some(ObservingMode::Mask),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ObservingMode::Imaging => "imaging",
            ObservingMode::Longslit => "longslit",
            ObservingMode::Mask => "mask",
        }
    }

    /// Longslit and multi-object mask modes both yield spectra.
    #[must_use]
    pub const fn is_spectroscopy(self) -> bool {
        matches!(self, ObservingMode::Longslit | ObservingMode::Mask)
    }
}

impl fmt::Display for ObservingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservingMode {
    type Err = FrbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imaging" => Ok(ObservingMode::Imaging),
            "longslit" => Ok(ObservingMode::Longslit),
            "mask" => Ok(ObservingMode::Mask),
            other => Err(FrbError::InvalidMode(other.to_string())),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the follow-up engine.
///
/// - No silent failures
/// - Use `Result<T, FrbError>` for fallible operations
/// - The status state machine itself never fails once its inputs are loaded
#[derive(Debug, Error)]
pub enum FrbError {
    /// An entity referenced by name or id does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The transient is not in the status an operation requires.
    #[error("{name} is in status {actual}, expected {expected}")]
    InvalidState {
        name: String,
        actual: StatusLabel,
        expected: StatusLabel,
    },

    /// The observing mode is outside {imaging, longslit, mask}.
    #[error("Mode {0} not allowed")]
    InvalidMode(String),

    /// The action must wait until a resource's validity window has closed.
    #[error("Resource {0} is still inside its validity window")]
    TimingViolation(String),

    /// A tag has no seeded sample criteria.
    #[error("No sample criteria configured for tag '{0}'")]
    ConfigurationMissing(String),

    /// An entity with the same unique name already exists.
    #[error("{kind} already exists: {name}")]
    Duplicate { kind: &'static str, name: String },

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl FrbError {
    pub(crate) fn not_found(kind: &'static str, name: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
