//! Records held by the object store.
//!
//! Records carry no identifier of their own; the store assigns ids on insert
//! and keys its tables by them.

use super::{GalaxyId, ObservingMode, ResourceId, StatusLabel, TransientId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// GALAXY
// =============================================================================

/// One photometric measurement of a galaxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    /// Telescope/instrument label, e.g. `Blanco-DECam` or `Pan-STARRS-GPC1`.
    pub instrument: String,
    /// Band name, e.g. `r` or `DECam_r`.
    pub band: String,
    pub mag: f64,
}

impl Photometry {
    #[must_use]
    pub fn new(instrument: impl Into<String>, band: impl Into<String>, mag: f64) -> Self {
        Self {
            instrument: instrument.into(),
            band: band.into(),
            mag,
        }
    }

    /// Filter label as `<instrument>-<band>`.
    #[must_use]
    pub fn filter(&self) -> String {
        format!("{}-{}", self.instrument, self.band)
    }
}

/// A measured redshift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redshift {
    pub value: f64,
    /// 1 means fully secure.
    pub quality: Option<i32>,
    /// Where the redshift came from (a resource name, a survey, ...).
    pub source: String,
}

/// A candidate host galaxy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Galaxy {
    /// J2000 name; unique in the store.
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    pub redshift: Option<Redshift>,
    /// Ordered as received; order decides the fallback filter.
    pub photometry: Vec<Photometry>,
}

impl Galaxy {
    #[must_use]
    pub fn new(name: impl Into<String>, ra: f64, dec: f64) -> Self {
        Self {
            name: name.into(),
            ra,
            dec,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_photometry(mut self, photometry: Photometry) -> Self {
        self.photometry.push(photometry);
        self
    }

    #[must_use]
    pub fn with_redshift(mut self, value: f64, source: impl Into<String>) -> Self {
        self.redshift = Some(Redshift {
            value,
            quality: None,
            source: source.into(),
        });
        self
    }

    /// The photometry used to judge the galaxy: the first r/R-band entry, or
    /// the first entry of any band. `None` without photometry.
    #[must_use]
    pub fn best_photometry(&self) -> Option<&Photometry> {
        self.photometry
            .iter()
            .find(|p| p.band.ends_with(['r', 'R']))
            .or_else(|| self.photometry.first())
    }
}

// =============================================================================
// TRANSIENT
// =============================================================================

/// One candidate from a PATH run: a galaxy and its association probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathCandidate {
    pub galaxy: GalaxyId,
    /// P(O|x)
    pub p_ox: f64,
}

/// An FRB transient.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transient {
    /// TNS name; unique in the store.
    pub name: String,
    /// Originating FRB survey, e.g. `CHIME/FRB`.
    pub survey: String,
    pub ra: f64,
    pub dec: f64,
    /// Localization ellipse semi-major axis (arcsec).
    pub a_err: f64,
    /// Localization ellipse semi-minor axis (arcsec).
    pub b_err: f64,
    /// Localization ellipse position angle (deg).
    pub theta: f64,
    /// Dispersion measure.
    pub dm: f64,
    /// Milky-Way E(B-V) along the sightline.
    pub mw_ebv: f64,
    /// Whether a very bright star sits near the localization; `None` if unchecked.
    pub bright_star: Option<bool>,
    /// Sample tags; each must name a seeded [`SampleCriteria`].
    pub tags: BTreeSet<String>,
    /// Assigned host galaxy, set once PATH has been run.
    pub host: Option<GalaxyId>,
    /// PATH candidates.
    pub path: Vec<PathCandidate>,
    /// P(U|x), the unseen-host probability.
    pub p_ux: Option<f64>,
    /// Cached sum of the two largest P(O|x).
    pub sum_top_two_path: Option<f64>,
    /// Cached PATH magnitude of the top two candidates.
    pub mag_top_two_path: Option<f64>,
    pub status: StatusLabel,
}

impl Transient {
    #[must_use]
    pub fn new(name: impl Into<String>, survey: impl Into<String>, ra: f64, dec: f64) -> Self {
        Self {
            name: name.into(),
            survey: survey.into(),
            ra,
            dec,
            ..Self::default()
        }
    }
}

// =============================================================================
// SAMPLE CRITERIA
// =============================================================================

/// Threshold configuration for one sample (tag).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleCriteria {
    /// Tag name this record configures.
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// FRB survey the sample draws from.
    #[serde(default)]
    pub survey: String,
    /// Weighting factor when selecting among many targets.
    #[serde(default)]
    pub weight: f64,
    /// Minimum P(O|x) for selection.
    pub min_pox: f64,
    /// Sum the top two candidates for the P(O|x) criterion.
    #[serde(default)]
    pub use_top_two: bool,
    /// Maximum E(B-V).
    pub max_ebv: f64,
    /// Faintest magnitude still worth spectroscopy.
    pub max_mr: f64,
    /// Run public-data PATH by default.
    #[serde(default)]
    pub run_public_path: bool,
    #[serde(default)]
    pub apply_bright_star: bool,
    /// Maximum P(U|x).
    #[serde(default)]
    pub max_pux: Option<f64>,
    #[serde(default)]
    pub min_dm: Option<f64>,
    #[serde(default)]
    pub max_dm: Option<f64>,
    /// Maximum localization semi-major axis.
    #[serde(default)]
    pub max_a: Option<f64>,
    /// Never ask for deeper imaging for this sample.
    #[serde(default)]
    pub skip_need_image: bool,
}

impl SampleCriteria {
    #[must_use]
    pub fn new(name: impl Into<String>, min_pox: f64, max_ebv: f64, max_mr: f64) -> Self {
        Self {
            name: name.into(),
            min_pox,
            max_ebv,
            max_mr,
            ..Self::default()
        }
    }
}

// =============================================================================
// FOLLOW-UP
// =============================================================================

/// An observing program on one instrument with a validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpResource {
    /// Unique name.
    pub name: String,
    pub instrument: String,
    pub valid_start: DateTime<Utc>,
    pub valid_stop: DateTime<Utc>,
    #[serde(default)]
    pub num_targ_img: u32,
    #[serde(default)]
    pub num_targ_mask: u32,
    #[serde(default)]
    pub num_targ_longslit: u32,
    /// Maximum airmass for observing.
    #[serde(default)]
    pub max_airmass: f64,
    /// Surveys the resource serves, e.g. `CHIME/FRB,CRAFT` or `all`.
    #[serde(default)]
    pub surveys: String,
}

impl FollowUpResource {
    /// True once `now` is past the end of the validity window.
    #[must_use]
    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        self.valid_stop <= now
    }
}

/// A pending request for a resource to observe a transient.
///
/// The triple is the whole identity: requests carry no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FollowUpRequest {
    pub transient: TransientId,
    pub resource: ResourceId,
    pub mode: ObservingMode,
}

/// Identity of an observation: at most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub transient: TransientId,
    pub resource: ResourceId,
    pub mode: ObservingMode,
    pub date: DateTime<Utc>,
}

/// A completed observation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpObservation {
    pub transient: TransientId,
    pub resource: ResourceId,
    pub mode: ObservingMode,
    pub date: DateTime<Utc>,
    pub success: bool,
    /// Exposure time in seconds.
    pub texp: f64,
    /// e.g. clear, cloudy, photometric
    pub conditions: String,
}

impl FollowUpObservation {
    #[must_use]
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            transient: self.transient,
            resource: self.resource,
            mode: self.mode,
            date: self.date,
        }
    }
}
