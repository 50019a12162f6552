//! # Transient Snapshot
//!
//! Everything the criteria evaluator and the status state machine need to know
//! about one transient, loaded in one pass from a store.
//!
//! Evaluation and resolution are pure functions of a snapshot. Stores decide
//! how the snapshot is read: the in-memory catalog under `&mut self`, the redb
//! catalog inside the same write transaction that persists the status.

use crate::{
    FollowUpObservation, FollowUpRequest, FrbError, Galaxy, GalaxyId, ObservingMode,
    SampleCriteria, Transient, TransientId,
};

// =============================================================================
// SNAPSHOT SOURCE
// =============================================================================

/// Read access needed to build a [`TransientSnapshot`].
pub trait SnapshotSource {
    /// Lookup a transient by id.
    fn transient(&self, id: TransientId) -> Result<Option<Transient>, FrbError>;

    /// Lookup a galaxy by id.
    fn galaxy(&self, id: GalaxyId) -> Result<Option<Galaxy>, FrbError>;

    /// Lookup the sample criteria seeded for a tag.
    fn sample_criteria(&self, name: &str) -> Result<Option<SampleCriteria>, FrbError>;

    /// All pending requests for a transient.
    fn requests_for_transient(&self, id: TransientId)
    -> Result<Vec<FollowUpRequest>, FrbError>;

    /// All observations (successful or not) of a transient.
    fn observations_for_transient(
        &self,
        id: TransientId,
    ) -> Result<Vec<FollowUpObservation>, FrbError>;
}

// =============================================================================
// FOLLOW-UP FACTS
// =============================================================================

/// Existence facts about requests and successful observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowUpFacts {
    pub imaging_requested: bool,
    pub spectroscopy_requested: bool,
    pub imaging_observed: bool,
    pub spectroscopy_observed: bool,
}

impl FollowUpFacts {
    /// Reduce request and observation rows to existence flags.
    ///
    /// Failed observations do not count.
    #[must_use]
    pub fn from_records(
        requests: &[FollowUpRequest],
        observations: &[FollowUpObservation],
    ) -> Self {
        let requested = |spectro: bool| {
            requests
                .iter()
                .any(|r| r.mode.is_spectroscopy() == spectro)
        };
        let observed = |spectro: bool| {
            observations
                .iter()
                .any(|o| o.success && o.mode.is_spectroscopy() == spectro)
        };

        Self {
            imaging_requested: requested(false),
            spectroscopy_requested: requested(true),
            imaging_observed: observed(false),
            spectroscopy_observed: observed(true),
        }
    }

    /// Whether a request in `mode`'s family is open.
    #[must_use]
    pub fn requested(&self, mode: ObservingMode) -> bool {
        if mode.is_spectroscopy() {
            self.spectroscopy_requested
        } else {
            self.imaging_requested
        }
    }
}

// =============================================================================
// CANDIDATE
// =============================================================================

/// A PATH candidate joined with its galaxy record.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub galaxy_id: GalaxyId,
    pub galaxy: Galaxy,
    /// P(O|x)
    pub p_ox: f64,
}

impl Candidate {
    /// Best-filter magnitude, if the galaxy has photometry.
    #[must_use]
    pub fn mag(&self) -> Option<f64> {
        self.galaxy.best_photometry().map(|p| p.mag)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A consistent view of one transient and its follow-up state.
#[derive(Debug, Clone)]
pub struct TransientSnapshot {
    pub id: TransientId,
    pub transient: Transient,
    /// One entry per tag, in tag order.
    pub samples: Vec<SampleCriteria>,
    /// PATH candidates ranked by descending P(O|x); ties by ascending galaxy id.
    pub candidates: Vec<Candidate>,
    /// The assigned host galaxy record.
    pub host: Option<Galaxy>,
    pub follow_up: FollowUpFacts,
}

impl TransientSnapshot {
    /// Load a snapshot for `id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transient, its host or a PATH candidate galaxy is missing
    /// - `ConfigurationMissing` if a tag has no seeded sample criteria
    pub fn load<S: SnapshotSource + ?Sized>(source: &S, id: TransientId) -> Result<Self, FrbError> {
        let transient = source
            .transient(id)?
            .ok_or_else(|| FrbError::not_found("Transient", id))?;

        let mut samples = Vec::with_capacity(transient.tags.len());
        for tag in &transient.tags {
            let sample = source
                .sample_criteria(tag)?
                .ok_or_else(|| FrbError::ConfigurationMissing(tag.clone()))?;
            samples.push(sample);
        }

        let mut candidates = Vec::with_capacity(transient.path.len());
        for entry in &transient.path {
            let galaxy = source
                .galaxy(entry.galaxy)?
                .ok_or_else(|| FrbError::not_found("Galaxy", entry.galaxy))?;
            candidates.push(Candidate {
                galaxy_id: entry.galaxy,
                galaxy,
                p_ox: entry.p_ox,
            });
        }
        rank_candidates(&mut candidates);

        let host = match transient.host {
            Some(host_id) => Some(
                source
                    .galaxy(host_id)?
                    .ok_or_else(|| FrbError::not_found("Galaxy", host_id))?,
            ),
            None => None,
        };

        let requests = source.requests_for_transient(id)?;
        let observations = source.observations_for_transient(id)?;

        Ok(Self {
            id,
            transient,
            samples,
            candidates,
            host,
            follow_up: FollowUpFacts::from_records(&requests, &observations),
        })
    }

    /// Whether a host has been assigned (PATH has been run).
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.transient.host.is_some()
    }

    /// The candidate with the largest P(O|x).
    #[must_use]
    pub fn primary(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// The (at most) two highest-ranked candidates.
    #[must_use]
    pub fn top_two(&self) -> &[Candidate] {
        &self.candidates[..self.candidates.len().min(2)]
    }

    /// Sum of the two largest P(O|x): the cached value, else computed.
    #[must_use]
    pub fn sum_top_two_pox(&self) -> Option<f64> {
        if self.transient.sum_top_two_path.is_some() {
            return self.transient.sum_top_two_path;
        }
        if self.candidates.is_empty() {
            return None;
        }
        Some(self.top_two().iter().map(|c| c.p_ox).sum())
    }

    /// Magnitude of the brighter of the top two candidates: the cached value,
    /// else computed from photometry.
    #[must_use]
    pub fn mag_top_two(&self) -> Option<f64> {
        if self.transient.mag_top_two_path.is_some() {
            return self.transient.mag_top_two_path;
        }
        self.top_two()
            .iter()
            .filter_map(Candidate::mag)
            .min_by(f64::total_cmp)
    }
}

/// Order candidates by descending P(O|x), then ascending galaxy id.
pub(crate) fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.p_ox
            .total_cmp(&a.p_ox)
            .then_with(|| a.galaxy_id.cmp(&b.galaxy_id))
    });
}

// =============================================================================
// TESTS
// =============================================================================
