//! # Observing Ingest
//!
//! Bulk updates from observing plans, observing logs and redshift tables.
//!
//! Rows are applied one at a time, each as its own unit of work followed by a
//! status recompute. The first bad row stops the batch; rows already applied
//! stay applied. Every batch reports an [`IngestOutcome`] with a numeric code.

use crate::catalog::CatalogStore;
use crate::mutation::MutationEngine;
use crate::primitives::{MAX_INGEST_ROWS, MAX_TEXT_LENGTH};
use crate::{
    FollowUpObservation, FollowUpRequest, FrbError, ObservingMode, Redshift, ResourceId,
    StatusLabel, TransientId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ROWS
// =============================================================================

/// One row of an observing plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsPlanRow {
    #[serde(rename = "TNS")]
    pub tns: String,
    #[serde(rename = "Resource")]
    pub resource: String,
    pub mode: String,
}

/// One row of an observing log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsLogRow {
    #[serde(rename = "TNS")]
    pub tns: String,
    #[serde(rename = "Resource")]
    pub resource: String,
    pub mode: String,
    #[serde(rename = "Conditions", default)]
    pub conditions: String,
    #[serde(default)]
    pub texp: f64,
    pub date: DateTime<Utc>,
    pub success: bool,
}

/// One row of a redshift table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedshiftRow {
    /// FRB that has this galaxy as its preferred host.
    #[serde(rename = "TNS")]
    pub tns: String,
    #[serde(rename = "Galaxy")]
    pub galaxy: String,
    #[serde(rename = "Resource")]
    pub resource: String,
    #[serde(rename = "Redshift")]
    pub redshift: f64,
    #[serde(rename = "Quality", default)]
    pub quality: Option<i32>,
}

// =============================================================================
// ERRORS & OUTCOME
// =============================================================================

/// Why a row stopped an ingest batch.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("FRB {0} not in DB")]
    UnknownTransient(String),

    #[error("Galaxy {0} not in DB")]
    UnknownGalaxy(String),

    #[error("FRB {name} not in {expected} status (is {actual})")]
    NotAwaitingImage {
        name: String,
        actual: StatusLabel,
        expected: StatusLabel,
    },

    #[error("FRB {name} not in {expected} status (is {actual})")]
    NotAwaitingSpectrum {
        name: String,
        actual: StatusLabel,
        expected: StatusLabel,
    },

    #[error("Resource {0} not in DB")]
    UnknownResource(String),

    #[error("Mode {0} not allowed")]
    InvalidMode(String),

    #[error("FRB {transient} not observed by {resource}")]
    NotObserved { transient: String, resource: String },

    #[error("Resource {0} not in DB")]
    UnknownPlanResource(String),

    #[error("Resource {0} cannot be logged until after its valid_stop date")]
    WindowOpen(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Batch of {0} rows exceeds the limit of {max}", max = MAX_INGEST_ROWS)]
    TooManyRows(usize),

    #[error(transparent)]
    Store(#[from] FrbError),
}

impl IngestError {
    /// Numeric outcome code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            IngestError::UnknownTransient(_) | IngestError::UnknownGalaxy(_) => 401,
            IngestError::NotAwaitingImage { .. } => 402,
            IngestError::NotAwaitingSpectrum { .. } => 403,
            IngestError::UnknownResource(_) => 405,
            IngestError::InvalidMode(_) | IngestError::NotObserved { .. } => 406,
            IngestError::UnknownPlanResource(_) => 409,
            IngestError::WindowOpen(_) => 410,
            IngestError::InvalidRow(_) => 400,
            IngestError::TooManyRows(_) => 413,
            IngestError::Store(_) => 500,
        }
    }
}

/// Result of an ingest batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub code: u16,
    pub message: String,
    /// Rows applied before the batch finished or stopped.
    pub rows_applied: usize,
}

impl IngestOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 200
    }

    fn from_result(result: Result<(), IngestError>, rows_applied: usize) -> Self {
        match result {
            Ok(()) => Self {
                code: 200,
                message: "All good".to_string(),
                rows_applied,
            },
            Err(e) => Self {
                code: e.code(),
                message: e.to_string(),
                rows_applied,
            },
        }
    }
}

// =============================================================================
// OBSERVING INGEST
// =============================================================================

/// The ObservingIngest applies observing batches to a store.
pub struct ObservingIngest;

impl ObservingIngest {
    /// Ingest an observing plan for `resource_name`.
    ///
    /// First clears every pending request for that resource, recomputing
    /// each affected transient. Then adds one request per row. Without
    /// `override_checks` an imaging row requires `NeedImage` and a
    /// spectroscopy row requires `NeedSpectrum`.
    pub fn ingest_obsplan<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[ObsPlanRow],
        resource_name: &str,
        override_checks: bool,
    ) -> IngestOutcome {
        let mut applied = 0;
        let result = Self::apply_obsplan(store, rows, resource_name, override_checks, &mut applied);
        IngestOutcome::from_result(result, applied)
    }

    /// Ingest an observing log.
    ///
    /// Per row: checks the pending status (unless `override_checks`), checks
    /// the resource window closed before `now`, replaces any observation with
    /// the same key, drops the transient's requests for that resource and
    /// recomputes. Finally clears the remaining requests of the last row's
    /// resource.
    pub fn ingest_obslog<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[ObsLogRow],
        now: DateTime<Utc>,
        override_checks: bool,
    ) -> IngestOutcome {
        let mut applied = 0;
        let result = Self::apply_obslog(store, rows, now, override_checks, &mut applied);
        IngestOutcome::from_result(result, applied)
    }

    /// Ingest a redshift table.
    ///
    /// Each row requires an observation of the transient by the resource. The
    /// galaxy's redshift source is set to the resource name.
    pub fn ingest_redshifts<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[RedshiftRow],
    ) -> IngestOutcome {
        let mut applied = 0;
        let result = Self::apply_redshifts(store, rows, &mut applied);
        IngestOutcome::from_result(result, applied)
    }

    fn apply_obsplan<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[ObsPlanRow],
        resource_name: &str,
        override_checks: bool,
        applied: &mut usize,
    ) -> Result<(), IngestError> {
        Self::check_batch(rows.len())?;
        let plan_resource = store
            .resource_id(resource_name)?
            .ok_or_else(|| IngestError::UnknownPlanResource(resource_name.to_string()))?;

        for pending in store.requests_for_resource(plan_resource)? {
            MutationEngine::cancel_request(store, pending)?;
        }

        for row in rows {
            let (transient, status) = Self::transient(store, &row.tns)?;
            let mode = Self::mode(&row.mode)?;
            if !override_checks {
                Self::require_status(
                    &row.tns,
                    mode,
                    status,
                    StatusLabel::NeedImage,
                    StatusLabel::NeedSpectrum,
                )?;
            }
            let resource = Self::resource(store, &row.resource)?;

            MutationEngine::request_follow_up(
                store,
                FollowUpRequest {
                    transient,
                    resource,
                    mode,
                },
            )?;
            *applied += 1;
        }
        Ok(())
    }

    fn apply_obslog<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[ObsLogRow],
        now: DateTime<Utc>,
        override_checks: bool,
        applied: &mut usize,
    ) -> Result<(), IngestError> {
        Self::check_batch(rows.len())?;
        let mut last_resource = None;

        for row in rows {
            let (transient, status) = Self::transient(store, &row.tns)?;
            let mode = Self::mode(&row.mode)?;
            if !override_checks {
                Self::require_status(
                    &row.tns,
                    mode,
                    status,
                    StatusLabel::ImagePending,
                    StatusLabel::SpectrumPending,
                )?;
            }
            let resource = Self::resource(store, &row.resource)?;
            if row.conditions.len() > MAX_TEXT_LENGTH {
                return Err(IngestError::InvalidRow(format!(
                    "conditions for {} exceed {} bytes",
                    row.tns, MAX_TEXT_LENGTH
                )));
            }
            if !(row.texp.is_finite() && row.texp >= 0.0) {
                return Err(IngestError::InvalidRow(format!(
                    "exposure time {} for {}",
                    row.texp, row.tns
                )));
            }
            let window = store
                .resource(resource)?
                .ok_or_else(|| IngestError::UnknownResource(row.resource.clone()))?;
            if !window.window_closed(now) {
                return Err(IngestError::WindowOpen(row.resource.clone()));
            }

            store.upsert_observation(FollowUpObservation {
                transient,
                resource,
                mode,
                date: row.date,
                success: row.success,
                texp: row.texp,
                conditions: row.conditions.clone(),
            })?;
            for pending in store.requests_for_transient(transient)? {
                if pending.resource == resource {
                    store.remove_request(pending)?;
                }
            }
            store.recompute_status(transient)?;

            last_resource = Some(resource);
            *applied += 1;
        }

        if let Some(resource) = last_resource {
            for pending in store.requests_for_resource(resource)? {
                MutationEngine::cancel_request(store, pending)?;
            }
        }
        Ok(())
    }

    fn apply_redshifts<S: CatalogStore + ?Sized>(
        store: &mut S,
        rows: &[RedshiftRow],
        applied: &mut usize,
    ) -> Result<(), IngestError> {
        Self::check_batch(rows.len())?;

        for row in rows {
            let (transient, _) = Self::transient(store, &row.tns)?;
            let galaxy_id = store
                .galaxy_id(&row.galaxy)?
                .ok_or_else(|| IngestError::UnknownGalaxy(row.galaxy.clone()))?;
            let mut galaxy = store
                .galaxy(galaxy_id)?
                .ok_or_else(|| IngestError::UnknownGalaxy(row.galaxy.clone()))?;
            let resource = Self::resource(store, &row.resource)?;
            if !(row.redshift.is_finite() && row.redshift >= 0.0) {
                return Err(IngestError::InvalidRow(format!(
                    "redshift {} for {}",
                    row.redshift, row.galaxy
                )));
            }

            let observed = store
                .observations_for_transient(transient)?
                .iter()
                .any(|o| o.resource == resource);
            if !observed {
                return Err(IngestError::NotObserved {
                    transient: row.tns.clone(),
                    resource: row.resource.clone(),
                });
            }

            galaxy.redshift = Some(Redshift {
                value: row.redshift,
                quality: row.quality,
                source: row.resource.clone(),
            });
            store.update_galaxy(galaxy_id, galaxy)?;
            store.recompute_status(transient)?;
            *applied += 1;
        }
        Ok(())
    }

    fn check_batch(len: usize) -> Result<(), IngestError> {
        if len > MAX_INGEST_ROWS {
            return Err(IngestError::TooManyRows(len));
        }
        Ok(())
    }

    fn transient<S: CatalogStore + ?Sized>(
        store: &S,
        name: &str,
    ) -> Result<(TransientId, StatusLabel), IngestError> {
        let id = store
            .transient_id(name)?
            .ok_or_else(|| IngestError::UnknownTransient(name.to_string()))?;
        let transient = store
            .transient(id)?
            .ok_or_else(|| IngestError::UnknownTransient(name.to_string()))?;
        Ok((id, transient.status))
    }

    fn resource<S: CatalogStore + ?Sized>(store: &S, name: &str) -> Result<ResourceId, IngestError> {
        store
            .resource_id(name)?
            .ok_or_else(|| IngestError::UnknownResource(name.to_string()))
    }

    fn mode(mode: &str) -> Result<ObservingMode, IngestError> {
        mode.parse()
            .map_err(|_| IngestError::InvalidMode(mode.to_string()))
    }

    fn require_status(
        name: &str,
        mode: ObservingMode,
        actual: StatusLabel,
        imaging: StatusLabel,
        spectroscopy: StatusLabel,
    ) -> Result<(), IngestError> {
        if mode.is_spectroscopy() {
            if actual != spectroscopy {
                return Err(IngestError::NotAwaitingSpectrum {
                    name: name.to_string(),
                    actual,
                    expected: spectroscopy,
                });
            }
        } else if actual != imaging {
            return Err(IngestError::NotAwaitingImage {
                name: name.to_string(),
                actual,
                expected: imaging,
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
