//! # Session Module
//!
//! A Session wraps one catalog backend and exposes the engine's operations by
//! name, so callers never match on the backend themselves.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses the in-memory `Catalog` (fast, volatile unless saved
//!   with [`Session::to_bytes`])
//! - `Persistent`: uses `RedbCatalog` for disk-backed ACID storage

use crate::catalog::{Catalog, CatalogStore};
use crate::criteria::{CriteriaVector, evaluate_criteria};
use crate::formats::{catalog_from_bytes, catalog_to_bytes};
use crate::mutation::MutationEngine;
use crate::observing::{IngestOutcome, ObsLogRow, ObsPlanRow, ObservingIngest, RedshiftRow};
use crate::registry::{SampleRegistry, Seeded};
use crate::storage::RedbCatalog;
use crate::{
    FollowUpResource, FrbError, Galaxy, GalaxyId, PathCandidate, ResourceId, SampleCriteria,
    StatusLabel, Transient, TransientId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory catalog (fast, volatile).
    InMemory(Catalog),
    /// Disk-backed catalog using redb (ACID, persistent).
    Persistent(RedbCatalog),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Catalog::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbCatalog (database handle) cannot be safely cloned.

/// A Session owns one catalog backend.
#[derive(Debug, Default)]
pub struct Session {
    backend: StorageBackend,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an existing in-memory catalog.
    #[must_use]
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            backend: StorageBackend::InMemory(catalog),
        }
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    /// All changes are automatically persisted to disk.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, FrbError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbCatalog::open(path)?),
        })
    }

    /// Create an in-memory session from snapshot bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrbError> {
        Ok(Self::with_catalog(catalog_from_bytes(bytes)?))
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get an optional reference to the in-memory catalog.
    ///
    /// Returns `None` for persistent backends.
    #[must_use]
    pub fn catalog_opt(&self) -> Option<&Catalog> {
        match &self.backend {
            StorageBackend::InMemory(c) => Some(c),
            StorageBackend::Persistent(_) => None,
        }
    }

    /// The backend as a catalog store.
    pub fn store(&self) -> &dyn CatalogStore {
        match &self.backend {
            StorageBackend::InMemory(catalog) => catalog,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    /// The backend as a mutable catalog store.
    pub fn store_mut(&mut self) -> &mut dyn CatalogStore {
        match &mut self.backend {
            StorageBackend::InMemory(catalog) => catalog,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Serialize the whole catalog in the snapshot file format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrbError> {
        match &self.backend {
            StorageBackend::InMemory(catalog) => catalog_to_bytes(catalog),
            StorageBackend::Persistent(redb) => catalog_to_bytes(&Catalog::copy_from(redb)?),
        }
    }

    /// Load snapshot bytes into this (empty) session.
    pub fn import_bytes(&mut self, bytes: &[u8]) -> Result<(), FrbError> {
        let catalog = catalog_from_bytes(bytes)?;
        catalog.restore_into(self.store_mut())
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Seed sample criteria.
    pub fn ensure_sample_criteria(&mut self, criteria: SampleCriteria) -> Result<Seeded, FrbError> {
        SampleRegistry::ensure_sample_criteria(self.store_mut(), criteria)
    }

    /// Seed a follow-up resource.
    pub fn ensure_resource(
        &mut self,
        resource: FollowUpResource,
    ) -> Result<(ResourceId, Seeded), FrbError> {
        SampleRegistry::ensure_resource(self.store_mut(), resource)
    }

    /// Add a transient and compute its initial status.
    pub fn add_transient(
        &mut self,
        transient: Transient,
    ) -> Result<(TransientId, StatusLabel), FrbError> {
        let tags: Vec<String> = transient.tags.iter().cloned().collect();
        for tag in &tags {
            SampleRegistry::lookup(self.store(), tag)?;
        }
        let store = self.store_mut();
        let id = store.insert_transient(transient)?;
        let status = store.recompute_status(id)?;
        Ok((id, status))
    }

    /// Add a galaxy.
    pub fn add_galaxy(&mut self, galaxy: Galaxy) -> Result<GalaxyId, FrbError> {
        self.store_mut().insert_galaxy(galaxy)
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// Resolve a transient by TNS name.
    pub fn transient_id(&self, name: &str) -> Result<TransientId, FrbError> {
        MutationEngine::transient_by_name(self.store(), name)
    }

    /// Resolve a galaxy by name.
    pub fn galaxy_id(&self, name: &str) -> Result<GalaxyId, FrbError> {
        self.store()
            .galaxy_id(name)?
            .ok_or_else(|| FrbError::not_found("Galaxy", name))
    }

    /// Load a transient by TNS name.
    pub fn transient(&self, name: &str) -> Result<(TransientId, Transient), FrbError> {
        let id = self.transient_id(name)?;
        let transient = self
            .store()
            .transient(id)?
            .ok_or_else(|| FrbError::not_found("Transient", name))?;
        Ok((id, transient))
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    /// Recompute and persist a transient's status.
    pub fn recompute_status(&mut self, name: &str) -> Result<StatusLabel, FrbError> {
        let id = self.transient_id(name)?;
        self.store_mut().recompute_status(id)
    }

    /// Evaluate a transient's per-tag criteria without touching its status.
    pub fn evaluate_criteria(&self, name: &str) -> Result<CriteriaVector, FrbError> {
        let id = self.transient_id(name)?;
        evaluate_criteria(self.store(), id)
    }

    /// Recompute every transient's status.
    pub fn recompute_all(&mut self) -> Result<Vec<(TransientId, StatusLabel)>, FrbError> {
        MutationEngine::recompute_all(self.store_mut())
    }

    /// Count transients per status.
    pub fn status_summary(&self) -> Result<BTreeMap<StatusLabel, usize>, FrbError> {
        MutationEngine::status_summary(self.store())
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Attach comma-separated tags.
    pub fn add_tags(&mut self, name: &str, tags: &str) -> Result<StatusLabel, FrbError> {
        let id = self.transient_id(name)?;
        MutationEngine::add_tags(self.store_mut(), id, tags)
    }

    /// Detach one tag.
    pub fn remove_tag(&mut self, name: &str, tag: &str) -> Result<StatusLabel, FrbError> {
        let id = self.transient_id(name)?;
        MutationEngine::remove_tag(self.store_mut(), id, tag)
    }

    /// Replace PATH results; candidates are given by galaxy name.
    pub fn set_path_results(
        &mut self,
        name: &str,
        candidates: &[(String, f64)],
        p_ux: Option<f64>,
    ) -> Result<StatusLabel, FrbError> {
        let id = self.transient_id(name)?;
        let mut path = Vec::with_capacity(candidates.len());
        for (galaxy, p_ox) in candidates {
            path.push(PathCandidate {
                galaxy: self.galaxy_id(galaxy)?,
                p_ox: *p_ox,
            });
        }
        MutationEngine::set_path_results(self.store_mut(), id, path, p_ux)
    }

    /// Assign the host galaxy by name, or clear it with `None`.
    pub fn assign_host(&mut self, name: &str, galaxy: Option<&str>) -> Result<StatusLabel, FrbError> {
        let id = self.transient_id(name)?;
        let host = galaxy.map(|g| self.galaxy_id(g)).transpose()?;
        MutationEngine::assign_host(self.store_mut(), id, host)
    }

    // =========================================================================
    // OBSERVING INGEST
    // =========================================================================

    /// Ingest an observing plan for one resource.
    pub fn ingest_obsplan(
        &mut self,
        rows: &[ObsPlanRow],
        resource: &str,
        override_checks: bool,
    ) -> IngestOutcome {
        ObservingIngest::ingest_obsplan(self.store_mut(), rows, resource, override_checks)
    }

    /// Ingest an observing log.
    pub fn ingest_obslog(
        &mut self,
        rows: &[ObsLogRow],
        now: DateTime<Utc>,
        override_checks: bool,
    ) -> IngestOutcome {
        ObservingIngest::ingest_obslog(self.store_mut(), rows, now, override_checks)
    }

    /// Ingest a redshift table.
    pub fn ingest_redshifts(&mut self, rows: &[RedshiftRow]) -> IngestOutcome {
        ObservingIngest::ingest_redshifts(self.store_mut(), rows)
    }
}

// =============================================================================
// TESTS
// =============================================================================
