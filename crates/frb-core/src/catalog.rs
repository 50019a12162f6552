//! # Catalog
//!
//! The object store for transients, galaxies, sample criteria, resources,
//! follow-up requests and observations.
//!
//! This module defines the `CatalogStore` trait and the in-memory `Catalog`.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::primitives::MAX_NAME_LENGTH;
use crate::snapshot::{SnapshotSource, TransientSnapshot};
use crate::status::StatusResolver;
use crate::{
    FollowUpObservation, FollowUpRequest, FollowUpResource, FrbError, Galaxy, GalaxyId,
    ObservationKey, ResourceId, SampleCriteria, StatusLabel, Transient, TransientId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CATALOGSTORE TRAIT
// =============================================================================

/// The CatalogStore trait defines the object-store operations.
///
/// All fallible operations return `Result<T, FrbError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait CatalogStore: SnapshotSource {
    /// Insert a transient. Fails with `Duplicate` if the name is taken.
    fn insert_transient(&mut self, transient: Transient) -> Result<TransientId, FrbError>;

    /// Replace a stored transient. Fails with `NotFound` if absent.
    ///
    /// The name index is not updated; names are immutable.
    fn update_transient(&mut self, id: TransientId, transient: Transient)
    -> Result<(), FrbError>;

    /// Lookup a transient id by TNS name.
    fn transient_id(&self, name: &str) -> Result<Option<TransientId>, FrbError>;

    /// All transient ids in ascending order.
    fn transient_ids(&self) -> Result<Vec<TransientId>, FrbError>;

    /// Insert a galaxy. Fails with `Duplicate` if the name is taken.
    fn insert_galaxy(&mut self, galaxy: Galaxy) -> Result<GalaxyId, FrbError>;

    /// Replace a stored galaxy. Fails with `NotFound` if absent.
    fn update_galaxy(&mut self, id: GalaxyId, galaxy: Galaxy) -> Result<(), FrbError>;

    /// Lookup a galaxy id by name.
    fn galaxy_id(&self, name: &str) -> Result<Option<GalaxyId>, FrbError>;

    /// All galaxy ids in ascending order.
    fn galaxy_ids(&self) -> Result<Vec<GalaxyId>, FrbError>;

    /// Insert a follow-up resource. Fails with `Duplicate` if the name is taken.
    fn insert_resource(&mut self, resource: FollowUpResource) -> Result<ResourceId, FrbError>;

    /// Lookup a resource by id.
    fn resource(&self, id: ResourceId) -> Result<Option<FollowUpResource>, FrbError>;

    /// Lookup a resource id by name.
    fn resource_id(&self, name: &str) -> Result<Option<ResourceId>, FrbError>;

    /// All resource ids in ascending order.
    fn resource_ids(&self) -> Result<Vec<ResourceId>, FrbError>;

    /// Store sample criteria. Fails with `Duplicate` if the name is taken.
    fn insert_sample_criteria(&mut self, criteria: SampleCriteria) -> Result<(), FrbError>;

    /// All sample names in ascending order.
    fn sample_names(&self) -> Result<Vec<String>, FrbError>;

    /// Add a request. Returns `false` if it already existed.
    fn add_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError>;

    /// Remove a request. Returns `false` if it did not exist.
    fn remove_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError>;

    /// All pending requests for a resource.
    fn requests_for_resource(&self, id: ResourceId) -> Result<Vec<FollowUpRequest>, FrbError>;

    /// Insert or replace the observation with the same key.
    ///
    /// Returns `true` if an existing record was replaced.
    fn upsert_observation(&mut self, observation: FollowUpObservation) -> Result<bool, FrbError>;

    /// Overwrite only the status of a transient.
    fn set_status(&mut self, id: TransientId, status: StatusLabel) -> Result<(), FrbError>;

    /// Recompute and persist the status of a transient.
    ///
    /// Idempotent: with no intervening data change the label is the same.
    /// Backends override this to run the read-resolve-write cycle atomically.
    fn recompute_status(&mut self, id: TransientId) -> Result<StatusLabel, FrbError> {
        let snapshot = TransientSnapshot::load(self, id)?;
        let status = StatusResolver::resolve(&snapshot);
        self.set_status(id, status)?;
        Ok(status)
    }
}

/// Recompute and persist the status of transient `id`.
///
/// Call after any mutation to its tags, host, PATH values, follow-up requests
/// or observations.
pub fn recompute_status<S: CatalogStore + ?Sized>(
    store: &mut S,
    id: TransientId,
) -> Result<StatusLabel, FrbError> {
    store.recompute_status(id)
}

/// Validate a unique name before it enters the store.
pub(crate) fn validate_name(kind: &'static str, name: &str) -> Result<(), FrbError> {
    if name.trim().is_empty() {
        return Err(FrbError::InvalidInput(format!("{} name is empty", kind)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(FrbError::InvalidInput(format!(
            "{} name exceeds {} bytes",
            kind, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

/// Validate a transient's measured values before they reach the resolver.
pub(crate) fn validate_transient(transient: &Transient) -> Result<(), FrbError> {
    validate_name("Transient", &transient.name)?;
    if !(transient.ra.is_finite() && transient.dec.is_finite()) {
        return Err(FrbError::InvalidInput(format!(
            "transient {} has non-finite coordinates",
            transient.name
        )));
    }
    if !(transient.mw_ebv.is_finite() && transient.mw_ebv >= 0.0) {
        return Err(FrbError::InvalidInput(format!(
            "transient {} E(B-V) {} must be finite and non-negative",
            transient.name, transient.mw_ebv
        )));
    }
    if let Some(p_ux) = transient.p_ux.filter(|v| !(0.0..=1.0).contains(v)) {
        return Err(FrbError::InvalidInput(format!(
            "transient {} P(U|x) {} outside [0, 1]",
            transient.name, p_ux
        )));
    }
    Ok(())
}

/// Validate sample thresholds before they are seeded.
pub(crate) fn validate_sample_criteria(criteria: &SampleCriteria) -> Result<(), FrbError> {
    validate_name("Sample", &criteria.name)?;
    let thresholds = [criteria.min_pox, criteria.max_ebv, criteria.max_mr];
    if thresholds.iter().any(|v| !v.is_finite()) {
        return Err(FrbError::InvalidInput(format!(
            "sample {} has a non-finite threshold",
            criteria.name
        )));
    }
    if let Some(max_pux) = criteria.max_pux.filter(|v| !(0.0..=1.0).contains(v)) {
        return Err(FrbError::InvalidInput(format!(
            "sample {} max_pux {} outside [0, 1]",
            criteria.name, max_pux
        )));
    }
    Ok(())
}

// =============================================================================
// CATALOG IMPLEMENTATION
// =============================================================================

/// The in-memory catalog.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    transients: BTreeMap<TransientId, Transient>,
    transient_names: BTreeMap<String, TransientId>,
    galaxies: BTreeMap<GalaxyId, Galaxy>,
    galaxy_names: BTreeMap<String, GalaxyId>,
    resources: BTreeMap<ResourceId, FollowUpResource>,
    resource_names: BTreeMap<String, ResourceId>,
    samples: BTreeMap<String, SampleCriteria>,
    requests: BTreeSet<FollowUpRequest>,
    observations: BTreeMap<ObservationKey, FollowUpObservation>,
    next_transient_id: u64,
    next_galaxy_id: u64,
    next_resource_id: u64,
}

impl Catalog {
    /// Create a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every record from another store, preserving ids.
    pub fn copy_from<S: CatalogStore + ?Sized>(store: &S) -> Result<Self, FrbError> {
        let mut catalog = Self::new();

        for name in store.sample_names()? {
            if let Some(sample) = store.sample_criteria(&name)? {
                catalog.samples.insert(name, sample);
            }
        }
        for id in store.galaxy_ids()? {
            if let Some(galaxy) = store.galaxy(id)? {
                catalog.galaxy_names.insert(galaxy.name.clone(), id);
                catalog.galaxies.insert(id, galaxy);
                catalog.next_galaxy_id = catalog.next_galaxy_id.max(id.0.saturating_add(1));
            }
        }
        for id in store.resource_ids()? {
            if let Some(resource) = store.resource(id)? {
                catalog.resource_names.insert(resource.name.clone(), id);
                catalog.resources.insert(id, resource);
                catalog.next_resource_id = catalog.next_resource_id.max(id.0.saturating_add(1));
            }
        }
        for id in store.transient_ids()? {
            if let Some(transient) = store.transient(id)? {
                catalog.transient_names.insert(transient.name.clone(), id);
                catalog.transients.insert(id, transient);
                catalog.next_transient_id =
                    catalog.next_transient_id.max(id.0.saturating_add(1));
            }
            catalog.requests.extend(store.requests_for_transient(id)?);
            for observation in store.observations_for_transient(id)? {
                catalog.observations.insert(observation.key(), observation);
            }
        }

        Ok(catalog)
    }

    /// Write every record into an empty store, reproducing ids.
    ///
    /// Fails with `InvalidInput` if the target already holds records or
    /// assigns a different id than the one recorded here.
    pub fn restore_into<S: CatalogStore + ?Sized>(&self, store: &mut S) -> Result<(), FrbError> {
        let occupied = !store.transient_ids()?.is_empty()
            || !store.galaxy_ids()?.is_empty()
            || !store.resource_ids()?.is_empty()
            || !store.sample_names()?.is_empty();
        if occupied {
            return Err(FrbError::InvalidInput(
                "restore target is not empty".to_string(),
            ));
        }

        let mismatch = |kind: &str, want: u64, got: u64| {
            FrbError::InvalidInput(format!(
                "{} id {} restored as {}; ids must be contiguous from 0",
                kind, want, got
            ))
        };

        for sample in self.samples.values() {
            store.insert_sample_criteria(sample.clone())?;
        }
        for (id, galaxy) in &self.galaxies {
            let got = store.insert_galaxy(galaxy.clone())?;
            if got != *id {
                return Err(mismatch("Galaxy", id.0, got.0));
            }
        }
        for (id, resource) in &self.resources {
            let got = store.insert_resource(resource.clone())?;
            if got != *id {
                return Err(mismatch("Resource", id.0, got.0));
            }
        }
        for (id, transient) in &self.transients {
            let got = store.insert_transient(transient.clone())?;
            if got != *id {
                return Err(mismatch("Transient", id.0, got.0));
            }
        }
        for request in &self.requests {
            store.add_request(*request)?;
        }
        for observation in self.observations.values() {
            store.upsert_observation(observation.clone())?;
        }
        Ok(())
    }

    /// Iterate over all transients in id order.
    pub fn transients(&self) -> impl Iterator<Item = (TransientId, &Transient)> {
        self.transients.iter().map(|(id, t)| (*id, t))
    }

    /// Iterate over all pending requests in key order.
    pub fn requests(&self) -> impl Iterator<Item = &FollowUpRequest> {
        self.requests.iter()
    }

    /// Iterate over all observations in key order.
    pub fn observations(&self) -> impl Iterator<Item = &FollowUpObservation> {
        self.observations.values()
    }

    /// Check the catalog's internal references.
    ///
    /// Every host, PATH candidate, request and observation must point at a
    /// stored record, and every tag at seeded criteria. Transient
    /// measurements and sample thresholds must be in range.
    pub fn validate(&self) -> Result<(), FrbError> {
        for criteria in self.samples.values() {
            validate_sample_criteria(criteria)?;
        }
        for (_, transient) in self.transients() {
            validate_transient(transient)?;
            for galaxy in transient
                .host
                .iter()
                .chain(transient.path.iter().map(|c| &c.galaxy))
            {
                if !self.galaxies.contains_key(galaxy) {
                    return Err(FrbError::not_found("Galaxy", galaxy));
                }
            }
            for tag in &transient.tags {
                if !self.samples.contains_key(tag) {
                    return Err(FrbError::ConfigurationMissing(tag.clone()));
                }
            }
        }
        let links = self
            .requests()
            .map(|r| (r.transient, r.resource))
            .chain(self.observations.keys().map(|k| (k.transient, k.resource)));
        for (transient, resource) in links {
            if !self.transients.contains_key(&transient) {
                return Err(FrbError::not_found("Transient", transient));
            }
            if !self.resources.contains_key(&resource) {
                return Err(FrbError::not_found("Resource", resource));
            }
        }
        Ok(())
    }
}

impl SnapshotSource for Catalog {
    fn transient(&self, id: TransientId) -> Result<Option<Transient>, FrbError> {
        Ok(self.transients.get(&id).cloned())
    }

    fn galaxy(&self, id: GalaxyId) -> Result<Option<Galaxy>, FrbError> {
        Ok(self.galaxies.get(&id).cloned())
    }

    fn sample_criteria(&self, name: &str) -> Result<Option<SampleCriteria>, FrbError> {
        Ok(self.samples.get(name).cloned())
    }

    fn requests_for_transient(
        &self,
        id: TransientId,
    ) -> Result<Vec<FollowUpRequest>, FrbError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.transient == id)
            .copied()
            .collect())
    }

    fn observations_for_transient(
        &self,
        id: TransientId,
    ) -> Result<Vec<FollowUpObservation>, FrbError> {
        Ok(self
            .observations
            .values()
            .filter(|o| o.transient == id)
            .cloned()
            .collect())
    }
}

impl CatalogStore for Catalog {
    fn insert_transient(&mut self, transient: Transient) -> Result<TransientId, FrbError> {
        validate_transient(&transient)?;
        if self.transient_names.contains_key(&transient.name) {
            return Err(FrbError::Duplicate {
                kind: "Transient",
                name: transient.name,
            });
        }
        let id = TransientId(self.next_transient_id);
        self.next_transient_id = self.next_transient_id.saturating_add(1);
        self.transient_names.insert(transient.name.clone(), id);
        self.transients.insert(id, transient);
        Ok(id)
    }

    fn update_transient(
        &mut self,
        id: TransientId,
        transient: Transient,
    ) -> Result<(), FrbError> {
        validate_transient(&transient)?;
        match self.transients.get_mut(&id) {
            Some(slot) => {
                *slot = transient;
                Ok(())
            }
            None => Err(FrbError::not_found("Transient", id)),
        }
    }

    fn transient_id(&self, name: &str) -> Result<Option<TransientId>, FrbError> {
        Ok(self.transient_names.get(name).copied())
    }

    fn transient_ids(&self) -> Result<Vec<TransientId>, FrbError> {
        Ok(self.transients.keys().copied().collect())
    }

    fn insert_galaxy(&mut self, galaxy: Galaxy) -> Result<GalaxyId, FrbError> {
        validate_name("Galaxy", &galaxy.name)?;
        if self.galaxy_names.contains_key(&galaxy.name) {
            return Err(FrbError::Duplicate {
                kind: "Galaxy",
                name: galaxy.name,
            });
        }
        let id = GalaxyId(self.next_galaxy_id);
        self.next_galaxy_id = self.next_galaxy_id.saturating_add(1);
        self.galaxy_names.insert(galaxy.name.clone(), id);
        self.galaxies.insert(id, galaxy);
        Ok(id)
    }

    fn update_galaxy(&mut self, id: GalaxyId, galaxy: Galaxy) -> Result<(), FrbError> {
        match self.galaxies.get_mut(&id) {
            Some(slot) => {
                *slot = galaxy;
                Ok(())
            }
            None => Err(FrbError::not_found("Galaxy", id)),
        }
    }

    fn galaxy_id(&self, name: &str) -> Result<Option<GalaxyId>, FrbError> {
        Ok(self.galaxy_names.get(name).copied())
    }

    fn galaxy_ids(&self) -> Result<Vec<GalaxyId>, FrbError> {
        Ok(self.galaxies.keys().copied().collect())
    }

    fn insert_resource(&mut self, resource: FollowUpResource) -> Result<ResourceId, FrbError> {
        validate_name("Resource", &resource.name)?;
        if self.resource_names.contains_key(&resource.name) {
            return Err(FrbError::Duplicate {
                kind: "Resource",
                name: resource.name,
            });
        }
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id = self.next_resource_id.saturating_add(1);
        self.resource_names.insert(resource.name.clone(), id);
        self.resources.insert(id, resource);
        Ok(id)
    }

    fn resource(&self, id: ResourceId) -> Result<Option<FollowUpResource>, FrbError> {
        Ok(self.resources.get(&id).cloned())
    }

    fn resource_id(&self, name: &str) -> Result<Option<ResourceId>, FrbError> {
        Ok(self.resource_names.get(name).copied())
    }

    fn resource_ids(&self) -> Result<Vec<ResourceId>, FrbError> {
        Ok(self.resources.keys().copied().collect())
    }

    fn insert_sample_criteria(&mut self, criteria: SampleCriteria) -> Result<(), FrbError> {
        validate_sample_criteria(&criteria)?;
        if self.samples.contains_key(&criteria.name) {
            return Err(FrbError::Duplicate {
                kind: "Sample",
                name: criteria.name,
            });
        }
        self.samples.insert(criteria.name.clone(), criteria);
        Ok(())
    }

    fn sample_names(&self) -> Result<Vec<String>, FrbError> {
        Ok(self.samples.keys().cloned().collect())
    }

    fn add_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError> {
        Ok(self.requests.insert(request))
    }

    fn remove_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError> {
        Ok(self.requests.remove(&request))
    }

    fn requests_for_resource(&self, id: ResourceId) -> Result<Vec<FollowUpRequest>, FrbError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.resource == id)
            .copied()
            .collect())
    }

    fn upsert_observation(&mut self, observation: FollowUpObservation) -> Result<bool, FrbError> {
        Ok(self
            .observations
            .insert(observation.key(), observation)
            .is_some())
    }

    fn set_status(&mut self, id: TransientId, status: StatusLabel) -> Result<(), FrbError> {
        match self.transients.get_mut(&id) {
            Some(transient) => {
                transient.status = status;
                Ok(())
            }
            None => Err(FrbError::not_found("Transient", id)),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
