//! # Mutation Engine
//!
//! Consolidates the catalog mutations that feed the status state machine.
//!
//! Every operation here changes one of the inputs of a transient's status
//! (tags, host, PATH values, requests, observations) and recomputes that
//! status before returning it. Callers never see a stale label.

use crate::catalog::CatalogStore;
use crate::registry::SampleRegistry;
use crate::{
    FollowUpObservation, FollowUpRequest, FrbError, GalaxyId, PathCandidate, StatusLabel,
    TransientId,
};
use std::collections::BTreeMap;

/// The MutationEngine applies status-relevant changes to a store.
pub struct MutationEngine;

impl MutationEngine {
    /// Resolve a transient by TNS name.
    pub fn transient_by_name<S: CatalogStore + ?Sized>(
        store: &S,
        name: &str,
    ) -> Result<TransientId, FrbError> {
        store
            .transient_id(name)?
            .ok_or_else(|| FrbError::not_found("Transient", name))
    }

    /// Attach tags given as a comma-separated list.
    ///
    /// Blank entries are ignored. Every tag must have seeded criteria; on an
    /// unknown tag nothing is attached.
    pub fn add_tags<S: CatalogStore + ?Sized>(
        store: &mut S,
        id: TransientId,
        tags: &str,
    ) -> Result<StatusLabel, FrbError> {
        let mut transient = Self::load(store, id)?;

        let names: Vec<&str> = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        for name in &names {
            SampleRegistry::lookup(store, name)?;
        }

        transient
            .tags
            .extend(names.into_iter().map(str::to_string));
        store.update_transient(id, transient)?;
        store.recompute_status(id)
    }

    /// Detach one tag.
    pub fn remove_tag<S: CatalogStore + ?Sized>(
        store: &mut S,
        id: TransientId,
        tag: &str,
    ) -> Result<StatusLabel, FrbError> {
        SampleRegistry::lookup(store, tag)?;
        let mut transient = Self::load(store, id)?;
        if transient.tags.remove(tag) {
            store.update_transient(id, transient)?;
        }
        store.recompute_status(id)
    }

    /// Assign (or clear) the host galaxy.
    pub fn assign_host<S: CatalogStore + ?Sized>(
        store: &mut S,
        id: TransientId,
        host: Option<GalaxyId>,
    ) -> Result<StatusLabel, FrbError> {
        let mut transient = Self::load(store, id)?;
        if let Some(galaxy) = host {
            Self::require_galaxy(store, galaxy)?;
        }
        transient.host = host;
        store.update_transient(id, transient)?;
        store.recompute_status(id)
    }

    /// Replace the PATH results of a transient.
    ///
    /// Clears the cached top-two aggregates so they are derived from the new
    /// candidates.
    pub fn set_path_results<S: CatalogStore + ?Sized>(
        store: &mut S,
        id: TransientId,
        candidates: Vec<PathCandidate>,
        p_ux: Option<f64>,
    ) -> Result<StatusLabel, FrbError> {
        let mut transient = Self::load(store, id)?;

        for candidate in &candidates {
            Self::check_probability("P(O|x)", candidate.p_ox)?;
            Self::require_galaxy(store, candidate.galaxy)?;
        }
        if let Some(p) = p_ux {
            Self::check_probability("P(U|x)", p)?;
        }

        transient.path = candidates;
        transient.p_ux = p_ux;
        transient.sum_top_two_path = None;
        transient.mag_top_two_path = None;
        store.update_transient(id, transient)?;
        store.recompute_status(id)
    }

    /// Open a follow-up request. Returns the refreshed status.
    pub fn request_follow_up<S: CatalogStore + ?Sized>(
        store: &mut S,
        request: FollowUpRequest,
    ) -> Result<StatusLabel, FrbError> {
        Self::require_resource(store, request)?;
        store.add_request(request)?;
        store.recompute_status(request.transient)
    }

    /// Close a follow-up request. Returns the refreshed status.
    pub fn cancel_request<S: CatalogStore + ?Sized>(
        store: &mut S,
        request: FollowUpRequest,
    ) -> Result<StatusLabel, FrbError> {
        store.remove_request(request)?;
        store.recompute_status(request.transient)
    }

    /// Record an observation, replacing any record with the same key.
    pub fn record_observation<S: CatalogStore + ?Sized>(
        store: &mut S,
        observation: FollowUpObservation,
    ) -> Result<StatusLabel, FrbError> {
        let transient = observation.transient;
        Self::require_resource(
            store,
            FollowUpRequest {
                transient,
                resource: observation.resource,
                mode: observation.mode,
            },
        )?;
        store.upsert_observation(observation)?;
        store.recompute_status(transient)
    }

    /// Recompute every transient's status, in id order.
    pub fn recompute_all<S: CatalogStore + ?Sized>(
        store: &mut S,
    ) -> Result<Vec<(TransientId, StatusLabel)>, FrbError> {
        let ids = store.transient_ids()?;
        let mut labels = Vec::with_capacity(ids.len());
        for id in ids {
            labels.push((id, store.recompute_status(id)?));
        }
        Ok(labels)
    }

    /// Count transients per stored status. Labels with no transient are omitted.
    pub fn status_summary<S: CatalogStore + ?Sized>(
        store: &S,
    ) -> Result<BTreeMap<StatusLabel, usize>, FrbError> {
        let mut counts = BTreeMap::new();
        for id in store.transient_ids()? {
            if let Some(transient) = store.transient(id)? {
                *counts.entry(transient.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn load<S: CatalogStore + ?Sized>(
        store: &S,
        id: TransientId,
    ) -> Result<crate::Transient, FrbError> {
        store
            .transient(id)?
            .ok_or_else(|| FrbError::not_found("Transient", id))
    }

    fn require_galaxy<S: CatalogStore + ?Sized>(store: &S, id: GalaxyId) -> Result<(), FrbError> {
        match store.galaxy(id)? {
            Some(_) => Ok(()),
            None => Err(FrbError::not_found("Galaxy", id)),
        }
    }

    fn require_resource<S: CatalogStore + ?Sized>(
        store: &S,
        request: FollowUpRequest,
    ) -> Result<(), FrbError> {
        if store.transient(request.transient)?.is_none() {
            return Err(FrbError::not_found("Transient", request.transient));
        }
        if store.resource(request.resource)?.is_none() {
            return Err(FrbError::not_found("Resource", request.resource));
        }
        Ok(())
    }

    fn check_probability(what: &str, p: f64) -> Result<(), FrbError> {
        if (0.0..=1.0).contains(&p) {
            Ok(())
        } else {
            Err(FrbError::InvalidInput(format!(
                "{} {} outside [0, 1]",
                what, p
            )))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::snapshot::SnapshotSource;
    use crate::{FollowUpResource, Galaxy, ObservingMode, Photometry, SampleCriteria, Transient};
    use chrono::DateTime;

    fn seeded() -> (Catalog, TransientId) {
        let mut catalog = Catalog::new();
        let mut criteria = SampleCriteria::new("CHIME-Unbiased", 0.8, 0.3, 23.5);
        criteria.run_public_path = true;
        catalog.insert_sample_criteria(criteria).expect("seed");
        catalog
            .insert_sample_criteria(SampleCriteria::new("Private", 0.8, 0.3, 23.5))
            .expect("seed");
        let id = catalog
            .insert_transient(Transient::new("FRB20240101A", "CHIME/FRB", 10.0, 20.0))
            .expect("insert");
        (catalog, id)
    }

    fn resource(catalog: &mut Catalog) -> crate::ResourceId {
        catalog
            .insert_resource(FollowUpResource {
                name: "Keck-LRIS-2024A".into(),
                instrument: "Keck-LRIS".into(),
                valid_start: DateTime::from_timestamp(1_700_000_000, 0).expect("ts"),
                valid_stop: DateTime::from_timestamp(1_700_100_000, 0).expect("ts"),
                num_targ_img: 0,
                num_targ_mask: 0,
                num_targ_longslit: 4,
                max_airmass: 2.0,
                surveys: "all".into(),
            })
            .expect("insert")
    }

    #[test]
    fn add_tags_parses_list_and_recomputes() {
        let (mut catalog, id) = seeded();
        let status =
            MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased, Private,").expect("tag");

        assert_eq!(status, StatusLabel::RunPublicPath);
        let transient = catalog.transient(id).expect("get").expect("present");
        assert_eq!(transient.tags.len(), 2);
        assert_eq!(transient.status, StatusLabel::RunPublicPath);
    }

    #[test]
    fn unknown_tag_attaches_nothing() {
        let (mut catalog, id) = seeded();
        let result = MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased,Nope");

        assert!(matches!(result, Err(FrbError::ConfigurationMissing(t)) if t == "Nope"));
        let transient = catalog.transient(id).expect("get").expect("present");
        assert!(transient.tags.is_empty());
    }

    #[test]
    fn remove_tag_reverts_to_unassigned() {
        let (mut catalog, id) = seeded();
        MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased").expect("tag");
        let status = MutationEngine::remove_tag(&mut catalog, id, "CHIME-Unbiased").expect("untag");
        assert_eq!(status, StatusLabel::Unassigned);
    }

    #[test]
    fn path_then_host_moves_to_need_spectrum() {
        let (mut catalog, id) = seeded();
        MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased").expect("tag");
        let g = catalog
            .insert_galaxy(
                Galaxy::new("J004000+200000", 10.0, 20.0).with_photometry(Photometry::new(
                    "Pan-STARRS-GPC1",
                    "r",
                    20.5,
                )),
            )
            .expect("insert");

        let status = MutationEngine::set_path_results(
            &mut catalog,
            id,
            vec![PathCandidate { galaxy: g, p_ox: 0.95 }],
            Some(0.01),
        )
        .expect("path");
        assert_eq!(status, StatusLabel::RunPublicPath);

        let status = MutationEngine::assign_host(&mut catalog, id, Some(g)).expect("host");
        assert_eq!(status, StatusLabel::NeedSpectrum);
    }

    #[test]
    fn path_rejects_bad_probability_and_missing_galaxy() {
        let (mut catalog, id) = seeded();
        let bad = MutationEngine::set_path_results(
            &mut catalog,
            id,
            vec![PathCandidate {
                galaxy: GalaxyId(99),
                p_ox: 0.5,
            }],
            None,
        );
        assert!(matches!(bad, Err(FrbError::NotFound { kind: "Galaxy", .. })));

        let bad = MutationEngine::set_path_results(&mut catalog, id, Vec::new(), Some(1.2));
        assert!(matches!(bad, Err(FrbError::InvalidInput(_))));
    }

    #[test]
    fn request_and_cancel_recompute() {
        let (mut catalog, id) = seeded();
        MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased").expect("tag");
        let g = catalog
            .insert_galaxy(Galaxy::new("J1", 10.0, 20.0))
            .expect("insert");
        MutationEngine::set_path_results(
            &mut catalog,
            id,
            vec![PathCandidate { galaxy: g, p_ox: 0.9 }],
            None,
        )
        .expect("path");
        MutationEngine::assign_host(&mut catalog, id, Some(g)).expect("host");
        let r = resource(&mut catalog);
        let request = FollowUpRequest {
            transient: id,
            resource: r,
            mode: ObservingMode::Longslit,
        };

        assert_eq!(
            MutationEngine::request_follow_up(&mut catalog, request).expect("request"),
            StatusLabel::SpectrumPending
        );
        assert_eq!(
            MutationEngine::cancel_request(&mut catalog, request).expect("cancel"),
            StatusLabel::NeedSpectrum
        );
    }

    #[test]
    fn summary_counts_labels() {
        let (mut catalog, id) = seeded();
        catalog
            .insert_transient(Transient::new("FRB20240202B", "CRAFT", 0.0, 0.0))
            .expect("insert");
        MutationEngine::add_tags(&mut catalog, id, "CHIME-Unbiased").expect("tag");

        let labels = MutationEngine::recompute_all(&mut catalog).expect("recompute");
        assert_eq!(labels.len(), 2);

        let summary = MutationEngine::status_summary(&catalog).expect("summary");
        assert_eq!(summary.get(&StatusLabel::RunPublicPath), Some(&1));
        assert_eq!(summary.get(&StatusLabel::Unassigned), Some(&1));
        assert_eq!(summary.values().sum::<usize>(), 2);
    }
}
