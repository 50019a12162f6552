//! # Property-Based Tests
//!
//! Totality, determinism, idempotence, precedence and gate properties of the
//! status state machine over synthesized transients.

use chrono::DateTime;
use frb_core::{
    Catalog, CatalogStore, FollowUpObservation, FollowUpRequest, FollowUpResource, Galaxy,
    ObservingMode, PathCandidate, Photometry, SampleCriteria, SnapshotSource, StatusLabel,
    StatusResolver, Transient, TransientId, TransientSnapshot, evaluate_criteria,
};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

const FILTERS: [(&str, &str); 4] = [
    ("Blanco-DECam", "DECam_r"),
    ("Pan-STARRS-GPC1", "r"),
    ("Keck-LRIS", "R"),
    ("VLT-FORS2", "I_BESS"),
];

const SOURCES: [&str; 3] = ["FFFF-PZ", "Keck-LRIS-2024A", "SDSS-DR17"];

// =============================================================================
// STRATEGIES
// =============================================================================

#[derive(Debug, Clone)]
struct CandidateSpec {
    p_ox: f64,
    photometry: Option<(usize, f64)>,
    redshift: Option<(f64, usize)>,
}

#[derive(Debug, Clone)]
struct Scenario {
    samples: Vec<SampleCriteria>,
    bright_star: Option<bool>,
    mw_ebv: f64,
    candidates: Vec<CandidateSpec>,
    host: bool,
    p_ux: Option<f64>,
    /// (mode code, is observation, success)
    follow_up: Vec<(u8, bool, bool)>,
}

prop_compose! {
    fn arb_sample()(
        min_pox in 0.0f64..1.0,
        max_ebv in 0.0f64..1.0,
        max_mr in 20.0f64..26.0,
        max_pux in option::of(0.0f64..1.0),
        flags in any::<[bool; 4]>(),
    ) -> SampleCriteria {
        let mut sample = SampleCriteria::new("", min_pox, max_ebv, max_mr);
        sample.max_pux = max_pux;
        sample.use_top_two = flags[0];
        sample.run_public_path = flags[1];
        sample.apply_bright_star = flags[2];
        sample.skip_need_image = flags[3];
        sample
    }
}

prop_compose! {
    fn arb_candidate()(
        p_ox in 0.0f64..1.0,
        photometry in option::of((0usize..FILTERS.len(), 18.0f64..26.0)),
        redshift in option::of((0.0f64..1.5, 0usize..SOURCES.len())),
    ) -> CandidateSpec {
        CandidateSpec { p_ox, photometry, redshift }
    }
}

prop_compose! {
    fn arb_scenario()(
        samples in vec(arb_sample(), 0..4),
        bright_star in option::of(any::<bool>()),
        mw_ebv in 0.0f64..1.0,
        candidates in vec(arb_candidate(), 0..4),
        host in any::<bool>(),
        p_ux in option::of(0.0f64..1.0),
        follow_up in vec((0u8..3, any::<bool>(), any::<bool>()), 0..4),
    ) -> Scenario {
        Scenario { samples, bright_star, mw_ebv, candidates, host, p_ux, follow_up }
    }
}

fn build(scenario: &Scenario) -> (Catalog, TransientId) {
    let mut catalog = Catalog::new();
    let mut transient = Transient::new("FRB20250101A", "CHIME/FRB", 45.0, 30.0);
    transient.bright_star = scenario.bright_star;
    transient.mw_ebv = scenario.mw_ebv;
    transient.p_ux = scenario.p_ux;

    for (i, sample) in scenario.samples.iter().enumerate() {
        let mut sample = sample.clone();
        sample.name = format!("Sample{}", i);
        transient.tags.insert(sample.name.clone());
        catalog.insert_sample_criteria(sample).expect("seed");
    }

    for (i, spec) in scenario.candidates.iter().enumerate() {
        let mut galaxy = Galaxy::new(format!("J{:06}", i), 45.0, 30.0);
        if let Some((filter, mag)) = spec.photometry {
            let (instrument, band) = FILTERS[filter];
            galaxy = galaxy.with_photometry(Photometry::new(instrument, band, mag));
        }
        if let Some((z, source)) = spec.redshift {
            galaxy = galaxy.with_redshift(z, SOURCES[source]);
        }
        let id = catalog.insert_galaxy(galaxy).expect("galaxy");
        transient.path.push(PathCandidate {
            galaxy: id,
            p_ox: spec.p_ox,
        });
    }
    if scenario.host {
        transient.host = match transient.path.first() {
            Some(c) => Some(c.galaxy),
            None => Some(
                catalog
                    .insert_galaxy(Galaxy::new("Jhost", 45.0, 30.0))
                    .expect("galaxy"),
            ),
        };
    }

    let id = catalog.insert_transient(transient).expect("transient");
    let resource = catalog
        .insert_resource(FollowUpResource {
            name: "Gemini-GMOS-S".into(),
            instrument: "Gemini-GMOS-S".into(),
            valid_start: DateTime::from_timestamp(1_700_000_000, 0).expect("ts"),
            valid_stop: DateTime::from_timestamp(1_700_100_000, 0).expect("ts"),
            num_targ_img: 1,
            num_targ_mask: 1,
            num_targ_longslit: 1,
            max_airmass: 2.0,
            surveys: "all".into(),
        })
        .expect("resource");

    for (i, &(mode, is_observation, success)) in scenario.follow_up.iter().enumerate() {
        let mode = ObservingMode::from_code(mode).expect("mode");
        if is_observation {
            catalog
                .upsert_observation(FollowUpObservation {
                    transient: id,
                    resource,
                    mode,
                    date: DateTime::from_timestamp(1_700_000_000 + i as i64, 0).expect("ts"),
                    success,
                    texp: 600.0,
                    conditions: "clear".into(),
                })
                .expect("observation");
        } else {
            catalog
                .add_request(FollowUpRequest {
                    transient: id,
                    resource,
                    mode,
                })
                .expect("request");
        }
    }

    (catalog, id)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Resolution always yields a label and the same label for the same input.
    #[test]
    fn resolution_is_total_and_deterministic(scenario in arb_scenario()) {
        let (catalog, id) = build(&scenario);
        let snapshot = TransientSnapshot::load(&catalog, id).expect("snapshot");

        let first = StatusResolver::resolve(&snapshot);
        let second = StatusResolver::resolve(&snapshot);

        prop_assert_eq!(first, second);
        prop_assert!(StatusLabel::ALL.contains(&first));
        prop_assert_eq!(StatusLabel::from_code(first.code()), Some(first));
    }

    /// Recomputing twice with no data change yields the same stored label.
    #[test]
    fn recompute_is_idempotent(scenario in arb_scenario()) {
        let (mut catalog, id) = build(&scenario);

        let first = catalog.recompute_status(id).expect("first");
        let second = catalog.recompute_status(id).expect("second");

        prop_assert_eq!(first, second);
        prop_assert_eq!(catalog.transient(id).expect("get").expect("present").status, second);
    }

    /// One criteria slot per tag, and missing hosts zero every PATH flag.
    #[test]
    fn criteria_shape(scenario in arb_scenario()) {
        let (catalog, id) = build(&scenario);
        let criteria = evaluate_criteria(&catalog, id).expect("criteria");

        prop_assert_eq!(criteria.len(), scenario.samples.len());
        if !scenario.host {
            for tag in &criteria.tags {
                prop_assert!(!tag.pox && !tag.pox_primary && !tag.pux);
                prop_assert!(!tag.ran_deep_path && !tag.too_faint);
                prop_assert_eq!(tag.n_pox, 0);
            }
        }
    }

    /// A bright-star veto on every tag dominates every later rule.
    #[test]
    fn bright_star_dominates(mut scenario in arb_scenario()) {
        prop_assume!(!scenario.samples.is_empty());
        scenario.bright_star = Some(true);
        for sample in &mut scenario.samples {
            sample.apply_bright_star = true;
        }
        let (catalog, id) = build(&scenario);
        let snapshot = TransientSnapshot::load(&catalog, id).expect("snapshot");

        prop_assert_eq!(StatusResolver::resolve(&snapshot), StatusLabel::BrightStar);
    }

    /// With no tag through the gate, the status is one of the pre-gate labels.
    #[test]
    fn closed_gate_never_reaches_path_states(mut scenario in arb_scenario()) {
        for sample in &mut scenario.samples {
            sample.run_public_path = false;
        }
        let (catalog, id) = build(&scenario);
        let snapshot = TransientSnapshot::load(&catalog, id).expect("snapshot");
        let status = StatusResolver::resolve(&snapshot);

        prop_assert!(matches!(
            status,
            StatusLabel::Unassigned | StatusLabel::BrightStar | StatusLabel::TooDusty
        ));
    }

    /// Gate closed and neither exclusion unanimous: always Unassigned.
    #[test]
    fn closed_gate_is_unassigned(mut scenario in arb_scenario()) {
        prop_assume!(!scenario.samples.is_empty());
        scenario.bright_star = Some(false);
        scenario.mw_ebv = 0.0;
        for sample in &mut scenario.samples {
            sample.run_public_path = false;
            sample.max_ebv = sample.max_ebv.max(0.01);
        }
        let (catalog, id) = build(&scenario);
        let snapshot = TransientSnapshot::load(&catalog, id).expect("snapshot");

        prop_assert_eq!(StatusResolver::resolve(&snapshot), StatusLabel::Unassigned);
    }

    /// Without a host only the pre-PATH labels are reachable.
    #[test]
    fn no_host_stops_before_path(mut scenario in arb_scenario()) {
        scenario.host = false;
        let (catalog, id) = build(&scenario);
        let snapshot = TransientSnapshot::load(&catalog, id).expect("snapshot");

        prop_assert!(matches!(
            StatusResolver::resolve(&snapshot),
            StatusLabel::Unassigned
                | StatusLabel::BrightStar
                | StatusLabel::TooDusty
                | StatusLabel::RunPublicPath
        ));
    }

    /// The in-memory store round-trips through the snapshot format unchanged.
    #[test]
    fn snapshot_format_preserves_catalog(scenario in arb_scenario()) {
        let (mut catalog, id) = build(&scenario);
        catalog.recompute_status(id).expect("recompute");

        let bytes = frb_core::catalog_to_bytes(&catalog).expect("serialize");
        let restored = frb_core::catalog_from_bytes(&bytes).expect("deserialize");

        prop_assert_eq!(restored, catalog);
    }
}
