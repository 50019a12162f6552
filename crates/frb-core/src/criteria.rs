//! # Criteria Evaluator
//!
//! Combines a transient's sample criteria with its measurements into one row
//! of decision flags per attached tag.
//!
//! Flags are evaluated per tag, independently. The status state machine then
//! reduces them across tags with `any`/`all`, usually over the "good" subset of
//! tags that survive the bright-star, dust and public-PATH gate.
//!
//! Missing measurements (no host, no photometry, no redshift) make the
//! dependent flags `false`; evaluation itself never fails.

use crate::primitives::{GOOD_REDSHIFT_SOURCES, PUBLIC_SURVEY_INSTRUMENTS, REDSHIFT_CONSISTENCY_TOLERANCE};
use crate::snapshot::{Candidate, SnapshotSource, TransientSnapshot};
use crate::{FrbError, SampleCriteria, TransientId};
use serde::{Deserialize, Serialize};

// =============================================================================
// TAG CRITERIA
// =============================================================================

/// Decision flags for one tag of one transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCriteria {
    /// Tag (sample) name.
    pub sample: String,
    /// The sample enforces the bright-star veto and a bright star is present.
    pub bright_star: bool,
    /// E(B-V) is below the sample's maximum.
    pub ebv: bool,
    /// The sample runs public-data PATH.
    pub run_public_path: bool,
    /// The primary candidate alone passes `min_POx`.
    pub pox_primary: bool,
    /// The P(O|x) criterion (primary or top two, per sample) passes.
    pub pox: bool,
    /// P(U|x) exceeds the sample's maximum.
    pub pux: bool,
    /// The primary's photometry is not from a public survey.
    pub ran_deep_path: bool,
    /// The primary has a redshift from a trusted source.
    pub z_primary: bool,
    /// Every relevant candidate has a trusted redshift.
    pub z_done: bool,
    /// The relevant redshifts agree.
    pub z_consistent: bool,
    /// The top-two magnitude is fainter than the sample's `max_mr`.
    pub too_faint: bool,
    /// The sample never asks for deeper imaging.
    pub skip_need_image: bool,
    /// Number of candidates the P(O|x) criterion considers (0 without a host).
    pub n_pox: u8,
}

impl TagCriteria {
    /// The tag passes the gate into PATH-driven follow-up.
    #[must_use]
    pub fn passes_gate(&self) -> bool {
        !self.bright_star && self.ebv && self.run_public_path
    }

    /// Evaluate one sample against a snapshot.
    #[must_use]
    pub fn evaluate(sample: &SampleCriteria, snapshot: &TransientSnapshot) -> Self {
        let transient = &snapshot.transient;

        let mut row = Self {
            sample: sample.name.clone(),
            bright_star: sample.apply_bright_star && transient.bright_star == Some(true),
            ebv: transient.mw_ebv < sample.max_ebv,
            run_public_path: sample.run_public_path,
            pox_primary: false,
            pox: false,
            pux: false,
            ran_deep_path: false,
            z_primary: false,
            z_done: false,
            z_consistent: false,
            too_faint: false,
            skip_need_image: sample.skip_need_image,
            n_pox: 0,
        };

        if !snapshot.has_host() {
            return row;
        }
        let Some(primary) = snapshot.primary() else {
            return row;
        };

        // P(O|x)
        row.pox_primary = primary.p_ox > sample.min_pox;
        if sample.use_top_two {
            row.n_pox = 2;
            row.pox = snapshot
                .sum_top_two_pox()
                .is_some_and(|sum| sum > sample.min_pox);
        } else {
            row.n_pox = 1;
            row.pox = row.pox_primary;
        }

        // P(U|x)
        row.pux = match (sample.max_pux, transient.p_ux) {
            (Some(max_pux), Some(p_ux)) => p_ux > max_pux,
            _ => false,
        };

        row.ran_deep_path = primary
            .galaxy
            .best_photometry()
            .is_some_and(|p| !is_public_filter(&p.filter()));

        // Redshifts
        row.z_primary = has_trusted_redshift(primary);
        let relevant: &[Candidate] = if row.pox_primary {
            &snapshot.candidates[..1]
        } else {
            snapshot.top_two()
        };
        row.z_done = relevant.iter().all(has_trusted_redshift);
        row.z_consistent = if row.pox_primary {
            true
        } else {
            row.z_done && redshifts_consistent(relevant)
        };

        row.too_faint = snapshot
            .mag_top_two()
            .is_some_and(|mag| mag > sample.max_mr);

        row
    }
}

/// True when the filter label names a public-survey instrument.
pub(crate) fn is_public_filter(filter: &str) -> bool {
    PUBLIC_SURVEY_INSTRUMENTS
        .iter()
        .any(|instrument| filter.contains(instrument))
}

fn has_trusted_redshift(candidate: &Candidate) -> bool {
    candidate.galaxy.redshift.as_ref().is_some_and(|z| {
        GOOD_REDSHIFT_SOURCES
            .iter()
            .any(|source| z.source.contains(source))
    })
}

/// Vacuously true for a single candidate.
fn redshifts_consistent(candidates: &[Candidate]) -> bool {
    match candidates {
        [first, second] => match (&first.galaxy.redshift, &second.galaxy.redshift) {
            (Some(z1), Some(z2)) => (z1.value - z2.value).abs() <= REDSHIFT_CONSISTENCY_TOLERANCE,
            _ => false,
        },
        _ => true,
    }
}

// =============================================================================
// CRITERIA VECTOR
// =============================================================================

/// Per-tag criteria for one transient, in tag order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriteriaVector {
    pub tags: Vec<TagCriteria>,
}

impl CriteriaVector {
    /// Evaluate every sample in the snapshot.
    #[must_use]
    pub fn evaluate(snapshot: &TransientSnapshot) -> Self {
        Self {
            tags: snapshot
                .samples
                .iter()
                .map(|sample| TagCriteria::evaluate(sample, snapshot))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// `all` over every tag.
    pub fn all(&self, predicate: impl Fn(&TagCriteria) -> bool) -> bool {
        self.tags.iter().all(predicate)
    }

    /// `any` over every tag.
    pub fn any(&self, predicate: impl Fn(&TagCriteria) -> bool) -> bool {
        self.tags.iter().any(predicate)
    }

    /// Tags that pass the gate.
    pub fn good(&self) -> impl Iterator<Item = &TagCriteria> {
        self.tags.iter().filter(|t| t.passes_gate())
    }

    /// `all` over the good tags.
    pub fn all_good(&self, predicate: impl Fn(&TagCriteria) -> bool) -> bool {
        self.good().all(predicate)
    }

    /// `any` over the good tags.
    pub fn any_good(&self, predicate: impl Fn(&TagCriteria) -> bool) -> bool {
        self.good().any(predicate)
    }

    /// One flag across all tags, as an array.
    pub fn column(&self, flag: impl Fn(&TagCriteria) -> bool) -> Vec<bool> {
        self.tags.iter().map(flag).collect()
    }
}

/// Evaluate the criteria vector of a stored transient.
///
/// Read-only: used by the state machine and for diagnostics.
pub fn evaluate_criteria<S: SnapshotSource + ?Sized>(
    source: &S,
    id: TransientId,
) -> Result<CriteriaVector, FrbError> {
    let snapshot = TransientSnapshot::load(source, id)?;
    Ok(CriteriaVector::evaluate(&snapshot))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FollowUpFacts;
    use crate::{Galaxy, GalaxyId, Photometry, Transient};

    fn sample(use_top_two: bool) -> SampleCriteria {
        SampleCriteria {
            use_top_two,
            run_public_path: true,
            apply_bright_star: true,
            max_pux: Some(0.2),
            ..SampleCriteria::new("CHIME-Repeaters", 0.8, 0.3, 23.5)
        }
    }

    fn galaxy(name: &str, z: Option<(f64, &str)>) -> Galaxy {
        let mut galaxy = Galaxy::new(name, 10.0, -5.0)
            .with_photometry(Photometry::new("Blanco-DECam", "DECam_r", 21.0));
        if let Some((value, source)) = z {
            galaxy = galaxy.with_redshift(value, source);
        }
        galaxy
    }

    fn snapshot(candidates: Vec<(u64, f64, Galaxy)>) -> TransientSnapshot {
        let mut transient = Transient::new("FRB20231120A", "CHIME/FRB", 10.0, -5.0);
        transient.mw_ebv = 0.05;
        transient.host = candidates.first().map(|(id, _, _)| GalaxyId(*id));
        let host = candidates.first().map(|(_, _, g)| g.clone());
        TransientSnapshot {
            id: TransientId(0),
            transient,
            samples: Vec::new(),
            candidates: candidates
                .into_iter()
                .map(|(id, p_ox, galaxy)| Candidate {
                    galaxy_id: GalaxyId(id),
                    galaxy,
                    p_ox,
                })
                .collect(),
            host,
            follow_up: FollowUpFacts::default(),
        }
    }

    #[test]
    fn no_host_leaves_path_flags_false() {
        let snap = snapshot(Vec::new());
        let row = TagCriteria::evaluate(&sample(true), &snap);

        assert!(row.ebv);
        assert!(row.run_public_path);
        assert!(!row.pox && !row.pox_primary && !row.pux && !row.ran_deep_path);
        assert!(!row.z_done && !row.z_consistent && !row.z_primary);
        assert_eq!(row.n_pox, 0);
    }

    #[test]
    fn bright_star_requires_sample_veto() {
        let mut snap = snapshot(Vec::new());
        snap.transient.bright_star = Some(true);

        assert!(TagCriteria::evaluate(&sample(false), &snap).bright_star);
        let lenient = SampleCriteria {
            apply_bright_star: false,
            ..sample(false)
        };
        assert!(!TagCriteria::evaluate(&lenient, &snap).bright_star);
    }

    #[test]
    fn top_two_sum_drives_pox() {
        let snap = snapshot(vec![
            (1, 0.5, galaxy("A", None)),
            (2, 0.4, galaxy("B", None)),
        ]);

        let top_two = TagCriteria::evaluate(&sample(true), &snap);
        assert!(!top_two.pox_primary);
        assert!(top_two.pox);
        assert_eq!(top_two.n_pox, 2);

        let primary_only = TagCriteria::evaluate(&sample(false), &snap);
        assert!(!primary_only.pox);
        assert_eq!(primary_only.n_pox, 1);
    }

    #[test]
    fn primary_redshift_is_enough_when_primary_passes() {
        let snap = snapshot(vec![
            (1, 0.9, galaxy("A", Some((0.21, "Keck-LRIS")))),
            (2, 0.05, galaxy("B", None)),
        ]);
        let row = TagCriteria::evaluate(&sample(true), &snap);

        assert!(row.pox_primary);
        assert!(row.z_primary);
        assert!(row.z_done);
        assert!(row.z_consistent);
    }

    #[test]
    fn untrusted_redshift_source_is_ignored() {
        let snap = snapshot(vec![(1, 0.9, galaxy("A", Some((0.21, "SDSS"))))]);
        let row = TagCriteria::evaluate(&sample(false), &snap);

        assert!(!row.z_primary);
        assert!(!row.z_done);
    }

    #[test]
    fn top_two_redshifts_must_agree() {
        let close = snapshot(vec![
            (1, 0.5, galaxy("A", Some((0.1000, "FFFF")))),
            (2, 0.4, galaxy("B", Some((0.1025, "Gemini-GMOS")))),
        ]);
        let row = TagCriteria::evaluate(&sample(true), &close);
        assert!(row.z_done && row.z_consistent);

        let far = snapshot(vec![
            (1, 0.5, galaxy("A", Some((0.1000, "FFFF")))),
            (2, 0.4, galaxy("B", Some((0.1050, "Gemini-GMOS")))),
        ]);
        let row = TagCriteria::evaluate(&sample(true), &far);
        assert!(row.z_done);
        assert!(!row.z_consistent);
    }

    #[test]
    fn public_photometry_means_no_deep_path() {
        let snap = snapshot(vec![(1, 0.9, galaxy("A", None))]);
        assert!(!TagCriteria::evaluate(&sample(false), &snap).ran_deep_path);

        let deep = Galaxy::new("A", 0.0, 0.0)
            .with_photometry(Photometry::new("Keck-LRIS", "R", 24.2));
        let snap = snapshot(vec![(1, 0.9, deep)]);
        assert!(TagCriteria::evaluate(&sample(false), &snap).ran_deep_path);
    }

    #[test]
    fn pux_needs_configured_maximum() {
        let mut snap = snapshot(vec![(1, 0.9, galaxy("A", None))]);
        snap.transient.p_ux = Some(0.35);

        assert!(TagCriteria::evaluate(&sample(false), &snap).pux);
        let no_max = SampleCriteria {
            max_pux: None,
            ..sample(false)
        };
        assert!(!TagCriteria::evaluate(&no_max, &snap).pux);
    }

    #[test]
    fn vector_reductions_use_good_subset() {
        let mut snap = snapshot(vec![(1, 0.9, galaxy("A", None))]);
        snap.samples = vec![
            sample(false),
            SampleCriteria {
                name: "Dusty".into(),
                max_ebv: 0.01,
                ..sample(false)
            },
        ];

        let vector = CriteriaVector::evaluate(&snap);
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.column(|t| t.ebv), vec![true, false]);
        assert_eq!(vector.good().count(), 1);
        assert!(vector.all_good(|t| t.pox));
        assert!(!vector.all(|t| t.ebv));
    }
}
