//! # Status State Machine
//!
//! Resolves a transient to exactly one [`StatusLabel`].
//!
//! Rules run in reverse order of completion: exclusion criteria (bright star,
//! dust, the public-PATH gate) short-circuit everything, then completed stages
//! are checked before the pending ones that lead to them. The first matching
//! rule wins; the predicates are not mutually exclusive, so the order below is
//! the contract.
//!
//! | # | Label | Fires when |
//! |---|-------|------------|
//! | 1 | `BrightStar` | every tag has the bright-star veto |
//! | 2 | `TooDusty` | every tag is dust-excluded and not bright-star-excluded |
//! | 3 | `Unassigned` | no tag passes the gate |
//! | 4 | `RunPublicPATH` | no host assigned yet |
//! | 5 | `ImagePending` | imaging requested |
//! | 6 | `NeedImage` | P(U|x) too high or primary beyond public depth, no imaging yet |
//! | 7 | `RunDeepPATH` | imaging obtained, PATH not rerun on it |
//! | 8 | `UnseenHost` | P(U|x) too high after deep PATH |
//! | 9 | `AmbiguousHost` | no good tag passes P(O|x) |
//! | 10 | `Redshift` / `AmbiguousHost` | trusted redshifts, consistent or not |
//! | 11 | `TooFaint` | every good tag finds the top two too faint |
//! | 12 | `GoodSpectrum` | spectroscopy obtained, even with a request still open |
//! | 13 | `SpectrumPending` | spectroscopy requested |
//! | 14 | `NeedSecondary` | primary redshift only (flagged at 10) |
//! | 15 | `NeedSpectrum` | P(O|x) passes |
//! | 16 | `Unassigned` | fallback |

use crate::criteria::{CriteriaVector, is_public_filter};
use crate::primitives::{DECAM_PUBLIC_DEPTH, PANSTARRS_PUBLIC_DEPTH};
use crate::snapshot::TransientSnapshot;
use crate::StatusLabel;

/// The status state machine.
///
/// Pure and total: given a snapshot it always returns a label.
pub struct StatusResolver;

impl StatusResolver {
    /// Resolve a snapshot to its status.
    #[must_use]
    pub fn resolve(snapshot: &TransientSnapshot) -> StatusLabel {
        let criteria = CriteriaVector::evaluate(snapshot);
        Self::resolve_with(snapshot, &criteria)
    }

    /// Resolve with a precomputed criteria vector.
    #[must_use]
    pub fn resolve_with(snapshot: &TransientSnapshot, criteria: &CriteriaVector) -> StatusLabel {
        // Without tags there is nothing to judge against.
        if criteria.is_empty() {
            return StatusLabel::Unassigned;
        }
        let follow_up = &snapshot.follow_up;

        // 1. Bright star
        if criteria.all(|t| t.bright_star) {
            return StatusLabel::BrightStar;
        }

        // 2. Too dusty
        if criteria.all(|t| !t.bright_star && !t.ebv) {
            return StatusLabel::TooDusty;
        }

        // 3. Gate; everything below requires PATH
        if !criteria.any(|t| t.passes_gate()) {
            return StatusLabel::Unassigned;
        }

        // 4. Public PATH
        if !snapshot.has_host() {
            return StatusLabel::RunPublicPath;
        }

        // 5. Pending image
        if follow_up.imaging_requested {
            return StatusLabel::ImagePending;
        }

        // 6. Need image. The skip flag is reduced over good tags only, so a
        // skipping tag whose gate is closed cannot suppress the depth trigger.
        let wants_image = criteria.any_good(|t| t.pux && !t.skip_need_image)
            || (beyond_public_depth(snapshot) && !criteria.all_good(|t| t.skip_need_image));
        if wants_image && !follow_up.imaging_requested && !follow_up.imaging_observed {
            return StatusLabel::NeedImage;
        }

        // 7. Run deep PATH
        if follow_up.imaging_observed && !criteria.any_good(|t| t.ran_deep_path) {
            return StatusLabel::RunDeepPath;
        }

        // 8. Unseen host
        if criteria.any_good(|t| t.pux && t.ran_deep_path) {
            return StatusLabel::UnseenHost;
        }

        // 9. Ambiguous host
        if criteria.all_good(|t| !t.pox) {
            return StatusLabel::AmbiguousHost;
        }

        // 10. Redshift
        let mut need_secondary = false;
        let host_has_redshift = snapshot
            .host
            .as_ref()
            .is_some_and(|host| host.redshift.is_some());
        if host_has_redshift && criteria.any_good(|t| t.pox) {
            if criteria.any_good(|t| t.z_done && t.z_consistent) {
                return StatusLabel::Redshift;
            }
            if criteria.any_good(|t| t.z_done && !t.z_consistent) {
                return StatusLabel::AmbiguousHost;
            }
            need_secondary = criteria.any_good(|t| t.z_primary);
        }

        // 11. Too faint
        if snapshot.has_host() && criteria.all_good(|t| t.too_faint) {
            return StatusLabel::TooFaint;
        }

        // 12. Good spectrum
        if follow_up.spectroscopy_observed {
            return StatusLabel::GoodSpectrum;
        }

        // 13. Pending spectrum
        if follow_up.spectroscopy_requested {
            return StatusLabel::SpectrumPending;
        }

        // 14. Need secondary
        if need_secondary {
            return StatusLabel::NeedSecondary;
        }

        // 15. Need spectrum
        if snapshot.has_host() && criteria.any_good(|t| t.pox) {
            return StatusLabel::NeedSpectrum;
        }

        StatusLabel::Unassigned
    }
}

/// The primary candidate is fainter than its public survey reaches.
fn beyond_public_depth(snapshot: &TransientSnapshot) -> bool {
    let Some(photometry) = snapshot
        .primary()
        .and_then(|primary| primary.galaxy.best_photometry())
    else {
        return false;
    };
    let filter = photometry.filter();
    if !is_public_filter(&filter) {
        return false;
    }
    if filter.contains("Blanco") || filter.contains("DECam") {
        photometry.mag > DECAM_PUBLIC_DEPTH
    } else {
        photometry.mag > PANSTARRS_PUBLIC_DEPTH
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Candidate, FollowUpFacts};
    use crate::{Galaxy, GalaxyId, Photometry, SampleCriteria, Transient, TransientId};

    fn sample() -> SampleCriteria {
        SampleCriteria {
            run_public_path: true,
            apply_bright_star: true,
            use_top_two: true,
            max_pux: Some(0.2),
            ..SampleCriteria::new("CRAFT-ICS", 0.8, 0.3, 23.5)
        }
    }

    fn decam(mag: f64) -> Galaxy {
        Galaxy::new("J101010-101010", 0.0, 0.0)
            .with_photometry(Photometry::new("Blanco-DECam", "DECam_r", mag))
    }

    fn base() -> TransientSnapshot {
        let mut transient = Transient::new("FRB20240210A", "CRAFT", 0.0, 0.0);
        transient.mw_ebv = 0.04;
        transient.tags.insert("CRAFT-ICS".into());
        TransientSnapshot {
            id: TransientId(0),
            transient,
            samples: vec![sample()],
            candidates: Vec::new(),
            host: None,
            follow_up: FollowUpFacts::default(),
        }
    }

    fn with_host(mut snap: TransientSnapshot, candidates: Vec<(u64, f64, Galaxy)>) -> TransientSnapshot {
        snap.transient.host = candidates.first().map(|(id, _, _)| GalaxyId(*id));
        snap.host = candidates.first().map(|(_, _, g)| g.clone());
        snap.candidates = candidates
            .into_iter()
            .map(|(id, p_ox, galaxy)| Candidate {
                galaxy_id: GalaxyId(id),
                galaxy,
                p_ox,
            })
            .collect();
        snap
    }

    #[test]
    fn no_tags_is_unassigned() {
        let mut snap = base();
        snap.samples.clear();
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::Unassigned);
    }

    #[test]
    fn bright_star_dominates() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(20.0))]);
        snap.transient.bright_star = Some(true);
        snap.follow_up.spectroscopy_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::BrightStar);
    }

    #[test]
    fn dust_excludes() {
        let mut snap = base();
        snap.transient.mw_ebv = 0.9;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::TooDusty);
    }

    #[test]
    fn gate_closed_is_unassigned() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(20.0))]);
        snap.samples[0].run_public_path = false;
        snap.follow_up.spectroscopy_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::Unassigned);
    }

    #[test]
    fn no_host_runs_public_path() {
        assert_eq!(StatusResolver::resolve(&base()), StatusLabel::RunPublicPath);
    }

    #[test]
    fn faint_decam_primary_needs_image() {
        let snap = with_host(base(), vec![(1, 0.95, decam(23.5))]);
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedImage);
    }

    #[test]
    fn skip_need_image_suppresses_depth_trigger() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(23.5))]);
        snap.samples[0].skip_need_image = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedSpectrum);
    }

    #[test]
    fn skip_need_image_ignores_closed_gate_tags() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(23.5))]);
        snap.samples[0].skip_need_image = true;
        snap.samples.push(SampleCriteria {
            run_public_path: false,
            ..SampleCriteria::new("MeerTRAP", 0.8, 0.3, 23.5)
        });
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedSpectrum);
    }

    #[test]
    fn pending_image_precedes_need_image() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(23.5))]);
        snap.follow_up.imaging_requested = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::ImagePending);
    }

    #[test]
    fn observed_image_without_deep_path() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(23.5))]);
        snap.follow_up.imaging_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::RunDeepPath);
    }

    #[test]
    fn deep_path_with_high_pux_is_unseen() {
        let deep = Galaxy::new("J0", 0.0, 0.0)
            .with_photometry(Photometry::new("VLT-FORS2", "R_SPECIAL", 25.0));
        let mut snap = with_host(base(), vec![(1, 0.3, deep)]);
        snap.transient.p_ux = Some(0.6);
        snap.follow_up.imaging_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::UnseenHost);
    }

    #[test]
    fn low_pox_is_ambiguous() {
        let snap = with_host(base(), vec![(1, 0.3, decam(20.0)), (2, 0.2, decam(20.5))]);
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::AmbiguousHost);
    }

    #[test]
    fn primary_redshift_waits_for_secondary() {
        let snap = with_host(
            base(),
            vec![
                (1, 0.5, decam(20.0).with_redshift(0.12, "FFFF-DEIMOS")),
                (2, 0.4, decam(20.5)),
            ],
        );
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedSecondary);
    }

    #[test]
    fn need_secondary_yields_to_pending_spectrum() {
        let mut snap = with_host(
            base(),
            vec![
                (1, 0.5, decam(20.0).with_redshift(0.12, "FFFF-DEIMOS")),
                (2, 0.4, decam(20.5)),
            ],
        );
        snap.follow_up.spectroscopy_requested = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::SpectrumPending);
    }

    #[test]
    fn need_secondary_yields_to_good_spectrum() {
        let mut snap = with_host(
            base(),
            vec![
                (1, 0.5, decam(20.0).with_redshift(0.12, "FFFF-DEIMOS")),
                (2, 0.4, decam(20.5)),
            ],
        );
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedSecondary);
        snap.follow_up.spectroscopy_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::GoodSpectrum);
    }

    #[test]
    fn host_without_path_candidates_is_ambiguous() {
        let mut snap = base();
        snap.transient.host = Some(GalaxyId(1));
        snap.host = Some(decam(20.0));

        let criteria = CriteriaVector::evaluate(&snap);
        let row = &criteria.tags[0];
        assert!(!row.pox_primary && !row.pox && !row.pux && !row.ran_deep_path);
        assert!(!row.z_primary && !row.z_done && !row.too_faint);
        assert_eq!(row.n_pox, 0);

        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::AmbiguousHost);
    }

    #[test]
    fn too_faint_for_spectroscopy() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(22.0))]);
        snap.samples[0].max_mr = 21.5;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::TooFaint);
    }

    #[test]
    fn good_spectrum_overrides_need_spectrum() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(20.0))]);
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedSpectrum);
        snap.follow_up.spectroscopy_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::GoodSpectrum);
    }

    #[test]
    fn good_spectrum_overrides_open_request() {
        let mut snap = with_host(base(), vec![(1, 0.95, decam(20.0))]);
        snap.follow_up.spectroscopy_requested = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::SpectrumPending);
        snap.follow_up.spectroscopy_observed = true;
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::GoodSpectrum);
    }

    #[test]
    fn pan_starrs_depth_is_shallower() {
        let ps1 = Galaxy::new("J1", 0.0, 0.0)
            .with_photometry(Photometry::new("Pan-STARRS-GPC1", "r", 21.4));
        let snap = with_host(base(), vec![(1, 0.95, ps1)]);
        assert_eq!(StatusResolver::resolve(&snap), StatusLabel::NeedImage);
    }
}
