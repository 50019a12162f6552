//! # Sample Registry
//!
//! Administrative seeding and lookup of sample criteria and follow-up
//! resources.
//!
//! Configuration is never created implicitly: evaluation of a tag with no
//! seeded criteria fails with `ConfigurationMissing`. Seeding is idempotent
//! for identical records and rejects a conflicting record under an existing
//! name, since criteria are immutable once seeded.

use crate::catalog::{CatalogStore, validate_sample_criteria};
use crate::{FollowUpResource, FrbError, ResourceId, SampleCriteria};

/// Result of an `ensure_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeded {
    /// The record was inserted.
    Created,
    /// An identical record was already present.
    Unchanged,
}

/// The SampleRegistry seeds and resolves per-tag configuration.
pub struct SampleRegistry;

impl SampleRegistry {
    /// Seed sample criteria.
    ///
    /// # Errors
    ///
    /// `Duplicate` if different criteria are already seeded under the name.
    pub fn ensure_sample_criteria<S: CatalogStore + ?Sized>(
        store: &mut S,
        criteria: SampleCriteria,
    ) -> Result<Seeded, FrbError> {
        validate_sample_criteria(&criteria)?;
        match store.sample_criteria(&criteria.name)? {
            Some(existing) if existing == criteria => Ok(Seeded::Unchanged),
            Some(_) => Err(FrbError::Duplicate {
                kind: "Sample",
                name: criteria.name,
            }),
            None => {
                store.insert_sample_criteria(criteria)?;
                Ok(Seeded::Created)
            }
        }
    }

    /// Seed a follow-up resource, returning its id.
    ///
    /// # Errors
    ///
    /// `Duplicate` if a different resource is already stored under the name,
    /// `InvalidInput` if the validity window is inverted.
    pub fn ensure_resource<S: CatalogStore + ?Sized>(
        store: &mut S,
        resource: FollowUpResource,
    ) -> Result<(ResourceId, Seeded), FrbError> {
        if resource.valid_stop < resource.valid_start {
            return Err(FrbError::InvalidInput(format!(
                "resource {} ends before it starts",
                resource.name
            )));
        }
        if let Some(id) = store.resource_id(&resource.name)? {
            let existing = store.resource(id)?;
            if existing.as_ref() == Some(&resource) {
                return Ok((id, Seeded::Unchanged));
            }
            return Err(FrbError::Duplicate {
                kind: "Resource",
                name: resource.name,
            });
        }
        let id = store.insert_resource(resource)?;
        Ok((id, Seeded::Created))
    }

    /// Lookup the criteria for a tag.
    ///
    /// # Errors
    ///
    /// `ConfigurationMissing` if the tag was never seeded.
    pub fn lookup<S: CatalogStore + ?Sized>(
        store: &S,
        tag: &str,
    ) -> Result<SampleCriteria, FrbError> {
        store
            .sample_criteria(tag)?
            .ok_or_else(|| FrbError::ConfigurationMissing(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use chrono::DateTime;

    #[test]
    fn ensure_is_idempotent() {
        let mut catalog = Catalog::new();
        let criteria = SampleCriteria::new("CHIME-Unbiased", 0.9, 0.3, 23.0);

        assert_eq!(
            SampleRegistry::ensure_sample_criteria(&mut catalog, criteria.clone()).expect("seed"),
            Seeded::Created
        );
        assert_eq!(
            SampleRegistry::ensure_sample_criteria(&mut catalog, criteria).expect("seed"),
            Seeded::Unchanged
        );
        assert_eq!(catalog.sample_names().expect("names").len(), 1);
    }

    #[test]
    fn conflicting_criteria_rejected() {
        let mut catalog = Catalog::new();
        SampleRegistry::ensure_sample_criteria(
            &mut catalog,
            SampleCriteria::new("CHIME-Unbiased", 0.9, 0.3, 23.0),
        )
        .expect("seed");

        let result = SampleRegistry::ensure_sample_criteria(
            &mut catalog,
            SampleCriteria::new("CHIME-Unbiased", 0.5, 0.3, 23.0),
        );
        assert!(matches!(result, Err(FrbError::Duplicate { .. })));
        assert_eq!(
            SampleRegistry::lookup(&catalog, "CHIME-Unbiased")
                .expect("lookup")
                .min_pox,
            0.9
        );
    }

    #[test]
    fn lookup_never_creates() {
        let catalog = Catalog::new();
        let result = SampleRegistry::lookup(&catalog, "CRAFT-ICS");
        assert!(matches!(result, Err(FrbError::ConfigurationMissing(tag)) if tag == "CRAFT-ICS"));
    }

    #[test]
    fn invalid_thresholds_rejected() {
        let mut catalog = Catalog::new();
        let mut criteria = SampleCriteria::new("Bad", f64::NAN, 0.3, 23.0);
        assert!(SampleRegistry::ensure_sample_criteria(&mut catalog, criteria.clone()).is_err());

        criteria.min_pox = 0.5;
        criteria.max_pux = Some(1.5);
        assert!(SampleRegistry::ensure_sample_criteria(&mut catalog, criteria).is_err());
    }

    #[test]
    fn inverted_resource_window_rejected() {
        let mut catalog = Catalog::new();
        let resource = FollowUpResource {
            name: "MMT-Binospec".into(),
            instrument: "MMT-Binospec".into(),
            valid_start: DateTime::from_timestamp(1_700_100_000, 0).expect("ts"),
            valid_stop: DateTime::from_timestamp(1_700_000_000, 0).expect("ts"),
            num_targ_img: 0,
            num_targ_mask: 1,
            num_targ_longslit: 0,
            max_airmass: 1.5,
            surveys: "all".into(),
        };
        assert!(matches!(
            SampleRegistry::ensure_resource(&mut catalog, resource),
            Err(FrbError::InvalidInput(_))
        ));
    }
}
