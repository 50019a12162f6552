//! # frb-core
//!
//! The deterministic follow-up status engine for Fast Radio Burst (FRB)
//! host-galaxy campaigns.
//!
//! Each FRB transient moves through localization checks, host association
//! (PATH), imaging, spectroscopy and redshift determination. This crate
//! decides, from stored facts alone, which of the mutually exclusive pipeline
//! states a transient is in.
//!
//! ## Layout
//!
//! - `types`: identifiers, records, status labels, errors
//! - `snapshot`: the consistent per-transient view the engine reads
//! - `criteria`: per-tag criteria evaluation
//! - `status`: the status state machine
//! - `catalog` / `storage`: in-memory and redb-backed object stores
//! - `registry`, `mutation`, `observing`: administrative seeding, single
//!   mutations, bulk ingestion
//! - `formats`: the catalog snapshot file format
//! - `session`: backend-agnostic entry points
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Deterministic: `BTreeMap`/`BTreeSet` only
//! - Closed: status labels are a fixed enum; criteria are never created on
//!   demand

// =============================================================================
// MODULES
// =============================================================================

pub mod catalog;
pub mod criteria;
pub mod formats;
pub mod mutation;
pub mod observing;
pub mod primitives;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    FollowUpObservation, FollowUpRequest, FollowUpResource, FrbError, Galaxy, GalaxyId,
    ObservationKey, ObservingMode, PathCandidate, Photometry, Redshift, ResourceId,
    SampleCriteria, StatusLabel, Transient, TransientId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use catalog::{Catalog, CatalogStore, recompute_status};
pub use criteria::{CriteriaVector, TagCriteria, evaluate_criteria};
pub use mutation::MutationEngine;
pub use observing::{
    IngestError, IngestOutcome, ObsLogRow, ObsPlanRow, ObservingIngest, RedshiftRow,
};
pub use registry::{SampleRegistry, Seeded};
pub use session::{Session, StorageBackend};
pub use snapshot::{FollowUpFacts, SnapshotSource, TransientSnapshot};
pub use status::StatusResolver;
pub use storage::RedbCatalog;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, catalog_from_bytes, catalog_to_bytes};
