//! # redb-backed Catalog Storage
//!
//! A disk-backed catalog using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are postcard-encoded and keyed by id; unique names live in
//! separate index tables. `recompute_status` reads the snapshot and writes
//! the label inside one write transaction.

use crate::catalog::{CatalogStore, validate_name, validate_sample_criteria, validate_transient};
use crate::snapshot::{SnapshotSource, TransientSnapshot};
use crate::status::StatusResolver;
use crate::{
    FollowUpObservation, FollowUpRequest, FollowUpResource, FrbError, Galaxy, GalaxyId,
    ObservationKey, ObservingMode, ResourceId, SampleCriteria, StatusLabel, Transient,
    TransientId,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Transients: TransientId(u64) -> postcard Transient
const TRANSIENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("transients");

/// TNS name -> TransientId(u64)
const TRANSIENT_NAMES: TableDefinition<&str, u64> = TableDefinition::new("transient_names");

/// Galaxies: GalaxyId(u64) -> postcard Galaxy
const GALAXIES: TableDefinition<u64, &[u8]> = TableDefinition::new("galaxies");

/// Galaxy name -> GalaxyId(u64)
const GALAXY_NAMES: TableDefinition<&str, u64> = TableDefinition::new("galaxy_names");

/// Resources: ResourceId(u64) -> postcard FollowUpResource
const RESOURCES: TableDefinition<u64, &[u8]> = TableDefinition::new("resources");

/// Resource name -> ResourceId(u64)
const RESOURCE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("resource_names");

/// Sample name -> postcard SampleCriteria
const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Pending requests: (transient, resource, mode code) -> ()
const REQUESTS: TableDefinition<(u64, u64, u8), ()> = TableDefinition::new("requests");

/// Observations: (transient, resource, mode code, unix secs, subsec nanos)
/// -> postcard FollowUpObservation
const OBSERVATIONS: TableDefinition<(u64, u64, u8, i64, u32), &[u8]> =
    TableDefinition::new("observations");

/// Id counters: key string -> next id
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_TRANSIENT_ID: &str = "next_transient_id";
const NEXT_GALAXY_ID: &str = "next_galaxy_id";
const NEXT_RESOURCE_ID: &str = "next_resource_id";

/// The tables behind one kind of named, id-keyed record.
#[derive(Clone, Copy)]
struct NamedTables {
    kind: &'static str,
    records: TableDefinition<'static, u64, &'static [u8]>,
    names: TableDefinition<'static, &'static str, u64>,
    counter: &'static str,
}

const TRANSIENT_TABLES: NamedTables = NamedTables {
    kind: "Transient",
    records: TRANSIENTS,
    names: TRANSIENT_NAMES,
    counter: NEXT_TRANSIENT_ID,
};

const GALAXY_TABLES: NamedTables = NamedTables {
    kind: "Galaxy",
    records: GALAXIES,
    names: GALAXY_NAMES,
    counter: NEXT_GALAXY_ID,
};

const RESOURCE_TABLES: NamedTables = NamedTables {
    kind: "Resource",
    records: RESOURCES,
    names: RESOURCE_NAMES,
    counter: NEXT_RESOURCE_ID,
};

/// A disk-backed catalog store using redb.
pub struct RedbCatalog {
    db: Database,
    next_transient_id: u64,
    next_galaxy_id: u64,
    next_resource_id: u64,
}

impl std::fmt::Debug for RedbCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCatalog")
            .field("next_transient_id", &self.next_transient_id)
            .field("next_galaxy_id", &self.next_galaxy_id)
            .field("next_resource_id", &self.next_resource_id)
            .finish_non_exhaustive()
    }
}

impl RedbCatalog {
    /// Open or create a catalog database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrbError> {
        let db = Database::create(path.as_ref()).map_err(|e| FrbError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            for records in [TRANSIENTS, GALAXIES, RESOURCES] {
                let _ = write_txn
                    .open_table(records)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
            }
            for names in [TRANSIENT_NAMES, GALAXY_NAMES, RESOURCE_NAMES, METADATA] {
                let _ = write_txn
                    .open_table(names)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
            }
            let _ = write_txn
                .open_table(SAMPLES)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(REQUESTS)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(OBSERVATIONS)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }

        // Load counters
        let (next_transient_id, next_galaxy_id, next_resource_id) = {
            let read_txn = db
                .begin_read()
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let meta_table = read_txn
                .open_table(METADATA)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let counter = |key: &str| -> Result<u64, FrbError> {
                Ok(meta_table
                    .get(key)
                    .map_err(|e| FrbError::IoError(e.to_string()))?
                    .map(|v| v.value())
                    .unwrap_or(0))
            };
            (
                counter(NEXT_TRANSIENT_ID)?,
                counter(NEXT_GALAXY_ID)?,
                counter(NEXT_RESOURCE_ID)?,
            )
        };

        Ok(Self {
            db,
            next_transient_id,
            next_galaxy_id,
            next_resource_id,
        })
    }

    fn read(&self) -> Result<ReadTransaction, FrbError> {
        self.db
            .begin_read()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    fn write(&self) -> Result<WriteTransaction, FrbError> {
        self.db
            .begin_write()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    /// Insert a named record under a fresh id in one transaction.
    fn insert_named<T: Serialize>(
        &self,
        tables: NamedTables,
        name: &str,
        record: &T,
        id: u64,
    ) -> Result<(), FrbError> {
        validate_name(tables.kind, name)?;
        let bytes = encode(record)?;

        let write_txn = self.write()?;
        {
            let mut names_table = write_txn
                .open_table(tables.names)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let taken = names_table
                .get(name)
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some();
            if taken {
                return Err(FrbError::Duplicate {
                    kind: tables.kind,
                    name: name.to_string(),
                });
            }
            names_table
                .insert(name, id)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }
        {
            let mut records_table = write_txn
                .open_table(tables.records)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            records_table
                .insert(id, bytes.as_slice())
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }
        {
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            meta_table
                .insert(tables.counter, id.saturating_add(1))
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    /// Overwrite an existing id-keyed record.
    fn update_record<T: Serialize>(
        &self,
        tables: NamedTables,
        id: u64,
        record: &T,
        label: impl std::fmt::Display,
    ) -> Result<(), FrbError> {
        let bytes = encode(record)?;
        let write_txn = self.write()?;
        {
            let mut table = write_txn
                .open_table(tables.records)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let exists = table
                .get(id)
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some();
            if !exists {
                return Err(FrbError::not_found(tables.kind, label));
            }
            table
                .insert(id, bytes.as_slice())
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    fn name_lookup(&self, tables: NamedTables, name: &str) -> Result<Option<u64>, FrbError> {
        let read_txn = self.read()?;
        let table = read_txn
            .open_table(tables.names)
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        Ok(table
            .get(name)
            .map_err(|e| FrbError::IoError(e.to_string()))?
            .map(|v| v.value()))
    }

    fn ids(&self, tables: NamedTables) -> Result<Vec<u64>, FrbError> {
        let read_txn = self.read()?;
        let table = read_txn
            .open_table(tables.records)
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        let mut ids = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FrbError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| FrbError::IoError(e.to_string()))?;
            ids.push(key.value());
        }
        Ok(ids)
    }
}

// =============================================================================
// ENCODING HELPERS
// =============================================================================

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, FrbError> {
    postcard::to_allocvec(record).map_err(|e| FrbError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FrbError> {
    postcard::from_bytes(bytes).map_err(|e| FrbError::SerializationError(e.to_string()))
}

fn get_record<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<T>, FrbError> {
    match table
        .get(id)
        .map_err(|e| FrbError::IoError(e.to_string()))?
    {
        Some(data) => decode(data.value()).map(Some),
        None => Ok(None),
    }
}

fn request_key(request: &FollowUpRequest) -> (u64, u64, u8) {
    (
        request.transient.0,
        request.resource.0,
        request.mode.code(),
    )
}

fn observation_key(key: &ObservationKey) -> (u64, u64, u8, i64, u32) {
    (
        key.transient.0,
        key.resource.0,
        key.mode.code(),
        key.date.timestamp(),
        key.date.timestamp_subsec_nanos(),
    )
}

fn decode_request((transient, resource, mode): (u64, u64, u8)) -> Result<FollowUpRequest, FrbError> {
    let mode = ObservingMode::from_code(mode)
        .ok_or_else(|| FrbError::SerializationError(format!("Invalid mode code: {}", mode)))?;
    Ok(FollowUpRequest {
        transient: TransientId(transient),
        resource: ResourceId(resource),
        mode,
    })
}

// =============================================================================
// TRANSACTION VIEWS
// =============================================================================

/// Snapshot reads inside a read transaction.
struct ReadView<'a>(&'a ReadTransaction);

/// Snapshot reads inside a write transaction, seeing its uncommitted writes.
struct WriteView<'a>(&'a WriteTransaction);

macro_rules! impl_snapshot_source {
    ($view:ident) => {
        impl SnapshotSource for $view<'_> {
            fn transient(&self, id: TransientId) -> Result<Option<Transient>, FrbError> {
                let table = self
                    .0
                    .open_table(TRANSIENTS)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
                get_record(&table, id.0)
            }

            fn galaxy(&self, id: GalaxyId) -> Result<Option<Galaxy>, FrbError> {
                let table = self
                    .0
                    .open_table(GALAXIES)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
                get_record(&table, id.0)
            }

            fn sample_criteria(&self, name: &str) -> Result<Option<SampleCriteria>, FrbError> {
                let table = self
                    .0
                    .open_table(SAMPLES)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
                match table
                    .get(name)
                    .map_err(|e| FrbError::IoError(e.to_string()))?
                {
                    Some(data) => decode(data.value()).map(Some),
                    None => Ok(None),
                }
            }

            fn requests_for_transient(
                &self,
                id: TransientId,
            ) -> Result<Vec<FollowUpRequest>, FrbError> {
                let table = self
                    .0
                    .open_table(REQUESTS)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
                let mut requests = Vec::new();
                for entry in table
                    .range((id.0, 0u64, 0u8)..=(id.0, u64::MAX, u8::MAX))
                    .map_err(|e| FrbError::IoError(e.to_string()))?
                {
                    let (key, _) = entry.map_err(|e| FrbError::IoError(e.to_string()))?;
                    requests.push(decode_request(key.value())?);
                }
                Ok(requests)
            }

            fn observations_for_transient(
                &self,
                id: TransientId,
            ) -> Result<Vec<FollowUpObservation>, FrbError> {
                let table = self
                    .0
                    .open_table(OBSERVATIONS)
                    .map_err(|e| FrbError::IoError(e.to_string()))?;
                let mut observations = Vec::new();
                for entry in table
                    .range(
                        (id.0, 0u64, 0u8, i64::MIN, 0u32)
                            ..=(id.0, u64::MAX, u8::MAX, i64::MAX, u32::MAX),
                    )
                    .map_err(|e| FrbError::IoError(e.to_string()))?
                {
                    let (_, value) = entry.map_err(|e| FrbError::IoError(e.to_string()))?;
                    observations.push(decode(value.value())?);
                }
                Ok(observations)
            }
        }
    };
}

impl_snapshot_source!(ReadView);
impl_snapshot_source!(WriteView);

// =============================================================================
// TRAIT IMPLEMENTATIONS
// =============================================================================

impl SnapshotSource for RedbCatalog {
    fn transient(&self, id: TransientId) -> Result<Option<Transient>, FrbError> {
        ReadView(&self.read()?).transient(id)
    }

    fn galaxy(&self, id: GalaxyId) -> Result<Option<Galaxy>, FrbError> {
        ReadView(&self.read()?).galaxy(id)
    }

    fn sample_criteria(&self, name: &str) -> Result<Option<SampleCriteria>, FrbError> {
        ReadView(&self.read()?).sample_criteria(name)
    }

    fn requests_for_transient(
        &self,
        id: TransientId,
    ) -> Result<Vec<FollowUpRequest>, FrbError> {
        ReadView(&self.read()?).requests_for_transient(id)
    }

    fn observations_for_transient(
        &self,
        id: TransientId,
    ) -> Result<Vec<FollowUpObservation>, FrbError> {
        ReadView(&self.read()?).observations_for_transient(id)
    }
}

impl CatalogStore for RedbCatalog {
    fn insert_transient(&mut self, transient: Transient) -> Result<TransientId, FrbError> {
        validate_transient(&transient)?;
        let id = self.next_transient_id;
        self.insert_named(TRANSIENT_TABLES, &transient.name, &transient, id)?;
        // Update counter only after successful commit
        self.next_transient_id = id.saturating_add(1);
        Ok(TransientId(id))
    }

    fn update_transient(
        &mut self,
        id: TransientId,
        transient: Transient,
    ) -> Result<(), FrbError> {
        validate_transient(&transient)?;
        self.update_record(TRANSIENT_TABLES, id.0, &transient, id)
    }

    fn transient_id(&self, name: &str) -> Result<Option<TransientId>, FrbError> {
        Ok(self.name_lookup(TRANSIENT_TABLES, name)?.map(TransientId))
    }

    fn transient_ids(&self) -> Result<Vec<TransientId>, FrbError> {
        Ok(self
            .ids(TRANSIENT_TABLES)?
            .into_iter()
            .map(TransientId)
            .collect())
    }

    fn insert_galaxy(&mut self, galaxy: Galaxy) -> Result<GalaxyId, FrbError> {
        let id = self.next_galaxy_id;
        self.insert_named(GALAXY_TABLES, &galaxy.name, &galaxy, id)?;
        self.next_galaxy_id = id.saturating_add(1);
        Ok(GalaxyId(id))
    }

    fn update_galaxy(&mut self, id: GalaxyId, galaxy: Galaxy) -> Result<(), FrbError> {
        self.update_record(GALAXY_TABLES, id.0, &galaxy, id)
    }

    fn galaxy_id(&self, name: &str) -> Result<Option<GalaxyId>, FrbError> {
        Ok(self.name_lookup(GALAXY_TABLES, name)?.map(GalaxyId))
    }

    fn galaxy_ids(&self) -> Result<Vec<GalaxyId>, FrbError> {
        Ok(self.ids(GALAXY_TABLES)?.into_iter().map(GalaxyId).collect())
    }

    fn insert_resource(&mut self, resource: FollowUpResource) -> Result<ResourceId, FrbError> {
        let id = self.next_resource_id;
        self.insert_named(RESOURCE_TABLES, &resource.name, &resource, id)?;
        self.next_resource_id = id.saturating_add(1);
        Ok(ResourceId(id))
    }

    fn resource(&self, id: ResourceId) -> Result<Option<FollowUpResource>, FrbError> {
        let read_txn = self.read()?;
        let table = read_txn
            .open_table(RESOURCES)
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        get_record(&table, id.0)
    }

    fn resource_id(&self, name: &str) -> Result<Option<ResourceId>, FrbError> {
        Ok(self.name_lookup(RESOURCE_TABLES, name)?.map(ResourceId))
    }

    fn resource_ids(&self) -> Result<Vec<ResourceId>, FrbError> {
        Ok(self
            .ids(RESOURCE_TABLES)?
            .into_iter()
            .map(ResourceId)
            .collect())
    }

    fn insert_sample_criteria(&mut self, criteria: SampleCriteria) -> Result<(), FrbError> {
        validate_sample_criteria(&criteria)?;
        let bytes = encode(&criteria)?;

        let write_txn = self.write()?;
        {
            let mut table = write_txn
                .open_table(SAMPLES)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            let taken = table
                .get(criteria.name.as_str())
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some();
            if taken {
                return Err(FrbError::Duplicate {
                    kind: "Sample",
                    name: criteria.name,
                });
            }
            table
                .insert(criteria.name.as_str(), bytes.as_slice())
                .map_err(|e| FrbError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    fn sample_names(&self) -> Result<Vec<String>, FrbError> {
        let read_txn = self.read()?;
        let table = read_txn
            .open_table(SAMPLES)
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        let mut names = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FrbError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| FrbError::IoError(e.to_string()))?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    fn add_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError> {
        let write_txn = self.write()?;
        let existed = {
            let mut table = write_txn
                .open_table(REQUESTS)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            table
                .insert(request_key(&request), ())
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        Ok(!existed)
    }

    fn remove_request(&mut self, request: FollowUpRequest) -> Result<bool, FrbError> {
        let write_txn = self.write()?;
        let existed = {
            let mut table = write_txn
                .open_table(REQUESTS)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            table
                .remove(request_key(&request))
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        Ok(existed)
    }

    fn requests_for_resource(&self, id: ResourceId) -> Result<Vec<FollowUpRequest>, FrbError> {
        let read_txn = self.read()?;
        let table = read_txn
            .open_table(REQUESTS)
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        let mut requests = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FrbError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| FrbError::IoError(e.to_string()))?;
            let request = decode_request(key.value())?;
            if request.resource == id {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    fn upsert_observation(&mut self, observation: FollowUpObservation) -> Result<bool, FrbError> {
        let bytes = encode(&observation)?;
        let write_txn = self.write()?;
        let replaced = {
            let mut table = write_txn
                .open_table(OBSERVATIONS)
                .map_err(|e| FrbError::IoError(e.to_string()))?;
            table
                .insert(observation_key(&observation.key()), bytes.as_slice())
                .map_err(|e| FrbError::IoError(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        Ok(replaced)
    }

    fn set_status(&mut self, id: TransientId, status: StatusLabel) -> Result<(), FrbError> {
        let write_txn = self.write()?;
        write_status(&write_txn, id, status)?;
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))
    }

    fn recompute_status(&mut self, id: TransientId) -> Result<StatusLabel, FrbError> {
        let write_txn = self.write()?;
        let snapshot = TransientSnapshot::load(&WriteView(&write_txn), id)?;
        let status = StatusResolver::resolve(&snapshot);
        write_status(&write_txn, id, status)?;
        write_txn
            .commit()
            .map_err(|e| FrbError::IoError(e.to_string()))?;
        Ok(status)
    }
}

fn write_status(
    write_txn: &WriteTransaction,
    id: TransientId,
    status: StatusLabel,
) -> Result<(), FrbError> {
    let mut table = write_txn
        .open_table(TRANSIENTS)
        .map_err(|e| FrbError::IoError(e.to_string()))?;
    let mut transient: Transient =
        get_record(&table, id.0)?.ok_or_else(|| FrbError::not_found("Transient", id))?;
    transient.status = status;
    let bytes = encode(&transient)?;
    table
        .insert(id.0, bytes.as_slice())
        .map_err(|e| FrbError::IoError(e.to_string()))?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
