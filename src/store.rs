//! The record store engine.
//!
//! A [`Store`] owns one immutable [`Schema`] and one insertion-ordered table
//! of records keyed by content hash. Every mutation validates first, decides
//! ids second, and touches the table last, so a failing call leaves the
//! table exactly as it was.
//!
//! The store is single-threaded by contract: mutations take `&mut self`, and
//! the stage-then-merge (add) and copy-then-swap (update) protocols assume
//! exclusive access for their full duration. Callers that share a store
//! across threads must wrap it in their own exclusive lock.

use crate::error::{Result, StoreError};
use crate::identity::assign_id;
use crate::snapshot::SnapshotStore;
use crate::types::{Record, RecordId, Schema, Table, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Table name; also names the snapshot directory and file.
    pub name: String,

    /// Root directory under which all table directories live.
    pub root: PathBuf,

    /// Schema for the table. Required the first time a table is created;
    /// optional when reopening (the cached schema is used). If both exist
    /// they must be structurally equal.
    pub schema: Option<Schema>,

    /// Whether records with identical content may coexist (under salted ids).
    pub allow_duplicates: bool,

    /// Keep everything in memory; never touch the filesystem.
    pub in_memory: bool,
}

impl StoreConfig {
    /// Configuration for a named table with defaults for everything else.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "db".to_string(),
            root: PathBuf::from("./contabase"),
            schema: None,
            allow_duplicates: false,
            in_memory: false,
        }
    }
}

/// The record store.
#[derive(Debug)]
pub struct Store {
    name: String,
    schema: Schema,
    table: Table,
    allow_duplicates: bool,
    /// Absent for in-memory stores.
    snapshot: Option<SnapshotStore>,
}

impl Store {
    /// Open a store, creating its directory and schema cache on first use.
    ///
    /// Schema resolution is fatal on failure: a supplied schema that
    /// disagrees with the cached one, or no schema from either source,
    /// produces no store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let snapshot = if config.in_memory {
            None
        } else {
            let snap = SnapshotStore::new(&config.root, &config.name);
            snap.ensure_dir()?;
            Some(snap)
        };

        let cached = match &snapshot {
            Some(snap) => snap.load_schema()?,
            None => None,
        };

        let schema = match (config.schema, cached) {
            (Some(supplied), Some(cached)) => {
                if supplied != cached {
                    return Err(StoreError::Schema(format!(
                        "the schema provided does not match the cached schema for table '{}'",
                        config.name
                    )));
                }
                supplied
            }
            (Some(supplied), None) => {
                if let Some(snap) = &snapshot {
                    snap.save_schema(&supplied)?;
                }
                supplied
            }
            (None, Some(cached)) => cached,
            (None, None) => {
                return Err(StoreError::Schema("schema not provided".to_string()));
            }
        };

        let table = match &snapshot {
            Some(snap) => snap.load_table()?.unwrap_or_default(),
            None => Table::new(),
        };

        info!(
            table = %config.name,
            records = table.len(),
            in_memory = config.in_memory,
            "store opened"
        );

        Ok(Self {
            name: config.name,
            schema,
            table,
            allow_duplicates: config.allow_duplicates,
            snapshot,
        })
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema this store validates against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of records in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Add a batch of records, returning their ids in input order.
    ///
    /// The whole batch is staged before the table changes: a record that
    /// fails validation, or a content collision while duplicates are
    /// disallowed (against the table or within the batch), aborts the call
    /// with the table untouched.
    pub fn add(&mut self, records: Vec<Record>) -> Result<Vec<RecordId>> {
        let mut staged: Vec<(RecordId, Record)> = Vec::with_capacity(records.len());
        let mut occupied: HashSet<RecordId> = self.table.keys().cloned().collect();

        for raw in &records {
            if !self.schema.validate_record(raw) {
                return Err(StoreError::Data(format!(
                    "record {raw:?} does not comply with the schema"
                )));
            }
            let record = self.schema.apply_defaults(raw);
            let values = rendered_values(&record);
            let id = assign_id(&values, &occupied, self.allow_duplicates)?;

            if !self.allow_duplicates && occupied.contains(&id) {
                return Err(StoreError::Duplicate(format!(
                    "record {raw:?} duplicates existing content (id {id})"
                )));
            }

            occupied.insert(id.clone());
            staged.push((id, record));
        }

        let ids: Vec<RecordId> = staged.iter().map(|(id, _)| id.clone()).collect();
        self.table.extend(staged);

        debug!(table = %self.name, added = ids.len(), total = self.table.len(), "records added");
        Ok(ids)
    }

    /// All records whose predicate field equals the predicate value.
    ///
    /// Strict equality is the only operator. Zero matches is an empty
    /// result, not an error.
    pub fn get_by_query(&self, predicate: &Record) -> Result<Table> {
        self.schema.validate_predicate(predicate)?;
        let (field, value) = predicate.first().expect("predicate has one entry");

        Ok(self
            .table
            .iter()
            .filter(|(_, record)| record.get(field) == Some(value))
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect())
    }

    /// Look up a single record. Absence is not an error.
    pub fn get_by_hash_id(&self, id: &RecordId) -> Option<Record> {
        self.table.get(id).cloned()
    }

    /// The full table, in insertion order.
    pub fn get_all(&self) -> Table {
        self.table.clone()
    }

    /// A deep copy of the table, sharing nothing with internal state.
    pub fn raw_snapshot(&self) -> Table {
        self.table.clone()
    }

    /// Update every record matching the predicate, re-keying changed records
    /// by their new content. Returns the old-id to new-id mapping for
    /// records whose id changed; an empty selection is a no-op.
    pub fn update_by_query(
        &mut self,
        predicate: &Record,
        payload: &Record,
    ) -> Result<IndexMap<RecordId, RecordId>> {
        self.schema.validate_predicate(predicate)?;
        self.schema.validate_update_payload(payload)?;

        let (field, value) = predicate.first().expect("predicate has one entry");
        let targets: Vec<RecordId> = self
            .table
            .iter()
            .filter(|(_, record)| record.get(field) == Some(value))
            .map(|(id, _)| id.clone())
            .collect();

        self.apply_update(targets, payload)
    }

    /// Update one record by id, re-keying it if its content changes. A
    /// missing id is a no-op, not an error.
    pub fn update_by_hash_id(
        &mut self,
        id: &RecordId,
        payload: &Record,
    ) -> Result<IndexMap<RecordId, RecordId>> {
        self.schema.validate_update_payload(payload)?;

        let targets = if self.table.contains_key(id) {
            vec![id.clone()]
        } else {
            Vec::new()
        };

        self.apply_update(targets, payload)
    }

    /// The transactional core of both update operations.
    ///
    /// Works on a private copy of the table: payload application and id
    /// recomputation happen there, and only a fully successful pass swaps
    /// the copy in. Any failure leaves the live table byte-for-byte
    /// unchanged.
    fn apply_update(
        &mut self,
        targets: Vec<RecordId>,
        payload: &Record,
    ) -> Result<IndexMap<RecordId, RecordId>> {
        if targets.is_empty() {
            return Ok(IndexMap::new());
        }

        let mut working = self.table.clone();
        let mut renames: IndexMap<RecordId, RecordId> = IndexMap::new();
        let mut chosen: HashSet<RecordId> = HashSet::new();

        for old_id in &targets {
            let record = working.get_mut(old_id).expect("target selected from table");
            for (field, value) in payload {
                record.insert(field.clone(), value.clone());
            }

            let values = rendered_values(record);
            let mut occupied: HashSet<RecordId> = working.keys().cloned().collect();
            occupied.remove(old_id);
            occupied.extend(chosen.iter().cloned());

            let candidate = assign_id(&values, &occupied, self.allow_duplicates)?;

            if !self.allow_duplicates && occupied.contains(&candidate) {
                return Err(StoreError::Duplicate(format!(
                    "updating record {old_id} would duplicate existing content (id {candidate})"
                )));
            }

            if candidate != *old_id {
                chosen.insert(candidate.clone());
                renames.insert(old_id.clone(), candidate);
            }
        }

        if renames.is_empty() {
            self.table = working;
            return Ok(renames);
        }

        // Rename keys without disturbing record positions.
        self.table = working
            .into_iter()
            .map(|(id, record)| match renames.get(&id) {
                Some(new_id) => (new_id.clone(), record),
                None => (id, record),
            })
            .collect();

        debug!(table = %self.name, updated = targets.len(), rekeyed = renames.len(), "records updated");
        Ok(renames)
    }

    /// Delete every record matching the predicate, returning the removed
    /// ids. Zero matches is an empty result, not an error.
    pub fn delete_by_query(&mut self, predicate: &Record) -> Result<Vec<RecordId>> {
        self.schema.validate_predicate(predicate)?;
        let (field, value) = predicate.first().expect("predicate has one entry");

        let removed: Vec<RecordId> = self
            .table
            .iter()
            .filter(|(_, record)| record.get(field) == Some(value))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &removed {
            self.table.shift_remove(id);
        }

        debug!(table = %self.name, removed = removed.len(), "records deleted by query");
        Ok(removed)
    }

    /// Delete one record by id. Returns whether a record was removed;
    /// absence is not an error.
    pub fn delete_by_hash_id(&mut self, id: &RecordId) -> bool {
        self.table.shift_remove(id).is_some()
    }

    /// Remove every record. The schema is retained.
    pub fn purge(&mut self) {
        self.table.clear();
        debug!(table = %self.name, "table purged");
    }

    /// Write the current table snapshot to disk. A no-op for in-memory
    /// stores; never alters in-memory state; safe to call repeatedly.
    pub fn commit(&self) -> Result<()> {
        if let Some(snap) = &self.snapshot {
            snap.save_table(&self.table)?;
        }
        Ok(())
    }
}

/// Field values rendered for hashing, in the record's (schema) order.
fn rendered_values(record: &Record) -> Vec<String> {
    record.values().map(Value::render).collect()
}
