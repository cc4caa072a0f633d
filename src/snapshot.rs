//! On-disk snapshots of schema and table.
//!
//! One directory per named table under a configurable root. The schema is
//! cached as human-readable JSON (`db.schema`) exactly once at creation and
//! compared structurally on every later open. The table snapshot
//! (`<name>.db`) is a framed MessagePack blob: magic bytes, format version,
//! CRC32 of the body, body length, body.

use crate::error::{Result, StoreError};
use crate::types::{Schema, Table};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for table snapshot files.
const TABLE_MAGIC: &[u8; 4] = b"CTB\0";

/// Current table snapshot format version.
const TABLE_VERSION: u8 = 1;

/// File name of the cached schema inside a table directory.
const SCHEMA_FILE: &str = "db.schema";

/// Load/save adapter for one table directory.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    name: String,
}

impl SnapshotStore {
    /// Adapter for `root/<name>/`. No disk access until used.
    pub fn new(root: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dir: root.as_ref().join(&name),
            name,
        }
    }

    /// The table directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cached schema file.
    pub fn schema_path(&self) -> PathBuf {
        self.dir.join(SCHEMA_FILE)
    }

    /// Path of the table snapshot file.
    pub fn table_path(&self) -> PathBuf {
        self.dir.join(format!("{}.db", self.name))
    }

    /// Create the table directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Read the cached schema, or `None` when the table was never created.
    pub fn load_schema(&self) -> Result<Option<Schema>> {
        let path = self.schema_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let schema: Schema = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Deserialization(format!("cached schema: {e}")))?;
        Ok(Some(schema))
    }

    /// Persist the schema. Written once, at first creation.
    pub fn save_schema(&self, schema: &Schema) -> Result<()> {
        let encoded = serde_json::to_string_pretty(schema)?;
        fs::write(self.schema_path(), encoded)?;
        debug!(table = %self.name, "schema snapshot written");
        Ok(())
    }

    /// Read the table snapshot, or `None` when no snapshot exists yet.
    pub fn load_table(&self) -> Result<Option<Table>> {
        let path = self.table_path();
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != TABLE_MAGIC {
            return Err(StoreError::InvalidFormat(
                "invalid table snapshot magic".into(),
            ));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != TABLE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "unsupported table snapshot version: {}",
                version[0]
            )));
        }

        let mut crc_bytes = [0u8; 4];
        file.read_exact(&mut crc_bytes)?;
        let expected = u32::from_le_bytes(crc_bytes);

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;

        let got = crc32fast::hash(&body);
        if got != expected {
            return Err(StoreError::ChecksumMismatch { expected, got });
        }

        let table: Table = rmp_serde::from_slice(&body)?;
        debug!(table = %self.name, records = table.len(), "table snapshot loaded");
        Ok(Some(table))
    }

    /// Persist the full table, replacing any previous snapshot.
    pub fn save_table(&self, table: &Table) -> Result<()> {
        let body = rmp_serde::to_vec(table)?;
        let crc = crc32fast::hash(&body);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.table_path())?;

        file.write_all(TABLE_MAGIC)?;
        file.write_all(&[TABLE_VERSION])?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&(body.len() as u64).to_le_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;

        debug!(table = %self.name, records = table.len(), "table snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldSpec, FieldType, Record, RecordId, Value};
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn sample_schema() -> Schema {
        let mut fields = IndexMap::new();
        fields.insert("name".to_string(), FieldSpec::required(FieldType::Str));
        fields.insert(
            "place".to_string(),
            FieldSpec::new(FieldType::Str).with_default("canada"),
        );
        Schema::new(fields).unwrap()
    }

    fn sample_table() -> Table {
        let mut record = Record::new();
        record.insert("name".to_string(), Value::Str("ab".into()));
        record.insert("place".to_string(), Value::Str("canada".into()));

        let mut table = Table::new();
        table.insert(RecordId::new("a811ebf6"), record);
        table
    }

    #[test]
    fn test_schema_roundtrip() {
        let dir = TempDir::new().unwrap();
        let snap = SnapshotStore::new(dir.path(), "people");
        snap.ensure_dir().unwrap();

        assert!(snap.load_schema().unwrap().is_none());

        let schema = sample_schema();
        snap.save_schema(&schema).unwrap();
        assert_eq!(snap.load_schema().unwrap(), Some(schema));
    }

    #[test]
    fn test_table_roundtrip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let snap = SnapshotStore::new(dir.path(), "people");
        snap.ensure_dir().unwrap();

        assert!(snap.load_table().unwrap().is_none());

        let mut table = sample_table();
        let mut second = Record::new();
        second.insert("name".to_string(), Value::Str("ac".into()));
        second.insert("place".to_string(), Value::Str("france".into()));
        table.insert(RecordId::new("a103f392"), second);

        snap.save_table(&table).unwrap();
        let loaded = snap.load_table().unwrap().unwrap();
        assert_eq!(loaded, table);

        let ids: Vec<_> = loaded.keys().map(|id| id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["a811ebf6", "a103f392"]);
    }

    #[test]
    fn test_table_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let snap = SnapshotStore::new(dir.path(), "people");
        snap.ensure_dir().unwrap();

        fs::write(snap.table_path(), b"NOPE....").unwrap();
        assert!(matches!(
            snap.load_table(),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_table_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let snap = SnapshotStore::new(dir.path(), "people");
        snap.ensure_dir().unwrap();
        snap.save_table(&sample_table()).unwrap();

        // Flip a byte in the body.
        let mut bytes = fs::read(snap.table_path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(snap.table_path(), bytes).unwrap();

        assert!(matches!(
            snap.load_table(),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }
}
