//! # Contabase
//!
//! An embeddable, schema-validated record store where a record's identity is
//! a deterministic content hash rather than an assigned key.
//!
//! ## Core Concepts
//!
//! - **Schema**: a fixed, ordered contract of field names, types,
//!   requiredness, and defaults
//! - **Records**: validated field maps identified by the first 8 hex chars
//!   of the SHA-256 of their values
//! - **Table**: an insertion-ordered in-memory map of id to record
//! - **Snapshots**: explicit, synchronous persistence of schema and table
//!
//! ## Example
//!
//! ```ignore
//! use contabase::{Schema, Store, StoreConfig};
//! use serde_json::json;
//!
//! let schema = Schema::from_json_value(&json!({
//!     "name": {"type": "str", "required": true},
//!     "age": {"type": "int", "required": true},
//!     "place": {"type": "str", "default": "canada"},
//! }))?;
//!
//! let mut store = Store::open(StoreConfig {
//!     name: "people".into(),
//!     schema: Some(schema),
//!     ..Default::default()
//! })?;
//!
//! let ids = store.add(vec![[
//!     ("name".to_string(), "ab".into()),
//!     ("age".to_string(), 3.into()),
//! ].into_iter().collect()])?;
//!
//! store.commit()?;
//! ```

pub mod error;
pub mod identity;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use identity::{assign_id, content_hash};
pub use snapshot::SnapshotStore;
pub use store::{Store, StoreConfig};
pub use types::{FieldSpec, FieldType, Record, RecordId, Schema, Table, Value};
