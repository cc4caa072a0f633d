//! Content-hash identity assignment.
//!
//! A record's id is the first 8 hex characters of the SHA-256 digest of its
//! field values rendered in schema order and concatenated WITHOUT a
//! delimiter. The missing delimiter means `["1","23"]` and `["12","3"]`
//! hash identically; persisted tables depend on these literal digests, so
//! the concatenation must never grow a separator.

use crate::error::{Result, StoreError};
use crate::types::RecordId;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Length of a record id in hex characters.
pub const ID_LEN: usize = 8;

/// Bound on the salted retry loop. A fresh random u64 per attempt makes
/// exhaustion unreachable in practice, but the loop must not be unbounded.
const MAX_SALT_ATTEMPTS: usize = 64;

/// Hash a sequence of rendered field values into a record id.
pub fn content_hash<S: AsRef<str>>(values: &[S]) -> RecordId {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    RecordId::new(hex::encode(&digest[..ID_LEN / 2]))
}

/// Choose an id for a record with the given rendered field values.
///
/// With duplicates disallowed the base hash is returned unconditionally; the
/// caller is responsible for treating an occupied base id as a duplicate.
/// With duplicates allowed, an occupied base id triggers salting: a fresh
/// random integer is appended to the value sequence and the hash recomputed
/// until an unoccupied candidate emerges. `occupied` must include any ids
/// already chosen earlier in the same batch.
pub fn assign_id(
    values: &[String],
    occupied: &HashSet<RecordId>,
    allow_duplicates: bool,
) -> Result<RecordId> {
    let base = content_hash(values);
    if !allow_duplicates || !occupied.contains(&base) {
        return Ok(base);
    }

    let mut rng = rand::thread_rng();
    let mut salted: Vec<String> = values.to_vec();
    for _ in 0..MAX_SALT_ATTEMPTS {
        salted.push(rng.gen::<u64>().to_string());
        let candidate = content_hash(&salted);
        if !occupied.contains(&candidate) {
            return Ok(candidate);
        }
    }

    Err(StoreError::Duplicate(format!(
        "could not find a free id for colliding content after {MAX_SALT_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_content_hash_reference_vectors() {
        assert_eq!(content_hash(&["Hello", "World"]).as_str(), "872e4e50");
        assert_eq!(
            content_hash(&["ad", "4", "high school"]).as_str(),
            "1199e3f8"
        );
        assert_eq!(
            content_hash(&["python", "test", "param", "3"]).as_str(),
            "411996b0"
        );
    }

    #[test]
    fn test_content_hash_is_delimiter_free() {
        // Boundary placement does not matter. Load-bearing compatibility
        // behavior, not an oversight.
        assert_eq!(content_hash(&["1", "23"]), content_hash(&["12", "3"]));
        assert_eq!(content_hash(&["ab", "3"]), content_hash(&["a", "b3"]));
    }

    #[test]
    fn test_assign_id_returns_base_when_duplicates_disallowed() {
        let values = vec!["ab".to_string(), "3".to_string()];
        let mut occupied = HashSet::new();
        occupied.insert(content_hash(&values));

        // Occupied or not, the base hash comes back; duplicate detection is
        // the caller's job.
        let id = assign_id(&values, &occupied, false).unwrap();
        assert_eq!(id, content_hash(&values));
    }

    #[test]
    fn test_assign_id_salts_when_duplicates_allowed() {
        let values = vec!["ab".to_string(), "3".to_string()];
        let base = content_hash(&values);
        let mut occupied = HashSet::new();
        occupied.insert(base.clone());

        let id = assign_id(&values, &occupied, true).unwrap();
        assert_ne!(id, base);
        assert_eq!(id.as_str().len(), ID_LEN);
    }

    #[test]
    fn test_assign_id_unoccupied_base_passes_through() {
        let values = vec!["ab".to_string(), "3".to_string()];
        let id = assign_id(&values, &HashSet::new(), true).unwrap();
        assert_eq!(id, content_hash(&values));
    }

    proptest! {
        #[test]
        fn prop_hash_is_deterministic(values in proptest::collection::vec(".*", 0..6)) {
            prop_assert_eq!(content_hash(&values), content_hash(&values));
        }

        #[test]
        fn prop_hash_is_lowercase_hex(values in proptest::collection::vec(".*", 0..6)) {
            let id = content_hash(&values);
            prop_assert_eq!(id.as_str().len(), ID_LEN);
            prop_assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }

        #[test]
        fn prop_salted_ids_stay_unique(n in 1usize..20) {
            let values = vec!["same".to_string(), "content".to_string()];
            let mut occupied = HashSet::new();
            for _ in 0..n {
                let id = assign_id(&values, &occupied, true).unwrap();
                prop_assert!(occupied.insert(id));
            }
        }
    }
}
