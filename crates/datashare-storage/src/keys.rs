//! Shared key generation for storage backends.
//!
//! Key format: `datasets/{dataset_id}/{filename}`. Both backends use the
//! same layout so a dataset's copies line up across backends during
//! migration and verification.

use uuid::Uuid;

/// Prefix under which all dataset objects live.
pub const DATASET_PREFIX: &str = "datasets";

/// Generate a storage key for the given dataset and filename.
pub fn dataset_key(dataset_id: Uuid, filename: &str) -> String {
    format!("{}/{}/{}", DATASET_PREFIX, dataset_id, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = Uuid::new_v4();
        let key = dataset_key(id, "data.csv");
        assert_eq!(key, format!("datasets/{}/data.csv", id));
    }
}
