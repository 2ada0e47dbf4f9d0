//! Input records and the index entries built from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::utils::calculate_checksum;

/// Separator used between words of a stable key.
pub const KEY_SEPARATOR: &str = "-";

/// Metadata keys written for every entry; `extra` fields cannot override them.
pub const RESERVED_METADATA_KEYS: [&str; 3] = ["name", "advice", "checksum"];

/// One input item: `description` is embedded, the rest is stored alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(alias = "symptom")]
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub advice: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SourceRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        advice: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            advice: advice.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Metadata stored next to the vector.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata: BTreeMap<String, String> = self
            .extra
            .iter()
            .filter(|(k, _)| !RESERVED_METADATA_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.insert("name".to_string(), self.name.clone());
        metadata.insert("advice".to_string(), self.advice.clone());
        metadata.insert(
            "checksum".to_string(),
            calculate_checksum(&self.description),
        );
        metadata
    }
}

/// Deterministic index key derived from a record name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableKey(String);

impl StableKey {
    /// Lower-case the name and collapse each whitespace run into one separator.
    pub fn derive(name: &str) -> Result<Self, RecordError> {
        let words: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Err(RecordError::InvalidRecord(
                "name is empty after trimming".to_string(),
            ));
        }
        Ok(Self(words.join(KEY_SEPARATOR)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Qdrant point id for this key.
    pub fn point_uuid(&self) -> String {
        use uuid::Uuid;
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.0.as_bytes()).to_string()
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vector with its key and metadata, ready for an index upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertEntry {
    pub key: StableKey,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl UpsertEntry {
    pub fn from_record(key: StableKey, vector: Vec<f32>, record: &SourceRecord) -> Self {
        Self {
            key,
            vector,
            metadata: record.metadata(),
        }
    }
}

/// The two-record dataset the project started from.
pub fn sample_records() -> Vec<SourceRecord> {
    vec![
        SourceRecord::new(
            "Morning Sickness",
            "Nausea and vomiting in early pregnancy.",
            "Eat small meals frequently and stay hydrated.",
        ),
        SourceRecord::new(
            "Fatigue",
            "Feeling tired and exhausted during pregnancy.",
            "Take naps and eat energy-rich foods.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key() {
        let key = StableKey::derive("Morning Sickness").unwrap();
        assert_eq!(key.as_str(), "morning-sickness");
        assert_eq!(key, StableKey::derive("Morning Sickness").unwrap());
    }

    #[test]
    fn test_derive_key_collapses_whitespace_runs() {
        let key = StableKey::derive("  Lower \t Back\n\nPain  ").unwrap();
        assert_eq!(key.as_str(), "lower-back-pain");
        assert_eq!(StableKey::derive("Fatigue").unwrap().as_str(), "fatigue");
    }

    #[test]
    fn test_derive_key_rejects_blank_names() {
        assert!(matches!(
            StableKey::derive(""),
            Err(RecordError::InvalidRecord(_))
        ));
        assert!(StableKey::derive(" \t\n ").is_err());
    }

    #[test]
    fn test_point_uuid_is_deterministic() {
        let a = StableKey::derive("Fatigue").unwrap();
        let b = StableKey::derive("  fatigue ").unwrap();
        assert_eq!(a.point_uuid(), b.point_uuid());
        assert_eq!(a.point_uuid().len(), 36);
        assert_ne!(
            a.point_uuid(),
            StableKey::derive("Headache").unwrap().point_uuid()
        );
    }

    #[test]
    fn test_record_accepts_symptom_alias() {
        let record: SourceRecord = serde_json::from_str(
            r#"{"symptom": "Fatigue", "description": "Tired.", "advice": "Rest."}"#,
        )
        .unwrap();
        assert_eq!(record.name, "Fatigue");
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_metadata_keeps_reserved_keys() {
        let mut record = SourceRecord::new("Headache", "Head pain.", "Drink water.");
        record
            .extra
            .insert("trimester".to_string(), "1st".to_string());
        record
            .extra
            .insert("name".to_string(), "overridden".to_string());

        let metadata = record.metadata();
        assert_eq!(metadata["name"], "Headache");
        assert_eq!(metadata["advice"], "Drink water.");
        assert_eq!(metadata["trimester"], "1st");
        assert_eq!(metadata["checksum"], calculate_checksum("Head pain."));
    }

    #[test]
    fn test_sample_records_have_distinct_keys() {
        let keys: Vec<String> = sample_records()
            .iter()
            .map(|r| StableKey::derive(&r.name).unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["morning-sickness", "fatigue"]);
    }
}
