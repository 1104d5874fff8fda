//! Run configuration.
//!
//! Defaults target a Wikidata "truthy" N-Triples dump (`P31`/`P279`/`P361`).
//! Every field can be overridden from a JSON file; missing fields fall back to
//! the defaults.

use crate::error::{IoResultExt, PartitionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const WIKIDATA_INSTANCE_OF: &str = "<http://www.wikidata.org/prop/direct/P31>";
pub const WIKIDATA_SUBCLASS_OF: &str = "<http://www.wikidata.org/prop/direct/P279>";
pub const WIKIDATA_PART_OF: &str = "<http://www.wikidata.org/prop/direct/P361>";
pub const WIKIDATA_ENTITY_NAMESPACE: &str = "http://www.wikidata.org/entity/";

pub const DEFAULT_UNCATEGORIZED_BUCKET: &str = "P31_other";

/// The three predicate tokens the classifier recognizes, compared verbatim
/// (brackets included) against the second field of each line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predicates {
    pub instance_of: String,
    pub subclass_of: String,
    pub part_of: String,
}

impl Default for Predicates {
    fn default() -> Self {
        Self {
            instance_of: WIKIDATA_INSTANCE_OF.to_string(),
            subclass_of: WIKIDATA_SUBCLASS_OF.to_string(),
            part_of: WIKIDATA_PART_OF.to_string(),
        }
    }
}

/// How structurally broken lines are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Lines with fewer than three fields are skipped.
    #[default]
    Lenient,
    /// Every line must be `subject predicate object .`; non-instance-of lines
    /// must have URI subject/predicate and a URI or literal object. The first
    /// violation aborts the chunk.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub predicates: Predicates,
    pub mode: ParseMode,
    pub uncategorized_bucket: String,
    pub bucket_extension: String,
    pub chunk_prefix: String,
    pub entity_namespace: Option<String>,
    /// Upper bound on in-flight chunk workers; `0` means available parallelism.
    pub jobs: usize,
    pub emit_backbone: bool,
    pub emit_membership: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            predicates: Predicates::default(),
            mode: ParseMode::Lenient,
            uncategorized_bucket: DEFAULT_UNCATEGORIZED_BUCKET.to_string(),
            bucket_extension: "tsv".to_string(),
            chunk_prefix: "chunk_".to_string(),
            entity_namespace: Some(WIKIDATA_ENTITY_NAMESPACE.to_string()),
            jobs: 0,
            emit_backbone: true,
            emit_membership: true,
        }
    }
}

impl PartitionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PartitionError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.predicates;
        for (name, value) in [
            ("instance_of", &p.instance_of),
            ("subclass_of", &p.subclass_of),
            ("part_of", &p.part_of),
        ] {
            if value.trim().is_empty() || value.contains(char::is_whitespace) {
                return Err(PartitionError::InvalidConfig(format!(
                    "predicate `{name}` must be a single non-empty token"
                )));
            }
        }
        if p.instance_of == p.subclass_of || p.instance_of == p.part_of {
            return Err(PartitionError::InvalidConfig(
                "instance-of predicate must differ from the backbone predicates".to_string(),
            ));
        }
        if !is_valid_bucket_name(&self.uncategorized_bucket) {
            return Err(PartitionError::InvalidConfig(format!(
                "invalid uncategorized bucket name `{}`",
                self.uncategorized_bucket
            )));
        }
        if self.bucket_extension.is_empty() || self.bucket_extension.contains('.') {
            return Err(PartitionError::InvalidConfig(format!(
                "bucket extension must be non-empty and dot-free, got `{}`",
                self.bucket_extension
            )));
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Bucket names become file stems, so they must be usable as one.
pub fn is_valid_bucket_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PartitionConfig =
            serde_json::from_str(r#"{"mode": "strict", "jobs": 4}"#).unwrap();
        assert_eq!(config.mode, ParseMode::Strict);
        assert_eq!(config.jobs, 4);
        assert_eq!(config.predicates, Predicates::default());
        assert_eq!(config.uncategorized_bucket, "P31_other");
        assert!(config.emit_backbone && config.emit_membership);
    }

    #[test]
    fn rejects_colliding_predicates() {
        let mut config = PartitionConfig::default();
        config.predicates.part_of = config.predicates.instance_of.clone();
        assert!(matches!(
            config.validate(),
            Err(PartitionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_path_like_bucket_names() {
        assert!(is_valid_bucket_name("Q488383"));
        assert!(!is_valid_bucket_name("../escape"));
        assert!(!is_valid_bucket_name("two words"));
        assert!(!is_valid_bucket_name(""));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"uncategorized_bucket": "other", "entity_namespace": null}"#)
            .unwrap();
        let config = PartitionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.uncategorized_bucket, "other");
        assert_eq!(config.entity_namespace, None);

        std::fs::write(&path, "{not json").unwrap();
        assert!(PartitionConfig::from_json_file(&path)
            .unwrap_err()
            .is_configuration());
    }
}
