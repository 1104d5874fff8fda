//! Bucket definitions and the class → buckets reverse index.
//!
//! A bucket is a named set of class IRIs loaded from `<buckets_dir>/<name>.<ext>`.
//! The same class may be declared by several buckets; the reverse index keeps
//! every association, ordered by bucket name, so classification output does
//! not depend on directory listing order.

use crate::config::is_valid_bucket_name;
use crate::error::{require_dir, IoResultExt, PartitionError, Result};
use ahash::{AHashMap, AHashSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Dense bucket handle: index into [`BucketIndex::names`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BucketId(u32);

impl BucketId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct BucketIndex {
    /// Sorted, unique bucket names.
    names: Vec<String>,
    /// Class count per bucket (parallel to `names`).
    sizes: Vec<usize>,
    /// class IRI -> buckets declaring it, ascending by name.
    by_class: AHashMap<Box<str>, Vec<BucketId>>,
}

/// Builder collecting (bucket name, classes) pairs in any order.
#[derive(Debug, Default)]
pub struct BucketIndexBuilder {
    buckets: Vec<(String, AHashSet<Box<str>>)>,
}

impl BucketIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bucket. Declaring the same name twice is a configuration error.
    pub fn bucket<I, S>(mut self, name: &str, classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_bucket(name, classes)?;
        Ok(self)
    }

    pub fn add_bucket<I, S>(&mut self, name: &str, classes: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !is_valid_bucket_name(name) {
            return Err(PartitionError::InvalidConfig(format!(
                "invalid bucket name `{name}`"
            )));
        }
        if self.buckets.iter().any(|(n, _)| n == name) {
            return Err(PartitionError::InvalidConfig(format!(
                "bucket `{name}` declared twice"
            )));
        }
        let set: AHashSet<Box<str>> = classes
            .into_iter()
            .filter_map(|c| {
                let c = c.as_ref().trim();
                (!c.is_empty()).then(|| Box::<str>::from(c))
            })
            .collect();
        self.buckets.push((name.to_string(), set));
        Ok(())
    }

    pub fn build(mut self) -> BucketIndex {
        self.buckets.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut names = Vec::with_capacity(self.buckets.len());
        let mut sizes = Vec::with_capacity(self.buckets.len());
        let mut by_class: AHashMap<Box<str>, Vec<BucketId>> = AHashMap::new();

        for (i, (name, classes)) in self.buckets.into_iter().enumerate() {
            let id = BucketId(i as u32);
            sizes.push(classes.len());
            // Buckets are visited in name order and each class set is
            // duplicate-free, so every list stays sorted and unique.
            for class in classes {
                by_class.entry(class).or_default().push(id);
            }
            names.push(name);
        }

        BucketIndex {
            names,
            sizes,
            by_class,
        }
    }
}

impl BucketIndex {
    pub fn builder() -> BucketIndexBuilder {
        BucketIndexBuilder::new()
    }

    /// Load every `*.{extension}` file directly inside `dir`.
    ///
    /// Empty files still produce a (zero-member) bucket.
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self> {
        require_dir("bucket directory", dir)?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                PartitionError::io(path, e.into())
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if !entry.file_type().is_file() {
                tracing::warn!(path = %path.display(), "skipping non-file bucket entry");
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();

        let mut builder = BucketIndexBuilder::new();
        for path in &files {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    PartitionError::InvalidConfig(format!(
                        "bucket file name is not valid UTF-8: {}",
                        path.display()
                    ))
                })?
                .to_string();
            let file = std::fs::File::open(path).at(path)?;
            let mut classes = Vec::new();
            for line in BufReader::new(file).lines() {
                classes.push(line.at(path)?);
            }
            builder.add_bucket(&name, &classes)?;
            tracing::debug!(bucket = %name, lines = classes.len(), "loaded bucket file");
        }

        let index = builder.build();
        tracing::info!(
            dir = %dir.display(),
            buckets = index.len(),
            classes = index.class_count(),
            multi_bucket_classes = index.multi_bucket_class_count(),
            "built bucket index"
        );
        Ok(index)
    }

    /// All buckets declaring `class`, ascending by name. Empty if none.
    #[inline]
    pub fn lookup(&self, class: &str) -> &[BucketId] {
        self.by_class.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn name(&self, id: BucketId) -> &str {
        &self.names[id.index()]
    }

    pub fn id_of(&self, name: &str) -> Option<BucketId> {
        self.names
            .binary_search_by(|n| n.as_str().cmp(name))
            .ok()
            .map(|i| BucketId(i as u32))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of classes declared by `id`.
    pub fn size(&self, id: BucketId) -> usize {
        self.sizes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = BucketId> + '_ {
        (0..self.names.len() as u32).map(BucketId)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Distinct class IRIs across all buckets.
    pub fn class_count(&self) -> usize {
        self.by_class.len()
    }

    pub fn multi_bucket_class_count(&self) -> usize {
        self.by_class.values().filter(|ids| ids.len() > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_class_maps_to_every_bucket_in_name_order() {
        let index = BucketIndex::builder()
            .bucket("music", ["<Q500>"])
            .unwrap()
            .bucket("arts", ["<Q500>", "<Q501>"])
            .unwrap()
            .build();

        let names: Vec<&str> = index
            .lookup("<Q500>")
            .iter()
            .map(|&id| index.name(id))
            .collect();
        assert_eq!(names, vec!["arts", "music"]);
        assert_eq!(index.lookup("<Q501>").len(), 1);
        assert!(index.lookup("<Q999>").is_empty());
        assert_eq!(index.multi_bucket_class_count(), 1);
    }

    #[test]
    fn blank_lines_and_duplicates_are_ignored() {
        let index = BucketIndex::builder()
            .bucket("science", ["<Q901>", "", "  <Q901>  ", "<Q902>"])
            .unwrap()
            .build();
        let id = index.id_of("science").unwrap();
        assert_eq!(index.size(id), 2);
        assert_eq!(index.lookup("<Q901>"), &[id]);
    }

    #[test]
    fn duplicate_bucket_name_is_rejected() {
        let err = BucketIndex::builder()
            .bucket("a", ["<Q1>"])
            .unwrap()
            .bucket("a", ["<Q2>"])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn load_dir_keeps_empty_buckets_and_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("science.tsv"), "<Q901>\n").unwrap();
        std::fs::write(dir.path().join("empty.tsv"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "<Q901>\n").unwrap();

        let index = BucketIndex::load_dir(dir.path(), "tsv").unwrap();
        assert_eq!(index.names(), &["empty".to_string(), "science".to_string()]);
        let empty = index.id_of("empty").unwrap();
        assert_eq!(index.size(empty), 0);
        assert_eq!(index.lookup("<Q901>").len(), 1);
    }

    #[test]
    fn load_dir_requires_directory() {
        let err = BucketIndex::load_dir(Path::new("/no/such/buckets"), "tsv").unwrap_err();
        assert!(err.is_configuration());
    }
}
