//! Cross-chunk merge reducer.
//!
//! Partials are grouped by file stem (the bucket name) wherever they sit
//! under the input directories. The merged file for a bucket is the sorted,
//! deduplicated union of its partials, which makes the reduction commutative,
//! associative and idempotent: a merged file is itself a valid partial.

use crate::atomic::write_lines;
use crate::error::{require_dir, IoResultExt, PartitionError, Result};
use crate::output::{subjects_file, SUBJECTS_EXTENSION};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Fold the current merged file of each bucket into its union.
    pub include_existing: bool,
    /// Upper bound on buckets merged concurrently; `0` means available
    /// parallelism.
    pub jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedBucket {
    pub bucket: String,
    pub partials: usize,
    pub subjects: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBucket {
    pub bucket: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub merged: Vec<MergedBucket>,
    pub failed: Vec<FailedBucket>,
}

impl MergeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sorted, deduplicated union of any number of partial subject lists.
pub fn union_partials<I, P, S>(partials: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = P>,
    P: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for partial in partials {
        union_into(&mut out, partial);
    }
    out
}

/// Fold one partial into `out`. Every merge path goes through here.
fn union_into<P, S>(out: &mut BTreeSet<String>, partial: P)
where
    P: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for item in partial {
        let item = item.as_ref().trim();
        if !item.is_empty() && !out.contains(item) {
            out.insert(item.to_string());
        }
    }
}

/// Group every `*.tsv` file below `inputs` by stem.
///
/// A directory nested under an input that resolves to `out_dir` is not
/// descended into, so earlier merged files are never read back as partials.
pub fn collect_partials(
    inputs: &[PathBuf],
    out_dir: &Path,
) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let out_canonical = out_dir.canonicalize().ok();
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for input in inputs {
        require_dir("merge input directory", input)?;
        let walker = walkdir::WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0
                    && e.file_type().is_dir()
                    && is_same_dir(e.path(), out_dir, out_canonical.as_deref()))
            });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(input).to_path_buf();
                PartitionError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SUBJECTS_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping partial with non UTF-8 name");
                continue;
            };
            groups
                .entry(stem.to_string())
                .or_default()
                .push(path.to_path_buf());
        }
    }
    for paths in groups.values_mut() {
        paths.sort();
        paths.dedup();
    }
    Ok(groups)
}

fn is_same_dir(dir: &Path, out_dir: &Path, out_canonical: Option<&Path>) -> bool {
    match (dir.canonicalize().ok(), out_canonical) {
        (Some(a), Some(b)) => a == b,
        _ => dir == out_dir,
    }
}

fn read_partial(path: &Path, into: &mut BTreeSet<String>) -> Result<()> {
    let text = std::fs::read_to_string(path).at(path)?;
    union_into(into, text.lines());
    Ok(())
}

/// Merge one bucket's partials into `<out_dir>/<bucket>.tsv`.
pub fn merge_bucket(
    bucket: &str,
    partials: &[PathBuf],
    out_dir: &Path,
    include_existing: bool,
) -> Result<MergedBucket> {
    let dest = subjects_file(out_dir, bucket);
    let mut union = BTreeSet::new();

    let mut sources: Vec<&Path> = partials.iter().map(PathBuf::as_path).collect();
    if include_existing && dest.is_file() && !partials.iter().any(|p| same_file(p, &dest)) {
        sources.push(dest.as_path());
    }
    for path in &sources {
        read_partial(path, &mut union)?;
    }

    let subjects = write_lines(&dest, &union)?;
    tracing::info!(bucket, partials = sources.len(), subjects, "merged bucket");
    Ok(MergedBucket {
        bucket: bucket.to_string(),
        partials: sources.len(),
        subjects,
        path: dest,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Merge every bucket found below `inputs` into `out_dir`.
///
/// Buckets are independent: a failing bucket is reported and the others are
/// still merged.
pub fn merge_partials(
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &MergeOptions,
) -> Result<MergeReport> {
    for input in inputs {
        require_dir("merge input directory", input)?;
    }
    std::fs::create_dir_all(out_dir).at(out_dir)?;
    let groups = collect_partials(inputs, out_dir)?;

    let jobs = if options.jobs > 0 {
        options.jobs
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    };

    let groups: Vec<(String, Vec<PathBuf>)> = groups.into_iter().collect();
    let merge_one = |(bucket, partials): &(String, Vec<PathBuf>)| {
        (
            bucket.clone(),
            merge_bucket(bucket, partials, out_dir, options.include_existing),
        )
    };

    let results: Vec<(String, Result<MergedBucket>)> = if jobs <= 1 || groups.len() <= 1 {
        groups.iter().map(merge_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| PartitionError::InvalidConfig(format!("rayon pool: {e}")))?;
        pool.install(|| groups.par_iter().map(merge_one).collect())
    };

    let mut report = MergeReport::default();
    for (bucket, result) in results {
        match result {
            Ok(merged) => report.merged.push(merged),
            Err(err) => {
                tracing::warn!(bucket = %bucket, error = %err, "bucket merge failed");
                report.failed.push(FailedBucket {
                    bucket,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}
