//! Per-chunk membership flush.
//!
//! Layout: `<subjects_dir>/<chunk>/<bucket>.tsv`, one subject per line,
//! sorted and deduplicated. Buckets without members get no file.

use crate::atomic::write_lines;
use crate::buckets::BucketIndex;
use crate::classify::Membership;
use crate::error::{IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extension of every per-bucket subject file, partial or merged.
pub const SUBJECTS_EXTENSION: &str = "tsv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenBucket {
    pub bucket: String,
    pub path: PathBuf,
    pub subjects: usize,
}

pub fn subjects_file(dir: &Path, bucket: &str) -> PathBuf {
    dir.join(format!("{bucket}.{SUBJECTS_EXTENSION}"))
}

/// Write one file per non-empty bucket (plus the uncategorized bucket) into
/// `dir`, then remove subject files left in `dir` by an earlier run of the
/// same chunk that this run did not produce.
pub fn write_membership(
    membership: &Membership,
    index: &BucketIndex,
    uncategorized_bucket: &str,
    dir: &Path,
) -> Result<Vec<WrittenBucket>> {
    let mut written = Vec::new();

    for id in index.ids() {
        if membership.bucket_len(id) == 0 {
            continue;
        }
        let bucket = index.name(id);
        let path = subjects_file(dir, bucket);
        let subjects = write_lines(&path, membership.sorted_subjects(id))?;
        written.push(WrittenBucket {
            bucket: bucket.to_string(),
            path,
            subjects,
        });
    }

    if membership.uncategorized_len() > 0 {
        let path = subjects_file(dir, uncategorized_bucket);
        let subjects = write_lines(&path, membership.sorted_uncategorized())?;
        written.push(WrittenBucket {
            bucket: uncategorized_bucket.to_string(),
            path,
            subjects,
        });
    }

    remove_stale(dir, &written)?;
    Ok(written)
}

fn remove_stale(dir: &Path, written: &[WrittenBucket]) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let keep: BTreeSet<&Path> = written.iter().map(|w| w.path.as_path()).collect();
    for entry in std::fs::read_dir(dir).at(dir)? {
        let path = entry.at(dir)?.path();
        let is_subjects = path.extension().and_then(|e| e.to_str()) == Some(SUBJECTS_EXTENSION);
        if is_subjects && path.is_file() && !keep.contains(path.as_path()) {
            tracing::debug!(path = %path.display(), "removing stale partial");
            std::fs::remove_file(&path).at(&path)?;
        }
    }
    Ok(())
}
