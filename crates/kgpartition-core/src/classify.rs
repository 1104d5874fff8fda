//! Single-pass triple classification.
//!
//! One call to [`Classifier::classify`] consumes one chunk, in order, exactly
//! once:
//!
//! ```text
//! line ──split──► predicate?
//!                  ├─ subclass-of / part-of ──► backbone sink (verbatim)
//!                  ├─ instance-of ──► quality filter ──► reverse index lookup
//!                  │                       │                 ├─ hit  ──► every matching bucket
//!                  │                       └─ reject         └─ miss ──► uncategorized
//!                  └─ other ──► skip
//! ```
//!
//! The kept path does a single hash lookup against [`BucketIndex`]; it never
//! scans buckets, so the cost per line is independent of the bucket count.

use crate::atomic::AtomicFile;
use crate::buckets::{BucketId, BucketIndex};
use crate::config::{ParseMode, PartitionConfig};
use crate::error::{IoResultExt, PartitionError, Result};
use crate::interner::{SubjectId, SubjectInterner};
use crate::quality::QualityFilter;
use crate::triple::{check_backbone_shape, split_line};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

// ============================================================================
// Counters
// ============================================================================

/// Operational counters. They never influence output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyStats {
    /// Physical lines read, blank ones included.
    pub lines: u64,
    /// Lines skipped as unparseable (lenient mode).
    pub malformed_skipped: u64,
    pub backbone: u64,
    pub instance_of: u64,
    /// Instance-of edges whose subject is absent from the quality filter.
    pub filtered: u64,
    /// Instance-of edges that passed the filter (matched or not).
    pub kept: u64,
    pub uncategorized: u64,
    /// Assignments per configured bucket, zero-count buckets included.
    pub per_bucket: BTreeMap<String, u64>,
}

impl ClassifyStats {
    /// Fold another unit's counters into this one.
    pub fn absorb(&mut self, other: &ClassifyStats) {
        self.lines += other.lines;
        self.malformed_skipped += other.malformed_skipped;
        self.backbone += other.backbone;
        self.instance_of += other.instance_of;
        self.filtered += other.filtered;
        self.kept += other.kept;
        self.uncategorized += other.uncategorized;
        for (bucket, n) in &other.per_bucket {
            *self.per_bucket.entry(bucket.clone()).or_default() += n;
        }
    }

    pub fn assignments(&self) -> u64 {
        self.per_bucket.values().sum()
    }
}

// ============================================================================
// Backbone sink
// ============================================================================

/// Destination for verbatim subclass-of / part-of lines.
pub trait BackboneSink {
    fn emit(&mut self, line: &str) -> Result<()>;
}

/// Discards backbone lines (membership-only passes).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackbone;

impl BackboneSink for NoBackbone {
    fn emit(&mut self, _line: &str) -> Result<()> {
        Ok(())
    }
}

impl BackboneSink for AtomicFile {
    fn emit(&mut self, line: &str) -> Result<()> {
        self.write_line(line)
    }
}

impl BackboneSink for Vec<String> {
    fn emit(&mut self, line: &str) -> Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

// ============================================================================
// Membership accumulator
// ============================================================================

/// Bucket → subjects for one processing unit.
///
/// Populated during the pass and only read once the pass is over.
#[derive(Debug)]
pub struct Membership {
    interner: SubjectInterner,
    /// Parallel to the bucket index.
    buckets: Vec<AHashSet<SubjectId>>,
    uncategorized: AHashSet<SubjectId>,
}

impl Membership {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            interner: SubjectInterner::new(),
            buckets: (0..bucket_count).map(|_| AHashSet::new()).collect(),
            uncategorized: AHashSet::new(),
        }
    }

    pub fn assign(&mut self, buckets: &[BucketId], subject: &str) {
        let id = self.interner.intern(subject);
        for bucket in buckets {
            self.buckets[bucket.index()].insert(id);
        }
    }

    pub fn assign_uncategorized(&mut self, subject: &str) {
        let id = self.interner.intern(subject);
        self.uncategorized.insert(id);
    }

    /// Sorted, distinct subjects of one bucket.
    pub fn sorted_subjects(&self, bucket: BucketId) -> Vec<&str> {
        self.sorted(&self.buckets[bucket.index()])
    }

    pub fn sorted_uncategorized(&self) -> Vec<&str> {
        self.sorted(&self.uncategorized)
    }

    pub fn bucket_len(&self, bucket: BucketId) -> usize {
        self.buckets[bucket.index()].len()
    }

    pub fn uncategorized_len(&self) -> usize {
        self.uncategorized.len()
    }

    /// Distinct subjects seen in any bucket, uncategorized included.
    pub fn distinct_subjects(&self) -> usize {
        self.interner.len()
    }

    fn sorted<'s>(&'s self, ids: &AHashSet<SubjectId>) -> Vec<&'s str> {
        let mut out: Vec<&str> = ids.iter().map(|&id| self.interner.resolve(id)).collect();
        out.sort_unstable();
        out
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Everything a pass produces besides the backbone lines.
#[derive(Debug)]
pub struct ChunkOutput {
    pub stats: ClassifyStats,
    /// `None` when membership emission is disabled.
    pub membership: Option<Membership>,
}

/// Shared, read-only view used by every chunk worker.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    config: &'a PartitionConfig,
    buckets: &'a BucketIndex,
    filter: Option<&'a QualityFilter>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        config: &'a PartitionConfig,
        buckets: &'a BucketIndex,
        filter: Option<&'a QualityFilter>,
    ) -> Self {
        Self {
            config,
            buckets,
            filter,
        }
    }

    /// Classify every line of `reader`.
    ///
    /// `origin` only labels read errors. In strict mode the first malformed
    /// line aborts the pass; whatever the sink received must then be thrown
    /// away by the caller.
    pub fn classify<R, S>(&self, mut reader: R, origin: &Path, sink: &mut S) -> Result<ChunkOutput>
    where
        R: BufRead,
        S: BackboneSink + ?Sized,
    {
        let preds = &self.config.predicates;
        let mode = self.config.mode;
        let emit_backbone = self.config.emit_backbone;

        let mut stats = ClassifyStats::default();
        let mut per_bucket = vec![0u64; self.buckets.len()];
        let mut membership = self
            .config
            .emit_membership
            .then(|| Membership::new(self.buckets.len()));

        let mut buf: Vec<u8> = Vec::with_capacity(512);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).at(origin)? == 0 {
                break;
            }
            stats.lines += 1;
            let line_no = stats.lines;

            let text = match std::str::from_utf8(&buf) {
                Ok(text) => text,
                Err(_) if mode == ParseMode::Lenient => {
                    stats.malformed_skipped += 1;
                    continue;
                }
                Err(_) => {
                    return Err(PartitionError::MalformedLine {
                        line_no,
                        reason: "invalid UTF-8",
                        line: String::from_utf8_lossy(&buf).trim().to_string(),
                    })
                }
            };
            let line = text.trim();
            if line.is_empty() {
                continue;
            }

            let Some(triple) = split_line(line, mode, line_no)? else {
                stats.malformed_skipped += 1;
                continue;
            };

            if triple.predicate == preds.instance_of {
                stats.instance_of += 1;
                if let Some(filter) = self.filter {
                    if !filter.contains(triple.subject) {
                        stats.filtered += 1;
                        continue;
                    }
                }
                stats.kept += 1;

                let hits = self.buckets.lookup(triple.object);
                if hits.is_empty() {
                    stats.uncategorized += 1;
                    if let Some(m) = membership.as_mut() {
                        m.assign_uncategorized(triple.subject);
                    }
                } else {
                    for id in hits {
                        per_bucket[id.index()] += 1;
                    }
                    if let Some(m) = membership.as_mut() {
                        m.assign(hits, triple.subject);
                    }
                }
                continue;
            }

            if mode == ParseMode::Strict {
                check_backbone_shape(&triple, line, line_no)?;
            }

            if triple.predicate == preds.subclass_of || triple.predicate == preds.part_of {
                stats.backbone += 1;
                if emit_backbone {
                    sink.emit(line)?;
                }
            }
        }

        stats.per_bucket = self
            .buckets
            .ids()
            .map(|id| (self.buckets.name(id).to_string(), per_bucket[id.index()]))
            .collect();

        Ok(ChunkOutput { stats, membership })
    }
}
