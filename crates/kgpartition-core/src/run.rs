//! Run driver: loads the shared read-only state once, then fans chunks out
//! to a bounded worker pool.
//!
//! Chunk isolation:
//! - every chunk owns its accumulator and output files,
//! - a failing chunk never publishes its backbone file, never leaves a
//!   half-written file behind, and does not stop its siblings,
//! - the summary names failed chunks so they can be reprocessed; the
//!   idempotent merge makes a retry safe.

use crate::atomic::AtomicFile;
use crate::backbone::backbone_file;
use crate::buckets::BucketIndex;
use crate::chunks::chunk_name;
use crate::classify::{BackboneSink, ChunkOutput, ClassifyStats, Classifier, NoBackbone};
use crate::config::PartitionConfig;
use crate::error::{require_path, IoResultExt, PartitionError, Result};
use crate::output::{write_membership, WrittenBucket};
use crate::quality::QualityFilter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Where per-chunk artifacts go. A `None` directory disables that output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDirs {
    pub subjects_dir: Option<PathBuf>,
    pub backbone_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk: String,
    pub stats: ClassifyStats,
    pub written: Vec<WrittenBucket>,
    pub backbone_path: Option<PathBuf>,
}

/// A chunk that failed, with the reason.
#[derive(Debug, thiserror::Error)]
#[error("chunk {chunk} failed: {source}")]
pub struct ChunkError {
    pub chunk: String,
    pub path: PathBuf,
    #[source]
    pub source: PartitionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub chunk: String,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub chunks_total: usize,
    pub chunks_succeeded: usize,
    pub failed: Vec<FailedChunk>,
    /// Every configured bucket, empty ones included.
    pub buckets: Vec<String>,
    pub uncategorized_bucket: String,
    pub stats: ClassifyStats,
    pub files_written: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Partitioner {
    config: PartitionConfig,
    buckets: BucketIndex,
    filter: Option<QualityFilter>,
}

impl Partitioner {
    pub fn new(
        config: PartitionConfig,
        buckets: BucketIndex,
        filter: Option<QualityFilter>,
    ) -> Result<Self> {
        config.validate()?;
        if buckets.id_of(&config.uncategorized_bucket).is_some() {
            return Err(PartitionError::InvalidConfig(format!(
                "bucket `{}` collides with the reserved uncategorized bucket",
                config.uncategorized_bucket
            )));
        }
        Ok(Self {
            config,
            buckets,
            filter,
        })
    }

    /// Build the bucket index and (optionally) the quality filter from disk.
    pub fn load(
        config: PartitionConfig,
        buckets_dir: &Path,
        quality_filter: Option<&Path>,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(path) = quality_filter {
            require_path("quality filter file", path)?;
        }
        let buckets = BucketIndex::load_dir(buckets_dir, &config.bucket_extension)?;
        let filter = quality_filter
            .map(|path| QualityFilter::load(path, config.entity_namespace.as_deref()))
            .transpose()?;
        Self::new(config, buckets, filter)
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn buckets(&self) -> &BucketIndex {
        &self.buckets
    }

    pub fn quality_filter(&self) -> Option<&QualityFilter> {
        self.filter.as_ref()
    }

    pub fn classifier(&self) -> Classifier<'_> {
        Classifier::new(&self.config, &self.buckets, self.filter.as_ref())
    }

    /// Classify one chunk and write its artifacts.
    pub fn process_chunk(&self, chunk: &Path, out: &OutputDirs) -> std::result::Result<ChunkReport, ChunkError> {
        let name = chunk_name(chunk);
        self.process_chunk_inner(chunk, &name, out)
            .map_err(|source| ChunkError {
                chunk: name,
                path: chunk.to_path_buf(),
                source,
            })
    }

    fn process_chunk_inner(&self, chunk: &Path, name: &str, out: &OutputDirs) -> Result<ChunkReport> {
        let started = Instant::now();
        let reader = BufReader::with_capacity(1 << 20, std::fs::File::open(chunk).at(chunk)?);

        let backbone_dir = out
            .backbone_dir
            .as_deref()
            .filter(|_| self.config.emit_backbone);

        // The backbone guard stays uncommitted until memberships are on disk;
        // dropping it on any error below discards the temporary file.
        let mut backbone = backbone_dir
            .map(|dir| AtomicFile::create(&backbone_file(dir, name)))
            .transpose()?;
        let output = match backbone.as_mut() {
            Some(file) => self.classify_into(reader, chunk, file)?,
            None => self.classify_into(reader, chunk, &mut NoBackbone)?,
        };

        let written = match (&output.membership, out.subjects_dir.as_deref()) {
            (Some(membership), Some(dir)) => write_membership(
                membership,
                &self.buckets,
                &self.config.uncategorized_bucket,
                &dir.join(name),
            )?,
            _ => Vec::new(),
        };
        let backbone_path = backbone.map(AtomicFile::commit).transpose()?;

        let stats = output.stats;
        tracing::info!(
            chunk = name,
            lines = stats.lines,
            backbone = stats.backbone,
            instance_of = stats.instance_of,
            filtered = stats.filtered,
            kept = stats.kept,
            uncategorized = stats.uncategorized,
            files = written.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chunk done"
        );

        Ok(ChunkReport {
            chunk: name.to_string(),
            stats,
            written,
            backbone_path,
        })
    }

    fn classify_into<S: BackboneSink + ?Sized>(
        &self,
        reader: BufReader<std::fs::File>,
        chunk: &Path,
        sink: &mut S,
    ) -> Result<ChunkOutput> {
        self.classifier().classify(reader, chunk, sink)
    }

    /// Process `chunks` with at most `config.jobs` workers in flight.
    ///
    /// Only pool setup or duplicate chunk names fail the whole call; chunk
    /// failures are collected into the summary.
    pub fn run(&self, chunks: &[PathBuf], out: &OutputDirs) -> Result<RunSummary> {
        let mut seen = BTreeSet::new();
        for chunk in chunks {
            let name = chunk_name(chunk);
            if !seen.insert(name.clone()) {
                return Err(PartitionError::InvalidConfig(format!(
                    "two input chunks share the name `{name}`"
                )));
            }
        }

        let jobs = self.config.effective_jobs();
        tracing::info!(chunks = chunks.len(), jobs, buckets = self.buckets.len(), "partitioning");

        let results: Vec<std::result::Result<ChunkReport, ChunkError>> =
            if jobs <= 1 || chunks.len() <= 1 {
                chunks.iter().map(|c| self.process_chunk(c, out)).collect()
            } else {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|e| PartitionError::InvalidConfig(format!("rayon pool: {e}")))?;
                pool.install(|| {
                    chunks
                        .par_iter()
                        .map(|c| self.process_chunk(c, out))
                        .collect()
                })
            };

        Ok(self.summarize(results))
    }

    fn summarize(
        &self,
        results: Vec<std::result::Result<ChunkReport, ChunkError>>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            chunks_total: results.len(),
            buckets: self.buckets.names().to_vec(),
            uncategorized_bucket: self.config.uncategorized_bucket.clone(),
            ..RunSummary::default()
        };
        summary.stats.per_bucket = self
            .buckets
            .names()
            .iter()
            .map(|n| (n.clone(), 0))
            .collect();

        for result in results {
            match result {
                Ok(report) => {
                    summary.chunks_succeeded += 1;
                    summary.files_written += report.written.len();
                    summary.stats.absorb(&report.stats);
                }
                Err(err) => {
                    tracing::warn!(chunk = %err.chunk, error = %err.source, "chunk failed");
                    summary.failed.push(FailedChunk {
                        chunk: err.chunk,
                        path: err.path,
                        error: err.source.to_string(),
                    });
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;

    const P31: &str = "<http://www.wikidata.org/prop/direct/P31>";
    const P279: &str = "<http://www.wikidata.org/prop/direct/P279>";

    fn partitioner(mode: ParseMode) -> Partitioner {
        let buckets = BucketIndex::builder()
            .bucket("science", ["<Q901>"])
            .unwrap()
            .bucket("idle", ["<Q000>"])
            .unwrap()
            .build();
        let config = PartitionConfig {
            mode,
            jobs: 2,
            ..PartitionConfig::default()
        };
        Partitioner::new(config, buckets, None).unwrap()
    }

    #[test]
    fn reserved_name_collision_is_rejected() {
        let buckets = BucketIndex::builder()
            .bucket("P31_other", ["<Q1>"])
            .unwrap()
            .build();
        let err = Partitioner::new(PartitionConfig::default(), buckets, None)
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn failing_chunk_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        std::fs::create_dir(&chunks).unwrap();
        let good = chunks.join("chunk_0.nt");
        let bad = chunks.join("chunk_1.nt");
        std::fs::write(&good, format!("<Q1> {P31} <Q901> .\n<Q1> {P279} <Q2> .\n")).unwrap();
        std::fs::write(&bad, format!("<Q3> {P279} <Q4> .\nbroken\n")).unwrap();

        let out = OutputDirs {
            subjects_dir: Some(dir.path().join("subjects")),
            backbone_dir: Some(dir.path().join("backbone")),
        };
        let summary = partitioner(ParseMode::Strict)
            .run(&[good, bad.clone()], &out)
            .unwrap();

        assert_eq!(summary.chunks_total, 2);
        assert_eq!(summary.chunks_succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].chunk, "chunk_1");
        assert_eq!(summary.failed[0].path, bad);
        assert_eq!(summary.buckets, vec!["idle".to_string(), "science".to_string()]);
        assert_eq!(summary.stats.per_bucket["idle"], 0);
        assert_eq!(summary.stats.per_bucket["science"], 1);

        assert!(dir.path().join("subjects/chunk_0/science.tsv").exists());
        assert!(dir.path().join("backbone/chunk_0.nt").exists());
        assert!(!dir.path().join("backbone/chunk_1.nt").exists());
        assert!(!dir.path().join("backbone/chunk_1.nt.tmp").exists());
        assert!(!dir.path().join("subjects/chunk_1").exists());
    }

    #[test]
    fn membership_write_failure_discards_backbone() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = dir.path().join("chunk_0.nt");
        std::fs::write(&chunk, format!("<Q1> {P31} <Q901> .\n<Q1> {P279} <Q2> .\n")).unwrap();
        // a regular file where the chunk's subject directory should go
        let subjects = dir.path().join("subjects");
        std::fs::create_dir(&subjects).unwrap();
        std::fs::write(subjects.join("chunk_0"), "").unwrap();

        let out = OutputDirs {
            subjects_dir: Some(subjects),
            backbone_dir: Some(dir.path().join("backbone")),
        };
        let summary = partitioner(ParseMode::Lenient).run(&[chunk], &out).unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].chunk, "chunk_0");
        assert!(!dir.path().join("backbone/chunk_0.nt").exists());
        assert!(!dir.path().join("backbone/chunk_0.nt.tmp").exists());
    }

    #[test]
    fn duplicate_chunk_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a/chunk_0.nt");
        let b = dir.path().join("b/chunk_0.nt");
        let err = partitioner(ParseMode::Lenient)
            .run(&[a, b], &OutputDirs::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_chunk_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let summary = partitioner(ParseMode::Lenient)
            .run(&[dir.path().join("chunk_9.nt")], &OutputDirs::default())
            .unwrap();
        assert!(!summary.is_success());
        assert!(summary.failed[0].error.contains("chunk_9.nt"));
    }
}
