//! kgpartition: single-pass partitioning of knowledge-graph dumps.
//!
//! Splits a large N-Triples dump (many `chunk_*` files) into:
//! - an ontology **backbone**: every subclass-of / part-of statement, verbatim,
//! - per-**bucket** membership lists built from instance-of statements, where a
//!   bucket is an externally supplied set of class IRIs.
//!
//! ```text
//!  buckets/*.tsv ──► BucketIndex ─┐
//!  sitelinks.tsv ──► QualityFilter┤   (built once, shared read-only)
//!                                 ▼
//!  chunk_000 ──► Classifier ──► backbone/chunk_000.nt
//!  chunk_001 ──► Classifier ──► subjects/chunk_001/<bucket>.tsv
//!     ...        (one worker per chunk, bounded pool)
//!                                 │
//!                                 ▼
//!                        merge_partials ──► final/<bucket>.tsv
//! ```
//!
//! The merge is a sorted set union, so partial results can be reduced in
//! any order, incrementally, or more than once.

pub mod atomic;
pub mod backbone;
pub mod buckets;
pub mod chunks;
pub mod classify;
pub mod config;
pub mod error;
pub mod interner;
pub mod merge;
pub mod output;
pub mod quality;
pub mod run;
pub mod triple;

pub use backbone::{concat_backbone, list_backbone_files};
pub use buckets::{BucketId, BucketIndex, BucketIndexBuilder};
pub use chunks::{chunk_name, discover_chunks};
pub use classify::{BackboneSink, ChunkOutput, ClassifyStats, Classifier, Membership, NoBackbone};
pub use config::{ParseMode, PartitionConfig, Predicates};
pub use error::{PartitionError, Result};
pub use merge::{merge_partials, union_partials, MergeOptions, MergeReport, MergedBucket};
pub use output::{write_membership, WrittenBucket};
pub use quality::QualityFilter;
pub use run::{ChunkError, ChunkReport, FailedChunk, OutputDirs, Partitioner, RunSummary};
