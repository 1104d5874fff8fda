//! kgpartition CLI
//!
//! Command-line interface for:
//! - partitioning N-Triples chunks into backbone + per-bucket subject lists
//! - extracting only the backbone
//! - merging per-chunk partials into final bucket files
//! - inspecting a bucket directory

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kgpartition_core::{
    concat_backbone, discover_chunks, merge_partials, BucketIndex, MergeOptions, MergeReport,
    OutputDirs, ParseMode, PartitionConfig, Partitioner, RunSummary,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "kgpartition")]
#[command(
    author,
    version,
    about = "Partition knowledge-graph dumps into an ontology backbone and per-bucket subject lists"
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every chunk once: backbone edges + bucket memberships.
    Partition {
        /// Directory containing `chunk_*` N-Triples files
        chunks_dir: PathBuf,
        /// Directory containing one bucket definition file per bucket
        buckets_dir: PathBuf,
        /// Output directory for per-chunk subject partials
        subjects_dir: PathBuf,
        /// Output directory for per-chunk backbone files
        backbone_dir: Option<PathBuf>,
        /// File listing notable subjects (first field per line)
        #[arg(long)]
        quality_filter: Option<PathBuf>,
        /// Skip writing backbone files
        #[arg(long)]
        no_backbone: bool,
        /// Skip writing bucket memberships
        #[arg(long)]
        no_membership: bool,
        #[command(flatten)]
        run: RunArgs,
        /// Write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Extract subclass-of / part-of edges into a single backbone file.
    Backbone {
        /// Directory containing `chunk_*` N-Triples files
        chunks_dir: PathBuf,
        /// Concatenated backbone output file
        backbone_out: PathBuf,
        /// Directory for per-chunk backbone files (default: `<backbone_out>.parts`)
        #[arg(long)]
        parts_dir: Option<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Union per-chunk partials into one sorted, deduplicated file per bucket.
    Merge {
        /// Output directory for merged bucket files
        out_dir: PathBuf,
        /// Directories searched recursively for `<bucket>.tsv` partials
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Fold the existing merged files into the union
        #[arg(long)]
        incremental: bool,
        /// Maximum buckets merged concurrently (0 = available parallelism)
        #[arg(long, default_value_t = 0)]
        jobs: usize,
    },

    /// Show the buckets defined in a directory.
    Buckets {
        /// Directory containing bucket definition files
        buckets_dir: PathBuf,
        /// Bucket file extension
        #[arg(long, default_value = "tsv")]
        extension: String,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// JSON config file (predicates, reserved names, defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Abort a chunk on the first malformed line instead of skipping it
    #[arg(long)]
    strict: bool,
    /// Maximum chunks processed concurrently (0 = available parallelism)
    #[arg(long)]
    jobs: Option<usize>,
}

impl RunArgs {
    fn to_config(&self) -> Result<PartitionConfig> {
        let mut config = match &self.config {
            Some(path) => PartitionConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PartitionConfig::default(),
        };
        if self.strict {
            config.mode = ParseMode::Strict;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        Ok(config)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Partition {
            chunks_dir,
            buckets_dir,
            subjects_dir,
            backbone_dir,
            quality_filter,
            no_backbone,
            no_membership,
            run,
            summary,
        } => {
            let mut config = run.to_config()?;
            if no_backbone {
                config.emit_backbone = false;
            }
            if no_membership {
                config.emit_membership = false;
            }
            cmd_partition(
                &chunks_dir,
                &buckets_dir,
                &subjects_dir,
                backbone_dir.as_ref(),
                quality_filter.as_ref(),
                config,
                summary.as_ref(),
            )
        }
        Commands::Backbone {
            chunks_dir,
            backbone_out,
            parts_dir,
            run,
        } => {
            let config = run.to_config()?;
            cmd_backbone(&chunks_dir, &backbone_out, parts_dir.as_ref(), config)
        }
        Commands::Merge {
            out_dir,
            inputs,
            incremental,
            jobs,
        } => cmd_merge(&out_dir, &inputs, incremental, jobs),
        Commands::Buckets {
            buckets_dir,
            extension,
        } => cmd_buckets(&buckets_dir, &extension),
    }
}

fn cmd_partition(
    chunks_dir: &PathBuf,
    buckets_dir: &PathBuf,
    subjects_dir: &PathBuf,
    backbone_dir: Option<&PathBuf>,
    quality_filter: Option<&PathBuf>,
    config: PartitionConfig,
    summary_out: Option<&PathBuf>,
) -> Result<()> {
    println!(
        "{} {} → {}",
        "Partitioning".green().bold(),
        chunks_dir.display(),
        subjects_dir.display()
    );
    let started = Instant::now();

    let chunks = discover_chunks(chunks_dir, &config.chunk_prefix)?;
    let partitioner = Partitioner::load(config, buckets_dir, quality_filter.map(PathBuf::as_path))?;

    println!(
        "  {} buckets, {} classes ({} in several buckets)",
        partitioner.buckets().len(),
        partitioner.buckets().class_count(),
        partitioner.buckets().multi_bucket_class_count()
    );
    if let Some(filter) = partitioner.quality_filter() {
        println!("  {} subjects in quality filter", filter.len());
    }
    println!("  {} chunks", chunks.len());

    let out = OutputDirs {
        subjects_dir: Some(subjects_dir.clone()),
        backbone_dir: backbone_dir.cloned(),
    };
    let summary = partitioner.run(&chunks, &out)?;

    print_run_summary(&summary);
    println!("  elapsed: {:.1}s", started.elapsed().as_secs_f64());

    if let Some(path) = summary_out {
        write_json(path, &summary)?;
        println!("  summary: {}", path.display());
    }
    finish_run(&summary)
}

fn cmd_backbone(
    chunks_dir: &PathBuf,
    backbone_out: &PathBuf,
    parts_dir: Option<&PathBuf>,
    mut config: PartitionConfig,
) -> Result<()> {
    println!(
        "{} {} → {}",
        "Extracting backbone".green().bold(),
        chunks_dir.display(),
        backbone_out.display()
    );

    config.emit_backbone = true;
    config.emit_membership = false;
    let parts_dir = parts_dir.cloned().unwrap_or_else(|| {
        let mut name = backbone_out.as_os_str().to_os_string();
        name.push(".parts");
        PathBuf::from(name)
    });

    let chunks = discover_chunks(chunks_dir, &config.chunk_prefix)?;
    let partitioner = Partitioner::new(config, BucketIndex::default(), None)?;
    let out = OutputDirs {
        subjects_dir: None,
        backbone_dir: Some(parts_dir.clone()),
    };
    let summary = partitioner.run(&chunks, &out)?;
    fs::create_dir_all(&parts_dir)?;
    let lines = concat_backbone(&parts_dir, backbone_out)?;

    println!("  chunks: {}/{}", summary.chunks_succeeded, summary.chunks_total);
    println!("  backbone triples: {lines}");
    println!("  written to: {}", backbone_out.display());
    finish_run(&summary)
}

fn cmd_merge(out_dir: &PathBuf, inputs: &[PathBuf], incremental: bool, jobs: usize) -> Result<()> {
    println!(
        "{} {} input dir(s) → {}",
        "Merging".green().bold(),
        inputs.len(),
        out_dir.display()
    );

    let options = MergeOptions {
        include_existing: incremental,
        jobs,
    };
    let report = merge_partials(inputs, out_dir, &options)?;
    print_merge_report(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} bucket(s) failed to merge", report.failed.len()))
    }
}

fn cmd_buckets(buckets_dir: &PathBuf, extension: &str) -> Result<()> {
    let index = BucketIndex::load_dir(buckets_dir, extension)?;
    println!(
        "{} {} ({} buckets, {} distinct classes)",
        "Buckets".green().bold(),
        buckets_dir.display(),
        index.len(),
        index.class_count()
    );
    for id in index.ids() {
        let size = index.size(id);
        let line = format!("  {:<40} {:>10}", index.name(id), size);
        if size == 0 {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
    println!(
        "  classes declared by several buckets: {}",
        index.multi_bucket_class_count()
    );
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!();
    println!("{}", "Summary".bold());
    println!(
        "  chunks:                  {}/{}",
        summary.chunks_succeeded, summary.chunks_total
    );
    println!("  backbone triples:        {}", stats.backbone);
    println!("  instance-of triples:     {}", stats.instance_of);
    println!("  filtered (quality):      {}", stats.filtered);
    println!("  kept:                    {}", stats.kept);
    println!(
        "  uncategorized ({}): {}",
        summary.uncategorized_bucket, stats.uncategorized
    );
    if stats.malformed_skipped > 0 {
        println!("  malformed lines skipped: {}", stats.malformed_skipped);
    }
    println!("  files written:           {}", summary.files_written);
    for (bucket, n) in &stats.per_bucket {
        let line = format!("    {bucket:<38} {n:>12}");
        if *n == 0 {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
    println!("  (subjects may appear in several buckets)");

    for failed in &summary.failed {
        println!(
            "  {} {} ({}): {}",
            "FAILED".red().bold(),
            failed.chunk,
            failed.path.display(),
            failed.error
        );
    }
}

fn print_merge_report(report: &MergeReport) {
    for merged in &report.merged {
        println!(
            "  {:<40} {:>10} subjects from {} partial(s)",
            merged.bucket, merged.subjects, merged.partials
        );
    }
    for failed in &report.failed {
        println!(
            "  {} {}: {}",
            "FAILED".red().bold(),
            failed.bucket,
            failed.error
        );
    }
    println!("  merged buckets: {}", report.merged.len());
}

fn finish_run(summary: &RunSummary) -> Result<()> {
    if summary.is_success() {
        println!("{}", "Done".green().bold());
        Ok(())
    } else {
        let names: Vec<&str> = summary.failed.iter().map(|f| f.chunk.as_str()).collect();
        Err(anyhow!(
            "{} chunk(s) failed and should be reprocessed: {}",
            names.len(),
            names.join(", ")
        ))
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
