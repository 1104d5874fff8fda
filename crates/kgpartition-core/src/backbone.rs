//! Backbone file handling.
//!
//! Each chunk writes its subclass-of / part-of lines to
//! `<backbone_dir>/<chunk>.nt`; [`concat_backbone`] stitches them together in
//! chunk order.

use crate::atomic::AtomicFile;
use crate::error::{require_dir, IoResultExt, PartitionError, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const BACKBONE_EXTENSION: &str = "nt";

pub fn backbone_file(dir: &Path, chunk: &str) -> PathBuf {
    dir.join(format!("{chunk}.{BACKBONE_EXTENSION}"))
}

/// Per-chunk backbone files directly inside `dir`, sorted by name.
pub fn list_backbone_files(dir: &Path) -> Result<Vec<PathBuf>> {
    require_dir("backbone directory", dir)?;
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            PartitionError::io(path, e.into())
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(BACKBONE_EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenate every per-chunk backbone file of `dir` into `out`.
///
/// Returns the number of lines written. `out` may live inside `dir`; it is
/// never read as one of its own inputs.
pub fn concat_backbone(dir: &Path, out: &Path) -> Result<u64> {
    let files: Vec<PathBuf> = list_backbone_files(dir)?
        .into_iter()
        .filter(|p| p.as_path() != out)
        .collect();
    let mut dest = AtomicFile::create(out)?;
    let mut lines = 0u64;
    let mut buf = Vec::with_capacity(512);

    for path in &files {
        let mut reader = BufReader::new(std::fs::File::open(path).at(path)?);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).at(path)? == 0 {
                break;
            }
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            dest.write_all(&buf)?;
            lines += 1;
        }
    }

    dest.commit()?;
    tracing::info!(files = files.len(), lines, out = %out.display(), "concatenated backbone");
    Ok(lines)
}
