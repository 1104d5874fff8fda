//! Input chunk discovery.

use crate::error::{require_dir, PartitionError, Result};
use std::path::{Path, PathBuf};

/// Regular files directly inside `dir` whose name starts with `prefix`,
/// sorted by file name.
pub fn discover_chunks(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    require_dir("chunks directory", dir)?;
    let mut chunks = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            PartitionError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let keep = {
            let name = entry.file_name().to_string_lossy();
            name.starts_with(prefix) && !name.ends_with(".tmp")
        };
        if keep {
            chunks.push(entry.into_path());
        }
    }
    Ok(chunks)
}

/// Stable name of a chunk: its file stem.
pub fn chunk_name(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_else(|| path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_prefixed_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["chunk_002.nt", "chunk_001.nt", "other.nt", "chunk_003.nt.tmp"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("chunk_dir")).unwrap();

        let chunks = discover_chunks(dir.path(), "chunk_").unwrap();
        let names: Vec<String> = chunks.iter().map(|p| chunk_name(p)).collect();
        assert_eq!(names, vec!["chunk_001", "chunk_002"]);
    }

    #[test]
    fn missing_directory_is_configuration_error() {
        let err = discover_chunks(Path::new("/no/such/chunks"), "chunk_").unwrap_err();
        assert!(err.is_configuration());
    }
}
