//! Write-then-rename file guard.
//!
//! Content goes to `<name>.tmp` next to the destination and is renamed into
//! place by [`AtomicFile::commit`]. A guard dropped without commit removes
//! its temporary file, so readers only ever see complete artifacts.

use crate::error::{IoResultExt, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AtomicFile {
    dest: PathBuf,
    tmp: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicFile {
    pub fn create(dest: &Path) -> Result<Self> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).at(parent)?;
        }
        let tmp = tmp_path(dest);
        let file = File::create(&tmp).at(&tmp)?;
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
            writer: Some(BufWriter::with_capacity(1 << 16, file)),
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let tmp = &self.tmp;
        match self.writer.as_mut() {
            Some(w) => w.write_all(bytes).at(tmp),
            None => Ok(()),
        }
    }

    /// Write `line` followed by `\n`.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\n")
    }

    /// Flush, sync and move the file into place.
    pub fn commit(mut self) -> Result<PathBuf> {
        let result = self.finish();
        if result.is_err() {
            let _ = fs::remove_file(&self.tmp);
        }
        result.map(|()| std::mem::take(&mut self.dest))
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| crate::PartitionError::io(&self.tmp, e.into_error()))?;
            file.sync_all().at(&self.tmp)?;
        }
        fs::rename(&self.tmp, &self.dest).at(&self.dest)
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Convenience: atomically replace `dest` with `lines`, one per line.
pub fn write_lines<I, S>(dest: &Path, lines: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut file = AtomicFile::create(dest)?;
    let mut n = 0usize;
    for line in lines {
        file.write_line(line.as_ref())?;
        n += 1;
    }
    file.commit()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/out.tsv");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "old\n").unwrap();

        let n = write_lines(&dest, ["a", "b"]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a\nb\n");
        assert!(!dir.path().join("nested/out.tsv.tmp").exists());
    }

    #[test]
    fn dropped_guard_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bucket.tsv");
        {
            let mut file = AtomicFile::create(&dest).unwrap();
            file.write_line("<Q1>").unwrap();
            // dropped without commit
        }
        assert!(!dest.exists());
        assert!(!dir.path().join("bucket.tsv.tmp").exists());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/c.nt");
        write_lines(&dest, ["x"]).unwrap();
        assert!(dest.exists());
    }
}
