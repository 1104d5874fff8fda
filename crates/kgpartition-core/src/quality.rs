//! Quality filter set ("has at least one sitelink").
//!
//! This is the largest in-memory structure of a run (tens of millions of
//! entries for a full Wikidata dump), so keys inside the configured entity
//! namespace are stored by their local name only:
//!
//! ```text
//! <http://www.wikidata.org/entity/Q42>   ->  "Q42"      (folded)
//! <http://example.org/thing>             ->  verbatim   (unfolded)
//! ```
//!
//! Lookups fold the queried token the same way, so membership is exactly
//! equivalent to a set of the raw tokens.

use crate::error::{IoResultExt, Result};
use ahash::AHashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct QualityFilter {
    /// `<` + namespace, precomputed for prefix tests.
    open_prefix: Option<String>,
    folded: AHashSet<Box<str>>,
    verbatim: AHashSet<Box<str>>,
}

impl QualityFilter {
    pub fn new(entity_namespace: Option<&str>) -> Self {
        Self {
            open_prefix: entity_namespace
                .filter(|ns| !ns.is_empty())
                .map(|ns| format!("<{ns}")),
            folded: AHashSet::new(),
            verbatim: AHashSet::new(),
        }
    }

    /// Load the first whitespace-delimited token of every line of `path`.
    pub fn load(path: &Path, entity_namespace: Option<&str>) -> Result<Self> {
        let file = std::fs::File::open(path).at(path)?;
        let mut filter = Self::new(entity_namespace);
        let skipped = filter.extend_from_reader(BufReader::new(file)).at(path)?;
        if skipped > 0 {
            tracing::debug!(path = %path.display(), skipped, "skipped non UTF-8 filter lines");
        }
        tracing::info!(
            path = %path.display(),
            entries = filter.len(),
            folded = filter.folded.len(),
            "loaded quality filter"
        );
        Ok(filter)
    }

    /// Returns the number of lines skipped for not being valid UTF-8; only
    /// read failures are errors.
    pub fn extend_from_reader<R: BufRead>(&mut self, mut reader: R) -> std::io::Result<u64> {
        let mut buf: Vec<u8> = Vec::with_capacity(128);
        let mut skipped = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                skipped += 1;
                continue;
            };
            if let Some(token) = line.split_whitespace().next() {
                self.insert(token);
            }
        }
        Ok(skipped)
    }

    pub fn insert(&mut self, token: &str) -> bool {
        match self.fold(token) {
            Some(local) => self.folded.insert(local.into()),
            None => self.verbatim.insert(token.into()),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        match self.fold(token) {
            Some(local) => self.folded.contains(local),
            None => self.verbatim.contains(token),
        }
    }

    pub fn len(&self) -> usize {
        self.folded.len() + self.verbatim.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fold<'a>(&self, token: &'a str) -> Option<&'a str> {
        let prefix = self.open_prefix.as_deref()?;
        token
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix('>'))
            .filter(|local| !local.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://www.wikidata.org/entity/";

    #[test]
    fn folding_is_transparent_to_lookups() {
        let mut filter = QualityFilter::new(Some(NS));
        assert!(filter.insert("<http://www.wikidata.org/entity/Q42>"));
        assert!(filter.insert("<http://example.org/Q42>"));
        assert!(!filter.insert("<http://www.wikidata.org/entity/Q42>"));

        assert!(filter.contains("<http://www.wikidata.org/entity/Q42>"));
        assert!(filter.contains("<http://example.org/Q42>"));
        // the local name alone was never inserted
        assert!(!filter.contains("Q42"));
        assert!(!filter.contains("<http://www.wikidata.org/entity/Q43>"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn bare_namespace_is_not_folded_to_empty() {
        let mut filter = QualityFilter::new(Some(NS));
        filter.insert("<http://www.wikidata.org/entity/>");
        assert!(filter.contains("<http://www.wikidata.org/entity/>"));
        assert!(!filter.contains("<http://www.wikidata.org/entity/Q1>"));
    }

    #[test]
    fn only_first_field_is_significant() {
        let text = "<http://www.wikidata.org/entity/Q1>\t12\n\n   \n<http://www.wikidata.org/entity/Q2> enwiki dewiki\n";
        let mut filter = QualityFilter::new(None);
        filter.extend_from_reader(text.as_bytes()).unwrap();
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("<http://www.wikidata.org/entity/Q2>"));
    }

    #[test]
    fn non_utf8_line_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitelinks.tsv");
        std::fs::write(&path, b"Q1\nQ\xff\xfe\nQ2\n").unwrap();
        let filter = QualityFilter::load(&path, Some(NS)).unwrap();
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("Q1"));
        assert!(filter.contains("Q2"));

        let mut filter = QualityFilter::new(None);
        let skipped = filter
            .extend_from_reader(&b"<a>\t1\n\xc3\x28\n<b>"[..])
            .unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn loading_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitelinks.tsv");
        std::fs::write(&path, "<http://www.wikidata.org/entity/Q1>\n<http://www.wikidata.org/entity/Q1>\n").unwrap();
        let a = QualityFilter::load(&path, Some(NS)).unwrap();
        let b = QualityFilter::load(&path, Some(NS)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = QualityFilter::load(Path::new("/no/such/sitelinks.tsv"), None).unwrap_err();
        assert!(matches!(err, crate::PartitionError::Io { .. }));
    }
}
