//! Per-chunk subject interning.
//!
//! A subject that lands in several buckets is stored once; bucket sets hold
//! 4-byte ids instead of strings.

use ahash::AHashMap;
use std::sync::Arc;

/// Interned subject id (4 bytes instead of 16+ for `Box<str>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SubjectId(u32);

/// Single-owner interner; one lives inside each chunk worker.
#[derive(Debug, Default)]
pub struct SubjectInterner {
    str_to_id: AHashMap<Arc<str>, SubjectId>,
    id_to_str: Vec<Arc<str>>,
}

impl SubjectInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its id.
    pub fn intern(&mut self, s: &str) -> SubjectId {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }
        let id = SubjectId(self.id_to_str.len() as u32);
        let shared: Arc<str> = Arc::from(s);
        self.id_to_str.push(Arc::clone(&shared));
        self.str_to_id.insert(shared, id);
        id
    }

    pub fn resolve(&self, id: SubjectId) -> &str {
        &self.id_to_str[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }
}
