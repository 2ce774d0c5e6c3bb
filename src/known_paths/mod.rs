//! The known-path set — every canonical path pass 1 discovered a payload
//! record for, consulted read-only during pass 2 to decide whether a
//! redirect target is worth keeping as an alias (spec §5, §6).
//!
//! Unlike the teacher's SQLite-backed `LinkIndex`, this is a plain
//! in-memory set: the spec's resource model is a single process, two
//! sequential passes over one archive, with no requirement to persist
//! across runs and an explicit "no temporary files" constraint. `ahash`
//! gives the hashing the teacher already reaches for `dashmap`/caches with,
//! without the write-contention machinery a single-writer, read-only-after
//! structure doesn't need.

use crate::canonical::CanonicalPath;
use ahash::AHashSet;

/// The set of canonical paths that will have a payload entry in the output
/// bundle, built during pass 1 and frozen for pass 2.
#[derive(Debug, Default, Clone)]
pub struct KnownPathSet {
    paths: AHashSet<CanonicalPath>,
}

impl KnownPathSet {
    /// An empty set, ready to be populated during pass 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            paths: AHashSet::default(),
        }
    }

    /// Record that `path` will have a payload entry.
    ///
    /// Returns `false` if `path` was already present — callers that must
    /// reject duplicate payload records (spec: canonical path collisions)
    /// use this to detect the second insertion.
    pub fn insert(&mut self, path: CanonicalPath) -> bool {
        self.paths.insert(path)
    }

    /// Whether `path` has a payload entry.
    #[must_use]
    pub fn contains(&self, path: &CanonicalPath) -> bool {
        self.paths.contains(path)
    }

    /// Number of distinct canonical paths recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no paths have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
