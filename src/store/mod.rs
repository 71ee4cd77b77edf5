//! Tag-index persistence — incremental, crash-safe snapshots.
//!
//! The artifact is a pretty-printed JSON object mapping document
//! identifier → ordered tag list. Every commit replaces it atomically via
//! a sibling temp file, so a run killed mid-pass leaves the last complete
//! snapshot behind and loses at most the in-flight document.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Persisted mapping: document identifier → ordered tag list.
///
/// `BTreeMap` keys give the artifact a stable key order, so an unchanged
/// corpus rewrites byte-identically.
pub type TagIndex = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Positional comparison of two index snapshots.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexDiff {
    /// Identifiers added or whose tag sequence changed (reorderings count).
    pub updated: Vec<String>,
    /// Identifiers present before and gone now.
    pub removed: Vec<String>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of the final reconciliation pass.
#[derive(Debug, Default)]
pub struct FinalizeReport {
    pub diff: IndexDiff,
    /// Identifiers pruned because the unfiltered pass no longer saw them.
    pub pruned: Vec<String>,
    /// False under dry-run.
    pub written: bool,
}

/// Owns the tag-index artifact for the duration of a run.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted index. A missing artifact is an empty index;
    /// malformed content is an empty index plus a warning. Never fails.
    pub fn read(&self) -> TagIndex {
        if !self.path.exists() {
            return TagIndex::new();
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not read tag index; starting empty"
                );
                return TagIndex::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "malformed tag index; starting empty"
                );
                TagIndex::new()
            }
        }
    }

    /// Snapshot the in-memory index to disk, replacing the artifact
    /// atomically. Called after every document's merge completes.
    pub fn commit(&self, index: &TagIndex, reason: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(index)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, format!("{data}\n"))?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            entries = index.len(),
            reason,
            "committed tag index"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tag-index.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Positional sequence comparison — not set equality; a reordering of
    /// a document's tags counts as a change.
    pub fn diff(previous: &TagIndex, next: &TagIndex) -> IndexDiff {
        let mut diff = IndexDiff::default();
        for (id, tags) in next {
            if previous.get(id) != Some(tags) {
                diff.updated.push(id.clone());
            }
        }
        for id in previous.keys() {
            if !next.contains_key(id) {
                diff.removed.push(id.clone());
            }
        }
        diff
    }

    /// Reconcile the index after a full pass.
    ///
    /// Identifiers the pass did not produce are pruned only when no filter
    /// was active: a filtered or partial pass must never delete entries it
    /// did not examine. Dry-run reports the diff without writing.
    pub fn finalize(
        &self,
        index: &TagIndex,
        seen: &HashSet<String>,
        filter_active: bool,
        dry_run: bool,
    ) -> Result<FinalizeReport, StoreError> {
        let mut next = index.clone();
        let mut pruned = Vec::new();
        if !filter_active {
            next.retain(|id, _| {
                let keep = seen.contains(id);
                if !keep {
                    pruned.push(id.clone());
                }
                keep
            });
        }

        let previous = self.read();
        let diff = Self::diff(&previous, &next);

        if dry_run {
            debug!(
                updated = diff.updated.len(),
                removed = diff.removed.len(),
                "dry-run finalize; index not written"
            );
            return Ok(FinalizeReport {
                diff,
                pruned,
                written: false,
            });
        }

        self.commit(&next, "finalize")?;
        Ok(FinalizeReport {
            diff,
            pruned,
            written: true,
        })
    }
}
