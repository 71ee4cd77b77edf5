//! Front-matter synchronization — writes final tags back into documents.
//!
//! Only the tags entry of a metadata block is ever rewritten; every other
//! field keeps its original source text byte-for-byte, so a sync never
//! produces spurious diffs on dates, quoted strings, or multi-line values.

use crate::corpus::{frontmatter, Document};
use crate::merge::canonicalize;
use crate::store::TagIndex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compare and report without touching disk.
    pub dry_run: bool,
    /// Canonicalize index tags in sorted order before comparing.
    pub sort: bool,
}

/// Per-identifier outcome of one synchronization pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// Referenced by the index but absent from disk.
    pub missing: Vec<String>,
    /// Present on disk but excluded from this pass by an active filter.
    pub filtered_out: Vec<String>,
}

/// Apply the tag index back to the documents' metadata blocks.
///
/// The index's tag list goes through the same normalization/sort the
/// merger uses; a document whose own tags already equal the target is
/// reported `unchanged` and its file is never rewritten.
pub fn apply(
    index: &TagIndex,
    documents: &[Document],
    vault_root: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let by_id: HashMap<&str, &Document> =
        documents.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut report = SyncReport::default();

    for (id, tags) in index {
        let target = canonicalize(tags, options.sort);

        let Some(document) = by_id.get(id.as_str()) else {
            if vault_root.join(id).is_file() {
                debug!(document = %id, "on disk but excluded by the active filter");
                report.filtered_out.push(id.clone());
            } else {
                report.missing.push(id.clone());
            }
            continue;
        };

        if document.own_tags == target {
            report.unchanged.push(id.clone());
            continue;
        }

        if !options.dry_run {
            let rewritten =
                frontmatter::rewrite_tags(&document.content, &document.front_matter, &target);
            let path = vault_root.join(id);
            fs::write(&path, rewritten).map_err(|source| SyncError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
        report.updated.push(id.clone());
    }

    info!(
        updated = report.updated.len(),
        unchanged = report.unchanged.len(),
        missing = report.missing.len(),
        filtered_out = report.filtered_out.len(),
        "front-matter sync complete"
    );
    Ok(report)
}
