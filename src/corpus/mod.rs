//! Corpus scanning — turns a vault directory into an ordered document list.
//!
//! The scan is deterministic (entries sorted by file name), identifiers are
//! forward-slash relative paths regardless of host conventions, and a
//! document that cannot be read or parsed is excluded and counted without
//! failing the pass.

pub mod frontmatter;

pub use frontmatter::{BlockEntry, FrontMatter, FrontMatterError};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("vault root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// One parsed markdown document, immutable within a run.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable forward-slash relative path; primary key into the tag index.
    pub id: String,
    pub title: String,
    /// Tags already declared in the document's front matter.
    pub own_tags: Vec<String>,
    /// Verbatim file contents.
    pub content: String,
    pub front_matter: FrontMatter,
}

/// Upstream filtering applied during the scan.
#[derive(Debug, Clone, Default)]
pub struct CorpusFilter {
    /// Identifier prefixes to restrict the pass to; empty means everything.
    pub path_prefixes: Vec<String>,
    /// Include documents marked `draft: true`.
    pub include_drafts: bool,
}

impl CorpusFilter {
    pub fn matches(&self, id: &str) -> bool {
        self.path_prefixes.is_empty()
            || self.path_prefixes.iter().any(|prefix| id.starts_with(prefix.as_str()))
    }
}

/// Outcome of one pass over the vault.
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub documents: Vec<Document>,
    /// Identifiers (or paths) that could not be read or parsed, with the
    /// reason. These degrade the exit status but never abort the pass.
    pub failures: Vec<(String, String)>,
    /// True when this pass did not examine the whole corpus — a path
    /// filter was set, or at least one draft was actually skipped. Finalize
    /// must not prune under a partial pass.
    pub filter_active: bool,
}

/// Walk the vault and parse every markdown document the filter admits.
pub fn scan_vault(root: &Path, filter: &CorpusFilter) -> Result<CorpusScan, CorpusError> {
    if !root.is_dir() {
        return Err(CorpusError::NotADirectory(root.to_path_buf()));
    }

    let mut scan = CorpusScan {
        filter_active: !filter.path_prefixes.is_empty(),
        ..Default::default()
    };

    let walker = WalkDir::new(root).sort_by_file_name().into_iter();
    for entry in walker.filter_entry(|e| !is_hidden(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let shown = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(path = %shown, error = %err, "could not read vault entry");
                scan.failures.push((shown, err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        let Some(id) = document_id(root, entry.path()) else {
            continue;
        };
        if !filter.matches(&id) {
            continue;
        }

        let content = match fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(err) => {
                warn!(document = %id, error = %err, "skipping unreadable document");
                scan.failures.push((id, err.to_string()));
                continue;
            }
        };
        let front_matter = match frontmatter::parse(&content) {
            Ok(fm) => fm,
            Err(err) => {
                warn!(document = %id, error = %err, "skipping document with malformed front matter");
                scan.failures.push((id, err.to_string()));
                continue;
            }
        };

        if front_matter.draft() && !filter.include_drafts {
            debug!(document = %id, "skipping draft");
            scan.filter_active = true;
            continue;
        }

        let title = front_matter
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(entry.path()));
        let own_tags = front_matter.tags().to_vec();
        scan.documents.push(Document {
            id,
            title,
            own_tags,
            content,
            front_matter,
        });
    }

    debug!(
        documents = scan.documents.len(),
        failures = scan.failures.len(),
        "vault scan complete"
    );
    Ok(scan)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("md") | Some("markdown")
    )
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Relative path joined with forward slashes regardless of host separator.
fn document_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_orders_documents_and_normalizes_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.md", "---\ntags: [two]\n---\n");
        write(dir.path(), "a/nested.md", "---\ntags: [one]\n---\n");
        write(dir.path(), "notes.txt", "not markdown");

        let scan = scan_vault(dir.path(), &CorpusFilter::default()).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a/nested.md", "b.md"]);
        assert!(!scan.filter_active);
        assert!(scan.failures.is_empty());
    }

    #[test]
    fn scan_skips_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".obsidian/cache.md", "ignored");
        write(dir.path(), "kept.md", "body");

        let scan = scan_vault(dir.path(), &CorpusFilter::default()).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["kept.md"]);
    }

    #[test]
    fn path_filter_restricts_and_marks_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "projects/x.md", "body");
        write(dir.path(), "journal/y.md", "body");

        let filter = CorpusFilter {
            path_prefixes: vec!["projects/".to_string()],
            include_drafts: false,
        };
        let scan = scan_vault(dir.path(), &filter).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["projects/x.md"]);
        assert!(scan.filter_active);
    }

    #[test]
    fn skipped_draft_marks_the_pass_as_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "draft.md", "---\ndraft: true\n---\n");
        write(dir.path(), "published.md", "---\ndraft: false\n---\n");

        let scan = scan_vault(dir.path(), &CorpusFilter::default()).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["published.md"]);
        assert!(scan.filter_active);

        let inclusive = CorpusFilter {
            include_drafts: true,
            ..Default::default()
        };
        let scan = scan_vault(dir.path(), &inclusive).unwrap();
        assert_eq!(scan.documents.len(), 2);
        assert!(!scan.filter_active);
    }

    #[test]
    fn malformed_front_matter_is_excluded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.md", "---\ntitle: [unclosed\n---\n");
        write(dir.path(), "good.md", "---\ntitle: fine\n---\n");

        let scan = scan_vault(dir.path(), &CorpusFilter::default()).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["good.md"]);
        assert_eq!(scan.failures.len(), 1);
        assert_eq!(scan.failures[0].0, "bad.md");
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "untitled-note.md", "body only\n");

        let scan = scan_vault(dir.path(), &CorpusFilter::default()).unwrap();
        assert_eq!(scan.documents[0].title, "untitled-note");
        assert!(scan.documents[0].own_tags.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(scan_vault(&gone, &CorpusFilter::default()).is_err());
    }
}
