//! Tag merging — pure combination of historical, own, and proposed tags.
//!
//! No I/O happens here. The merge is deterministic: same inputs, same
//! output, which is what makes repeated runs over an unchanged corpus
//! byte-identical on disk.

pub mod taxonomy;

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use taxonomy::Taxonomy;

fn separator_runs() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[\s_/]+").unwrap())
}

/// Collapse internal whitespace/underscore/slash runs to single spaces and
/// trim. An all-separator input normalizes to the empty string and is
/// dropped by the merge.
pub fn normalize_tag(raw: &str) -> String {
    separator_runs().replace_all(raw, " ").trim().to_string()
}

/// Case-insensitive identity of a normalized tag.
fn tag_key(tag: &str) -> String {
    tag.to_lowercase()
}

/// Knobs for one merge call.
#[derive(Debug, Default)]
pub struct MergeOptions<'a> {
    /// Replace first-seen ordering with a case-folded lexical sort.
    pub sort: bool,
    /// Classification rules; absent means everything is uncategorized.
    pub taxonomy: Option<&'a Taxonomy>,
}

/// Result of merging one document's tag sources.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Final normalized, deduped tag set.
    pub tags: Vec<String>,
    /// Tags genuinely contributed by generation: absent from the
    /// historical+own union before proposals were folded in.
    pub added: Vec<String>,
    /// tag → category, for reporting only; never persisted.
    pub classification: BTreeMap<String, String>,
}

/// Merge historical, own, and proposed tags into one tag set.
///
/// The union is ordered historical → own → proposed; the first
/// case-insensitive occurrence wins both casing and position.
pub fn merge_tags(
    historical: &[String],
    own: &[String],
    proposed: &[String],
    options: &MergeOptions,
) -> MergeOutcome {
    let mut tags: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for raw in historical.iter().chain(own).chain(proposed) {
        let tag = normalize_tag(raw);
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag_key(&tag)) {
            tags.push(tag);
        }
    }

    let pre_generation: HashSet<String> = historical
        .iter()
        .chain(own)
        .map(|raw| tag_key(&normalize_tag(raw)))
        .filter(|key| !key.is_empty())
        .collect();

    if options.sort {
        sort_tags(&mut tags);
    }

    let added: Vec<String> = tags
        .iter()
        .filter(|tag| !pre_generation.contains(&tag_key(tag)))
        .cloned()
        .collect();

    let classification = tags
        .iter()
        .map(|tag| {
            let category = options
                .taxonomy
                .map(|tax| tax.classify(tag))
                .unwrap_or(taxonomy::UNCATEGORIZED);
            (tag.clone(), category.to_string())
        })
        .collect();

    MergeOutcome {
        tags,
        added,
        classification,
    }
}

/// Normalize, dedupe, and optionally sort a single tag list — the merge's
/// steps applied to one source, shared with the front-matter synchronizer.
pub fn canonicalize(tags: &[String], sort: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for raw in tags {
        let tag = normalize_tag(raw);
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag_key(&tag)) {
            out.push(tag);
        }
    }
    if sort {
        sort_tags(&mut out);
    }
    out
}

/// Case-folded lexical ordering with a raw tiebreak.
fn sort_tags(tags: &mut [String]) {
    tags.sort_by(|a, b| tag_key(a).cmp(&tag_key(b)).then_with(|| a.cmp(b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn normalization_collapses_separator_runs() {
        assert_eq!(normalize_tag("deep_work"), "deep work");
        assert_eq!(normalize_tag("deep/work"), "deep work");
        assert_eq!(normalize_tag("  deep   work  "), "deep work");
        assert_eq!(normalize_tag("deep _/ work"), "deep work");
        assert_eq!(normalize_tag("_/ "), "");
    }

    #[test]
    fn variants_collapse_to_one_key_with_first_seen_casing() {
        let outcome = merge_tags(
            &owned(&["Deep Work"]),
            &owned(&["deep_work"]),
            &owned(&["DEEP/WORK"]),
            &MergeOptions::default(),
        );
        assert_eq!(outcome.tags, ["Deep Work"]);
        assert!(outcome.added.is_empty());
    }

    #[test]
    fn union_is_ordered_historical_own_proposed() {
        let outcome = merge_tags(
            &owned(&["A", "B"]),
            &owned(&["B", "C"]),
            &owned(&["C", "D"]),
            &MergeOptions::default(),
        );
        assert_eq!(outcome.tags, ["A", "B", "C", "D"]);
    }

    #[test]
    fn sorted_merge_is_the_same_set_in_case_folded_order() {
        let outcome = merge_tags(
            &owned(&["banana", "Apple"]),
            &owned(&["cherry"]),
            &owned(&["apricot"]),
            &MergeOptions {
                sort: true,
                taxonomy: None,
            },
        );
        assert_eq!(outcome.tags, ["Apple", "apricot", "banana", "cherry"]);
    }

    #[test]
    fn added_contains_only_generation_contributions() {
        let outcome = merge_tags(
            &owned(&["X"]),
            &[],
            &owned(&["X", "Y"]),
            &MergeOptions::default(),
        );
        assert_eq!(outcome.added, ["Y"]);
    }

    #[test]
    fn added_is_empty_when_proposals_duplicate_existing_tags() {
        let outcome = merge_tags(
            &owned(&["Rust"]),
            &owned(&["Async"]),
            &owned(&["rust", "ASYNC"]),
            &MergeOptions::default(),
        );
        assert!(outcome.added.is_empty());
        assert_eq!(outcome.tags, ["Rust", "Async"]);
    }

    #[test]
    fn merge_is_deterministic() {
        let historical = owned(&["one", "two"]);
        let own = owned(&["three"]);
        let proposed = owned(&["four"]);
        let a = merge_tags(&historical, &own, &proposed, &MergeOptions::default());
        let b = merge_tags(&historical, &own, &proposed, &MergeOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn classification_defaults_to_uncategorized_without_taxonomy() {
        let outcome = merge_tags(&[], &owned(&["misc"]), &[], &MergeOptions::default());
        assert_eq!(
            outcome.classification.get("misc").map(String::as_str),
            Some(taxonomy::UNCATEGORIZED)
        );
    }

    #[test]
    fn canonicalize_matches_merge_normalization() {
        let tags = owned(&["Deep_Work", "deep work", "Focus"]);
        assert_eq!(canonicalize(&tags, false), ["Deep Work", "Focus"]);
        assert_eq!(canonicalize(&tags, true), ["Deep Work", "Focus"]);
    }
}
