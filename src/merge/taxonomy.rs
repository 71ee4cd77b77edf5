//! Tag classification against an ordered taxonomy.
//!
//! A taxonomy is a JSON object mapping category name → rule; declared
//! order is significant, which is why the JSON map is read with insertion
//! order preserved.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Category assigned when no rule matches, or no taxonomy is configured.
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("taxonomy parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
struct RawRule {
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    pattern: Option<String>,
}

/// One named category with its matching rule.
#[derive(Debug)]
struct CategoryRule {
    name: String,
    /// Lowercased allow-list for case-insensitive exact matching.
    includes: Vec<String>,
    /// Compiled pattern; `None` when absent or malformed.
    pattern: Option<Regex>,
}

/// Ordered classification rules.
#[derive(Debug, Default)]
pub struct Taxonomy {
    categories: Vec<CategoryRule>,
}

impl Taxonomy {
    /// Parse taxonomy rules from a JSON object, preserving declared order.
    ///
    /// A malformed pattern disables only that category's pattern check;
    /// its allow-list still applies.
    pub fn from_json(text: &str) -> Result<Self, TaxonomyError> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut categories = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let rule: RawRule = serde_json::from_value(value)?;
            let pattern = rule.pattern.as_deref().and_then(|source| {
                match Regex::new(source) {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        warn!(
                            category = %name,
                            pattern = %source,
                            error = %err,
                            "ignoring malformed taxonomy pattern"
                        );
                        None
                    }
                }
            });
            categories.push(CategoryRule {
                name,
                includes: rule.includes.iter().map(|s| s.to_lowercase()).collect(),
                pattern,
            });
        }
        Ok(Self { categories })
    }

    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Classify one tag.
    ///
    /// Explicit allow-list matches win over patterns across the whole
    /// taxonomy; within each pass categories are consulted in declared
    /// order. Patterns match the tag as written, allow-lists match
    /// case-insensitively.
    pub fn classify(&self, tag: &str) -> &str {
        let key = tag.to_lowercase();
        for category in &self.categories {
            if category.includes.iter().any(|included| *included == key) {
                return &category.name;
            }
        }
        for category in &self.categories {
            if let Some(pattern) = &category.pattern {
                if pattern.is_match(tag) {
                    return &category.name;
                }
            }
        }
        UNCATEGORIZED
    }
}
