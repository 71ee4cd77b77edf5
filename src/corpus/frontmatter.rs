//! Front-matter parsing with verbatim field capture.
//!
//! The parser keeps every top-level field's original source lines so a
//! rewrite can splice a new tags entry into the block without
//! re-serializing — and thereby reformatting — anything else. Dates,
//! quoted strings, and multi-line values keep their exact source spelling.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("front matter is not a mapping of string keys: {0}")]
    NotAMapping(#[from] serde_json::Error),
}

/// One top-level entry of the block: a field with its verbatim source
/// lines, or a leading run of comment/blank lines (`key` is `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub key: Option<String>,
    /// Exact source lines, the `key:` line included.
    pub lines: Vec<String>,
}

/// Parsed metadata block of one document.
///
/// Holds both the semantic view (tags, title, draft) and the verbatim view
/// (`entries`) used for format-preserving rewrites.
#[derive(Debug, Clone, Default)]
pub struct FrontMatter {
    entries: Vec<BlockEntry>,
    tags: Vec<String>,
    title: Option<String>,
    draft: bool,
    /// Byte offset where the body starts; 0 when there is no block.
    body_start: usize,
    has_block: bool,
}

impl FrontMatter {
    pub fn has_block(&self) -> bool {
        self.has_block
    }

    /// Tags declared in the block, order and casing preserved.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn draft(&self) -> bool {
        self.draft
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }
}

/// Parse a document's leading metadata block.
///
/// A document without a block (or with an unterminated one) parses to the
/// default value; malformed YAML inside a block is an error so the scanner
/// can exclude the document.
pub fn parse(content: &str) -> Result<FrontMatter, FrontMatterError> {
    let Some((inner, body_start)) = block_bounds(content) else {
        return Ok(FrontMatter::default());
    };

    let entries = split_entries(inner);

    let yaml: serde_yaml::Value = serde_yaml::from_str(inner)?;
    let semantic = match yaml {
        serde_yaml::Value::Null => Value::Object(serde_json::Map::new()),
        other => serde_json::to_value(other)?,
    };

    Ok(FrontMatter {
        entries,
        tags: tags_from_value(&semantic),
        title: semantic
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        draft: semantic
            .get("draft")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        body_start,
        has_block: true,
    })
}

/// Rewrite `content` so its metadata block carries exactly `tags`, leaving
/// every other field's source text untouched. A document without a block
/// gets a fresh one prepended.
pub fn rewrite_tags(content: &str, fm: &FrontMatter, tags: &[String]) -> String {
    let rendered = render_tags(tags);

    if !fm.has_block {
        let mut out = String::with_capacity(content.len() + 64);
        out.push_str("---\n");
        push_lines(&mut out, &rendered);
        out.push_str("---\n");
        out.push_str(content);
        return out;
    }

    let mut out = String::with_capacity(content.len() + 64);
    out.push_str("---\n");
    let mut replaced = false;
    for entry in &fm.entries {
        if entry.key.as_deref() == Some("tags") {
            push_lines(&mut out, &rendered);
            // Comment/blank lines captured after the old value stay put.
            for line in trailing_trivia(&entry.lines) {
                out.push_str(line);
                out.push('\n');
            }
            replaced = true;
        } else {
            push_lines(&mut out, &entry.lines);
        }
    }
    if !replaced {
        push_lines(&mut out, &rendered);
    }
    out.push_str("---\n");
    out.push_str(&content[fm.body_start..]);
    out
}

fn push_lines(out: &mut String, lines: &[String]) {
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
}

/// Locate the block delimiters. Returns the inner text and the byte offset
/// of the body, or `None` when the content carries no terminated block.
fn block_bounds(content: &str) -> Option<(&str, usize)> {
    let rest = content.strip_prefix("---\n")?;

    // Empty block: the closing delimiter follows immediately.
    if let Some(after) = rest.strip_prefix("---") {
        if after.is_empty() {
            return Some(("", content.len()));
        }
        if after.starts_with('\n') {
            return Some(("", 8));
        }
    }

    let mut search = 0;
    while let Some(found) = rest[search..].find("\n---") {
        let pos = search + found;
        let after = &rest[pos + 4..];
        if after.is_empty() {
            return Some((&rest[..pos + 1], content.len()));
        }
        if after.starts_with('\n') {
            return Some((&rest[..pos + 1], 4 + pos + 5));
        }
        search = pos + 1;
    }
    None
}

/// Group block lines into top-level entries. A field starts on an
/// unindented `key:` line; everything else (continuations, list items,
/// comments) belongs to the entry above it.
fn split_entries(inner: &str) -> Vec<BlockEntry> {
    let mut entries: Vec<BlockEntry> = Vec::new();
    for line in inner.lines() {
        if let Some(key) = field_key(line) {
            entries.push(BlockEntry {
                key: Some(key),
                lines: vec![line.to_string()],
            });
        } else if let Some(last) = entries.last_mut() {
            last.lines.push(line.to_string());
        } else {
            entries.push(BlockEntry {
                key: None,
                lines: vec![line.to_string()],
            });
        }
    }
    entries
}

/// Extract the field name from an unindented `key:` line, honoring quoted
/// keys and ignoring colons inside quotes.
fn field_key(line: &str) -> Option<String> {
    let first = line.chars().next()?;
    if first.is_whitespace() || first == '#' || first == '-' {
        return None;
    }

    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ':' if !in_single && !in_double => {
                let key = line[..idx].trim();
                if key.is_empty() {
                    return None;
                }
                return Some(key.trim_matches('"').trim_matches('\'').to_string());
            }
            _ => {}
        }
    }
    None
}

/// Comment/blank lines at the end of an entry's captured lines.
fn trailing_trivia(lines: &[String]) -> &[String] {
    let mut start = lines.len();
    while start > 0 {
        let trimmed = lines[start - 1].trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            start -= 1;
        } else {
            break;
        }
    }
    &lines[start..]
}

/// Tags from the semantic view: a sequence of strings, or a single
/// comma-separated string. Casing is preserved.
fn tags_from_value(fm: &Value) -> Vec<String> {
    let mut tags = Vec::new();
    match fm.get("tags") {
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::String(s) = item {
                    let tag = s.trim();
                    if !tag.is_empty() {
                        tags.push(tag.to_string());
                    }
                }
            }
        }
        Some(Value::String(s)) => {
            for part in s.split(',') {
                let tag = part.trim();
                if !tag.is_empty() {
                    tags.push(tag.to_string());
                }
            }
        }
        _ => {}
    }
    tags
}

/// Render a tags entry in block-list form.
fn render_tags(tags: &[String]) -> Vec<String> {
    if tags.is_empty() {
        return vec!["tags: []".to_string()];
    }
    let mut lines = Vec::with_capacity(tags.len() + 1);
    lines.push("tags:".to_string());
    for tag in tags {
        lines.push(format!("  - {}", yaml_scalar(tag)));
    }
    lines
}

/// Serialize one scalar the way the YAML emitter would, quoting only when
/// the plain form would change meaning.
fn yaml_scalar(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(rendered) => rendered.trim_end().to_string(),
        Err(_) => format!("\"{}\"", value.replace('"', "\\\"")),
    }
}
