//! Prompt construction for tag proposal calls.

use crate::corpus::Document;

/// System instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You are a meticulous librarian who assigns concise topical \
     tags to markdown notes. Respond with a single JSON array of tag strings and nothing else.";

/// Build the user prompt embedding the full document plus both tag sources.
pub fn build_prompt(document: &Document, language: &str, historical: &[String]) -> String {
    format!(
        "Propose tags for the following markdown document.\n\
         Reply with a JSON array of tag strings in {language}, most relevant first.\n\
         Reuse existing tags where they fit instead of inventing synonyms.\n\
         \n\
         Document path: {id}\n\
         Title: {title}\n\
         Existing tags in the document: {own}\n\
         Tags previously recorded for it: {historical}\n\
         \n\
         Document content:\n{content}\n",
        id = document.id,
        title = document.title,
        own = format_tag_list(&document.own_tags),
        historical = format_tag_list(historical),
        content = document.content,
    )
}

fn format_tag_list(tags: &[String]) -> String {
    if tags.is_empty() {
        "(none)".to_string()
    } else {
        tags.join(", ")
    }
}
