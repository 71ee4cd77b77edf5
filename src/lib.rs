//! Tagmill: LLM-assisted tag index maintainer for markdown note vaults
//!
//! Tagmill asks a chat-completion endpoint to propose tags for every
//! document in a vault, merges the proposals with historical and
//! document-native tags, persists the result incrementally so an
//! interrupted run stays useful, and can write the final tags back into
//! each document's front matter without disturbing any other field.
//!
//! # Core Concepts
//!
//! - **Document**: a markdown file with a stable forward-slash identifier
//! - **Tag index**: the persisted identifier → tag-list artifact
//! - **Merge**: historical → own → proposed union with case-insensitive
//!   dedupe; first occurrence wins casing and position
//!
//! # Example
//!
//! ```
//! use tagmill::merge::{merge_tags, MergeOptions};
//!
//! let historical = vec!["rust".to_string()];
//! let own = vec!["async".to_string()];
//! let proposed = vec!["Tokio".to_string(), "rust".to_string()];
//!
//! let outcome = merge_tags(&historical, &own, &proposed, &MergeOptions::default());
//! assert_eq!(outcome.tags, ["rust", "async", "Tokio"]);
//! assert_eq!(outcome.added, ["Tokio"]);
//! ```

pub mod config;
pub mod corpus;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod store;
pub mod sync;

pub use config::{ConfigError, GenerationConfig, RunConfig};
pub use corpus::{scan_vault, CorpusFilter, CorpusScan, Document, FrontMatter};
pub use llm::{GenerateError, GenerationResult, HttpGenerator, TagGenerator};
pub use merge::taxonomy::Taxonomy;
pub use merge::{merge_tags, MergeOptions, MergeOutcome};
pub use pipeline::{run_pipeline, PipelineOutcome, RunStats};
pub use store::{FinalizeReport, IndexDiff, IndexStore, StoreError, TagIndex};
pub use sync::{SyncOptions, SyncReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
