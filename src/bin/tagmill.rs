//! Tagmill CLI — maintain and apply a vault's tag index.
//!
//! Usage:
//!   tagmill run [VAULT] [--sort] [--dry-run] [--filter prefix]...
//!   tagmill sync [VAULT] [--sort] [--dry-run]
//!   tagmill report [VAULT] --taxonomy rules.json

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tagmill::config::{self, GenerationConfig, RunConfig};
use tagmill::corpus::{scan_vault, CorpusFilter, CorpusScan};
use tagmill::merge::taxonomy::Taxonomy;
use tagmill::pipeline::run_pipeline;
use tagmill::store::IndexStore;
use tagmill::sync::{self, SyncOptions};
use tagmill::HttpGenerator;

#[derive(Parser)]
#[command(
    name = "tagmill",
    version,
    about = "LLM-assisted tag index maintainer for markdown note vaults"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct VaultArgs {
    /// Vault root directory
    #[arg(default_value = ".")]
    vault: PathBuf,
    /// Tag-index artifact (default: <vault>/.tagmill/tag-index.json)
    #[arg(long)]
    index: Option<PathBuf>,
    /// Restrict the pass to identifiers with this prefix (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,
    /// Process documents marked `draft: true`
    #[arg(long)]
    include_drafts: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, merge, and persist tags for every document
    Run {
        #[command(flatten)]
        vault: VaultArgs,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Sort each document's tags instead of keeping merge order
        #[arg(long)]
        sort: bool,
        /// Maximum simultaneous generation calls
        #[arg(long, default_value_t = config::DEFAULT_MAX_CONCURRENCY)]
        concurrency: usize,
        /// Further attempts after a failed generation call
        #[arg(long, default_value_t = config::DEFAULT_MAX_RETRIES)]
        retries: usize,
        /// Model name sent to the endpoint
        #[arg(long, default_value = config::DEFAULT_MODEL)]
        model: String,
        /// Base URL of the chat-completion endpoint
        #[arg(long, default_value = config::DEFAULT_ENDPOINT)]
        endpoint: String,
        /// Language the proposed tags should be written in
        #[arg(long, default_value = config::DEFAULT_LANGUAGE)]
        language: String,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SECS)]
        timeout_secs: u64,
        /// Extra header sent with every request, as 'Name: Value' (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Write the persisted index back into document front matter
    Sync {
        #[command(flatten)]
        vault: VaultArgs,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Compare against sorted tag order
        #[arg(long)]
        sort: bool,
    },
    /// Classify the persisted index against a taxonomy and print counts
    Report {
        /// Vault root directory
        #[arg(default_value = ".")]
        vault: PathBuf,
        /// Tag-index artifact (default: <vault>/.tagmill/tag-index.json)
        #[arg(long)]
        index: Option<PathBuf>,
        /// Taxonomy rules file (JSON)
        #[arg(long)]
        taxonomy: PathBuf,
    },
}

fn default_index_path(vault: &Path) -> PathBuf {
    vault.join(".tagmill").join("tag-index.json")
}

fn store_at(vault: &Path, index: Option<PathBuf>) -> IndexStore {
    IndexStore::new(index.unwrap_or_else(|| default_index_path(vault)))
}

fn filter_for(args: &VaultArgs) -> CorpusFilter {
    CorpusFilter {
        path_prefixes: args.filters.clone(),
        include_drafts: args.include_drafts,
    }
}

fn scan_or_exit(args: &VaultArgs) -> Result<CorpusScan, i32> {
    match scan_vault(&args.vault, &filter_for(args)) {
        Ok(scan) => {
            for (id, reason) in &scan.failures {
                eprintln!("Warning: skipped {}: {}", id, reason);
            }
            Ok(scan)
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            Err(2)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    vault: VaultArgs,
    dry_run: bool,
    sort: bool,
    concurrency: usize,
    retries: usize,
    model: String,
    endpoint: String,
    language: String,
    timeout_secs: u64,
    headers: Vec<String>,
) -> i32 {
    // Pre-flight: a missing credential aborts before any document is read.
    let api_key = match config::resolve_api_key() {
        Ok(key) => key,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 2;
        }
    };
    let mut extra_headers = Vec::with_capacity(headers.len());
    for raw in &headers {
        match config::parse_header(raw) {
            Ok(header) => extra_headers.push(header),
            Err(err) => {
                eprintln!("Error: {}", err);
                return 2;
            }
        }
    }

    let run_config = RunConfig {
        generation: GenerationConfig {
            endpoint,
            api_key,
            model,
            temperature: config::DEFAULT_TEMPERATURE,
            max_output_tokens: config::DEFAULT_MAX_OUTPUT_TOKENS,
            extra_headers,
            request_timeout: Duration::from_secs(timeout_secs),
        },
        language,
        max_concurrency: concurrency,
        max_retries: retries,
        sort_tags: sort,
        dry_run,
    };

    let scan = match scan_or_exit(&vault) {
        Ok(scan) => scan,
        Err(code) => return code,
    };
    let generator = match HttpGenerator::new(run_config.generation.clone()) {
        Ok(generator) => generator,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 2;
        }
    };

    let store = store_at(&vault.vault, vault.index.clone());
    let scan_failures = scan.failures.len();
    let filter_active = scan.filter_active;
    let outcome = run_pipeline(scan.documents, Arc::new(generator), store.clone(), &run_config).await;

    let report = match store.finalize(&outcome.index, &outcome.seen, filter_active, dry_run) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Error: failed to finalize index: {}", err);
            return 1;
        }
    };

    let stats = &outcome.stats;
    let skipped = if scan_failures > 0 {
        format!(", {} skipped", scan_failures)
    } else {
        String::new()
    };
    println!(
        "{:<20}{} total, {} processed{}",
        "Documents:",
        stats.total_documents + scan_failures,
        stats.processed,
        skipped
    );
    println!(
        "{:<20}{} ({} failed)",
        "Generation calls:", stats.generation_calls, stats.generation_failures
    );
    println!(
        "{:<20}{} total, {} new",
        "Tags:", stats.total_tags, stats.new_tags
    );
    println!(
        "{:<20}{} ({} updated, {} removed{})",
        "Index:",
        store.path().display(),
        report.diff.updated.len(),
        report.diff.removed.len(),
        if dry_run { ", dry run" } else { "" }
    );

    if stats.generation_failures > 0 || scan_failures > 0 {
        1
    } else {
        0
    }
}

fn cmd_sync(vault: VaultArgs, dry_run: bool, sort: bool) -> i32 {
    let scan = match scan_or_exit(&vault) {
        Ok(scan) => scan,
        Err(code) => return code,
    };
    let store = store_at(&vault.vault, vault.index.clone());
    let index = store.read();
    if index.is_empty() {
        eprintln!(
            "Warning: tag index at {} is empty; nothing to sync",
            store.path().display()
        );
    }

    let options = SyncOptions { dry_run, sort };
    let report = match sync::apply(&index, &scan.documents, &vault.vault, &options) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };

    println!(
        "{:<16}{}{}",
        "Updated:",
        report.updated.len(),
        if dry_run { " (dry run)" } else { "" }
    );
    println!("{:<16}{}", "Unchanged:", report.unchanged.len());
    println!("{:<16}{}", "Missing:", report.missing.len());
    println!("{:<16}{}", "Filtered out:", report.filtered_out.len());
    for id in &report.missing {
        eprintln!("Warning: {} is referenced by the index but not on disk", id);
    }

    if report.missing.is_empty() {
        0
    } else {
        1
    }
}

fn cmd_report(vault: PathBuf, index: Option<PathBuf>, taxonomy_path: PathBuf) -> i32 {
    let store = store_at(&vault, index);
    let index = store.read();
    let taxonomy = match Taxonomy::load(&taxonomy_path) {
        Ok(taxonomy) => taxonomy,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 2;
        }
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for tags in index.values() {
        for tag in tags {
            *counts.entry(taxonomy.classify(tag).to_string()).or_insert(0) += 1;
            total += 1;
        }
    }
    if counts.is_empty() {
        println!("No tags recorded in {}", store.path().display());
        return 0;
    }

    println!("{:<24}{:>7}", "CATEGORY", "TAGS");
    println!("{}", "-".repeat(31));
    let mut rows: Vec<(String, usize)> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (category, count) in rows {
        println!("{:<24}{:>7}", category, count);
    }
    println!("{}", "-".repeat(31));
    println!("{:<24}{:>7}", "total", total);
    0
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            vault,
            dry_run,
            sort,
            concurrency,
            retries,
            model,
            endpoint,
            language,
            timeout_secs,
            headers,
        } => {
            cmd_run(
                vault,
                dry_run,
                sort,
                concurrency,
                retries,
                model,
                endpoint,
                language,
                timeout_secs,
                headers,
            )
            .await
        }
        Commands::Sync {
            vault,
            dry_run,
            sort,
        } => cmd_sync(vault, dry_run, sort),
        Commands::Report {
            vault,
            index,
            taxonomy,
        } => cmd_report(vault, index, taxonomy),
    };
    std::process::exit(code);
}
