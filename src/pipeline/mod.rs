//! Generation pipeline — bounded concurrency, per-document retry,
//! incremental commits.
//!
//! Every document is scheduled eagerly; a semaphore caps how many
//! generation calls are in flight at once. Completion order is
//! unspecified: each document merges and commits the moment its own
//! generation finishes, and one document's failure never cancels a
//! sibling.

use crate::config::RunConfig;
use crate::corpus::Document;
use crate::llm::prompt::build_prompt;
use crate::llm::{extract_tag_array, GenerationResult, TagGenerator};
use crate::merge::{merge_tags, MergeOptions};
use crate::store::{IndexStore, TagIndex};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

const BACKOFF_STEP_MS: u64 = 2000;
const BACKOFF_CEILING_MS: u64 = 5000;

/// Aggregate counters for the run summary and exit status.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total_documents: usize,
    pub processed: usize,
    /// Individual attempts, retries included.
    pub generation_calls: usize,
    /// Documents whose every attempt failed.
    pub generation_failures: usize,
    pub total_tags: usize,
    pub new_tags: usize,
}

/// Linear backoff before the given retry (1-based), capped at the ceiling.
pub fn backoff_delay(retry: usize) -> Duration {
    Duration::from_millis(BACKOFF_STEP_MS.saturating_mul(retry as u64).min(BACKOFF_CEILING_MS))
}

/// Run one document's generation with up to `max_retries` further
/// attempts.
///
/// Attempts are independent; only the last one is kept. Exhaustion
/// records the final error on the result and leaves the proposed list
/// empty, so the document degrades to its historical+own tags instead of
/// failing the run.
pub async fn generate_with_retry(
    generator: &dyn TagGenerator,
    document_id: &str,
    prompt: &str,
    max_retries: usize,
) -> GenerationResult {
    let mut last_error = None;
    let mut attempts = 0;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
        attempts += 1;
        match generator.complete(prompt).await {
            Ok(raw) => {
                return GenerationResult {
                    document_id: document_id.to_string(),
                    proposed_tags: extract_tag_array(&raw),
                    raw_response: raw,
                    error: None,
                    attempts,
                };
            }
            Err(err) => {
                warn!(
                    document = %document_id,
                    attempt = attempts,
                    error = %err,
                    "generation attempt failed"
                );
                last_error = Some(err);
            }
        }
    }

    GenerationResult {
        document_id: document_id.to_string(),
        proposed_tags: Vec::new(),
        raw_response: String::new(),
        error: last_error.map(|err| err.to_string()),
        attempts,
    }
}

/// Outcome of a full pipeline pass, ready for finalize.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub stats: RunStats,
    /// In-memory index after every document's slot was written.
    pub index: TagIndex,
    /// Identifiers the pass examined.
    pub seen: HashSet<String>,
}

struct SharedState {
    store: IndexStore,
    /// Single-writer critical section: every slot write and artifact
    /// commit happens under this lock, so concurrent completions never
    /// race on the backing file.
    index: Mutex<TagIndex>,
    stats: Mutex<RunStats>,
}

/// Process every document under the configured concurrency ceiling.
pub async fn run_pipeline(
    documents: Vec<Document>,
    generator: Arc<dyn TagGenerator>,
    store: IndexStore,
    config: &RunConfig,
) -> PipelineOutcome {
    let historical = store.read();
    let seen: HashSet<String> = documents.iter().map(|d| d.id.clone()).collect();

    let shared = Arc::new(SharedState {
        store,
        index: Mutex::new(historical.clone()),
        stats: Mutex::new(RunStats {
            total_documents: documents.len(),
            ..Default::default()
        }),
    });
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

    let mut tasks = JoinSet::new();
    for document in documents {
        let shared = Arc::clone(&shared);
        let generator = Arc::clone(&generator);
        let semaphore = Arc::clone(&semaphore);
        let historical_tags = historical.get(&document.id).cloned().unwrap_or_default();
        let language = config.language.clone();
        let max_retries = config.max_retries;
        let sort = config.sort_tags;
        let dry_run = config.dry_run;

        tasks.spawn(async move {
            let result = {
                // The semaphore is never closed; acquisition only fails
                // after shutdown, when there is nothing left to do.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let prompt = build_prompt(&document, &language, &historical_tags);
                generate_with_retry(generator.as_ref(), &document.id, &prompt, max_retries).await
            };

            let outcome = merge_tags(
                &historical_tags,
                &document.own_tags,
                &result.proposed_tags,
                &MergeOptions {
                    sort,
                    taxonomy: None,
                },
            );

            {
                let mut index = shared.index.lock().await;
                index.insert(document.id.clone(), outcome.tags.clone());
                if !dry_run {
                    if let Err(err) = shared.store.commit(&index, &document.id) {
                        warn!(
                            document = %document.id,
                            error = %err,
                            "incremental commit failed"
                        );
                    }
                }
            }

            let mut stats = shared.stats.lock().await;
            stats.processed += 1;
            stats.generation_calls += result.attempts;
            if result.error.is_some() {
                stats.generation_failures += 1;
            }
            stats.new_tags += outcome.added.len();
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "pipeline task panicked");
        }
    }

    let index = shared.index.lock().await.clone();
    let mut stats = shared.stats.lock().await.clone();
    stats.total_tags = index.values().map(Vec::len).sum();
    info!(
        processed = stats.processed,
        failures = stats.generation_failures,
        "pipeline pass complete"
    );

    PipelineOutcome { stats, index, seen }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::corpus::FrontMatter;
    use crate::llm::GenerateError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str, own: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            own_tags: own.iter().map(|t| t.to_string()).collect(),
            content: format!("# {id}\n"),
            front_matter: FrontMatter::default(),
        }
    }

    fn config() -> RunConfig {
        RunConfig::new(GenerationConfig::new("test-key"))
    }

    fn unavailable() -> GenerateError {
        GenerateError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    /// Fails a fixed number of times, then answers with one tag.
    struct FlakyGenerator {
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    impl FlakyGenerator {
        fn new(failures_before_success: usize) -> Self {
            Self {
                failures_before_success,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TagGenerator for FlakyGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(unavailable())
            } else {
                Ok(r#"["generated"]"#.to_string())
            }
        }
    }

    /// Fails every attempt for prompts mentioning `fail_for`.
    struct SelectiveGenerator {
        fail_for: &'static str,
    }

    #[async_trait]
    impl TagGenerator for SelectiveGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
            if prompt.contains(self.fail_for) {
                Err(unavailable())
            } else {
                Ok(r#"["proposed"]"#.to_string())
            }
        }
    }

    /// Tracks how many calls are in flight at once.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TagGenerator for ConcurrencyProbe {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(r#"["probe"]"#.to_string())
        }
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(3), Duration::from_millis(5000));
        assert_eq!(backoff_delay(10), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_succeeds_after_two_backoffs() {
        let generator = FlakyGenerator::new(2);
        let start = tokio::time::Instant::now();

        let result = generate_with_retry(&generator, "d.md", "prompt", 2).await;

        assert_eq!(result.attempts, 3);
        assert!(result.error.is_none());
        assert_eq!(result.proposed_tags, ["generated"]);
        // Exactly the two linear delays: 2000ms + 4000ms.
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_records_the_last_error() {
        let generator = FlakyGenerator::new(usize::MAX);
        let start = tokio::time::Instant::now();

        let result = generate_with_retry(&generator, "d.md", "prompt", 2).await;

        assert_eq!(result.attempts, 3);
        assert!(result.proposed_tags.is_empty());
        assert!(result.error.as_deref().unwrap().contains("503"));
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_document_falls_back_to_historical_and_own_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));
        let mut seeded = TagIndex::new();
        seeded.insert("d.md".to_string(), vec!["A".to_string()]);
        store.commit(&seeded, "seed").unwrap();

        let outcome = run_pipeline(
            vec![doc("d.md", &["B"])],
            Arc::new(FlakyGenerator::new(usize::MAX)),
            store,
            &config(),
        )
        .await;

        assert_eq!(outcome.index["d.md"], ["A", "B"]);
        assert_eq!(outcome.stats.generation_failures, 1);
        assert_eq!(outcome.stats.generation_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_calls_respect_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));
        let probe = Arc::new(ConcurrencyProbe::new());

        let documents: Vec<Document> =
            (0..8).map(|i| doc(&format!("doc-{i}.md"), &[])).collect();
        let mut config = config();
        config.max_concurrency = 2;

        let generator: Arc<dyn TagGenerator> = probe.clone();
        let outcome = run_pipeline(documents, generator, store, &config).await;

        assert_eq!(outcome.stats.processed, 8);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_documents_failure_never_cancels_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));

        let outcome = run_pipeline(
            vec![doc("bad.md", &["own"]), doc("good.md", &[])],
            Arc::new(SelectiveGenerator { fail_for: "bad.md" }),
            store,
            &config(),
        )
        .await;

        assert_eq!(outcome.index["bad.md"], ["own"]);
        assert_eq!(outcome.index["good.md"], ["proposed"]);
        assert_eq!(outcome.stats.generation_failures, 1);
        assert_eq!(outcome.stats.processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_committed_incrementally() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));

        let outcome = run_pipeline(
            vec![doc("a.md", &[])],
            Arc::new(FlakyGenerator::new(0)),
            store.clone(),
            &config(),
        )
        .await;

        assert_eq!(store.read(), outcome.index);
        assert_eq!(outcome.stats.new_tags, 1);
        assert_eq!(outcome.stats.total_tags, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_never_touches_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));

        let mut config = config();
        config.dry_run = true;
        let outcome = run_pipeline(
            vec![doc("a.md", &[])],
            Arc::new(FlakyGenerator::new(0)),
            store.clone(),
            &config,
        )
        .await;

        assert_eq!(outcome.index["a.md"], ["generated"]);
        assert!(!store.path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_inputs_rewrite_the_artifact_byte_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("tag-index.json"));
        let documents = vec![doc("a.md", &["own"]), doc("b.md", &[])];

        run_pipeline(
            documents.clone(),
            Arc::new(FlakyGenerator::new(0)),
            store.clone(),
            &config(),
        )
        .await;
        let first = std::fs::read_to_string(store.path()).unwrap();

        run_pipeline(
            documents,
            Arc::new(FlakyGenerator::new(0)),
            store.clone(),
            &config(),
        )
        .await;
        let second = std::fs::read_to_string(store.path()).unwrap();

        assert_eq!(first, second);
    }
}
