//! Answer composition: retrieve, fit the context budget, generate.
//!
//! Retrieved chunks go into the prompt whole and in rank order. When they
//! exceed `max_context_chars` the lowest-ranked ones are dropped and logged;
//! a top-ranked chunk that alone exceeds it is cut to fit.
//! With no usable context the prompt carries [`NO_CONTEXT_MARKER`] instead,
//! and the answer is flagged as not grounded.
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{self, RetryPolicy};
use crate::db::{MetadataFilter, ScoredEntry};
use crate::document::Metadata;
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::retriever::Retriever;

/// Stands in for the context block when retrieval found nothing usable.
pub const NO_CONTEXT_MARKER: &str = "NO CONTEXT FOUND";

const INSTRUCTION: &str = "You are a hardware assistant answering questions about CPUs and \
other components. Answer using only the context below. If the context does not contain \
the answer, say that you don't know.";

/// One context section handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f64,
}

impl From<ScoredEntry> for Source {
    fn from(hit: ScoredEntry) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            text: hit.text,
            metadata: hit.metadata,
            score: hit.score,
        }
    }
}

/// The generator's reply plus the exact context it was given.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub result: String,
    pub sources: Vec<Source>,
    /// False when the prompt carried the no-context marker.
    pub grounded: bool,
    /// Retrieved chunk ids left out by the context budget.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
}

pub struct AnswerComposer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    top_k: usize,
    max_context_chars: usize,
    policy: RetryPolicy,
}

impl AnswerComposer {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        top_k: usize,
        max_context_chars: usize,
        policy: RetryPolicy,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be at least 1".into()));
        }
        if max_context_chars == 0 {
            return Err(RagError::InvalidConfig(
                "max_context_chars must be positive".into(),
            ));
        }
        Ok(Self {
            retriever,
            generator,
            top_k,
            max_context_chars,
            policy,
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn answer(&self, query: &str) -> Result<Answer> {
        self.answer_with(query, None, &CancellationToken::new())
            .await
    }

    pub async fn answer_with(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let retrieved = self
            .retriever
            .retrieve(query, self.top_k, filter, cancel)
            .await?;

        let (sources, dropped) = fit_budget(retrieved.hits, self.max_context_chars);
        if !dropped.is_empty() {
            warn!(
                dropped = ?dropped,
                budget = self.max_context_chars,
                "context budget exceeded, dropped lowest-ranked chunks"
            );
        }

        let grounded = !sources.is_empty();
        let prompt = build_prompt(query, &sources);

        let generator = Arc::clone(&self.generator);
        let result = backend::call("generation", &self.policy, cancel, move || {
            Ok(generator.generate(&prompt)?)
        })
        .await?;

        info!(
            sources = sources.len(),
            grounded,
            model = self.generator.model_name(),
            "answered"
        );
        Ok(Answer {
            result,
            sources,
            grounded,
            dropped,
        })
    }
}

/// Keep the longest ranked prefix whose texts fit in `max_chars`.
///
/// The top-ranked hit is always kept; when it alone exceeds the budget it is
/// cut to `max_chars` characters.
fn fit_budget(hits: Vec<ScoredEntry>, max_chars: usize) -> (Vec<Source>, Vec<String>) {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    let mut used = 0;

    for hit in hits {
        let len = hit.text.chars().count();
        if kept.is_empty() && len > max_chars {
            warn!(
                chunk_id = %hit.chunk_id,
                chars = len,
                budget = max_chars,
                "top-ranked chunk truncated to the context budget"
            );
            let mut source = Source::from(hit);
            source.text = source.text.chars().take(max_chars).collect();
            used = max_chars;
            kept.push(source);
        } else if dropped.is_empty() && used + len <= max_chars {
            used += len;
            kept.push(Source::from(hit));
        } else {
            dropped.push(hit.chunk_id);
        }
    }
    (kept, dropped)
}

fn build_prompt(query: &str, sources: &[Source]) -> String {
    let mut prompt = String::with_capacity(
        INSTRUCTION.len() + query.len() + sources.iter().map(|s| s.text.len() + 64).sum::<usize>(),
    );
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n\nContext:\n");

    if sources.is_empty() {
        prompt.push_str(NO_CONTEXT_MARKER);
        prompt.push('\n');
    } else {
        for (i, source) in sources.iter().enumerate() {
            let _ = writeln!(prompt, "[source {}] {}", i + 1, source.chunk_id);
            prompt.push_str(source.text.trim_end());
            prompt.push_str("\n\n");
        }
    }

    let _ = write!(prompt, "\nQuestion: {}\nAnswer:", query.trim());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, IndexEntry, OpenMode, VectorIndex};
    use crate::embedder::Embedder;
    use crate::embedder::mock::MockEmbedder;
    use crate::generator::GeneratorError;
    use crate::generator::mock::MockGenerator;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    /// Records every prompt it receives.
    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl Generator for RecordingGenerator {
        fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("verbatim reply".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    /// Always refuses, counting the attempts.
    #[derive(Default)]
    struct RejectingGenerator {
        calls: AtomicU32,
    }

    impl Generator for RejectingGenerator {
        fn generate(&self, _prompt: &str) -> std::result::Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GeneratorError::Rejected("404 model not found".into()))
        }

        fn model_name(&self) -> &str {
            "rejecting"
        }
    }

    struct DownGenerator;

    impl Generator for DownGenerator {
        fn generate(&self, _prompt: &str) -> std::result::Result<String, GeneratorError> {
            Err(GeneratorError::BackendUnavailable("connection refused".into()))
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn hit(id: &str, text: &str, score: f64) -> ScoredEntry {
        ScoredEntry {
            chunk_id: id.into(),
            source_id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            score,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        }
    }

    fn retriever(texts: &[(&str, &str)]) -> Retriever {
        let embedder = MockEmbedder::new(8);
        let db = Db::open_in_memory().unwrap();
        let mut index = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 8, "mock").unwrap();
        let entries: Vec<IndexEntry> = texts
            .iter()
            .map(|(id, text)| IndexEntry {
                chunk_id: (*id).into(),
                source_id: (*id).into(),
                text: (*text).into(),
                metadata: Metadata::new(),
                embedding: embedder.embed(text).unwrap(),
            })
            .collect();
        index.add(&entries).unwrap();
        Retriever::new(Arc::new(TokioMutex::new(index)), Arc::new(embedder), policy())
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        let hits = vec![hit("a", "12345", 0.9), hit("b", "1234", 0.8), hit("c", "1", 0.7)];
        let (kept, dropped) = fit_budget(hits, 10);
        assert_eq!(kept.len(), 3);
        assert!(dropped.is_empty());

        let hits = vec![hit("a", "12345", 0.9), hit("b", "1234", 0.8), hit("c", "1", 0.7)];
        let (kept, dropped) = fit_budget(hits, 8);
        assert_eq!(kept.iter().map(|s| s.chunk_id.as_str()).collect::<Vec<_>>(), vec!["a"]);
        // Once something is dropped, everything ranked below goes too.
        assert_eq!(dropped, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_budget_truncates_oversized_top_hit() {
        let hits = vec![hit("a", "Ryzen 9 7950X", 0.9), hit("b", "1234", 0.8)];
        let (kept, dropped) = fit_budget(hits, 5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "a");
        assert_eq!(kept[0].text, "Ryzen");
        assert_eq!(dropped, vec!["b".to_string()]);

        let hits = vec![hit("a", "核心数量为十六", 0.9)];
        let (kept, _) = fit_budget(hits, 3);
        assert_eq!(kept[0].text, "核心数");
    }

    #[test]
    fn test_prompt_layout() {
        let sources = vec![Source::from(hit("cpus.csv:row0#00000", "AMD has 16 cores.", 0.9))];
        let prompt = build_prompt(" How many cores? ", &sources);
        assert!(prompt.contains("[source 1] cpus.csv:row0#00000\nAMD has 16 cores.\n"));
        assert!(prompt.ends_with("Question: How many cores?\nAnswer:"));
        assert!(!prompt.contains(NO_CONTEXT_MARKER));

        let empty = build_prompt("How many cores?", &[]);
        assert!(empty.contains(NO_CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn test_answer_returns_reply_verbatim_with_provenance() {
        let generator = Arc::new(RecordingGenerator::default());
        let composer = AnswerComposer::new(
            retriever(&[("r0", "AMD Ryzen 9 has 16 cores"), ("r1", "Intel i5 has 6 cores")]),
            generator.clone(),
            3,
            4000,
            policy(),
        )
        .unwrap();

        let answer = composer.answer("AMD Ryzen 9 has 16 cores").await.unwrap();
        assert_eq!(answer.result, "verbatim reply");
        assert!(answer.grounded);
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].chunk_id, "r0");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[source 2] r1"));
    }

    #[tokio::test]
    async fn test_no_context_is_marked_not_grounded() {
        let composer = AnswerComposer::new(
            retriever(&[("r0", "AMD Ryzen 9 has 16 cores")]),
            Arc::new(MockGenerator),
            3,
            4000,
            policy(),
        )
        .unwrap();

        let filter = MetadataFilter::eq("brand_name", "VIA");
        let answer = composer
            .answer_with("cores?", Some(&filter), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
        assert!(answer.result.starts_with("I don't know"));
    }

    #[tokio::test]
    async fn test_generation_failure_surfaces_after_bounded_retry() {
        let composer = AnswerComposer::new(
            retriever(&[("r0", "AMD Ryzen 9 has 16 cores")]),
            Arc::new(DownGenerator),
            3,
            4000,
            policy(),
        )
        .unwrap();

        let err = composer.answer("cores?").await.unwrap_err();
        assert!(matches!(err, RagError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejected_generation_is_not_retried() {
        let generator = Arc::new(RejectingGenerator::default());
        let composer = AnswerComposer::new(
            retriever(&[("r0", "AMD Ryzen 9 has 16 cores")]),
            generator.clone(),
            3,
            4000,
            policy(),
        )
        .unwrap();

        let err = composer.answer("cores?").await.unwrap_err();
        assert!(matches!(&err, RagError::Backend(msg) if msg.contains("404")));
        assert!(!err.is_retryable());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_match_still_grounds_the_answer() {
        let text = "The AMD Ryzen 9 7950X has 16 cores and a base clock of 4.5 GHz.";
        let generator = Arc::new(RecordingGenerator::default());
        let composer =
            AnswerComposer::new(retriever(&[("a", text)]), generator.clone(), 3, 20, policy())
                .unwrap();

        let answer = composer.answer(text).await.unwrap();
        assert!(answer.grounded);
        assert!(answer.dropped.is_empty());
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].text, text.chars().take(20).collect::<String>());

        let prompts = generator.prompts.lock().unwrap();
        assert!(!prompts[0].contains(NO_CONTEXT_MARKER));
        assert!(prompts[0].contains("[source 1] a\nThe AMD Ryzen 9 7950\n"));
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let r = retriever(&[]);
        assert!(matches!(
            AnswerComposer::new(r.clone(), Arc::new(MockGenerator), 0, 10, policy()),
            Err(RagError::InvalidConfig(_))
        ));
        assert!(matches!(
            AnswerComposer::new(r, Arc::new(MockGenerator), 3, 0, policy()),
            Err(RagError::InvalidConfig(_))
        ));
    }
}
