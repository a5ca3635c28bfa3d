//! Question-answering engine.
//!
//! Owns the configured collaborators (index, embedder, generator, session
//! registry) and exposes the pipeline's operations: ingest documents, run
//! a plain retrieval query, and hold a grounded conversation. The CLI and
//! the HTTP server are both thin layers over this type.

use anyhow::{bail, Result};

use crate::assemble::{assemble_context, AssembledContext};
use crate::chunker::chunk_document;
use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::generation::{create_generator, GenerationProvider, PromptSections};
use crate::index::{create_index, VectorIndex};
use crate::memory::SessionRegistry;
use crate::models::{IngestReport, Reference, ScoredChunk};
use crate::retrieval::{filter_candidates, DistanceMetric, RelevanceThreshold};
use crate::store::ContentStore;

/// Upper bound on per-request result counts, matching config validation.
const MAX_TOP_K: usize = 20;

/// One document handed to ingestion.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    /// Title used for citations and dedup scoping.
    pub source: String,
    pub text: String,
}

/// Outcome of a plain retrieval query.
#[derive(Debug)]
pub struct AskResponse {
    /// Surviving chunks, best match first. May be empty.
    pub results: Vec<ScoredChunk>,
    /// Human-readable status line.
    pub message: String,
}

/// Outcome of one conversational exchange.
#[derive(Debug)]
pub struct ConverseResponse {
    pub answer: String,
    /// Citations backing the answer. Empty when the fallback fired.
    pub references: Vec<Reference>,
}

pub struct QaEngine {
    config: Config,
    index: Box<dyn VectorIndex>,
    embedder: Box<dyn EmbeddingProvider>,
    generator: Box<dyn GenerationProvider>,
    sessions: SessionRegistry,
}

impl QaEngine {
    /// Build an engine with the providers named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        crate::config::validate(&config)?;
        let index = create_index(&config.index)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(config, index, embedder, generator))
    }

    /// Build an engine from explicit collaborators. Used by tests to plug
    /// in instrumented indexes and providers.
    pub fn new(
        config: Config,
        index: Box<dyn VectorIndex>,
        embedder: Box<dyn EmbeddingProvider>,
        generator: Box<dyn GenerationProvider>,
    ) -> Self {
        let sessions = SessionRegistry::new(config.memory.max_turns);
        Self {
            config,
            index,
            embedder,
            generator,
            sessions,
        }
    }

    fn store(&self) -> ContentStore<'_> {
        ContentStore::new(
            self.index.as_ref(),
            self.embedder.as_ref(),
            self.config.ingestion.batch_size,
        )
    }

    /// Chunk and ingest a set of documents.
    ///
    /// Chunk positions run continuously across documents so ids stay
    /// stable for a given corpus order. With `clear_existing`, the index
    /// is emptied first; clearing an empty index is fine.
    pub async fn ingest_documents(
        &self,
        documents: &[IngestDocument],
        clear_existing: bool,
    ) -> Result<IngestReport> {
        let store = self.store();
        if clear_existing {
            store.clear().await?;
        }

        let mut report = IngestReport::default();
        let mut position = 0usize;

        for doc in documents {
            let chunks = chunk_document(&doc.text, &doc.source, &self.config.chunking)?;
            if chunks.is_empty() {
                continue;
            }
            let doc_report = store.ingest(&chunks, position).await?;
            position += chunks.len();

            report.accepted += doc_report.accepted;
            report.skipped_duplicates += doc_report.skipped_duplicates;
            report.rejected.extend(doc_report.rejected);
        }

        Ok(report)
    }

    /// Plain retrieval: return the chunks most relevant to `query`.
    ///
    /// Filters on minimum similarity, so only confident matches surface.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<AskResponse> {
        let k = self.resolve_k(k)?;
        let scored = self
            .retrieve(
                query,
                k,
                RelevanceThreshold::MinSimilarity(self.config.retrieval.similarity_threshold),
            )
            .await?;

        let message = if scored.is_empty() {
            self.config.retrieval.fallback_message.clone()
        } else {
            format!("Found {} relevant legal documents.", scored.len())
        };

        Ok(AskResponse {
            results: scored,
            message,
        })
    }

    /// Conversational exchange: retrieve, assemble context, generate an
    /// answer, and record the turn.
    ///
    /// Uses the looser distance threshold so context assembly sees more
    /// material than plain retrieval would. When nothing clears the
    /// threshold the configured fallback message is returned with no
    /// references, and the transcript is left untouched. The turn is
    /// recorded only after generation succeeds.
    pub async fn converse(&self, query: &str, session_id: &str) -> Result<ConverseResponse> {
        let k = self.config.retrieval.top_k;
        let scored = self
            .retrieve(
                query,
                k,
                RelevanceThreshold::MaxDistance(self.config.retrieval.distance_threshold),
            )
            .await?;

        let assembled = assemble_context(&scored, self.config.retrieval.max_context_chars);
        let (context, references) = match assembled {
            AssembledContext::NoRelevantContext => {
                return Ok(ConverseResponse {
                    answer: self.config.retrieval.fallback_message.clone(),
                    references: Vec::new(),
                });
            }
            AssembledContext::Context { text, references } => (text, references),
        };

        let session = self.sessions.session(session_id);
        let mut memory = session.lock().await;

        let answer = self
            .generator
            .generate(&PromptSections {
                context,
                history: memory.render(),
                question: query.to_string(),
            })
            .await?;

        memory.append(query, answer.clone());

        Ok(ConverseResponse { answer, references })
    }

    pub async fn count(&self) -> Result<usize> {
        self.store().count().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        threshold: RelevanceThreshold,
    ) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            bail!("Query must not be empty");
        }

        let total = self.index.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        // Extra headroom so the relevance filter can discard without
        // starving the final top-k.
        let candidate_count = k * self.config.retrieval.candidate_multiplier.max(1);
        let candidates = self.index.query(&embedding, candidate_count).await?;

        let mut scored = filter_candidates(candidates, DistanceMetric::Cosine, threshold);
        scored.truncate(k);
        Ok(scored)
    }

    fn resolve_k(&self, k: Option<usize>) -> Result<usize> {
        let k = k.unwrap_or(self.config.retrieval.top_k);
        if !(1..=MAX_TOP_K).contains(&k) {
            bail!("k must be in [1, {}], got {}", MAX_TOP_K, k);
        }
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::generation::DisabledGeneration;
    use crate::index::MemoryIndex;

    fn engine() -> QaEngine {
        let config = Config::default();
        QaEngine::new(
            config,
            Box::new(MemoryIndex::new()),
            Box::new(HashEmbedder::new(128)),
            Box::new(DisabledGeneration),
        )
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = engine();
        assert!(engine.ask("", None).await.is_err());
        assert!(engine.ask("   ", None).await.is_err());
        assert!(engine.converse("  ", "s1").await.is_err());
    }

    #[tokio::test]
    async fn test_k_out_of_range_rejected() {
        let engine = engine();
        assert!(engine.ask("question", Some(0)).await.is_err());
        assert!(engine.ask("question", Some(21)).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_index_returns_fallback_message() {
        let engine = engine();
        let response = engine.ask("right to life", None).await.unwrap();
        assert!(response.results.is_empty());
        assert_eq!(
            response.message,
            engine.config().retrieval.fallback_message
        );
    }

    #[tokio::test]
    async fn test_ingest_then_count() {
        let engine = engine();
        let docs = vec![IngestDocument {
            source: "Constitution".to_string(),
            text: "Article 1. Everyone has the right to life. \
                   Article 2. No one shall be held in slavery."
                .to_string(),
        }];
        let report = engine.ingest_documents(&docs, false).await.unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(engine.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_existing_resets_index() {
        let engine = engine();
        let docs = vec![IngestDocument {
            source: "Code".to_string(),
            text: "Article 1. First rule applies here.".to_string(),
        }];
        engine.ingest_documents(&docs, false).await.unwrap();
        engine.ingest_documents(&docs, true).await.unwrap();
        assert_eq!(engine.count().await.unwrap(), 1);
    }
}
