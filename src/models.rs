//! Core data models used throughout legalctx.
//!
//! These types represent the chunks, retrieval candidates, and reports that
//! flow through the ingestion and retrieval pipeline. Metadata is a tagged
//! record with a required `source` rather than an open-ended map, so the
//! relevance-filter and assembler contracts are checkable at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a single chunk of statutory text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Document title the chunk came from (e.g. `"Constitution"`).
    pub source: String,
    /// Structural heading the chunk was split on (e.g. `"Article 12"`).
    pub heading: Option<String>,
    /// Article number extracted from the heading or body (e.g. `"12"`, `"52A"`).
    pub article_number: Option<String>,
    /// Topic labels carried over from the source document.
    pub topics: Vec<String>,
    /// Short body excerpt used in citation references.
    pub summary: Option<String>,
    /// Word count of the normalized content.
    pub word_count: usize,
    /// Ingestion-pipeline timestamp.
    pub created_at: DateTime<Utc>,
}

impl ChunkMeta {
    /// Minimal metadata with only the required `source` set.
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            heading: None,
            article_number: None,
            topics: Vec::new(),
            summary: None,
            word_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// A retrievable unit of document text with attached metadata.
///
/// Invariant: `content` is non-empty and whitespace-normalized (no run of
/// whitespace longer than one space, no leading/trailing whitespace). The
/// chunker upholds this; the store re-checks it before every write.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub meta: ChunkMeta,
}

/// A raw nearest-neighbor hit returned by the vector index.
///
/// Ephemeral: produced per query, consumed by the relevance filter, and
/// discarded after scoring. `distance` is in the index's metric space
/// (cosine distance for the shipped adapters), always `>= 0`.
#[derive(Debug, Clone)]
pub struct RetrievedCandidate {
    pub content: String,
    pub meta: ChunkMeta,
    pub distance: f64,
}

/// A candidate that survived relevance filtering, with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub meta: ChunkMeta,
    pub score: f64,
}

/// A citation-ready reference returned alongside a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Group title, e.g. `"Constitution - Article 12"`.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One ingestion item that could not be written, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedItem {
    /// Position of the item in the original ingestion sequence.
    pub index: usize,
    pub reason: String,
}

/// Outcome of one ingestion run.
///
/// Partial success is expected and reported, never treated as total failure:
/// `accepted + skipped_duplicates + rejected.len()` equals the number of
/// chunks that entered the write phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped_duplicates: usize,
    pub rejected: Vec<RejectedItem>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}
