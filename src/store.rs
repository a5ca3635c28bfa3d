//! Content-addressed chunk store.
//!
//! Sits between the chunker and the vector index. Every chunk gets a
//! deterministic id derived from its position and content hash, duplicate
//! content from the same source is skipped before it reaches the index,
//! and metadata is flattened to index-safe primitive values on the way in.
//!
//! Batch writes degrade to per-item writes when a batch is refused, so one
//! poisoned chunk never discards its batchmates.

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::models::{Chunk, ChunkMeta, IngestReport, RejectedItem};

/// Ingestion front door for the vector index.
pub struct ContentStore<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
    batch_size: usize,
}

impl<'a> ContentStore<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Write chunks to the index, skipping duplicates and reporting every
    /// rejected item.
    ///
    /// `start_index` is the position of `chunks[0]` within the overall
    /// ingestion sequence; ids stay stable across multi-document runs.
    ///
    /// Dedup is by content hash, checked both against earlier chunks in
    /// this call and against what the index already holds, so re-running
    /// ingestion on the same corpus is idempotent.
    pub async fn ingest(&self, chunks: &[Chunk], start_index: usize) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut seen_hashes: HashSet<String> = HashSet::new();

        // Validate and dedup up front so batches contain only writable items.
        let mut pending: Vec<(usize, &Chunk, String)> = Vec::new();
        for (offset, chunk) in chunks.iter().enumerate() {
            let position = start_index + offset;

            if chunk.content.trim().is_empty() {
                report.rejected.push(RejectedItem {
                    index: position,
                    reason: "empty content".to_string(),
                });
                continue;
            }
            if chunk.meta.source.trim().is_empty() {
                report.rejected.push(RejectedItem {
                    index: position,
                    reason: "missing source".to_string(),
                });
                continue;
            }

            let hash = dedup_key(&chunk.meta.source, &chunk.content);
            if seen_hashes.contains(&hash) || self.index.contains(&hash).await? {
                report.skipped_duplicates += 1;
                continue;
            }
            seen_hashes.insert(hash.clone());
            pending.push((position, chunk, hash));
        }

        for batch in pending.chunks(self.batch_size) {
            self.write_batch(batch, &mut report).await?;
        }

        Ok(report)
    }

    async fn write_batch(
        &self,
        batch: &[(usize, &Chunk, String)],
        report: &mut IngestReport,
    ) -> Result<()> {
        let contents: Vec<String> = batch.iter().map(|(_, c, _)| c.content.clone()).collect();
        let embeddings = self.embedder.embed_many(&contents).await?;
        if embeddings.len() != contents.len() {
            bail!(
                "Embedding provider returned {} vectors for {} inputs",
                embeddings.len(),
                contents.len()
            );
        }

        let ids: Vec<String> = batch
            .iter()
            .map(|(position, _, hash)| chunk_id(*position, hash))
            .collect();
        let metadatas: Vec<Map<String, Value>> = batch
            .iter()
            .map(|(_, chunk, hash)| encode_metadata(&chunk.meta, hash))
            .collect();

        match self
            .index
            .add(&ids, &contents, &metadatas, &embeddings)
            .await
        {
            Ok(()) => {
                report.accepted += batch.len();
                Ok(())
            }
            Err(_) => {
                // Retry each item alone so one bad chunk only loses itself.
                for (i, (position, _, _)) in batch.iter().enumerate() {
                    let result = self
                        .index
                        .add(
                            &ids[i..i + 1],
                            &contents[i..i + 1],
                            &metadatas[i..i + 1],
                            &embeddings[i..i + 1],
                        )
                        .await;
                    match result {
                        Ok(()) => report.accepted += 1,
                        Err(e) => report.rejected.push(RejectedItem {
                            index: *position,
                            reason: e.to_string(),
                        }),
                    }
                }
                Ok(())
            }
        }
    }

    /// Remove every stored chunk. Tolerant of an already-empty index.
    pub async fn clear(&self) -> Result<usize> {
        self.index.clear().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }
}

/// Deterministic chunk id: position in the ingestion sequence plus a
/// content-hash prefix. Identical content at the same position always maps
/// to the same id.
pub fn chunk_id(position: usize, content_hash: &str) -> String {
    format!("doc-{}-{}", position, &content_hash[..16.min(content_hash.len())])
}

/// Dedup key over `(source, content)`. The same clause quoted by two
/// different documents is kept once per document, since each is a distinct
/// citable unit.
pub fn dedup_key(source: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Flatten chunk metadata to the primitive-only map vector indexes accept.
///
/// Lists become comma-joined strings; absent options pass through as
/// nulls, and stripping those is the adapter's business.
pub fn encode_metadata(meta: &ChunkMeta, content_hash: &str) -> Map<String, Value> {
    let optional = |v: &Option<String>| match v {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    };

    let mut map = Map::new();
    map.insert("source".to_string(), Value::String(meta.source.clone()));
    map.insert("heading".to_string(), optional(&meta.heading));
    map.insert("article_number".to_string(), optional(&meta.article_number));
    map.insert("topics".to_string(), Value::String(meta.topics.join(", ")));
    map.insert("summary".to_string(), optional(&meta.summary));
    map.insert("word_count".to_string(), Value::from(meta.word_count as u64));
    map.insert(
        "created_at".to_string(),
        Value::String(meta.created_at.to_rfc3339()),
    );
    map.insert(
        "content_hash".to_string(),
        Value::String(content_hash.to_string()),
    );
    sanitize_metadata(map)
}

/// Coerce any non-primitive values (from externally-supplied maps) to
/// strings so the index never sees nested structures. Nulls pass through
/// unchanged.
fn sanitize_metadata(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| {
            let coerced = match v {
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    Value::String(joined)
                }
                Value::Object(_) => Value::String(v.to_string()),
                primitive => primitive,
            };
            (k, coerced)
        })
        .collect()
}

/// Rebuild [`ChunkMeta`] from a flattened metadata map. Missing fields get
/// neutral defaults; a missing source becomes an empty string rather than
/// an error, since query results should degrade, not fail.
pub fn decode_metadata(map: &Map<String, Value>) -> ChunkMeta {
    let get_str = |key: &str| {
        map.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    ChunkMeta {
        source: get_str("source").unwrap_or_default(),
        heading: get_str("heading"),
        article_number: get_str("article_number"),
        topics: get_str("topics")
            .map(|joined| {
                joined
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        summary: get_str("summary"),
        word_count: map
            .get("word_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        created_at: get_str("created_at")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now),
    }
}
