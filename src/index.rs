//! Vector index abstraction and adapters.
//!
//! The [`VectorIndex`] trait is the narrow contract through which the
//! pipeline consumes nearest-neighbor search. The index owns chunk content
//! after a successful write; the core holds no further mutable reference.
//!
//! Two adapters ship with the crate:
//!
//! - **[`MemoryIndex`]** — brute-force cosine search behind `RwLock`s, for
//!   tests and single-process embedded use.
//! - **[`ChromaIndex`]** — HTTP client for a Chroma server, created with a
//!   cosine-space collection. Retries transient failures with exponential
//!   backoff.
//!
//! Both report distances in cosine space (`distance = 1 − similarity`), so
//! the relevance filter's cosine mapping applies unchanged.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::RwLock;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::embedding::cosine_similarity;
use crate::models::RetrievedCandidate;
use crate::store::decode_metadata;

/// Narrow contract for the nearest-neighbor index collaborator.
///
/// Metadata crosses this boundary as flat JSON objects whose values are
/// already restricted to primitives (see [`crate::store::encode_metadata`]).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write a batch of chunks. All four slices have equal length.
    async fn add(
        &self,
        ids: &[String],
        contents: &[String],
        metadatas: &[Map<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()>;

    /// Return the `top_n` nearest chunks to `embedding`, closest first.
    async fn query(&self, embedding: &[f32], top_n: usize) -> Result<Vec<RetrievedCandidate>>;

    /// Whether any stored chunk carries this content hash. Backs the
    /// store's dedup-by-content check against already-written data.
    async fn contains(&self, content_hash: &str) -> Result<bool>;

    /// Delete specific entries by id.
    async fn delete_ids(&self, ids: &[String]) -> Result<()>;

    /// Delete every entry. Returns the number removed; an already-empty
    /// index is a no-op, not an error.
    async fn clear(&self) -> Result<usize>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;
}

/// Create the configured [`VectorIndex`] adapter.
pub fn create_index(config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "memory" => Ok(Box::new(MemoryIndex::new())),
        "chroma" => Ok(Box::new(ChromaIndex::new(config)?)),
        other => bail!("Unknown index provider: {}", other),
    }
}

// ============ In-memory index ============

struct StoredEntry {
    id: String,
    content: String,
    metadata: Map<String, Value>,
    content_hash: Option<String>,
    embedding: Vec<f32>,
}

/// Brute-force in-memory index for tests and embedded use.
pub struct MemoryIndex {
    entries: RwLock<Vec<StoredEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn add(
        &self,
        ids: &[String],
        contents: &[String],
        metadatas: &[Map<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if ids.len() != contents.len()
            || ids.len() != metadatas.len()
            || ids.len() != embeddings.len()
        {
            bail!("add: mismatched batch lengths");
        }

        let mut entries = self.entries.write().unwrap();
        for i in 0..ids.len() {
            let content_hash = metadatas[i]
                .get("content_hash")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            entries.push(StoredEntry {
                id: ids[i].clone(),
                content: contents[i].clone(),
                metadata: metadatas[i].clone(),
                content_hash,
                embedding: embeddings[i].clone(),
            });
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_n: usize) -> Result<Vec<RetrievedCandidate>> {
        let entries = self.entries.read().unwrap();
        let mut candidates: Vec<RetrievedCandidate> = entries
            .iter()
            .map(|e| {
                let distance = 1.0 - cosine_similarity(embedding, &e.embedding) as f64;
                RetrievedCandidate {
                    content: e.content.clone(),
                    meta: decode_metadata(&e.metadata),
                    distance,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_n);
        Ok(candidates)
    }

    async fn contains(&self, content_hash: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .any(|e| e.content_hash.as_deref() == Some(content_hash)))
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| !ids.contains(&e.id));
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().unwrap();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}

// ============ Chroma HTTP index ============

/// HTTP adapter for a Chroma server.
///
/// The collection is resolved lazily with `get_or_create` semantics and a
/// cosine HNSW space, then cached for the lifetime of the adapter.
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    max_retries: u32,
    collection_id: tokio::sync::OnceCell<String>,
}

impl ChromaIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            max_retries: config.max_retries,
            collection_id: tokio::sync::OnceCell::new(),
        })
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let body = serde_json::json!({
                    "name": self.collection,
                    "get_or_create": true,
                    "metadata": { "hnsw:space": "cosine" },
                });
                let resp = self
                    .post_with_retry(&format!("{}/api/v1/collections", self.base_url), &body)
                    .await?;
                resp.get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow::anyhow!("Chroma collection response missing id"))
            })
            .await?;
        Ok(id.as_str())
    }

    /// POST a JSON body, retrying 429/5xx and network errors with
    /// exponential backoff. Other 4xx responses fail immediately.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.post(url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        // Some Chroma write endpoints return bare `true`.
                        return Ok(response.json().await.unwrap_or(Value::Null));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("Chroma error {}: {}", status, text));
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    bail!("Chroma error {}: {}", status, text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Chroma connection error (is Chroma running at {}?): {}",
                        self.base_url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chroma request failed after retries")))
    }

    fn collection_url(&self, id: &str, op: &str) -> String {
        format!("{}/api/v1/collections/{}/{}", self.base_url, id, op)
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn add(
        &self,
        ids: &[String],
        contents: &[String],
        metadatas: &[Map<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        let id = self.collection_id().await?;
        let body = serde_json::json!({
            "ids": ids,
            "documents": contents,
            "metadatas": metadatas,
            "embeddings": embeddings,
        });
        self.post_with_retry(&self.collection_url(id, "add"), &body)
            .await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_n: usize) -> Result<Vec<RetrievedCandidate>> {
        let id = self.collection_id().await?;
        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": top_n,
            "include": ["documents", "metadatas", "distances"],
        });
        let resp = self
            .post_with_retry(&self.collection_url(id, "query"), &body)
            .await?;

        let documents = first_row(&resp, "documents");
        let metadatas = first_row(&resp, "metadatas");
        let distances = first_row(&resp, "distances");

        let mut candidates = Vec::new();
        for i in 0..documents.len() {
            let content = documents[i].as_str().unwrap_or_default().to_string();
            let meta_map = metadatas
                .get(i)
                .and_then(|m| m.as_object())
                .cloned()
                .unwrap_or_default();
            let distance = distances.get(i).and_then(|d| d.as_f64()).unwrap_or(f64::MAX);

            candidates.push(RetrievedCandidate {
                content,
                meta: decode_metadata(&meta_map),
                distance,
            });
        }
        Ok(candidates)
    }

    async fn contains(&self, content_hash: &str) -> Result<bool> {
        let id = self.collection_id().await?;
        let body = serde_json::json!({
            "where": { "content_hash": content_hash },
            "include": [],
            "limit": 1,
        });
        let resp = self
            .post_with_retry(&self.collection_url(id, "get"), &body)
            .await?;
        let ids = resp.get("ids").and_then(|v| v.as_array());
        Ok(ids.map(|a| !a.is_empty()).unwrap_or(false))
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let id = self.collection_id().await?;
        let body = serde_json::json!({ "ids": ids });
        self.post_with_retry(&self.collection_url(id, "delete"), &body)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let id = self.collection_id().await?;

        let resp = self
            .post_with_retry(
                &self.collection_url(id, "get"),
                &serde_json::json!({ "include": [] }),
            )
            .await?;
        let ids: Vec<String> = resp
            .get("ids")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(0);
        }

        if self.delete_ids(&ids).await.is_err() {
            // Broad structural delete when bulk id deletion is refused.
            let body = serde_json::json!({ "where": { "source": { "$ne": "" } } });
            self.post_with_retry(&self.collection_url(id, "delete"), &body)
                .await?;
        }
        Ok(ids.len())
    }

    async fn count(&self) -> Result<usize> {
        let id = self.collection_id().await?;
        let url = self.collection_url(id, "count");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Chroma count request failed: {}", url))?;
        if !resp.status().is_success() {
            bail!("Chroma count error {}", resp.status());
        }
        let value: Value = resp.json().await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| anyhow::anyhow!("Chroma count returned a non-integer"))
    }
}

fn first_row(resp: &Value, key: &str) -> Vec<Value> {
    resp.get(key)
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.first())
        .and_then(|row| row.as_array())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::encode_metadata;
    use crate::models::ChunkMeta;

    fn meta_map(source: &str, hash: &str) -> Map<String, Value> {
        encode_metadata(&ChunkMeta::for_source(source), hash)
    }

    #[tokio::test]
    async fn test_memory_index_query_orders_by_distance() {
        let index = MemoryIndex::new();
        index
            .add(
                &["a".into(), "b".into()],
                &["close".into(), "far".into()],
                &[meta_map("S", "h1"), meta_map("S", "h2")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "close");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_memory_index_truncates_to_top_n() {
        let index = MemoryIndex::new();
        for i in 0..5 {
            index
                .add(
                    &[format!("id{}", i)],
                    &[format!("content {}", i)],
                    &[meta_map("S", &format!("h{}", i))],
                    &[vec![i as f32, 1.0]],
                )
                .await
                .unwrap();
        }
        let hits = index.query(&[1.0, 1.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_index_contains_by_content_hash() {
        let index = MemoryIndex::new();
        index
            .add(
                &["a".into()],
                &["text".into()],
                &[meta_map("S", "hash-1")],
                &[vec![1.0]],
            )
            .await
            .unwrap();
        assert!(index.contains("hash-1").await.unwrap());
        assert!(!index.contains("hash-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_index_clear_tolerates_empty() {
        let index = MemoryIndex::new();
        assert_eq!(index.clear().await.unwrap(), 0);

        index
            .add(
                &["a".into()],
                &["text".into()],
                &[meta_map("S", "h")],
                &[vec![1.0]],
            )
            .await
            .unwrap();
        assert_eq!(index.clear().await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_index_rejects_mismatched_batches() {
        let index = MemoryIndex::new();
        let result = index
            .add(&["a".into(), "b".into()], &["only one".into()], &[], &[])
            .await;
        assert!(result.is_err());
    }
}
