//! # legalctx
//!
//! A retrieval-and-ranking pipeline for statute-grounded legal question
//! answering.
//!
//! legalctx ingests legal documents (constitutions, codes, statutes), splits
//! them into citation-addressable chunks, and writes them to a vector index
//! with content-addressed deduplication. At query time it converts raw
//! vector-similarity results into a relevance-filtered, grouped, and
//! character-budgeted context suitable for a downstream language model,
//! together with a citation-ready reference list and per-session
//! conversational memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Documents │──▶│  Chunker    │──▶│ ContentStore │──▶ VectorIndex
//! └───────────┘   │ articles /  │   │ dedup+batch  │    (memory/chroma)
//!                 │ windows     │   └──────────────┘
//!                 └─────────────┘
//!
//! Query ──▶ VectorIndex ──▶ RelevanceFilter ──▶ ContextAssembler ──▶ LLM
//!                                                    ▲                │
//!                                         ConversationMemory ◀────────┘
//! ```
//!
//! The embedding model, the vector index, and the generation model are
//! external collaborators consumed through narrow traits
//! ([`index::VectorIndex`], [`embedding::EmbeddingProvider`],
//! [`generation::GenerationProvider`]); the crate ships an in-memory index
//! and a deterministic hashing embedder so the whole pipeline runs offline.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunker`] | Structural and windowed document chunking |
//! | [`store`] | Content-addressed ingestion with batch-write isolation |
//! | [`index`] | Vector index trait and adapters |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retrieval`] | Distance→similarity mapping and relevance filtering |
//! | [`assemble`] | Reference grouping and context assembly |
//! | [`memory`] | Session-scoped conversation memory |
//! | [`generation`] | Answer generation provider abstraction |
//! | [`engine`] | Ask/converse/ingest orchestration |
//! | [`server`] | JSON HTTP API |

pub mod assemble;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod index;
pub mod memory;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod store;
