//! Vector storage for requirement chunks.
//!
//! The [`Store`] trait is the seam between the requirements index and its
//! backing storage. Two implementations exist:
//!
//! | Type | Backing |
//! |------|---------|
//! | [`SqliteStore`](sqlite::SqliteStore) | SQLite file inside the index directory |
//! | [`InMemoryStore`](memory::InMemoryStore) | `Vec` behind a lock, for tests |
//!
//! Both search by brute-force cosine distance over every vector in a
//! collection. Results are ordered by ascending distance and are neither
//! deduplicated nor filtered by score.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::Chunk;

/// A stored chunk returned from vector search.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance to the query vector (`0.0` = same direction).
    pub distance: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Append chunks with their vectors to `collection`.
    ///
    /// `vectors` must hold exactly one vector per chunk.
    async fn insert_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// The `limit` chunks closest to `query_vec`, closest first.
    async fn vector_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Number of chunks stored in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}

pub(crate) fn check_lengths(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

/// Sort ascending by distance and keep the first `limit`.
pub(crate) fn rank(mut candidates: Vec<ChunkCandidate>, limit: usize) -> Vec<ChunkCandidate> {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit);
    candidates
}
