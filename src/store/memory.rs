//! In-memory [`Store`] used by tests.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::Chunk;

use super::{check_lengths, rank, ChunkCandidate, Store};

struct StoredChunk {
    collection: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            stored.push(StoredChunk {
                collection: collection.to_string(),
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        let candidates = stored
            .iter()
            .filter(|sc| sc.collection == collection)
            .map(|sc| ChunkCandidate {
                chunk_id: sc.chunk.id.clone(),
                text: sc.chunk.text.clone(),
                metadata: sc.chunk.metadata.clone(),
                distance: cosine_distance(query_vec, &sc.vector),
            })
            .collect();
        Ok(rank(candidates, limit))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        Ok(stored.iter().filter(|sc| sc.collection == collection).count())
    }
}
