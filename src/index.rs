//! Requirements index: bootstrap and similarity search.
//!
//! The index lives in a directory (`requirements.index_dir`) containing:
//!
//! - `index.sqlite`: chunks, metadata and vectors ([`SqliteStore`])
//! - `manifest.json`: embedding model, dims, collection, chunk count and
//!   the SHA-256 of the source document ([`Manifest`])
//!
//! # Bootstrap
//!
//! [`RequirementIndex::load_or_build`] opens the existing index when the
//! directory exists and is non-empty. Otherwise it reads the requirements
//! document, splits it with [`chunk_document`], embeds the chunks in
//! batches, and persists them together with a fresh manifest. Every I/O or
//! embedding failure is returned to the caller; at startup that is fatal.
//!
//! # Chunk metadata
//!
//! | Key | Value |
//! |-----|-------|
//! | `source_path` | document path as configured |
//! | `chunk_index` | position of the chunk, from 0 |
//! | `title` | first Markdown heading in the chunk, else the last heading seen before it |
//! | `req_id` | `REQ-<n>` for the first requirement reference in the chunk (omitted if none) |
//!
//! Search adds `snippet` (first 400 characters of the chunk text).

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::chunk::chunk_document;
use crate::config::RequirementsConfig;
use crate::embedding::{embed_in_batches, embed_query, EmbeddingProvider};
use crate::models::{Chunk, RequirementCandidate};
use crate::requirements::extract_requirement_number;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub const INDEX_DB_FILE: &str = "index.sqlite";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SNIPPET_CHARS: usize = 400;

/// Description of a built index, written next to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: String,
    pub dims: usize,
    pub collection: String,
    pub chunk_count: usize,
    pub source_path: String,
    pub source_sha256: String,
    pub built_at: String,
}

impl Manifest {
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// The requirements corpus as a searchable vector index.
pub struct RequirementIndex {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl RequirementIndex {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            collection: collection.into(),
        }
    }

    /// Open the persisted index, or build it from the requirements document.
    ///
    /// With `rebuild` set, the index directory is deleted first.
    pub async fn load_or_build(
        config: &RequirementsConfig,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        rebuild: bool,
    ) -> Result<Self> {
        let dir = &config.index_dir;

        if rebuild && dir.exists() {
            tracing::info!(dir = %dir.display(), "Removing existing requirements index");
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }

        if dir_has_entries(dir)? {
            return Self::open_existing(config, provider).await;
        }

        tracing::info!(
            document = %config.document.display(),
            "Requirements index not found, building"
        );
        let text = std::fs::read_to_string(&config.document).with_context(|| {
            format!(
                "Failed to read requirements document {}",
                config.document.display()
            )
        })?;

        let created = !dir.exists();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let built = Self::build_fresh(config, provider, batch_size, &text).await;
        let (index, chunk_count) = match built {
            Ok(ok) => ok,
            Err(e) => {
                // A half-built directory would be opened as-is on the next start.
                discard_partial_build(dir, created);
                return Err(e);
            }
        };

        tracing::info!(chunks = chunk_count, dir = %dir.display(), "Requirements index built");
        Ok(index)
    }

    async fn build_fresh(
        config: &RequirementsConfig,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        text: &str,
    ) -> Result<(Self, usize)> {
        let dir = &config.index_dir;
        let store = SqliteStore::open(&dir.join(INDEX_DB_FILE)).await?;
        let index = Self::new(Arc::new(store), provider, config.collection.clone());

        let source_path = config.document.display().to_string();
        let (chunk_count, dims) = index
            .ingest_document(
                &source_path,
                text,
                config.chunk_size,
                config.chunk_overlap,
                batch_size,
            )
            .await?;

        Manifest {
            model: index.provider.model_name().to_string(),
            dims,
            collection: config.collection.clone(),
            chunk_count,
            source_path,
            source_sha256: sha256_hex(text),
            built_at: chrono::Utc::now().to_rfc3339(),
        }
        .write(dir)?;

        Ok((index, chunk_count))
    }

    async fn open_existing(
        config: &RequirementsConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let dir = &config.index_dir;
        let db_path = dir.join(INDEX_DB_FILE);
        if !db_path.exists() {
            bail!(
                "Index directory {} is not empty but has no {}; use --rebuild",
                dir.display(),
                INDEX_DB_FILE
            );
        }

        match Manifest::read(dir)? {
            Some(m) if m.model != provider.model_name() => tracing::warn!(
                index_model = %m.model,
                configured_model = %provider.model_name(),
                "Requirements index was built with a different embedding model"
            ),
            Some(_) => {}
            None => tracing::warn!(dir = %dir.display(), "Requirements index has no manifest"),
        }

        let store = SqliteStore::open(&db_path).await?;
        let count = store.count(&config.collection).await?;
        tracing::info!(chunks = count, dir = %dir.display(), "Requirements index loaded");

        Ok(Self::new(
            Arc::new(store),
            provider,
            config.collection.clone(),
        ))
    }

    /// Split, annotate, embed and store one document.
    ///
    /// Returns the number of chunks stored and the vector dimensionality.
    pub async fn ingest_document(
        &self,
        source_path: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
        batch_size: usize,
    ) -> Result<(usize, usize)> {
        let mut chunks = chunk_document(source_path, text, chunk_size, chunk_overlap);
        annotate_chunks(&mut chunks);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(self.provider.as_ref(), &texts, batch_size).await?;
        let dims = vectors.first().map(Vec::len).unwrap_or(0);

        self.store
            .insert_chunks(&self.collection, &chunks, &vectors)
            .await?;
        Ok((chunks.len(), dims))
    }

    /// The `k` requirement chunks closest to `query`, closest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RequirementCandidate>> {
        let query_vec = embed_query(self.provider.as_ref(), query).await?;
        let hits = self
            .store
            .vector_search(&self.collection, &query_vec, k)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut metadata = hit.metadata;
                let snippet: String = hit.text.chars().take(SNIPPET_CHARS).collect();
                metadata.insert("snippet".to_string(), Value::from(snippet));
                RequirementCandidate {
                    metadata,
                    score: hit.distance,
                }
            })
            .collect())
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.count(&self.collection).await
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

/// Undo a failed build. A directory this run created is removed; one that
/// already existed (empty) is only emptied again.
fn discard_partial_build(dir: &Path, created: bool) {
    let result = if created {
        std::fs::remove_dir_all(dir)
    } else {
        std::fs::read_dir(dir).and_then(|entries| {
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    };
    if let Err(e) = result {
        tracing::warn!(
            dir = %dir.display(),
            error = %e,
            "Failed to clean up partially built requirements index"
        );
    }
}

/// Add `title` and `req_id` metadata to chunks in document order.
fn annotate_chunks(chunks: &mut [Chunk]) {
    let mut last_heading: Option<String> = None;

    for chunk in chunks.iter_mut() {
        let headings: Vec<String> = chunk.text.lines().filter_map(heading_text).collect();
        let title = headings
            .first()
            .cloned()
            .or_else(|| last_heading.clone())
            .unwrap_or_default();
        if let Some(last) = headings.last() {
            last_heading = Some(last.clone());
        }

        chunk
            .metadata
            .insert("title".to_string(), Value::from(title));
        if let Some(n) = extract_requirement_number(&chunk.text) {
            chunk
                .metadata
                .insert("req_id".to_string(), Value::from(format!("REQ-{}", n)));
        }
    }
}

/// `"## Login"` → `Some("Login")`.
fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn dir_has_entries(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    let mut entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    Ok(entries.next().is_some())
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
