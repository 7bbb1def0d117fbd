//! Requirements index bootstrap on disk, plus matching with a canned judge.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use commitlens::config::RequirementsConfig;
use commitlens::embedding::EmbeddingProvider;
use commitlens::index::{Manifest, RequirementIndex, INDEX_DB_FILE};
use commitlens::llm::ChatModel;
use commitlens::matcher::RequirementMatcher;
use commitlens::models::JudgeStatus;

const DOCUMENT: &str = "# Login\nREQ-1 Users must login with a password.\n\n\
# Export\nREQ-2 Admins can export reports as CSV.\n\n\
# Audit\nREQ-3 Every change is written to the audit log.";

/// Deterministic embedder: one dimension per keyword.
struct KeywordEmbedder {
    model: &'static str,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        self.model
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    t.matches("login").count() as f32 + 0.01,
                    t.matches("export").count() as f32 + 0.01,
                    t.matches("audit").count() as f32 + 0.01,
                ]
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding backend unavailable")
    }
}

fn provider(model: &'static str) -> Arc<dyn EmbeddingProvider> {
    Arc::new(KeywordEmbedder { model })
}

fn config(root: &Path) -> RequirementsConfig {
    let document = root.join("requirements.md");
    std::fs::write(&document, DOCUMENT).unwrap();
    RequirementsConfig {
        document,
        index_dir: root.join("index"),
        chunk_size: 80,
        chunk_overlap: 0,
        ..RequirementsConfig::default()
    }
}

#[tokio::test]
async fn builds_then_reopens_the_index() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());

    let index = RequirementIndex::load_or_build(&config, provider("keywords"), 2, false)
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 3);
    assert!(config.index_dir.join(INDEX_DB_FILE).exists());

    let manifest = Manifest::read(&config.index_dir).unwrap().unwrap();
    assert_eq!(manifest.model, "keywords");
    assert_eq!(manifest.dims, 3);
    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(manifest.collection, config.collection);
    drop(index);

    // The document is no longer needed once the index exists.
    std::fs::remove_file(&config.document).unwrap();
    let reopened = RequirementIndex::load_or_build(&config, provider("other-model"), 2, false)
        .await
        .unwrap();
    assert_eq!(reopened.len().await.unwrap(), 3);

    let hits = reopened.search("audit log entries", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].req_id(), "REQ-3");
    assert_eq!(hits[0].metadata["title"], "Audit");
    assert!(hits[0].score <= hits[1].score);
    assert!(hits[0].metadata["snippet"]
        .as_str()
        .unwrap()
        .contains("audit log"));
}

#[tokio::test]
async fn rebuild_replaces_the_index() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    RequirementIndex::load_or_build(&config, provider("keywords"), 8, false)
        .await
        .unwrap();

    std::fs::write(&config.document, "# Only\nREQ-9 A single login requirement.").unwrap();
    let rebuilt = RequirementIndex::load_or_build(&config, provider("keywords"), 8, true)
        .await
        .unwrap();
    assert_eq!(rebuilt.len().await.unwrap(), 1);
}

#[tokio::test]
async fn foreign_directory_is_refused() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    std::fs::create_dir_all(&config.index_dir).unwrap();
    std::fs::write(config.index_dir.join("notes.txt"), "not an index").unwrap();

    let err = RequirementIndex::load_or_build(&config, provider("keywords"), 8, false)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("--rebuild"));
}

#[tokio::test]
async fn failed_build_leaves_no_directory() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());

    let result =
        RequirementIndex::load_or_build(&config, Arc::new(FailingEmbedder), 8, false).await;
    assert!(result.is_err());
    assert!(!config.index_dir.exists());
}

#[tokio::test]
async fn failed_build_keeps_an_existing_empty_directory() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    std::fs::create_dir_all(&config.index_dir).unwrap();

    let result =
        RequirementIndex::load_or_build(&config, Arc::new(FailingEmbedder), 8, false).await;
    assert!(result.is_err());
    assert!(config.index_dir.is_dir());
    assert_eq!(std::fs::read_dir(&config.index_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_document_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = RequirementsConfig {
        document: tmp.path().join("nope.md"),
        index_dir: tmp.path().join("index"),
        ..RequirementsConfig::default()
    };
    let result = RequirementIndex::load_or_build(&config, provider("keywords"), 8, false).await;
    assert!(result.is_err());
}

/// Judges everything as met, with a confidence above the valid range.
struct AlwaysMeets;

#[async_trait]
impl ChatModel for AlwaysMeets {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(r#"{"status":"Meets","confidence":1.7,"evidence":["a","b","c","d"],"notes":"ok","coverage":"full"}"#.to_string())
    }
}

#[tokio::test]
async fn matcher_judges_top_candidates() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let index = RequirementIndex::load_or_build(&config, provider("keywords"), 8, false)
        .await
        .unwrap();

    let matcher = RequirementMatcher::new(Arc::new(index), Some(Arc::new(AlwaysMeets)), 2);
    assert!(matcher.has_judge());

    let source = "def export_csv(report):\n    \"\"\"Export the report.\"\"\"\n    return report.export()\n";
    let report = matcher.match_file("reports/export.py", source).await.unwrap();

    assert_eq!(report.language, "Python");
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.judgments.len(), 2);
    let first = &report.judgments[0];
    assert_eq!(first.req_id, "REQ-2");
    assert_eq!(first.req_title, "Export");
    assert_eq!(first.status, JudgeStatus::Meets);
    assert_eq!(first.confidence, 1.0);
    assert_eq!(first.evidence.len(), 3);
}
