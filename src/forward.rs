//! Forwarding collected commits to the analysis server.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::models::{CommitInfo, FileMatchReport};

/// Receives every commit that has at least one fetched file.
#[async_trait]
pub trait CommitSink: Send + Sync {
    async fn send(&self, commit: &CommitInfo, matches: &[FileMatchReport]) -> Result<()>;
}

#[derive(Debug, Serialize)]
pub struct AnalysisFile<'a> {
    #[serde(rename = "fileName")]
    pub file_name: &'a str,
    pub language: &'a str,
    pub code: &'a str,
}

/// Body of `POST /analyze_commit`.
#[derive(Debug, Serialize)]
pub struct AnalysisRequest<'a> {
    pub author: &'a str,
    pub email: &'a str,
    pub message: &'a str,
    pub sha: &'a str,
    pub requirement_ref: Option<&'a str>,
    pub files: Vec<AnalysisFile<'a>>,
    pub matches: &'a [FileMatchReport],
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(commit: &'a CommitInfo, matches: &'a [FileMatchReport]) -> Self {
        let files = commit
            .file_contents()
            .iter()
            .map(|(path, code)| AnalysisFile {
                file_name: path,
                language: commit.language_of(path),
                code,
            })
            .collect();
        Self {
            author: &commit.author,
            email: &commit.email,
            message: &commit.message,
            sha: &commit.sha,
            requirement_ref: commit.requirement_ref.as_deref(),
            files,
            matches,
        }
    }
}

pub struct AnalysisForwarder {
    endpoint: String,
    client: reqwest::Client,
}

impl AnalysisForwarder {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/analyze_commit", config.url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CommitSink for AnalysisForwarder {
    async fn send(&self, commit: &CommitInfo, matches: &[FileMatchReport]) -> Result<()> {
        let body = AnalysisRequest::new(commit, matches);
        tracing::info!(
            sha = %commit.short_sha(),
            files = body.files.len(),
            "Sending analysis request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Analysis request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Analysis server returned {}: {}", status, text);
        }

        tracing::info!(sha = %commit.short_sha(), "Analysis request accepted");
        Ok(())
    }
}
