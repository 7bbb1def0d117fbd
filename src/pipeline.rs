//! Push-event processing: one pass over the pushed commits.
//!
//! For every commit, in payload order and one at a time:
//!
//! 1. fetch the changed files and contents from the [`CommitSource`]
//! 2. build a [`CommitInfo`] (language labels, requirement reference)
//! 3. match each file against the requirements index, if a matcher is set
//! 4. forward the commit to the [`CommitSink`], if one is set
//!
//! A commit that fails at any step is logged and skipped; later commits
//! are still processed. The returned [`CommitReport`]s say what happened.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::forward::CommitSink;
use crate::matcher::RequirementMatcher;
use crate::models::{short_sha, CommitInfo, FileMatchReport, PushCommit, PushEvent};
use crate::source::CommitSource;

pub const DEFAULT_AUTHOR: &str = "Unknown";
pub const DEFAULT_EMAIL: &str = "unknown@email.com";

/// The services one pipeline run needs.
#[derive(Clone)]
pub struct PipelineContext {
    pub source: Arc<dyn CommitSource>,
    pub sink: Option<Arc<dyn CommitSink>>,
    pub matcher: Option<Arc<RequirementMatcher>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The payload entry had no `id`.
    MissingId,
    /// The payload entry could not be read as a commit.
    Malformed,
    /// The source failed or returned nothing.
    FetchFailed,
    /// The commit lists no changed files.
    NoFiles,
    /// Files changed, but none could be read (all removed, binary, ...).
    NoContent,
    Processed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub sha: Option<String>,
    pub outcome: CommitOutcome,
    pub fetched_files: Vec<String>,
    pub matches: Vec<FileMatchReport>,
    pub forwarded: bool,
}

impl CommitReport {
    fn skipped(sha: Option<&str>, outcome: CommitOutcome) -> Self {
        Self {
            sha: sha.map(str::to_string),
            outcome,
            fetched_files: Vec::new(),
            matches: Vec::new(),
            forwarded: false,
        }
    }
}

/// Process a raw push payload.
pub async fn process_push_event(ctx: &PipelineContext, payload: &Value) -> Vec<CommitReport> {
    let event: PushEvent = match serde_json::from_value(payload.clone()) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Push payload is missing required fields");
            return Vec::new();
        }
    };

    let repo = event.repository.full_name.clone();
    let commits = event.commits_to_process();
    if commits.is_empty() {
        tracing::info!(repo = %repo, "No commits to process in push event");
        return Vec::new();
    }

    tracing::info!(repo = %repo, commits = commits.len(), "Processing push event");
    let mut reports = Vec::with_capacity(commits.len());
    for entry in commits {
        let sha = entry.get("id").and_then(Value::as_str).map(str::to_string);
        let commit = match PushCommit::from_entry(entry) {
            Ok(commit) => commit,
            Err(e) => {
                tracing::error!(repo = %repo, sha = ?sha, error = %e, "Malformed commit entry, skipping");
                reports.push(CommitReport::skipped(sha.as_deref(), CommitOutcome::Malformed));
                continue;
            }
        };
        reports.push(process_commit(ctx, &repo, &commit).await);
    }
    reports
}

async fn process_commit(ctx: &PipelineContext, repo: &str, commit: &PushCommit) -> CommitReport {
    let Some(sha) = commit.id.as_deref() else {
        tracing::error!(repo = %repo, "Commit entry has no id, skipping");
        return CommitReport::skipped(None, CommitOutcome::MissingId);
    };

    let author = commit.author.clone().unwrap_or_default();
    let author_name = author.name.unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
    let author_email = author.email.unwrap_or_else(|| DEFAULT_EMAIL.to_string());
    tracing::info!(sha = %short_sha(sha), author = %author_name, "Processing commit");

    let snapshot = match ctx.source.fetch_commit(repo, sha).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            tracing::warn!(sha = %short_sha(sha), "Commit source returned no data");
            return CommitReport::skipped(Some(sha), CommitOutcome::FetchFailed);
        }
        Err(e) => {
            tracing::warn!(sha = %short_sha(sha), error = %e, "Failed to fetch commit");
            return CommitReport::skipped(Some(sha), CommitOutcome::FetchFailed);
        }
    };

    if snapshot.changed_files.is_empty() {
        tracing::warn!(sha = %short_sha(sha), "No files found for commit");
        return CommitReport::skipped(Some(sha), CommitOutcome::NoFiles);
    }
    if snapshot.contents.is_empty() {
        tracing::info!(sha = %short_sha(sha), "No processable file content found for commit");
        return CommitReport::skipped(Some(sha), CommitOutcome::NoContent);
    }

    let info = CommitInfo::from_snapshot(
        author_name,
        author_email,
        commit.message.clone().unwrap_or_default(),
        sha,
        snapshot,
    );
    for (path, language) in info.programming_languages() {
        tracing::info!(file = %path, language = %language, "Collected file");
    }

    let matches = match &ctx.matcher {
        Some(matcher) => match_files(matcher, &info).await,
        None => Vec::new(),
    };

    let forwarded = match &ctx.sink {
        Some(sink) => match sink.send(&info, &matches).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(sha = %info.short_sha(), error = %e, "Failed to forward commit");
                false
            }
        },
        None => {
            tracing::debug!(sha = %info.short_sha(), "No analysis sink configured");
            false
        }
    };

    CommitReport {
        sha: Some(info.sha.clone()),
        outcome: CommitOutcome::Processed,
        fetched_files: info.file_contents().keys().cloned().collect(),
        matches,
        forwarded,
    }
}

async fn match_files(matcher: &RequirementMatcher, info: &CommitInfo) -> Vec<FileMatchReport> {
    let mut reports = Vec::new();
    for (path, text) in info.file_contents() {
        match matcher.match_file(path, text).await {
            Ok(report) => {
                for j in &report.judgments {
                    tracing::info!(
                        sha = %info.short_sha(),
                        file = %path,
                        req = %j.req_id,
                        status = ?j.status,
                        confidence = j.confidence,
                        "Requirement verdict"
                    );
                }
                reports.push(report);
            }
            Err(e) => tracing::warn!(file = %path, error = %e, "Requirement matching failed"),
        }
    }
    reports
}
