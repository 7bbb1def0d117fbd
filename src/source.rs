//! Where commit data comes from.
//!
//! [`CommitSource`] hides whether the webhook process calls GitHub itself
//! ([`DirectSource`]) or asks a tool-server child to do it
//! ([`DelegatedSource`]). The pipeline only sees snapshots.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::github::GithubClient;
use crate::llm::ToolRouter;
use crate::models::{short_sha, CommitSnapshot};
use crate::tool_client::{ToolOutcome, ToolSession};
use crate::tool_server::TOOL_COMMIT_SNAPSHOT;

#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Changed files and contents of one commit.
    ///
    /// `Ok(None)` means the source answered but had nothing usable.
    async fn fetch_commit(&self, repo_full_name: &str, sha: &str)
        -> Result<Option<CommitSnapshot>>;
}

pub struct DirectSource {
    github: Arc<GithubClient>,
}

impl DirectSource {
    pub fn new(github: Arc<GithubClient>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl CommitSource for DirectSource {
    async fn fetch_commit(
        &self,
        repo_full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitSnapshot>> {
        let snapshot = self.github.fetch_snapshot(repo_full_name, sha).await?;
        Ok(Some(snapshot))
    }
}

pub struct DelegatedSource {
    session: Arc<ToolSession>,
    router: Option<ToolRouter>,
}

impl DelegatedSource {
    /// With a `router`, a tool-calling model picks the tool calls; without
    /// one, `get_commit_snapshot` is called directly.
    pub fn new(session: Arc<ToolSession>, router: Option<ToolRouter>) -> Self {
        Self { session, router }
    }

    async fn fetch_routed(
        &self,
        router: &ToolRouter,
        repo_full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitSnapshot>> {
        let instruction = format!(
            "Fetch the changed files and the content of every changed file for commit {} \
             in the GitHub repository {}. Call the {} tool with repo_full_name and commit_sha.",
            sha, repo_full_name, TOOL_COMMIT_SNAPSHOT
        );
        let calls = router.route(&instruction, self.session.list_tools()).await?;
        if calls.is_empty() {
            tracing::warn!(sha = %short_sha(sha), "Model requested no tool calls");
            return Ok(None);
        }

        let mut snapshot = None;
        for call in calls {
            tracing::info!(tool = %call.name, args = ?call.arguments, "Executing routed tool call");
            let outcome = self.session.call_tool(&call.name, call.arguments).await?;
            if snapshot.is_none() && call.name == TOOL_COMMIT_SNAPSHOT {
                snapshot = Some(snapshot_from_outcome(outcome, sha));
            }
        }
        Ok(snapshot.flatten())
    }
}

#[async_trait]
impl CommitSource for DelegatedSource {
    async fn fetch_commit(
        &self,
        repo_full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitSnapshot>> {
        if let Some(router) = &self.router {
            return self.fetch_routed(router, repo_full_name, sha).await;
        }

        let mut args = Map::new();
        args.insert("repo_full_name".to_string(), json!(repo_full_name));
        args.insert("commit_sha".to_string(), json!(sha));
        let outcome = self.session.call_tool(TOOL_COMMIT_SNAPSHOT, args).await?;
        Ok(snapshot_from_outcome(outcome, sha))
    }
}

fn snapshot_from_outcome(outcome: ToolOutcome, sha: &str) -> Option<CommitSnapshot> {
    if outcome.is_error {
        let message = match &outcome.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        tracing::warn!(sha = %short_sha(sha), error = %message, "Tool reported an error");
        return None;
    }
    match serde_json::from_value(outcome.payload) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(sha = %short_sha(sha), error = %e, "Unparsable tool payload");
            None
        }
    }
}
