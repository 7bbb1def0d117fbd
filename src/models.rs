//! Core data models that flow through the push pipeline.
//!
//! Webhook payload → [`PushEvent`] → [`CommitSnapshot`] (from a commit
//! source) → [`CommitInfo`] → per-file [`FeatureSet`] → ranked
//! [`RequirementCandidate`]s → [`JudgeResult`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::language::detect_language;
use crate::requirements::extract_requirement_number;

// ============ Webhook payload ============

/// Typed view over the fields of a GitHub push payload the pipeline reads.
/// Everything else in the payload is ignored.
///
/// Commit entries stay raw JSON until [`PushCommit::from_entry`], so one
/// malformed entry only costs that commit.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    pub repository: Repository,
    #[serde(default)]
    pub commits: Option<Vec<Value>>,
    #[serde(default)]
    pub head_commit: Option<Value>,
}

impl PushEvent {
    /// Commit entries to process: the `commits` list, or the head commit
    /// alone when the list is empty or absent.
    pub fn commits_to_process(&self) -> Vec<Value> {
        match &self.commits {
            Some(commits) if !commits.is_empty() => commits.clone(),
            _ => self.head_commit.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

/// A commit entry inside a push payload. `id` is optional here so a single
/// malformed entry can be skipped without rejecting the whole payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

impl PushCommit {
    pub fn from_entry(entry: Value) -> serde_json::Result<Self> {
        serde_json::from_value(entry)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// ============ Commit data ============

/// A changed-file descriptor as returned by the commit-detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Fields this struct does not model, kept so the descriptor stays raw.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChangedFile {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

/// What a commit source returns for one commit: the changed-file list and
/// the text of every file that could be fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitSnapshot {
    pub changed_files: Vec<ChangedFile>,
    pub contents: BTreeMap<String, String>,
}

/// Everything known about one pushed commit once its files are fetched.
///
/// The contents and language maps are private and filled together in
/// [`CommitInfo::from_snapshot`], so they always have the same keys.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub author: String,
    pub email: String,
    pub message: String,
    pub sha: String,
    pub requirement_ref: Option<String>,
    pub changed_files: Vec<ChangedFile>,
    file_contents: BTreeMap<String, String>,
    programming_languages: BTreeMap<String, String>,
}

impl CommitInfo {
    pub fn from_snapshot(
        author: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
        sha: impl Into<String>,
        snapshot: CommitSnapshot,
    ) -> Self {
        let message = message.into();
        let programming_languages = snapshot
            .contents
            .keys()
            .map(|path| (path.clone(), detect_language(path).to_string()))
            .collect();

        Self {
            author: author.into(),
            email: email.into(),
            requirement_ref: extract_requirement_number(&message),
            message,
            sha: sha.into(),
            changed_files: snapshot.changed_files,
            file_contents: snapshot.contents,
            programming_languages,
        }
    }

    pub fn file_contents(&self) -> &BTreeMap<String, String> {
        &self.file_contents
    }

    pub fn programming_languages(&self) -> &BTreeMap<String, String> {
        &self.programming_languages
    }

    pub fn language_of(&self, path: &str) -> &str {
        self.programming_languages
            .get(path)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    /// First eight characters of the SHA, for log lines.
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(8) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

// ============ Features ============

/// Boolean role guesses for a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleHints {
    pub is_controller: bool,
    pub is_repository: bool,
    pub is_service: bool,
}

impl RoleHints {
    /// Names of the roles that are set, in a fixed order.
    pub fn active(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.is_controller {
            roles.push("controller");
        }
        if self.is_repository {
            roles.push("repository");
        }
        if self.is_service {
            roles.push("service");
        }
        roles
    }
}

/// Structured summary of a single file's content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSet {
    pub file_path: String,
    pub routes: Vec<String>,
    pub defs: Vec<String>,
    pub configs: Vec<String>,
    pub hints: RoleHints,
    pub sampled: String,
}

// ============ Requirements ============

/// A chunk of the requirements document, as stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub metadata: Map<String, Value>,
}

/// A requirement chunk returned by similarity search.
///
/// `score` is a cosine distance: lower means closer.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementCandidate {
    pub metadata: Map<String, Value>,
    pub score: f64,
}

impl RequirementCandidate {
    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Requirement identifier, falling back to the source path, then `RFP`.
    pub fn req_id(&self) -> String {
        self.meta_str("req_id")
            .or_else(|| self.meta_str("source_path"))
            .unwrap_or("RFP")
            .to_string()
    }

    pub fn title(&self) -> String {
        self.meta_str("title").unwrap_or_default().to_string()
    }

    pub fn snippet(&self) -> String {
        self.meta_str("snippet").unwrap_or_default().to_string()
    }
}

/// Implementation status assigned by the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeStatus {
    Meets,
    Partial,
    Missing,
    Conflict,
}

/// Judge verdict for one (file, requirement) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeResult {
    pub status: JudgeStatus,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub notes: String,
    pub coverage: String,
    pub req_id: String,
    pub req_title: String,
}

/// Matching outcome for one file of a commit.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatchReport {
    pub path: String,
    pub language: String,
    pub query: String,
    pub candidates: Vec<RequirementCandidate>,
    pub judgments: Vec<JudgeResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot_with(paths: &[&str]) -> CommitSnapshot {
        CommitSnapshot {
            changed_files: Vec::new(),
            contents: paths
                .iter()
                .map(|p| (p.to_string(), format!("// {}", p)))
                .collect(),
        }
    }

    #[test]
    fn commit_info_language_keys_match_content_keys() {
        let info = CommitInfo::from_snapshot(
            "Ada",
            "ada@example.com",
            "REQ-12 add router",
            "abc123def456",
            snapshot_with(&["src/app.py", "web/App.tsx", "Dockerfile"]),
        );
        let content_keys: Vec<_> = info.file_contents().keys().collect();
        let lang_keys: Vec<_> = info.programming_languages().keys().collect();
        assert_eq!(content_keys, lang_keys);
        assert_eq!(info.language_of("src/app.py"), "Python");
        assert_eq!(info.language_of("Dockerfile"), "Dockerfile");
        assert_eq!(info.requirement_ref.as_deref(), Some("12"));
        assert_eq!(info.short_sha(), "abc123de");
    }

    #[test]
    fn head_commit_used_when_commit_list_empty() {
        let event: PushEvent = serde_json::from_value(json!({
            "repository": {"full_name": "acme/widgets"},
            "commits": [],
            "head_commit": {"id": "abc", "message": "m"}
        }))
        .unwrap();
        let commits = event.commits_to_process();
        assert_eq!(commits.len(), 1);
        let commit = PushCommit::from_entry(commits[0].clone()).unwrap();
        assert_eq!(commit.id.as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_entry_does_not_reject_the_event() {
        let event: PushEvent = serde_json::from_value(json!({
            "repository": {"full_name": "acme/widgets"},
            "commits": [{"id": "bad", "message": 42}, {"id": "good"}]
        }))
        .unwrap();
        let commits = event.commits_to_process();
        assert_eq!(commits.len(), 2);
        assert!(PushCommit::from_entry(commits[0].clone()).is_err());
        assert!(PushCommit::from_entry(commits[1].clone()).is_ok());
    }

    #[test]
    fn no_commits_and_no_head_commit_yields_nothing() {
        let event: PushEvent = serde_json::from_value(json!({
            "repository": {"full_name": "acme/widgets"},
            "commits": []
        }))
        .unwrap();
        assert!(event.commits_to_process().is_empty());
    }

    #[test]
    fn changed_file_keeps_unmodelled_fields() {
        let file: ChangedFile = serde_json::from_value(json!({
            "filename": "a.rs",
            "status": "modified",
            "blob_url": "https://example.invalid/blob"
        }))
        .unwrap();
        assert!(!file.is_removed());
        assert_eq!(file.extra.get("blob_url"), Some(&json!("https://example.invalid/blob")));
    }

    #[test]
    fn candidate_req_id_falls_back() {
        let mut c = RequirementCandidate {
            metadata: Map::new(),
            score: 0.1,
        };
        assert_eq!(c.req_id(), "RFP");
        c.metadata
            .insert("source_path".into(), json!("docs/RFP_requirements.md"));
        assert_eq!(c.req_id(), "docs/RFP_requirements.md");
        c.metadata.insert("req_id".into(), json!("REQ-7"));
        assert_eq!(c.req_id(), "REQ-7");
    }
}
