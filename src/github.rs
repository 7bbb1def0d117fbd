//! GitHub REST access: commit details and file contents.
//!
//! One [`GithubClient`] is shared by the webhook process (direct mode) and
//! the tool server (delegated mode). It sends `User-Agent`, the v3 `Accept`
//! header and, when a token is configured, `Authorization: token <t>`.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`get_commit_files`](GithubClient::get_commit_files) | `GET {api}/repos/{repo}/commits/{sha}` |
//! | [`get_file_content`](GithubClient::get_file_content) | `GET {api}/repos/{repo}/contents/{path}?ref={ref}` |
//! | large-file fallback | `GET {raw}/{repo}/{ref}/{path}` |
//!
//! Path segments are percent-encoded individually, so `/` separators are
//! kept while spaces and other reserved characters are escaped.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::config::GithubConfig;
use crate::models::{short_sha, ChangedFile, CommitSnapshot};

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("request to GitHub failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub returned {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("invalid GitHub URL: {0}")]
    Url(String),
}

#[derive(Clone)]
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    raw_base: String,
    large_file_threshold: u64,
    has_token: bool,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("commitlens/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("token {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            raw_base: config.raw_base.clone(),
            large_file_threshold: config.large_file_threshold,
            has_token: config.token.is_some(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.has_token
    }

    /// Changed files of a commit, as returned by the commit-detail endpoint.
    pub async fn get_commit_files(
        &self,
        repo_full_name: &str,
        sha: &str,
    ) -> Result<Vec<ChangedFile>, GithubError> {
        let url = build_url(&self.api_base, &["repos"], repo_full_name, &["commits", sha])?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GithubError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let files = match body.get("files") {
            Some(files) => {
                serde_json::from_value(files.clone()).map_err(|e| GithubError::Decode {
                    path: format!("{}@{}", repo_full_name, short_sha(sha)),
                    reason: e.to_string(),
                })?
            }
            None => Vec::new(),
        };
        Ok(files)
    }

    /// Text of `path` at `git_ref`. `Ok(None)` when the file is empty.
    pub async fn get_file_content(
        &self,
        repo_full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError> {
        let mut url = build_url(&self.api_base, &["repos"], repo_full_name, &["contents"])?;
        push_path(&mut url, path)?;
        url.query_pairs_mut().append_pair("ref", git_ref);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GithubError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(0);
        let encoding = body.get("encoding").and_then(Value::as_str).unwrap_or("");

        if size > self.large_file_threshold || (encoding == "none" && size > 0) {
            tracing::debug!(file = %path, size, "Large file, using raw endpoint");
            return self.get_raw_content(repo_full_name, path, git_ref).await;
        }

        match body.get("content").and_then(Value::as_str) {
            Some(content) if !content.is_empty() => decode_base64_text(path, content).map(Some),
            _ => Ok(None),
        }
    }

    async fn get_raw_content(
        &self,
        repo_full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError> {
        let mut url = build_url(&self.raw_base, &[], repo_full_name, &[git_ref])?;
        push_path(&mut url, path)?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GithubError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| GithubError::Decode {
                path: path.to_string(),
                reason: "content is not valid UTF-8".to_string(),
            })
    }

    /// Changed files of a commit plus the text of every non-removed file,
    /// read at the commit itself.
    ///
    /// Only the commit-detail request can fail the whole call. A file that
    /// cannot be fetched or decoded is logged and left out of `contents`.
    pub async fn fetch_snapshot(
        &self,
        repo_full_name: &str,
        sha: &str,
    ) -> Result<CommitSnapshot, GithubError> {
        let changed_files = self.get_commit_files(repo_full_name, sha).await?;
        let mut snapshot = CommitSnapshot {
            changed_files,
            contents: Default::default(),
        };

        for file in &snapshot.changed_files {
            if file.is_removed() {
                tracing::debug!(file = %file.filename, "Skipping removed file");
                continue;
            }
            match self
                .get_file_content(repo_full_name, &file.filename, sha)
                .await
            {
                Ok(Some(text)) => {
                    tracing::info!(file = %file.filename, bytes = text.len(), "Retrieved file content");
                    snapshot.contents.insert(file.filename.clone(), text);
                }
                Ok(None) => tracing::info!(file = %file.filename, "File is empty, skipping"),
                Err(e) => tracing::warn!(
                    file = %file.filename,
                    error = %e,
                    "Could not retrieve file content"
                ),
            }
        }

        Ok(snapshot)
    }
}

/// `{base}/{prefix..}/{owner}/{repo}/{suffix..}` with each segment escaped.
fn build_url(
    base: &str,
    prefix: &[&str],
    repo_full_name: &str,
    suffix: &[&str],
) -> Result<Url, GithubError> {
    let mut url = Url::parse(base).map_err(|e| GithubError::Url(format!("{}: {}", base, e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| GithubError::Url(format!("{} cannot be a base URL", base)))?;
        segments.pop_if_empty();
        segments.extend(prefix);
        segments.extend(repo_full_name.split('/').filter(|s| !s.is_empty()));
        segments.extend(suffix);
    }
    Ok(url)
}

fn push_path(url: &mut Url, path: &str) -> Result<(), GithubError> {
    let display = url.to_string();
    url.path_segments_mut()
        .map_err(|_| GithubError::Url(format!("{} cannot be a base URL", display)))?
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(())
}

/// Decode the contents API's base64 (wrapped at 60 columns) into UTF-8 text.
fn decode_base64_text(path: &str, content: &str) -> Result<String, GithubError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| GithubError::Decode {
            path: path.to_string(),
            reason: format!("invalid base64: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|_| GithubError::Decode {
        path: path.to_string(),
        reason: "content is not valid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_url_segments() {
        let url = build_url(
            "https://api.github.com",
            &["repos"],
            "acme/widgets",
            &["commits", "abc123"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/commits/abc123"
        );
    }

    #[test]
    fn content_path_is_escaped_but_keeps_slashes() {
        let mut url = build_url("http://127.0.0.1:9/", &["repos"], "acme/widgets", &["contents"])
            .unwrap();
        push_path(&mut url, "docs/my file#1.md").unwrap();
        url.query_pairs_mut().append_pair("ref", "abc");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/repos/acme/widgets/contents/docs/my%20file%231.md?ref=abc"
        );
    }

    #[test]
    fn raw_url_layout() {
        let mut url = build_url(
            "https://raw.githubusercontent.com",
            &[],
            "acme/widgets",
            &["abc123"],
        )
        .unwrap();
        push_path(&mut url, "src/app.py").unwrap();
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/acme/widgets/abc123/src/app.py"
        );
    }

    #[test]
    fn base64_with_line_breaks_decodes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("print('hello')\n");
        let (a, b) = encoded.split_at(8);
        let wrapped = format!("{}\n{}\n", a, b);
        assert_eq!(
            decode_base64_text("a.py", &wrapped).unwrap(),
            "print('hello')\n"
        );
    }

    #[test]
    fn non_utf8_content_is_a_decode_error() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe, 0x00]);
        let err = decode_base64_text("logo.png", &encoded).unwrap_err();
        assert!(matches!(err, GithubError::Decode { .. }));
    }
}
