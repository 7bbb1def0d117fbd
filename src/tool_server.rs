//! Stdio tool server exposing GitHub commit access (`commitlens tools`).
//!
//! Started as a child process by the webhook server in delegated mode (or
//! by any MCP client). stdout carries the protocol, so all logging goes to
//! stderr.
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `get_changed_files_from_commit` | `repo_name`, `commit_sha` | `[filename]` |
//! | `get_file_content` | `repo_full_name`, `file_path`, `ref` (default `main`) | text or `null` |
//! | `get_commit_snapshot` | `repo_full_name`, `commit_sha` | `{changed_files, contents}` |
//!
//! Failures are reported as tool results with `is_error = true` and the
//! error message as text.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::github::GithubClient;

pub const TOOL_CHANGED_FILES: &str = "get_changed_files_from_commit";
pub const TOOL_FILE_CONTENT: &str = "get_file_content";
pub const TOOL_COMMIT_SNAPSHOT: &str = "get_commit_snapshot";

#[derive(Clone)]
pub struct GithubTools {
    github: Arc<GithubClient>,
}

#[derive(Deserialize)]
struct ChangedFilesArgs {
    repo_name: String,
    commit_sha: String,
}

#[derive(Deserialize)]
struct FileContentArgs {
    repo_full_name: String,
    file_path: String,
    #[serde(default = "default_ref", rename = "ref")]
    git_ref: String,
}

fn default_ref() -> String {
    "main".to_string()
}

#[derive(Deserialize)]
struct SnapshotArgs {
    repo_full_name: String,
    commit_sha: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Map<String, Value>) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| anyhow::anyhow!("invalid arguments: {}", e))
}

impl GithubTools {
    pub fn new(github: Arc<GithubClient>) -> Self {
        Self { github }
    }

    pub fn tool_names() -> [&'static str; 3] {
        [TOOL_CHANGED_FILES, TOOL_FILE_CONTENT, TOOL_COMMIT_SNAPSHOT]
    }

    /// Run one tool. `Ok(None)` means there is no tool with that name.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        let value = match name {
            TOOL_CHANGED_FILES => {
                let a: ChangedFilesArgs = parse_args(args)?;
                let files = self.github.get_commit_files(&a.repo_name, &a.commit_sha).await?;
                json!(files.into_iter().map(|f| f.filename).collect::<Vec<_>>())
            }
            TOOL_FILE_CONTENT => {
                let a: FileContentArgs = parse_args(args)?;
                let text = self
                    .github
                    .get_file_content(&a.repo_full_name, &a.file_path, &a.git_ref)
                    .await?;
                json!(text)
            }
            TOOL_COMMIT_SNAPSHOT => {
                let a: SnapshotArgs = parse_args(args)?;
                let snapshot = self
                    .github
                    .fetch_snapshot(&a.repo_full_name, &a.commit_sha)
                    .await?;
                serde_json::to_value(snapshot)?
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn tool(name: &str, description: &str, schema: Value) -> Tool {
        let input_schema = match schema {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(Map::new()),
        };
        Tool {
            name: Cow::Owned(name.to_string()),
            title: None,
            description: Some(Cow::Owned(description.to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    pub fn tools() -> Vec<Tool> {
        vec![
            Self::tool(
                TOOL_CHANGED_FILES,
                "List the paths of the files changed by a GitHub commit.",
                json!({
                    "type": "object",
                    "properties": {
                        "repo_name": {"type": "string", "description": "Repository as 'owner/repo'"},
                        "commit_sha": {"type": "string", "description": "Commit SHA"}
                    },
                    "required": ["repo_name", "commit_sha"]
                }),
            ),
            Self::tool(
                TOOL_FILE_CONTENT,
                "Read a file from a GitHub repository at a branch, tag or commit.",
                json!({
                    "type": "object",
                    "properties": {
                        "repo_full_name": {"type": "string", "description": "Repository as 'owner/repo'"},
                        "file_path": {"type": "string", "description": "Path inside the repository"},
                        "ref": {"type": "string", "description": "Branch, tag or commit SHA", "default": "main"}
                    },
                    "required": ["repo_full_name", "file_path"]
                }),
            ),
            Self::tool(
                TOOL_COMMIT_SNAPSHOT,
                "Fetch the changed-file list of a commit and the text of every non-removed file at that commit.",
                json!({
                    "type": "object",
                    "properties": {
                        "repo_full_name": {"type": "string", "description": "Repository as 'owner/repo'"},
                        "commit_sha": {"type": "string", "description": "Commit SHA"}
                    },
                    "required": ["repo_full_name", "commit_sha"]
                }),
            ),
        ]
    }
}

impl ServerHandler for GithubTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "commitlens-tools".to_string(),
                title: Some("commitlens GitHub tools".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "GitHub commit access. Use get_commit_snapshot to fetch a whole commit, \
                 or get_changed_files_from_commit and get_file_content for single pieces."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        tracing::info!(tool = %request.name, "Tool call");

        match self.dispatch(&request.name, args).await {
            Ok(Some(value)) => {
                let text = serde_json::to_string(&value).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Ok(None) => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )),
            Err(e) => {
                tracing::warn!(tool = %request.name, error = %e, "Tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}

/// Serve the tools over stdin/stdout until the client disconnects.
pub async fn run_stdio(github: GithubClient) -> anyhow::Result<()> {
    tracing::info!("Starting commitlens tool server on stdio");
    let server = GithubTools::new(Arc::new(github))
        .serve(rmcp::transport::stdio())
        .await?;
    server.waiting().await?;
    tracing::info!("Tool server stopped");
    Ok(())
}
