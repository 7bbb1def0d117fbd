//! Client side of the tool protocol: a session with a tool-server child.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use rmcp::model::{CallToolRequestParams, CallToolResult};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::llm::ToolSpec;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub is_error: bool,
    pub payload: Value,
}

pub struct ToolSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    tools: Vec<ToolSpec>,
}

impl ToolSession {
    /// Spawn `command` (program followed by its arguments), complete the
    /// handshake and fetch the tool list.
    pub async fn connect(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("tool server command is empty");
        };

        let mut cmd = Command::new(program);
        cmd.args(args);

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("Failed to spawn tool server: {}", command.join(" ")))?;
        let service = tokio::time::timeout(HANDSHAKE_TIMEOUT, ().serve(transport))
            .await
            .context("Timed out connecting to tool server")??;

        let listed = service
            .list_tools(Default::default())
            .await
            .context("Failed to list tools")?;
        let tools: Vec<ToolSpec> = listed
            .tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or_default().to_string(),
                input_schema: Value::Object((*t.input_schema).clone()),
            })
            .collect();

        tracing::info!(
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Connected to tool server"
        );

        Ok(Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            tools,
        })
    }

    pub fn list_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Call a tool. Transport failures are errors; failures reported by the
    /// tool come back as `is_error = true`.
    pub async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<ToolOutcome> {
        let params: CallToolRequestParams =
            serde_json::from_value(json!({ "name": name, "arguments": args }))?;
        let result = self
            .peer
            .call_tool(params)
            .await
            .with_context(|| format!("Tool call '{}' failed", name))?;
        Ok(outcome_from_result(&result))
    }

    /// Shut the session down and let the child exit.
    pub async fn close(&self) {
        if let Some(service) = self.service.lock().await.take() {
            match service.cancel().await {
                Ok(reason) => tracing::info!(?reason, "Tool session closed"),
                Err(e) => tracing::warn!(error = %e, "Tool session did not close cleanly"),
            }
        }
    }
}

/// Structured content first, then the first text block as JSON, then the
/// raw text.
fn outcome_from_result(result: &CallToolResult) -> ToolOutcome {
    let payload = match &result.structured_content {
        Some(value) => value.clone(),
        None => result
            .content
            .first()
            .and_then(|c| c.raw.as_text())
            .map(|t| serde_json::from_str(&t.text).unwrap_or_else(|_| Value::String(t.text.clone())))
            .unwrap_or(Value::Null),
    };
    ToolOutcome {
        is_error: result.is_error.unwrap_or(false),
        payload,
    }
}
