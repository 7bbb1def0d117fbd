//! Chat model access over the Ollama HTTP API.
//!
//! - [`ChatModel`] / [`OllamaChat`]: one prompt in, one completion out
//!   (`POST /api/generate`, non-streaming). Used by the judge.
//! - [`ToolRouter`]: gives a tool-calling model a list of tools and an
//!   instruction (`POST /api/chat`) and returns the tool calls it asks for.
//!   Used by the delegated commit source.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::{DelegateConfig, JudgeConfig};

/// A text completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: Option<f32>,
    json_format: bool,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(model: &str, url: &str, temperature: Option<f32>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            model: model.to_string(),
            url: url.trim_end_matches('/').to_string(),
            temperature,
            json_format: false,
            client,
        })
    }

    /// Ask Ollama to constrain the output to JSON.
    pub fn with_json_format(mut self) -> Self {
        self.json_format = true;
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if self.json_format {
            body["format"] = json!("json");
        }
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }
        body
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&self.request_body(prompt))
            .send()
            .await
            .with_context(|| format!("Ollama request failed (is Ollama running at {}?)", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama generate error {}: {}", status, text);
        }

        let json: Value = response.json().await?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &Value) -> Result<String> {
    json.get("response")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing 'response' field"))
}

/// Build the judge model from `[judge]`; `None` when the provider is `disabled`.
pub fn create_judge_model(config: &JudgeConfig) -> Result<Option<Arc<dyn ChatModel>>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    match config.provider.as_str() {
        "ollama" => {
            let chat = OllamaChat::new(
                &config.model,
                &config.url,
                config.temperature,
                config.timeout_secs,
            )?
            .with_json_format();
            Ok(Some(Arc::new(chat)))
        }
        other => bail!("Unknown judge provider: {}", other),
    }
}

// ============ Tool routing ============

/// A tool as advertised to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

pub struct ToolRouter {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl ToolRouter {
    pub fn new(config: &DelegateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config.model_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            client,
        })
    }

    /// Ask the model which tools to call for `instruction`.
    ///
    /// An empty result means the model answered without calling a tool.
    pub async fn route(&self, instruction: &str, tools: &[ToolSpec]) -> Result<Vec<ToolCall>> {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": instruction }],
            "tools": tool_defs,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama chat request failed at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama chat error {}: {}", status, text);
        }

        let json: Value = response.json().await?;
        parse_tool_calls(&json)
    }
}

/// Read `message.tool_calls[].function`. Arguments may arrive as an object
/// or as a JSON-encoded string.
fn parse_tool_calls(json: &Value) -> Result<Vec<ToolCall>> {
    let Some(calls) = json
        .get("message")
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    calls
        .iter()
        .map(|call| {
            let function = call
                .get("function")
                .ok_or_else(|| anyhow::anyhow!("tool call without 'function'"))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("tool call without a name"))?
                .to_string();
            let arguments = match function.get("arguments") {
                Some(Value::Object(map)) => map.clone(),
                Some(Value::String(s)) => serde_json::from_str(s)
                    .with_context(|| format!("tool call '{}' has unparsable arguments", name))?,
                _ => Map::new(),
            };
            Ok(ToolCall { name, arguments })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_body_includes_format_and_temperature() {
        let chat = OllamaChat::new("qwen3:4b", "http://localhost:11434/", Some(0.2), 5)
            .unwrap()
            .with_json_format();
        let body = chat.request_body("hi");
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(chat.url, "http://localhost:11434");
    }

    #[test]
    fn parses_generate_response() {
        let text = parse_generate_response(&json!({"response": "{\"status\":\"Meets\"}"})).unwrap();
        assert_eq!(text, "{\"status\":\"Meets\"}");
        assert!(parse_generate_response(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn parses_tool_calls_with_object_and_string_arguments() {
        let json = json!({
            "message": {
                "role": "assistant",
                "tool_calls": [
                    {"function": {"name": "get_commit_snapshot",
                                  "arguments": {"repo_full_name": "acme/widgets", "commit_sha": "abc"}}},
                    {"function": {"name": "get_file_content",
                                  "arguments": "{\"file_path\": \"a.py\"}"}}
                ]
            }
        });
        let calls = parse_tool_calls(&json).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_commit_snapshot");
        assert_eq!(calls[0].arguments["commit_sha"], "abc");
        assert_eq!(calls[1].arguments["file_path"], "a.py");
    }

    #[test]
    fn no_tool_calls_is_empty() {
        let json = json!({"message": {"role": "assistant", "content": "done"}});
        assert!(parse_tool_calls(&json).unwrap().is_empty());
    }

    #[test]
    fn disabled_judge_has_no_model() {
        let config = JudgeConfig {
            provider: "disabled".to_string(),
            ..JudgeConfig::default()
        };
        assert!(create_judge_model(&config).unwrap().is_none());
    }
}
