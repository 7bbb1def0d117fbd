//! LLM judge: does this file's content suggest a requirement is implemented?
//!
//! The model sees the file feature summary (see [`crate::query`]) and one
//! requirement candidate, and must answer with a JSON object carrying
//! `status`, `confidence`, `evidence`, `notes` and `coverage`. Answers that
//! are not such an object are recorded as `Missing` with the raw text kept
//! in `notes`, so one malformed reply never fails a commit.

use anyhow::Result;
use serde_json::Value;

use crate::llm::ChatModel;
use crate::models::{JudgeResult, JudgeStatus, RequirementCandidate};

pub const JUDGE_PROMPT: &str = "\
You are a strict software requirements reviewer.

Given:
1) A code file context (file path, summarized features, sampled content).
2) A candidate requirement (id/title/snippet).

Without seeing diffs, decide whether THIS FILE CONTENT suggests the requirement is implemented.

Return strict JSON with:
- status: \"Meets\" | \"Partial\" | \"Missing\" | \"Conflict\"
- confidence: float between 0 and 1
- evidence: up to 3 bullets (endpoints, method names, SQL tables, config keys)
- notes: brief advice (e.g., add validation, tests, error handling)
- coverage: which acceptance aspects seem satisfied vs missing (if applicable)

Be conservative: If acceptance criteria (validation, error handling, tests) are not clearly present in the file, mark as Partial or Missing.";

pub const PARSE_FAILED_EVIDENCE: &str = "LLM JSON parse failed";
const MAX_EVIDENCE: usize = 3;
const NOTES_ON_FAILURE_CHARS: usize = 300;

pub fn build_judge_input(feature_query: &str, candidate: &RequirementCandidate) -> String {
    format!(
        "{}\n\n=== FILE FEATURE SUMMARY ===\n{}\n\n=== REQUIREMENT ===\n[{}] {}\nSNIPPET:\n{}\n\nReturn JSON only.\n",
        JUDGE_PROMPT,
        feature_query,
        candidate.req_id(),
        candidate.title(),
        candidate.snippet()
    )
}

/// Judge one candidate. Only a failing model call is an error.
pub async fn judge_one(
    model: &dyn ChatModel,
    feature_query: &str,
    candidate: &RequirementCandidate,
) -> Result<JudgeResult> {
    let prompt = build_judge_input(feature_query, candidate);
    let raw = model.complete(&prompt).await?;
    Ok(parse_verdict(&raw, candidate))
}

fn parse_verdict(raw: &str, candidate: &RequirementCandidate) -> JudgeResult {
    let parsed = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| verdict_from_json(&v));

    let (status, confidence, evidence, notes, coverage) = parsed.unwrap_or_else(|| {
        (
            JudgeStatus::Missing,
            0.0,
            vec![PARSE_FAILED_EVIDENCE.to_string()],
            raw.chars().take(NOTES_ON_FAILURE_CHARS).collect(),
            String::new(),
        )
    });

    JudgeResult {
        status,
        confidence,
        evidence,
        notes,
        coverage,
        req_id: candidate.req_id(),
        req_title: candidate.title(),
    }
}

type Verdict = (JudgeStatus, f64, Vec<String>, String, String);

fn verdict_from_json(value: &Value) -> Option<Verdict> {
    let obj = value.as_object()?;
    let status = parse_status(obj.get("status")?.as_str()?)?;

    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut evidence = match obj.get("evidence") {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![text_of(other)],
    };
    evidence.retain(|e: &String| !e.is_empty());
    evidence.truncate(MAX_EVIDENCE);

    Some((
        status,
        confidence,
        evidence,
        obj.get("notes").map(text_of).unwrap_or_default(),
        obj.get("coverage").map(text_of).unwrap_or_default(),
    ))
}

fn parse_status(s: &str) -> Option<JudgeStatus> {
    match s.trim().to_ascii_lowercase().as_str() {
        "meets" => Some(JudgeStatus::Meets),
        "partial" => Some(JudgeStatus::Partial),
        "missing" => Some(JudgeStatus::Missing),
        "conflict" => Some(JudgeStatus::Conflict),
        _ => None,
    }
}

/// Strings as-is, null as empty, anything else as compact JSON.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for Canned {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.seen.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn candidate() -> RequirementCandidate {
        let mut metadata = Map::new();
        metadata.insert("req_id".into(), json!("REQ-7"));
        metadata.insert("title".into(), json!("User login"));
        metadata.insert("snippet".into(), json!("Users must log in with a password."));
        RequirementCandidate {
            metadata,
            score: 0.2,
        }
    }

    #[test]
    fn input_contains_summary_and_requirement() {
        let input = build_judge_input("[FILE] app.py", &candidate());
        assert!(input.starts_with("You are a strict software requirements reviewer."));
        assert!(input.contains("=== FILE FEATURE SUMMARY ===\n[FILE] app.py\n"));
        assert!(input.contains(
            "=== REQUIREMENT ===\n[REQ-7] User login\nSNIPPET:\nUsers must log in with a password.\n"
        ));
        assert!(input.ends_with("Return JSON only.\n"));
    }

    #[test]
    fn input_falls_back_to_source_path() {
        let mut metadata = Map::new();
        metadata.insert("source_path".into(), json!("docs/RFP_requirements.md"));
        let c = RequirementCandidate {
            metadata,
            score: 0.0,
        };
        assert!(build_judge_input("q", &c).contains("[docs/RFP_requirements.md] \n"));
    }

    #[tokio::test]
    async fn valid_reply_is_parsed_and_normalised() {
        let model = Canned::ok(
            r#"{"status":"Partial","confidence":1.7,
                "evidence":["POST /login","UserService.login","users table","extra"],
                "notes":"add lockout tests","coverage":{"validation":"missing"}}"#,
        );
        let result = judge_one(&model, "[FILE] a", &candidate()).await.unwrap();
        assert_eq!(result.status, JudgeStatus::Partial);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.evidence.len(), 3);
        assert_eq!(result.notes, "add lockout tests");
        assert_eq!(result.coverage, r#"{"validation":"missing"}"#);
        assert_eq!(result.req_id, "REQ-7");
        assert_eq!(result.req_title, "User login");
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_json_reply_falls_back_to_missing() {
        let raw = "Sure! Here is my analysis: ".repeat(30);
        let model = Canned::ok(&raw);
        let result = judge_one(&model, "q", &candidate()).await.unwrap();
        assert_eq!(result.status, JudgeStatus::Missing);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.evidence, vec![PARSE_FAILED_EVIDENCE]);
        assert_eq!(result.notes.chars().count(), 300);
        assert_eq!(result.coverage, "");
        assert_eq!(result.req_id, "REQ-7");
    }

    #[tokio::test]
    async fn unknown_status_or_array_reply_falls_back() {
        for raw in [r#"{"status":"Done","confidence":0.9}"#, "[1,2,3]", "{}"] {
            let result = judge_one(&Canned::ok(raw), "q", &candidate()).await.unwrap();
            assert_eq!(result.status, JudgeStatus::Missing, "raw: {}", raw);
            assert_eq!(result.evidence, vec![PARSE_FAILED_EVIDENCE]);
        }
    }

    #[tokio::test]
    async fn model_error_propagates() {
        let model = Canned {
            reply: Err("connection refused".to_string()),
            seen: Mutex::new(Vec::new()),
        };
        let err = judge_one(&model, "q", &candidate()).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
