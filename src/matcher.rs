//! Per-file requirement matching: features → query → search → judge.

use std::sync::Arc;

use anyhow::Result;

use crate::features::extract_features;
use crate::index::RequirementIndex;
use crate::judge::judge_one;
use crate::language::detect_language;
use crate::llm::ChatModel;
use crate::models::FileMatchReport;
use crate::query::build_query;

pub struct RequirementMatcher {
    index: Arc<RequirementIndex>,
    judge: Option<Arc<dyn ChatModel>>,
    top_k: usize,
}

impl RequirementMatcher {
    pub fn new(
        index: Arc<RequirementIndex>,
        judge: Option<Arc<dyn ChatModel>>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            judge,
            top_k: top_k.max(1),
        }
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Match one file against the requirements index.
    ///
    /// Search failures are errors. Candidates are judged one after another;
    /// a failed judge call is logged and that candidate gets no verdict.
    pub async fn match_file(&self, path: &str, text: &str) -> Result<FileMatchReport> {
        let features = extract_features(path, text);
        let query = build_query(&features);
        let candidates = self.index.search(&query, self.top_k).await?;

        let mut judgments = Vec::new();
        if let Some(model) = &self.judge {
            for candidate in &candidates {
                match judge_one(model.as_ref(), &query, candidate).await {
                    Ok(result) => {
                        tracing::debug!(
                            file = %path,
                            req = %result.req_id,
                            status = ?result.status,
                            confidence = result.confidence,
                            "Requirement judged"
                        );
                        judgments.push(result);
                    }
                    Err(e) => tracing::warn!(
                        file = %path,
                        req = %candidate.req_id(),
                        error = %e,
                        "Judge call failed, skipping candidate"
                    ),
                }
            }
        }

        Ok(FileMatchReport {
            path: path.to_string(),
            language: detect_language(path).to_string(),
            query,
            candidates,
            judgments,
        })
    }
}
