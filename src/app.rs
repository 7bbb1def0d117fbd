//! Wiring: turns a [`Config`] into the services the commands run with.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::{Config, SourceMode};
use crate::embedding::create_provider;
use crate::forward::{AnalysisForwarder, CommitSink};
use crate::github::GithubClient;
use crate::index::RequirementIndex;
use crate::llm::{create_judge_model, ToolRouter};
use crate::matcher::RequirementMatcher;
use crate::pipeline::PipelineContext;
use crate::source::{CommitSource, DelegatedSource, DirectSource};
use crate::tool_client::ToolSession;

/// A commit source plus the tool session behind it, if any.
pub struct SourceParts {
    pub source: Arc<dyn CommitSource>,
    pub tools: Option<Arc<ToolSession>>,
}

/// Command line of the delegated tool server: `[delegate] command`, or this
/// executable's own `tools` subcommand with the same config file.
pub fn delegate_command(config: &Config, config_path: Option<&Path>) -> Result<Vec<String>> {
    if !config.delegate.command.is_empty() {
        return Ok(config.delegate.command.clone());
    }
    let exe = std::env::current_exe().context("Cannot locate the current executable")?;
    let mut command = vec![exe.display().to_string()];
    if let Some(path) = config_path {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    command.push("tools".to_string());
    Ok(command)
}

pub async fn build_source(config: &Config, config_path: Option<&Path>) -> Result<SourceParts> {
    match config.source.mode {
        SourceMode::Direct => {
            let github = GithubClient::new(&config.github)?;
            Ok(SourceParts {
                source: Arc::new(DirectSource::new(Arc::new(github))),
                tools: None,
            })
        }
        SourceMode::Delegated => {
            let command = delegate_command(config, config_path)?;
            tracing::info!(command = %command.join(" "), "Starting tool server");
            let session = Arc::new(ToolSession::connect(&command).await?);
            let router = if config.delegate.route_with_model {
                Some(ToolRouter::new(&config.delegate)?)
            } else {
                None
            };
            Ok(SourceParts {
                source: Arc::new(DelegatedSource::new(session.clone(), router)),
                tools: Some(session),
            })
        }
    }
}

/// Open (or build) the requirements index.
pub async fn build_index(config: &Config, rebuild: bool) -> Result<Arc<RequirementIndex>> {
    if !config.embedding.is_enabled() {
        bail!("The requirements index needs an embedding provider, but embedding.provider is disabled");
    }
    let provider = create_provider(&config.embedding)?;
    let index = RequirementIndex::load_or_build(
        &config.requirements,
        Arc::from(provider),
        config.embedding.batch_size,
        rebuild,
    )
    .await?;
    Ok(Arc::new(index))
}

pub async fn build_matcher(config: &Config) -> Result<RequirementMatcher> {
    let index = build_index(config, false).await?;
    let judge = create_judge_model(&config.judge)?;
    if judge.is_none() {
        tracing::info!("Judge disabled, matching will only rank candidates");
    }
    Ok(RequirementMatcher::new(
        index,
        judge,
        config.requirements.top_k,
    ))
}

pub fn build_sink(config: &Config) -> Result<Option<Arc<dyn CommitSink>>> {
    if !config.analysis.enabled {
        return Ok(None);
    }
    let forwarder = AnalysisForwarder::new(&config.analysis)?;
    tracing::info!(endpoint = %forwarder.endpoint(), "Forwarding commits to analysis server");
    Ok(Some(Arc::new(forwarder)))
}

/// Everything the webhook pipeline needs, per the configuration.
pub async fn build_pipeline(
    config: &Config,
    config_path: Option<&Path>,
) -> Result<(PipelineContext, Option<Arc<ToolSession>>)> {
    let parts = build_source(config, config_path).await?;
    let matcher = if config.requirements.enabled {
        Some(Arc::new(build_matcher(config).await?))
    } else {
        None
    };
    let ctx = PipelineContext {
        source: parts.source,
        sink: build_sink(config)?,
        matcher,
    };
    Ok((ctx, parts.tools))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_delegate_command_wins() {
        let mut config = Config::default();
        config.delegate.command = vec!["my-tools".to_string(), "--stdio".to_string()];
        assert_eq!(
            delegate_command(&config, Some(Path::new("c.toml"))).unwrap(),
            vec!["my-tools", "--stdio"]
        );
    }

    #[test]
    fn default_delegate_command_reuses_config() {
        let config = Config::default();
        let command = delegate_command(&config, Some(Path::new("cfg/commitlens.toml"))).unwrap();
        assert_eq!(&command[1..], ["--config", "cfg/commitlens.toml", "tools"]);
    }

    #[tokio::test]
    async fn disabled_embedding_cannot_build_an_index() {
        let mut config = Config::default();
        config.embedding.provider = "disabled".to_string();
        let err = build_index(&config, false).await.err().unwrap();
        assert!(err.to_string().contains("embedding.provider"));
    }

    #[test]
    fn disabled_analysis_has_no_sink() {
        let mut config = Config::default();
        config.analysis.enabled = false;
        assert!(build_sink(&config).unwrap().is_none());
        config.analysis.enabled = true;
        assert!(build_sink(&config).unwrap().is_some());
    }
}
