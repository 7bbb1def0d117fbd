//! # commitlens
//!
//! Receives GitHub push webhooks, collects the changed files of every
//! pushed commit, forwards them to an analysis server, and matches each
//! file against a requirements document using embedding search and an LLM
//! judge.
//!
//! ## Architecture
//!
//! ```text
//!  GitHub ──▶ relay ──▶ POST /webhook ──▶ pipeline (background task)
//!                                           │
//!            ┌──────────────────────────────┼───────────────────────┐
//!            ▼                              ▼                       ▼
//!     CommitSource                  RequirementMatcher        CommitSink
//!   direct: GitHub REST         features → query → index     POST /analyze_commit
//!   delegated: tool server               → judge
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Payload, commit and matching types |
//! | [`language`] | File name → language label |
//! | [`requirements`] | Requirement references in free text |
//! | [`features`] | Regex feature extraction from file text |
//! | [`query`] | Feature summary used as search query |
//! | [`chunk`] | Requirements document splitter |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`store`] | Vector storage (SQLite, in-memory) |
//! | [`index`] | Requirements index bootstrap and search |
//! | [`llm`] | Chat model and tool routing over Ollama |
//! | [`judge`] | Requirement verdicts from the model |
//! | [`matcher`] | Per-file matching pipeline |
//! | [`github`] | GitHub REST client |
//! | [`source`] | Direct and delegated commit sources |
//! | [`tool_server`] | Stdio tool server (`commitlens tools`) |
//! | [`tool_client`] | Tool session with a tool-server child |
//! | [`relay`] | Webhook relay subprocess |
//! | [`forward`] | Analysis server forwarding |
//! | [`pipeline`] | Push event processing |
//! | [`server`] | Webhook HTTP server |
//! | [`app`] | Service wiring from configuration |

pub mod app;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod features;
pub mod forward;
pub mod github;
pub mod index;
pub mod judge;
pub mod language;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod relay;
pub mod requirements;
pub mod server;
pub mod source;
pub mod store;
pub mod tool_client;
pub mod tool_server;
