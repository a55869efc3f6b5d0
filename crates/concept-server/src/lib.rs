//! Study-concept tournament server
//!
//! Wraps the tournament engine in a polling HTTP API and backs its two
//! external capabilities with an OpenAI-compatible LLM endpoint.
//!
//! - [`api`]: axum router for `POST /tournaments` and the polling reads
//! - [`config`]: TOML file + `CONCEPT_*` environment configuration
//! - [`llm`]: chat client, prompts, LLM generator and reviewer

pub mod api;
pub mod config;
pub mod llm;

pub use api::{build_router, ApiError};
pub use config::{LlmConfig, ServerConfig};
