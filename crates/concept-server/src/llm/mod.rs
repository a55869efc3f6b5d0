//! LLM-backed idea generator and expert reviewer.
//!
//! Both talk to one OpenAI-compatible endpoint through [`ChatClient`] and
//! expect a single JSON object back. Anything that does not parse, or parses
//! into an out-of-range verdict, is an `invalid_response` and gets retried by
//! the engine.

pub mod client;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tournament_engine::scoring::{SCORE_SCALE_MAX, SCORE_SCALE_MIN};
use tournament_engine::state::{ConceptDraft, ReviewVerdict};
use tournament_engine::{
    ExpertReviewer, GenerationContext, Idea, IdeaGenerator, ProviderError, ReviewerSpec,
};
use tracing::debug;

pub use client::ChatClient;

/// Locate the JSON object in a model reply.
///
/// Accepts a bare object, a fenced ```json block, or an object surrounded by
/// prose.
pub fn extract_json(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    let body = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Parse a model reply into `T`.
pub fn parse_reply<T: DeserializeOwned>(operation: &str, reply: &str) -> Result<T, ProviderError> {
    let json = extract_json(reply)
        .ok_or_else(|| ProviderError::invalid_response(operation, "no JSON object in reply"))?;
    serde_json::from_str(json).map_err(|e| {
        ProviderError::invalid_response(operation, format!("reply does not match schema: {e}"))
    })
}

/// Idea generator backed by the chat endpoint.
pub struct LlmIdeaGenerator {
    client: Arc<ChatClient>,
    system: String,
}

impl LlmIdeaGenerator {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self {
            client,
            system: prompts::generator_system(),
        }
    }
}

#[async_trait]
impl IdeaGenerator for LlmIdeaGenerator {
    async fn generate(&self, context: &GenerationContext) -> Result<ConceptDraft, ProviderError> {
        const OPERATION: &str = "generate";
        let reply = self
            .client
            .complete(
                OPERATION,
                &self.system,
                &prompts::generation_request(context),
                self.client.config().temperature,
            )
            .await?;
        let draft: ConceptDraft = parse_reply(OPERATION, &reply)?;
        if draft.title.trim().is_empty() {
            return Err(ProviderError::invalid_response(OPERATION, "concept has no title"));
        }
        debug!(
            tournament_id = %context.tournament_id,
            lane = context.lane,
            round = context.round,
            title = %draft.title,
            "Concept generated"
        );
        Ok(draft)
    }
}

/// Expert reviewer backed by the chat endpoint.
pub struct LlmExpertReviewer {
    client: Arc<ChatClient>,
}

impl LlmExpertReviewer {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExpertReviewer for LlmExpertReviewer {
    async fn review(
        &self,
        idea: &Idea,
        reviewer: &ReviewerSpec,
    ) -> Result<ReviewVerdict, ProviderError> {
        let operation = format!("review:{}", reviewer.id);
        let reply = self
            .client
            .complete(
                &operation,
                &prompts::reviewer_system(reviewer),
                &prompts::review_request(idea),
                self.client.config().review_temperature,
            )
            .await?;
        let verdict: ReviewVerdict = parse_reply(&operation, &reply)?;
        check_verdict(&operation, verdict)
    }
}

fn check_verdict(operation: &str, verdict: ReviewVerdict) -> Result<ReviewVerdict, ProviderError> {
    if !verdict.score.is_finite() || !(SCORE_SCALE_MIN..=SCORE_SCALE_MAX).contains(&verdict.score) {
        return Err(ProviderError::invalid_response(
            operation,
            format!(
                "score {} outside {SCORE_SCALE_MIN}..={SCORE_SCALE_MAX}",
                verdict.score
            ),
        ));
    }
    Ok(verdict)
}
