//! Prompts for concept generation and expert review.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes,
//! so stored ideas can be traced back to the prompt that produced them.

use schemars::schema_for;
use tournament_engine::state::{ConceptDraft, ReviewVerdict};
use tournament_engine::{GenerationContext, Idea, ReviewerSpec};

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Preamble for the idea generator.
pub const GENERATOR_PREAMBLE: &str = "\
You are a senior clinical development strategist designing clinical-trial study \
concepts for a pharmaceutical sponsor.

## Rules
- Every concept must be a single, executable study: one population, one \
  intervention, one comparator.
- Ground feasibility estimates in realistic recruitment rates for the indication \
  and regions given.
- Outcomes must be measurable endpoints with a time point.
- When a current champion concept is supplied, produce a concept that beats it on \
  at least one of scientific validity, clinical impact, commercial value or \
  feasibility without losing ground on the others. Do not restate the champion.

Respond with one JSON object and nothing else. It must match this JSON schema:
";

/// Preamble for an expert reviewer. The reviewer's focus is appended.
pub const REVIEWER_PREAMBLE: &str = "\
You are a member of an expert panel reviewing clinical-trial study concepts. \
Judge the concept only from your own perspective, described below.

## Scoring
Score from 0 to 5 in steps of 0.1:
- 0-1: fundamentally flawed
- 2-3: workable with major changes
- 4: strong
- 5: exceptional, ready for protocol writing

List concrete strengths and weaknesses. Put any additional quantitative \
observations into `additionalMetrics` as key/value pairs.

Respond with one JSON object and nothing else. It must match this JSON schema:
";

fn schema_json<T: schemars::JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

/// System prompt for the idea generator.
pub fn generator_system() -> String {
    format!("{GENERATOR_PREAMBLE}{}", schema_json::<ConceptDraft>())
}

/// System prompt for `reviewer`.
pub fn reviewer_system(reviewer: &ReviewerSpec) -> String {
    let dimensions = reviewer
        .dimensions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{REVIEWER_PREAMBLE}{}\n\n## Your perspective\n{}\nYour score counts towards: {dimensions}.",
        schema_json::<ReviewVerdict>(),
        reviewer.focus,
    )
}

/// User prompt for one generation request.
pub fn generation_request(ctx: &GenerationContext) -> String {
    let goals = ctx
        .strategic_goals
        .iter()
        .map(|g| format!("- {} (weight {:.2})", g.goal, g.weight))
        .collect::<Vec<_>>()
        .join("\n");
    let geography = if ctx.geography.is_empty() {
        "global".to_string()
    } else {
        ctx.geography.join(", ")
    };

    let mut prompt = format!(
        "**Drug:** {}\n**Indication:** {}\n**Preferred phase:** {}\n**Regions:** {geography}\n\n## Strategic goals\n{goals}\n",
        ctx.drug_name, ctx.indication, ctx.study_phase,
    );

    match &ctx.seed_idea {
        None => prompt.push_str(&format!(
            "\nPropose an initial study concept. This is lane {} of the tournament; \
             take a distinct angle from other lanes.\n",
            ctx.lane
        )),
        Some(champion) => {
            let champion_json = serde_json::to_string_pretty(&champion_summary(champion))
                .unwrap_or_default();
            prompt.push_str(&format!(
                "\n## Current champion (round {})\n```json\n{champion_json}\n```\n\n\
                 Propose challenger #{} for round {}: a concept that should outscore the champion.\n",
                champion.round,
                ctx.variant + 1,
                ctx.round,
            ));
        }
    }
    prompt
}

/// User prompt asking for a review of `idea`.
pub fn review_request(idea: &Idea) -> String {
    let concept = serde_json::to_string_pretty(&serde_json::json!({
        "title": idea.title,
        "design": idea.design,
    }))
    .unwrap_or_default();
    format!("Review this study concept:\n```json\n{concept}\n```\n")
}

/// What the generator sees of the champion: the concept and its scores.
fn champion_summary(idea: &Idea) -> serde_json::Value {
    serde_json::json!({
        "title": idea.title,
        "design": idea.design,
        "scores": idea.scores,
    })
}
