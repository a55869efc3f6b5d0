//! Engine configuration and per-tournament settings.
//!
//! `EngineConfig` is process-wide (reviewer panel, retry budget, limits) and
//! is loaded by the server from TOML. `TournamentSettings` travel with each
//! tournament request and are frozen into the tournament record.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{TournamentError, TournamentResult};
use crate::retry::RetryPolicy;
use crate::scoring::{
    Dimension, ReviewAggregator, ScoreWeights, DEFAULT_NEUTRAL_SCORE, SCORE_SCALE_MAX,
    SCORE_SCALE_MIN,
};
use crate::state::{StrategicGoal, StudyPhase, Tournament, TournamentStatus};

/// Promotion tie band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromotionPolicy {
    /// Overall-score differences within this band are decided by feasibility.
    pub epsilon: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self { epsilon: 0.05 }
    }
}

/// Early termination when lanes stop improving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EarlyStopPolicy {
    /// Off by default so every tournament runs to `maxRounds` for auditability.
    pub enabled: bool,
    /// Consecutive rounds without any promotion that end the tournament.
    #[serde(alias = "stale_rounds")]
    pub stale_rounds: u32,
}

impl Default for EarlyStopPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            stale_rounds: 2,
        }
    }
}

/// Scoring and progression knobs frozen into each tournament.
///
/// camelCase on the wire. The snake_case aliases let the same settings sit
/// under `[engine.defaults]` in a TOML file whose other keys are snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TournamentSettings {
    pub weights: ScoreWeights,
    pub promotion: PromotionPolicy,
    #[serde(alias = "early_stop")]
    pub early_stop: EarlyStopPolicy,
    /// Challengers requested per lane per round.
    #[serde(alias = "fan_out")]
    pub fan_out: u32,
    /// Score used for dimensions no reviewer covered.
    #[serde(alias = "neutral_score")]
    pub neutral_score: f64,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            promotion: PromotionPolicy::default(),
            early_stop: EarlyStopPolicy::default(),
            fan_out: 1,
            neutral_score: DEFAULT_NEUTRAL_SCORE,
        }
    }
}

impl TournamentSettings {
    pub fn aggregator(&self) -> ReviewAggregator {
        ReviewAggregator::new(self.weights, self.neutral_score)
    }

    /// Collect every problem with these settings.
    pub fn problems(&self, limits: &EngineLimits) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.weights.validate() {
            problems.push(e);
        }
        if !self.promotion.epsilon.is_finite() || self.promotion.epsilon < 0.0 {
            problems.push("promotion epsilon must be a non-negative number".to_string());
        }
        if self.early_stop.enabled && self.early_stop.stale_rounds < 1 {
            problems.push("early stop requires staleRounds of at least 1".to_string());
        }
        if self.fan_out < 1 || self.fan_out > limits.max_fan_out {
            problems.push(format!(
                "fanOut must be between 1 and {}",
                limits.max_fan_out
            ));
        }
        if !(SCORE_SCALE_MIN..=SCORE_SCALE_MAX).contains(&self.neutral_score) {
            problems.push(format!(
                "neutralScore must be within {SCORE_SCALE_MIN}..={SCORE_SCALE_MAX}"
            ));
        }
        problems
    }
}

/// One member of the expert review panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerSpec {
    pub id: String,
    /// Dimensions this reviewer's score contributes to.
    pub dimensions: Vec<Dimension>,
    /// Persona / focus statement handed to the review provider.
    #[serde(default)]
    pub focus: String,
}

impl ReviewerSpec {
    pub fn new(id: impl Into<String>, dimensions: Vec<Dimension>, focus: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dimensions,
            focus: focus.into(),
        }
    }

    /// One specialist per dimension.
    pub fn default_panel() -> Vec<Self> {
        vec![
            Self::new(
                "scientific",
                vec![Dimension::ScientificValidity],
                "Biostatistician and trial methodologist judging endpoints, design and bias control",
            ),
            Self::new(
                "clinical",
                vec![Dimension::ClinicalImpact],
                "Practising clinician judging unmet need and patient benefit",
            ),
            Self::new(
                "commercial",
                vec![Dimension::CommercialValue],
                "Market access lead judging positioning, payer value and differentiation",
            ),
            Self::new(
                "operations",
                vec![Dimension::Feasibility],
                "Clinical operations lead judging recruitment, sites, timeline and cost",
            ),
        ]
    }
}

/// Upper bounds on what a single request may ask for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    pub max_lanes: u32,
    pub max_rounds: u32,
    pub max_fan_out: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_lanes: 12,
            max_rounds: 20,
            max_fan_out: 4,
        }
    }
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Per-call timeout for generator and reviewer calls.
    pub call_timeout_ms: u64,
    /// Concurrent external calls across all tournaments.
    pub max_concurrent_calls: usize,
    pub reviewers: Vec<ReviewerSpec>,
    pub limits: EngineLimits,
    /// Settings applied when a request does not carry its own.
    pub defaults: TournamentSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout_ms: 120_000,
            max_concurrent_calls: 8,
            reviewers: ReviewerSpec::default_panel(),
            limits: EngineLimits::default(),
            defaults: TournamentSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> TournamentResult<()> {
        let mut problems = Vec::new();
        if self.reviewers.is_empty() {
            problems.push("at least one reviewer must be configured".to_string());
        }
        let mut ids: Vec<&str> = self.reviewers.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            problems.push("reviewer ids must be unique".to_string());
        }
        if let Some(r) = self.reviewers.iter().find(|r| r.dimensions.is_empty()) {
            problems.push(format!("reviewer '{}' covers no dimension", r.id));
        }
        if self.max_concurrent_calls == 0 {
            problems.push("max_concurrent_calls must be at least 1".to_string());
        }
        if self.call_timeout_ms == 0 {
            problems.push("call_timeout_ms must be at least 1".to_string());
        }
        problems.extend(self.defaults.problems(&self.limits));

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TournamentError::Validation(problems.join("; ")))
        }
    }
}

/// A client's request to start a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRequest {
    pub drug_name: String,
    pub indication: String,
    pub strategic_goals: Vec<StrategicGoal>,
    #[serde(default)]
    pub study_phase_preference: StudyPhase,
    #[serde(default)]
    pub geography: BTreeSet<String>,
    pub lane_count: u32,
    pub max_rounds: u32,
    /// Falls back to the engine defaults when absent.
    #[serde(default)]
    pub settings: Option<TournamentSettings>,
}

impl TournamentRequest {
    /// Validate against `config` and build the initial tournament record.
    ///
    /// Every problem is reported at once, joined with `; `.
    pub fn into_tournament(self, config: &EngineConfig) -> TournamentResult<Tournament> {
        let settings = self.settings.unwrap_or_else(|| config.defaults.clone());
        let limits = &config.limits;

        let mut problems = Vec::new();
        if self.drug_name.trim().is_empty() {
            problems.push("drugName must not be blank".to_string());
        }
        if self.indication.trim().is_empty() {
            problems.push("indication must not be blank".to_string());
        }
        if self.strategic_goals.is_empty() {
            problems.push("strategicGoals must not be empty".to_string());
        }
        for goal in &self.strategic_goals {
            if goal.goal.trim().is_empty() {
                problems.push("strategic goal text must not be blank".to_string());
            }
            if !goal.weight.is_finite() || goal.weight < 0.0 {
                problems.push(format!(
                    "weight of goal '{}' must be a non-negative number",
                    goal.goal
                ));
            }
        }
        if self.lane_count < 1 {
            problems.push("laneCount must be at least 1".to_string());
        } else if self.lane_count > limits.max_lanes {
            problems.push(format!("laneCount must not exceed {}", limits.max_lanes));
        }
        if self.max_rounds < 1 {
            problems.push("maxRounds must be at least 1".to_string());
        } else if self.max_rounds > limits.max_rounds {
            problems.push(format!("maxRounds must not exceed {}", limits.max_rounds));
        }
        problems.extend(settings.problems(limits));

        if !problems.is_empty() {
            return Err(TournamentError::Validation(problems.join("; ")));
        }

        let now = Utc::now();
        Ok(Tournament {
            id: uuid::Uuid::new_v4().to_string(),
            drug_name: self.drug_name.trim().to_string(),
            indication: self.indication.trim().to_string(),
            strategic_goals: self.strategic_goals,
            study_phase_preference: self.study_phase_preference,
            geography: self
                .geography
                .iter()
                .map(|g| g.trim().to_uppercase())
                .filter(|g| !g.is_empty())
                .collect(),
            lane_count: self.lane_count,
            max_rounds: self.max_rounds,
            current_round: 0,
            status: TournamentStatus::Created,
            settings,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        })
    }
}
