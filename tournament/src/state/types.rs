//! Core records held by the idea store.
//!
//! Everything here crosses the HTTP boundary, so wire names are camelCase.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{ReviewerSpec, TournamentSettings};
use crate::scoring::{Dimension, ScoreCard};

/// Unique identifier for tournaments
pub type TournamentId = String;

/// Unique identifier for ideas
pub type IdeaId = String;

/// Identifier of a reviewer on the expert panel
pub type ReviewerId = String;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Tournament ────────────────────────────────────────────────────────────────

/// Lifecycle status of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TournamentStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: TournamentStatus) -> bool {
        match self {
            Self::Created => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Preferred study phase for generated concepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StudyPhase {
    Phase1,
    Phase2,
    Phase3,
    Phase4,
    #[default]
    Any,
}

impl fmt::Display for StudyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase1 => write!(f, "Phase I"),
            Self::Phase2 => write!(f, "Phase II"),
            Self::Phase3 => write!(f, "Phase III"),
            Self::Phase4 => write!(f, "Phase IV"),
            Self::Any => write!(f, "any phase"),
        }
    }
}

/// A weighted strategic goal of the sponsor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicGoal {
    pub goal: String,
    pub weight: f64,
}

/// The tournament record. Only `current_round`, `status`, `failure_reason`
/// and `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: TournamentId,
    pub drug_name: String,
    pub indication: String,
    pub strategic_goals: Vec<StrategicGoal>,
    pub study_phase_preference: StudyPhase,
    pub geography: BTreeSet<String>,
    pub lane_count: u32,
    pub max_rounds: u32,
    pub current_round: u32,
    pub status: TournamentStatus,
    pub settings: TournamentSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

// ── Ideas ─────────────────────────────────────────────────────────────────────

/// Rough operational footprint of a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityEstimate {
    pub sample_size: u32,
    pub duration_months: u32,
    pub site_count: u32,
    pub enrollment_risk: EnrollmentRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Swot {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

/// Structured design of a study concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDesign {
    pub population: String,
    pub intervention: String,
    pub comparator: String,
    pub outcomes: Vec<String>,
    pub feasibility: FeasibilityEstimate,
    #[serde(default)]
    pub swot: Swot,
    #[serde(default)]
    pub rationale: String,
}

/// What the idea generator returns: a title plus a design, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptDraft {
    pub title: String,
    pub design: ConceptDesign,
}

/// One candidate study concept.
///
/// Immutable once stored, except for the `is_champion` marker which the
/// store flips on promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: IdeaId,
    pub tournament_id: TournamentId,
    pub lane: u32,
    pub round: u32,
    pub title: String,
    pub design: ConceptDesign,
    /// Absent when no reviewer could score the idea.
    pub scores: Option<ScoreCard>,
    pub is_champion: bool,
    /// Overall score minus the predecessor champion's; null in round 0 and
    /// for unscored challengers.
    pub score_change: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    pub fn new(tournament_id: &str, lane: u32, round: u32, draft: ConceptDraft) -> Self {
        Self {
            id: new_id(),
            tournament_id: tournament_id.to_string(),
            lane,
            round,
            title: draft.title,
            design: draft.design,
            scores: None,
            is_champion: false,
            score_change: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_scores(mut self, scores: ScoreCard) -> Self {
        self.scores = Some(scores);
        self
    }

    pub fn with_score_change(mut self, score_change: Option<f64>) -> Self {
        self.score_change = score_change;
        self
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.scores.map(|s| s.overall_score)
    }

    pub fn feasibility_score(&self) -> Option<f64> {
        self.scores.map(|s| s.feasibility())
    }
}

// ── Reviews ───────────────────────────────────────────────────────────────────

/// What an expert reviewer returns for one idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVerdict {
    /// Score on the 0-5 scale.
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Free-form metrics kept for display, never read by scoring.
    #[serde(default)]
    pub additional_metrics: serde_json::Map<String, serde_json::Value>,
}

/// A stored review of one idea by one reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub reviewer_id: ReviewerId,
    pub idea_id: IdeaId,
    pub score: f64,
    pub dimensions: Vec<Dimension>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub additional_metrics: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn from_verdict(verdict: ReviewVerdict, idea_id: &str, reviewer: &ReviewerSpec) -> Self {
        Self {
            reviewer_id: reviewer.id.clone(),
            idea_id: idea_id.to_string(),
            score: verdict.score,
            dimensions: reviewer.dimensions.clone(),
            strengths: verdict.strengths,
            weaknesses: verdict.weaknesses,
            additional_metrics: verdict.additional_metrics,
            created_at: Utc::now(),
        }
    }
}

// ── Lane bookkeeping ──────────────────────────────────────────────────────────

/// How a lane resolved one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneOutcome {
    Seeded,
    Promoted,
    Retained,
    Degraded,
    Cancelled,
}

impl fmt::Display for LaneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seeded => write!(f, "seeded"),
            Self::Promoted => write!(f, "promoted"),
            Self::Retained => write!(f, "retained"),
            Self::Degraded => write!(f, "degraded"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Audit entry for one lane-round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneRoundRecord {
    pub lane: u32,
    pub round: u32,
    pub outcome: LaneOutcome,
    pub challenger_ids: Vec<IdeaId>,
    /// Champion after the round resolved.
    pub champion_id: Option<IdeaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LaneRoundRecord {
    pub fn new(lane: u32, round: u32, outcome: LaneOutcome) -> Self {
        Self {
            lane,
            round,
            outcome,
            challenger_ids: Vec::new(),
            champion_id: None,
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_challengers(mut self, ids: Vec<IdeaId>) -> Self {
        self.challenger_ids = ids;
        self
    }

    pub fn with_champion(mut self, champion_id: Option<IdeaId>) -> Self {
        self.champion_id = champion_id;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Entry of the per-lane champion log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionChange {
    pub round: u32,
    pub idea_id: IdeaId,
}
