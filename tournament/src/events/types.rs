//! Tournament lifecycle events.
//!
//! Events mirror what the store already records; they exist for logs and
//! tests and are never read back to make decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{IdeaId, LaneOutcome, TournamentId, TournamentStatus};

/// All tournament lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TournamentEvent {
    /// A tournament was accepted and its lanes allocated
    TournamentCreated {
        tournament_id: TournamentId,
        lane_count: u32,
        max_rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A lane stored and promoted its round-0 idea
    LaneSeeded {
        tournament_id: TournamentId,
        lane: u32,
        idea_id: IdeaId,
        overall_score: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// `currentRound` advanced; challengers for this round may now be requested
    RoundStarted {
        tournament_id: TournamentId,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// A challenger was appended to a lane
    ChallengerStored {
        tournament_id: TournamentId,
        lane: u32,
        round: u32,
        idea_id: IdeaId,
        overall_score: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A lane finished deciding a round
    LaneDecided {
        tournament_id: TournamentId,
        lane: u32,
        round: u32,
        outcome: LaneOutcome,
        champion_id: Option<IdeaId>,
        score_change: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A lane task stopped and will not run further rounds
    LaneTerminated {
        tournament_id: TournamentId,
        lane: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Every active lane resolved the round
    RoundCompleted {
        tournament_id: TournamentId,
        round: u32,
        promoted: u32,
        degraded: u32,
        timestamp: DateTime<Utc>,
    },

    /// The tournament reached a terminal status
    TournamentFinished {
        tournament_id: TournamentId,
        status: TournamentStatus,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl TournamentEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TournamentCreated { .. } => "tournament_created",
            Self::LaneSeeded { .. } => "lane_seeded",
            Self::RoundStarted { .. } => "round_started",
            Self::ChallengerStored { .. } => "challenger_stored",
            Self::LaneDecided { .. } => "lane_decided",
            Self::LaneTerminated { .. } => "lane_terminated",
            Self::RoundCompleted { .. } => "round_completed",
            Self::TournamentFinished { .. } => "tournament_finished",
        }
    }

    pub fn tournament_id(&self) -> &str {
        match self {
            Self::TournamentCreated { tournament_id, .. }
            | Self::LaneSeeded { tournament_id, .. }
            | Self::RoundStarted { tournament_id, .. }
            | Self::ChallengerStored { tournament_id, .. }
            | Self::LaneDecided { tournament_id, .. }
            | Self::LaneTerminated { tournament_id, .. }
            | Self::RoundCompleted { tournament_id, .. }
            | Self::TournamentFinished { tournament_id, .. } => tournament_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TournamentCreated { timestamp, .. }
            | Self::LaneSeeded { timestamp, .. }
            | Self::RoundStarted { timestamp, .. }
            | Self::ChallengerStored { timestamp, .. }
            | Self::LaneDecided { timestamp, .. }
            | Self::LaneTerminated { timestamp, .. }
            | Self::RoundCompleted { timestamp, .. }
            | Self::TournamentFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Round the event belongs to, when it has one.
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::RoundStarted { round, .. }
            | Self::ChallengerStored { round, .. }
            | Self::LaneDecided { round, .. }
            | Self::RoundCompleted { round, .. } => Some(*round),
            Self::LaneSeeded { .. } => Some(0),
            _ => None,
        }
    }
}
