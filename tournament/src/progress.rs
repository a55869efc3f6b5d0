//! Progress projection for polling clients.
//!
//! Progress is a pure function of persisted state: the number of stored
//! ideas, `currentRound`, the status, and the tournament's static shape.
//!
//! | Stage        | Percent                                   |
//! |--------------|-------------------------------------------|
//! | queued       | 0                                         |
//! | seeding      | 0..=10, by seeded lanes                   |
//! | round r      | 10 + 85 * rounds done / maxRounds, <= 95  |
//! | finalizing   | 95                                        |
//! | completed    | 100                                       |
//! | failed       | frozen where it stopped                   |
//! | cancelled    | frozen where it stopped                   |

use serde::{Deserialize, Serialize};

use crate::state::{Tournament, TournamentStatus};

const SEEDING_SHARE: f64 = 10.0;
const ROUNDS_SHARE: f64 = 85.0;
const RUNNING_CAP: f64 = 95.0;

/// Coarse stage of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Seeding,
    Round { round: u32 },
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

/// What a polling client displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub label: String,
    #[serde(flatten)]
    pub stage: Stage,
}

/// Static shape of a tournament that progress depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressShape {
    pub lane_count: u32,
    pub max_rounds: u32,
    pub fan_out: u32,
}

impl From<&Tournament> for ProgressShape {
    fn from(t: &Tournament) -> Self {
        Self {
            lane_count: t.lane_count,
            max_rounds: t.max_rounds,
            fan_out: t.settings.fan_out,
        }
    }
}

/// Project `(ideas_count, current_round, status)` onto a progress value.
pub fn project(
    ideas_count: usize,
    current_round: u32,
    status: TournamentStatus,
    shape: ProgressShape,
) -> Progress {
    let lanes = shape.lane_count.max(1) as f64;
    let max_rounds = shape.max_rounds.max(1);
    let per_round = lanes * shape.fan_out.max(1) as f64;
    let ideas = ideas_count as f64;

    let (running_percent, running_stage) = if current_round == 0 {
        let seeded = ideas.min(lanes);
        (SEEDING_SHARE * seeded / lanes, Stage::Seeding)
    } else {
        // Rounds before `current_round` are done; the current one is
        // credited by the challengers already stored.
        let challengers = (ideas - lanes).max(0.0);
        let done = (challengers / per_round).clamp((current_round - 1) as f64, current_round as f64);
        let percent = (SEEDING_SHARE + ROUNDS_SHARE * done / max_rounds as f64).min(RUNNING_CAP);
        let stage = if done >= max_rounds as f64 {
            Stage::Finalizing
        } else {
            Stage::Round {
                round: current_round,
            }
        };
        (percent, stage)
    };

    let (percent, stage) = match status {
        TournamentStatus::Created => (0.0, Stage::Queued),
        TournamentStatus::Running => (running_percent, running_stage),
        TournamentStatus::Completed => (100.0, Stage::Completed),
        TournamentStatus::Failed => (running_percent, Stage::Failed),
        TournamentStatus::Cancelled => (running_percent, Stage::Cancelled),
    };

    Progress {
        percent: percent.round().clamp(0.0, 100.0) as u8,
        label: label(stage, shape.max_rounds),
        stage,
    }
}

fn label(stage: Stage, max_rounds: u32) -> String {
    match stage {
        Stage::Queued => "Queued".to_string(),
        Stage::Seeding => "Seeding lanes".to_string(),
        Stage::Round { round } => format!("Round {round} of {max_rounds}"),
        Stage::Finalizing => "Finalizing".to_string(),
        Stage::Completed => "Completed".to_string(),
        Stage::Failed => "Failed".to_string(),
        Stage::Cancelled => "Cancelled".to_string(),
    }
}
