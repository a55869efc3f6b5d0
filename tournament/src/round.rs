//! Round coordinator: moves every lane through the tournament in lock-step.
//!
//! ```text
//! seed all lanes ──▶ begin_round(r) ──▶ JoinSet: lane 0..N run_round(r) ──▶ barrier
//!                          ▲                                                  │
//!                          │                                           commit_round(r)
//!                          │                                                  │
//!                          └──────────── evaluate termination ◀───────────────┘
//! ```
//!
//! `currentRound` is advanced before any round-r challenger is requested, and
//! round r+1 never starts until every lane task for round r has joined. Lane
//! results are held until the barrier and stored together, so a reader sees
//! either none or all of round r.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{TournamentError, TournamentResult};
use crate::events::TournamentEvent;
use crate::lane::{self, LaneContext, LaneRoundReport, LaneRunner, PendingRound};
use crate::state::{LaneOutcome, TournamentStatus};

/// How a tournament run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TournamentOutcome {
    /// All `maxRounds` rounds ran.
    Completed { rounds: u32 },
    /// No lane promoted for `stale_rounds` consecutive rounds.
    Converged { round: u32, stale_rounds: u32 },
    Failed { reason: String },
    Cancelled { round: u32 },
}

impl TournamentOutcome {
    pub fn status(&self) -> TournamentStatus {
        match self {
            Self::Completed { .. } | Self::Converged { .. } => TournamentStatus::Completed,
            Self::Failed { .. } => TournamentStatus::Failed,
            Self::Cancelled { .. } => TournamentStatus::Cancelled,
        }
    }

    /// Failure reason recorded on the tournament.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Failed { reason } => Some(reason.clone()),
            Self::Cancelled { round } => Some(format!("cancelled after round {round}")),
            _ => None,
        }
    }
}

/// Drives all lanes of one tournament.
pub struct RoundCoordinator {
    ctx: Arc<LaneContext>,
    runners: Vec<LaneRunner>,
}

impl RoundCoordinator {
    pub fn new(ctx: Arc<LaneContext>) -> Self {
        let runners = (0..ctx.tournament.lane_count)
            .map(|lane| LaneRunner::new(lane, Arc::clone(&ctx)))
            .collect();
        Self { ctx, runners }
    }

    /// Seed every lane, then run rounds until a termination rule fires.
    pub async fn run(mut self) -> TournamentOutcome {
        if let Err(outcome) = self.seed_lanes().await {
            return outcome;
        }
        self.flush();

        let ctx = Arc::clone(&self.ctx);
        let tournament_id = ctx.tournament_id();
        let max_rounds = ctx.tournament.max_rounds;
        let early_stop = ctx.tournament.settings.early_stop;
        let mut stale_rounds = 0;

        for round in 1..=max_rounds {
            if ctx.is_cancelled() {
                return TournamentOutcome::Cancelled { round: round - 1 };
            }
            if let Err(e) = ctx.store.begin_round(tournament_id, round) {
                return TournamentOutcome::Failed {
                    reason: format!("could not begin round {round}: {e}"),
                };
            }
            ctx.events.publish(TournamentEvent::RoundStarted {
                tournament_id: tournament_id.to_string(),
                round,
                timestamp: Utc::now(),
            });

            let reports = match self.run_round(round).await {
                Ok(reports) => reports,
                Err(e) => {
                    return TournamentOutcome::Failed {
                        reason: format!("could not commit round {round}: {e}"),
                    };
                }
            };
            self.flush();

            let promoted = reports.iter().filter(|r| r.is_promoted()).count() as u32;
            let degraded = reports.iter().filter(|r| r.is_degraded()).count() as u32;
            ctx.events.publish(TournamentEvent::RoundCompleted {
                tournament_id: tournament_id.to_string(),
                round,
                promoted,
                degraded,
                timestamp: Utc::now(),
            });
            info!(
                tournament_id,
                round,
                promoted,
                degraded,
                active_lanes = self.runners.len(),
                "Round completed"
            );

            if ctx.is_cancelled()
                || reports.iter().any(|r| r.outcome == LaneOutcome::Cancelled)
            {
                return TournamentOutcome::Cancelled { round };
            }
            if self.runners.is_empty() {
                return TournamentOutcome::Failed {
                    reason: format!("no active lanes left after round {round}"),
                };
            }
            if !reports.is_empty() && degraded as usize == reports.len() {
                return TournamentOutcome::Failed {
                    reason: format!("all lanes degraded in round {round}"),
                };
            }

            if promoted == 0 {
                stale_rounds += 1;
            } else {
                stale_rounds = 0;
            }
            if early_stop.enabled && stale_rounds >= early_stop.stale_rounds && round < max_rounds {
                info!(tournament_id, round, stale_rounds, "No promotions, stopping early");
                return TournamentOutcome::Converged {
                    round,
                    stale_rounds,
                };
            }
        }

        TournamentOutcome::Completed { rounds: max_rounds }
    }

    /// Seed all lanes concurrently. Any seed failure fails the tournament.
    async fn seed_lanes(&mut self) -> Result<(), TournamentOutcome> {
        let tournament_id = self.ctx.tournament_id().to_string();
        let mut tasks = JoinSet::new();
        let mut lanes_by_task = HashMap::new();

        for mut runner in std::mem::take(&mut self.runners) {
            let lane = runner.lane();
            let span = info_span!("lane", tournament_id = %tournament_id, lane);
            let handle = tasks.spawn(
                async move {
                    let result = runner.seed().await;
                    (runner, result)
                }
                .instrument(span),
            );
            lanes_by_task.insert(handle.id(), lane);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (runner, Ok(_)))) => self.runners.push(runner),
                Ok((_, (runner, Err(TournamentError::Cancelled(_))))) => {
                    warn!(tournament_id = %tournament_id, lane = runner.lane(), "Seeding cancelled");
                    return Err(TournamentOutcome::Cancelled { round: 0 });
                }
                Ok((_, (runner, Err(e)))) => {
                    return Err(TournamentOutcome::Failed {
                        reason: format!("lane {} seeding failed: {e}", runner.lane()),
                    });
                }
                Err(e) => {
                    let lane = lanes_by_task.get(&e.id()).copied().unwrap_or_default();
                    return Err(TournamentOutcome::Failed {
                        reason: format!("lane {lane} seeding task failed: {e}"),
                    });
                }
            }
        }

        self.runners.sort_by_key(LaneRunner::lane);
        Ok(())
    }

    /// Run `round` on every active lane, wait for all of them, then commit
    /// the round.
    async fn run_round(&mut self, round: u32) -> TournamentResult<Vec<LaneRoundReport>> {
        let tournament_id = self.ctx.tournament_id().to_string();
        let mut tasks = JoinSet::new();
        let mut lanes_by_task = HashMap::new();

        for mut runner in std::mem::take(&mut self.runners) {
            let lane = runner.lane();
            let span = info_span!("lane", tournament_id = %tournament_id, lane, round);
            let handle = tasks.spawn(
                async move {
                    let pending = runner.run_round(round).await;
                    (runner, pending)
                }
                .instrument(span),
            );
            lanes_by_task.insert(handle.id(), lane);
        }

        let mut pending = Vec::with_capacity(lanes_by_task.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (runner, lane_round))) => {
                    self.runners.push(runner);
                    pending.push(lane_round);
                }
                Err(e) => {
                    let Some(lane) = lanes_by_task.get(&e.id()).copied() else {
                        warn!(tournament_id = %tournament_id, error = %e, "Unknown lane task failed");
                        continue;
                    };
                    pending.push(self.terminate_lane(lane, round, format!("lane task failed: {e}")));
                }
            }
        }

        self.runners.sort_by_key(LaneRunner::lane);
        lane::commit_round(&self.ctx, round, pending)
    }

    /// Drop a lane whose task died. Its round is committed as degraded.
    fn terminate_lane(&self, lane: u32, round: u32, reason: String) -> PendingRound {
        let ctx = &*self.ctx;
        let tournament_id = ctx.tournament_id();
        warn!(tournament_id, lane, round, %reason, "Lane terminated");

        let champion_id = ctx
            .store
            .current_champion(tournament_id, lane)
            .ok()
            .map(|c| c.id);
        let report = LaneRoundReport::new(lane, round, LaneOutcome::Degraded, champion_id)
            .with_reason(reason.clone());
        ctx.events.publish(TournamentEvent::LaneTerminated {
            tournament_id: tournament_id.to_string(),
            lane,
            reason,
            timestamp: Utc::now(),
        });
        PendingRound::settled(report)
    }

    fn flush(&self) {
        if let Err(e) = self.ctx.store.flush() {
            warn!(tournament_id = self.ctx.tournament_id(), error = %e, "Failed to flush idea store");
        }
    }
}
