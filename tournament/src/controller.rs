//! Tournament controller: lifecycle owner and the read side for clients.
//!
//! `create` validates and stores the tournament, then spawns its run in the
//! background; clients poll `status` and `ideas`. Every read is one store
//! snapshot, so a poll never mixes two rounds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{EngineConfig, TournamentRequest};
use crate::error::{TournamentError, TournamentResult};
use crate::events::{SharedEventBus, TournamentEvent};
use crate::lane::LaneContext;
use crate::progress::{self, Progress, ProgressShape};
use crate::providers::{SharedGenerator, SharedReviewer};
use crate::round::{RoundCoordinator, TournamentOutcome};
use crate::state::{
    Idea, LaneSummary, Review, SharedIdeaStore, Tournament, TournamentId, TournamentStatus,
};

/// Shared reference to TournamentController
pub type SharedTournamentController = Arc<TournamentController>;

/// Failure reason given to tournaments found unfinished at startup.
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

/// Status view returned to polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentStatusView {
    pub id: TournamentId,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    pub lane_count: u32,
    pub progress: Progress,
    pub lanes: Vec<LaneSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct RunHandle {
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// Runs started by this process that have not finished yet.
type RunRegistry = Arc<Mutex<HashMap<TournamentId, RunHandle>>>;

/// Owns tournament lifecycles for one process.
pub struct TournamentController {
    config: EngineConfig,
    store: SharedIdeaStore,
    events: SharedEventBus,
    generator: SharedGenerator,
    reviewer: SharedReviewer,
    limiter: Arc<Semaphore>,
    runs: RunRegistry,
}

impl TournamentController {
    pub fn new(
        config: EngineConfig,
        store: SharedIdeaStore,
        events: SharedEventBus,
        generator: SharedGenerator,
        reviewer: SharedReviewer,
    ) -> TournamentResult<Self> {
        config.validate()?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_calls));
        Ok(Self {
            config,
            store,
            events,
            generator,
            reviewer,
            limiter,
            runs: RunRegistry::default(),
        })
    }

    /// Create a shared reference to this controller
    pub fn shared(self) -> SharedTournamentController {
        Arc::new(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedIdeaStore {
        &self.store
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Mark tournaments left unfinished by a previous process as failed.
    pub fn recover(&self) -> TournamentResult<Vec<TournamentId>> {
        let failed = self.store.fail_unfinished(INTERRUPTED_REASON)?;
        if !failed.is_empty() {
            warn!(count = failed.len(), "Marked interrupted tournaments as failed");
            self.store.flush()?;
        }
        Ok(failed)
    }

    /// Validate `request`, store the tournament and start it in the background.
    pub fn create(&self, request: TournamentRequest) -> TournamentResult<TournamentId> {
        let tournament = request.into_tournament(&self.config)?;
        let tournament_id = tournament.id.clone();
        self.store.create_tournament(tournament.clone())?;
        self.store.flush()?;
        self.events.publish(TournamentEvent::TournamentCreated {
            tournament_id: tournament_id.clone(),
            lane_count: tournament.lane_count,
            max_rounds: tournament.max_rounds,
            timestamp: Utc::now(),
        });
        info!(
            tournament_id = %tournament_id,
            drug = %tournament.drug_name,
            indication = %tournament.indication,
            lanes = tournament.lane_count,
            max_rounds = tournament.max_rounds,
            "Tournament created"
        );

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        self.runs()?.insert(
            tournament_id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                finished: finished.clone(),
            },
        );

        let ctx = LaneContext {
            tournament,
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
            generator: Arc::clone(&self.generator),
            reviewer: Arc::clone(&self.reviewer),
            reviewers: self.config.reviewers.clone(),
            retry: self.config.retry.clone(),
            call_timeout: self.config.call_timeout(),
            limiter: Arc::clone(&self.limiter),
            cancel,
        };
        let runs = Arc::clone(&self.runs);
        let run_id = tournament_id.clone();
        let span = info_span!("tournament", tournament_id = %tournament_id);
        tokio::spawn(
            async move {
                drive(ctx).await;
                match runs.lock() {
                    Ok(mut runs) => {
                        runs.remove(&run_id);
                    }
                    Err(_) => error!("Run registry poisoned, handle not released"),
                }
                finished.cancel();
            }
            .instrument(span),
        );

        Ok(tournament_id)
    }

    pub fn tournament(&self, tournament_id: &str) -> TournamentResult<Tournament> {
        self.store.tournament(tournament_id)
    }

    pub fn list(&self) -> TournamentResult<Vec<Tournament>> {
        self.store.list_tournaments()
    }

    pub fn status(&self, tournament_id: &str) -> TournamentResult<TournamentStatusView> {
        let snapshot = self.store.snapshot(tournament_id)?;
        let t = snapshot.tournament;
        let progress = progress::project(
            snapshot.ideas.len(),
            t.current_round,
            t.status,
            ProgressShape::from(&t),
        );
        Ok(TournamentStatusView {
            id: t.id,
            status: t.status,
            current_round: t.current_round,
            max_rounds: t.max_rounds,
            lane_count: t.lane_count,
            progress,
            lanes: snapshot.lanes,
            failure_reason: t.failure_reason,
            created_at: t.created_at,
            updated_at: t.updated_at,
        })
    }

    /// Full history: all lanes, all rounds.
    pub fn ideas(&self, tournament_id: &str) -> TournamentResult<Vec<Idea>> {
        self.store.ideas(tournament_id)
    }

    /// One lane's ideas as of `through_round` (default: the current round).
    pub fn lane_history(
        &self,
        tournament_id: &str,
        lane: u32,
        through_round: Option<u32>,
    ) -> TournamentResult<Vec<Idea>> {
        let through_round = match through_round {
            Some(round) => round,
            None => self.store.tournament(tournament_id)?.current_round,
        };
        self.store.list_by_lane(tournament_id, lane, through_round)
    }

    pub fn review_for(&self, idea_id: &str, reviewer_id: &str) -> TournamentResult<Review> {
        self.store.review(idea_id, reviewer_id)
    }

    /// Ask a running tournament to stop at the next checkpoint.
    pub fn cancel(&self, tournament_id: &str) -> TournamentResult<()> {
        let tournament = self.store.tournament(tournament_id)?;
        if tournament.status.is_terminal() {
            return Err(TournamentError::Conflict(format!(
                "tournament {tournament_id} is already {}",
                tournament.status
            )));
        }
        match self.runs()?.get(tournament_id) {
            Some(handle) => {
                info!(tournament_id, "Cancellation requested");
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(TournamentError::Conflict(format!(
                "tournament {tournament_id} is not running in this process"
            ))),
        }
    }

    /// Number of tournaments this process is still running.
    pub fn active_runs(&self) -> TournamentResult<usize> {
        Ok(self.runs()?.len())
    }

    /// Wait until the background run finishes, then return the final record.
    pub async fn wait(&self, tournament_id: &str) -> TournamentResult<Tournament> {
        let finished = self
            .runs()?
            .get(tournament_id)
            .map(|handle| handle.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
        self.store.tournament(tournament_id)
    }

    fn runs(
        &self,
    ) -> TournamentResult<std::sync::MutexGuard<'_, HashMap<TournamentId, RunHandle>>> {
        self.runs.lock().map_err(|_| TournamentError::LockPoisoned)
    }
}

/// Run one tournament to a terminal status.
async fn drive(ctx: LaneContext) {
    let store = Arc::clone(&ctx.store);
    let events = Arc::clone(&ctx.events);
    let tournament_id = ctx.tournament.id.clone();

    if let Err(e) = store.set_status(&tournament_id, TournamentStatus::Running, None) {
        error!(error = %e, "Could not start tournament");
        return;
    }

    let outcome = RoundCoordinator::new(Arc::new(ctx)).run().await;
    let status = outcome.status();
    let reason = outcome.failure_reason();

    match &outcome {
        TournamentOutcome::Failed { reason } => warn!(%reason, "Tournament failed"),
        other => info!(outcome = ?other, "Tournament finished"),
    }

    if let Err(e) = store.set_status(&tournament_id, status, reason.clone()) {
        error!(error = %e, "Could not record final status");
    }
    if let Err(e) = store.flush() {
        error!(error = %e, "Could not flush final state");
    }
    events.publish(TournamentEvent::TournamentFinished {
        tournament_id,
        status,
        reason,
        timestamp: Utc::now(),
    });
}
