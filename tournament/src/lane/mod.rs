//! Lane runner: drives one lane through seeding and its rounds.
//!
//! ```text
//! Seeding ──▶ Idle(0) ──▶ AwaitingChallenger ──▶ AwaitingReview ──▶ Deciding ──▶ Idle(r)
//!                ▲                                                                 │
//!                └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A round ends in a [`PendingRound`] that nothing has written yet. The
//! coordinator hands every lane's pending round to [`commit_round`] at the
//! barrier, which decides each lane and stores the whole round at once, so
//! readers never see some lanes a round ahead of others.
//!
//! Provider failures never escape a round: they turn into a `degraded`
//! outcome with the champion kept. Only a failed seed is reported as an
//! error, because a lane without a champion cannot take part in the
//! tournament.

pub mod decision;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PromotionPolicy, ReviewerSpec};
use crate::error::{ProviderError, TournamentError, TournamentResult};
use crate::events::{SharedEventBus, TournamentEvent};
use crate::providers::{GenerationContext, SharedGenerator, SharedReviewer};
use crate::retry::{call_with_retry, RetryPolicy};
use crate::state::{
    ConceptDraft, Idea, IdeaId, LaneCommit, LaneOutcome, LaneRoundRecord, Promotion, Review,
    SharedIdeaStore, Tournament,
};

pub use decision::{decide, select_best, should_promote, Decision};

/// Inputs shared by every lane of one tournament.
pub struct LaneContext {
    pub tournament: Tournament,
    pub store: SharedIdeaStore,
    pub events: SharedEventBus,
    pub generator: SharedGenerator,
    pub reviewer: SharedReviewer,
    pub reviewers: Vec<ReviewerSpec>,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    /// Shared across tournaments to respect provider rate limits.
    pub limiter: Arc<Semaphore>,
    pub cancel: CancellationToken,
}

impl LaneContext {
    pub fn tournament_id(&self) -> &str {
        &self.tournament.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// How a lane resolved one round.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneRoundReport {
    pub lane: u32,
    pub round: u32,
    pub outcome: LaneOutcome,
    /// Champion after the round.
    pub champion_id: Option<IdeaId>,
    pub challenger_ids: Vec<IdeaId>,
    /// Score change of the promoted (or best retained) challenger.
    pub score_change: Option<f64>,
    pub reason: Option<String>,
}

impl LaneRoundReport {
    pub fn new(lane: u32, round: u32, outcome: LaneOutcome, champion_id: Option<IdeaId>) -> Self {
        Self {
            lane,
            round,
            outcome,
            champion_id,
            challenger_ids: Vec::new(),
            score_change: None,
            reason: None,
        }
    }

    fn with_outcome(mut self, outcome: LaneOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    fn with_challengers(mut self, ids: Vec<IdeaId>) -> Self {
        self.challenger_ids = ids;
        self
    }

    fn with_score_change(mut self, score_change: Option<f64>) -> Self {
        self.score_change = score_change;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_promoted(&self) -> bool {
        self.outcome == LaneOutcome::Promoted
    }

    pub fn is_degraded(&self) -> bool {
        self.outcome == LaneOutcome::Degraded
    }

    pub fn to_record(&self) -> LaneRoundRecord {
        let record = LaneRoundRecord::new(self.lane, self.round, self.outcome)
            .with_challengers(self.challenger_ids.clone())
            .with_champion(self.champion_id.clone());
        match &self.reason {
            Some(reason) => record.with_reason(reason.clone()),
            None => record,
        }
    }
}

/// A challenger after the review panel ran. `idea.scores` is `None` when no
/// reviewer answered.
struct ReviewedIdea {
    idea: Idea,
    reviews: Vec<Review>,
}

enum LanePhase {
    /// Waiting for the round-0 idea.
    Seeding,
    /// Round `round` resolved; ready for the next one.
    Idle { round: u32 },
    AwaitingChallenger {
        round: u32,
        champion: Idea,
    },
    AwaitingReview {
        round: u32,
        champion: Idea,
        challengers: Vec<Idea>,
    },
    Deciding {
        round: u32,
        champion: Idea,
        challengers: Vec<ReviewedIdea>,
    },
    /// Takes no further part in the tournament.
    Terminated { reason: String },
}

/// One lane's round, run up to the decision but not yet stored.
pub struct PendingRound {
    lane: u32,
    round: u32,
    state: PendingState,
}

enum PendingState {
    /// Nothing to decide; only the lane record is committed.
    Settled(LaneRoundReport),
    Reviewed {
        /// Champion the challengers were generated against.
        champion: Idea,
        challengers: Vec<ReviewedIdea>,
    },
}

impl PendingRound {
    /// A round whose outcome is already known, such as a degraded lane.
    pub fn settled(report: LaneRoundReport) -> Self {
        Self {
            lane: report.lane,
            round: report.round,
            state: PendingState::Settled(report),
        }
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    fn basis(&self) -> Option<&Idea> {
        match &self.state {
            PendingState::Settled(_) => None,
            PendingState::Reviewed { champion, .. } => Some(champion),
        }
    }

    /// Decide the round against `champion` (the basis when `None`) and build
    /// the store commit. Score changes are taken against that same champion.
    fn resolve(
        &self,
        champion: Option<&Idea>,
        policy: &PromotionPolicy,
        cancelled: bool,
    ) -> (LaneCommit, LaneRoundReport) {
        let (basis, challengers) = match &self.state {
            PendingState::Settled(report) => {
                return (LaneCommit::record_only(report.to_record()), report.clone());
            }
            PendingState::Reviewed {
                champion,
                challengers,
            } => (champion, challengers),
        };
        let champion = champion.unwrap_or(basis);
        let report = LaneRoundReport::new(
            self.lane,
            self.round,
            LaneOutcome::Retained,
            Some(champion.id.clone()),
        );

        if cancelled {
            let report = report
                .with_outcome(LaneOutcome::Cancelled)
                .with_reason("cancelled before decision");
            return (LaneCommit::record_only(report.to_record()), report);
        }

        let stored: Vec<Idea> = challengers
            .iter()
            .map(|c| {
                let change = decision::score_change(champion, &c.idea);
                c.idea.clone().with_score_change(change)
            })
            .collect();
        let reviews: Vec<Review> = challengers
            .iter()
            .flat_map(|c| c.reviews.iter().cloned())
            .collect();
        let report = report.with_challengers(stored.iter().map(|i| i.id.clone()).collect());

        let (report, promotion) = if stored.iter().all(|i| i.scores.is_none()) {
            let report = report
                .with_outcome(LaneOutcome::Degraded)
                .with_reason("no reviews for any challenger");
            (report, None)
        } else {
            match decide(champion, &stored, policy) {
                Decision::Retain { best_id } => {
                    let best_change = best_id
                        .and_then(|id| stored.iter().find(|i| i.id == id))
                        .and_then(|i| i.score_change);
                    (report.with_score_change(best_change), None)
                }
                Decision::Promote {
                    challenger_id,
                    score_change,
                } => {
                    let mut report = report
                        .with_outcome(LaneOutcome::Promoted)
                        .with_score_change(Some(score_change));
                    report.champion_id = Some(challenger_id.clone());
                    let promotion = Promotion {
                        expected: champion.id.clone(),
                        champion: challenger_id,
                    };
                    (report, Some(promotion))
                }
            }
        };

        let commit = LaneCommit {
            record: report.to_record(),
            challengers: stored,
            reviews,
            promotion,
        };
        (commit, report)
    }
}

enum Step {
    Continue,
    Resolved(PendingRound),
}

/// Runs one lane. Owned by the round coordinator and moved into the lane's
/// task for each round.
pub struct LaneRunner {
    lane: u32,
    ctx: Arc<LaneContext>,
    phase: LanePhase,
}

impl LaneRunner {
    pub fn new(lane: u32, ctx: Arc<LaneContext>) -> Self {
        Self {
            lane,
            ctx,
            phase: LanePhase::Seeding,
        }
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase, LanePhase::Terminated { .. })
    }

    fn report(&self, round: u32, outcome: LaneOutcome, champion: Option<IdeaId>) -> LaneRoundReport {
        LaneRoundReport::new(self.lane, round, outcome, champion)
    }

    /// Seed the lane with its round-0 champion.
    pub async fn seed(&mut self) -> TournamentResult<LaneRoundReport> {
        if !matches!(self.phase, LanePhase::Seeding) {
            return Err(TournamentError::Validation(format!(
                "lane {} is already seeded",
                self.lane
            )));
        }
        let result = self.seed_lane().await;
        self.phase = match &result {
            Ok(_) => LanePhase::Idle { round: 0 },
            Err(e) => LanePhase::Terminated {
                reason: e.to_string(),
            },
        };
        result
    }

    async fn seed_lane(&self) -> TournamentResult<LaneRoundReport> {
        let ctx = &*self.ctx;
        let tournament_id = ctx.tournament_id();
        let context = GenerationContext::seed(&ctx.tournament, self.lane);
        let draft = self.generate(&context).await?;

        let idea = Idea::new(tournament_id, self.lane, 0, draft);
        let reviews = self.review_all(&idea).await;
        let aggregator = ctx.tournament.settings.aggregator();
        let scores = if reviews.is_empty() {
            warn!(
                tournament_id,
                lane = self.lane,
                "No reviews for seed idea, using neutral scores"
            );
            aggregator.neutral()
        } else {
            aggregator.aggregate(&reviews)
        };
        let idea = idea.with_scores(scores);

        if ctx.is_cancelled() {
            return Err(TournamentError::Cancelled(format!(
                "lane {} cancelled before seeding",
                self.lane
            )));
        }

        let idea_id = ctx.store.append(idea)?;
        self.retain_reviews(reviews);
        ctx.store.promote(tournament_id, self.lane, None, &idea_id)?;

        let report = self.report(0, LaneOutcome::Seeded, Some(idea_id.clone()));
        ctx.store.record_lane_round(tournament_id, report.to_record())?;
        ctx.events.publish(TournamentEvent::LaneSeeded {
            tournament_id: tournament_id.to_string(),
            lane: self.lane,
            idea_id: idea_id.clone(),
            overall_score: Some(scores.overall_score),
            timestamp: Utc::now(),
        });
        info!(
            tournament_id,
            lane = self.lane,
            idea_id = %idea_id,
            overall = scores.overall_score,
            "Lane seeded"
        );
        Ok(report)
    }

        /// Run `round` up to its decision. Always resolves, never errors, and
    /// writes nothing: the result is committed with the other lanes by
    /// [`commit_round`].
    pub async fn run_round(&mut self, round: u32) -> PendingRound {
        let placeholder = LanePhase::Terminated {
            reason: String::new(),
        };
        match std::mem::replace(&mut self.phase, placeholder) {
            LanePhase::Idle { round: last } if last + 1 == round => {
                match self
                    .ctx
                    .store
                    .current_champion(self.ctx.tournament_id(), self.lane)
                {
                    Ok(champion) => {
                        self.phase = LanePhase::AwaitingChallenger { round, champion };
                    }
                    Err(e) => {
                        self.phase = LanePhase::Idle { round };
                        return PendingRound::settled(
                            self.report(round, LaneOutcome::Degraded, None)
                                .with_reason(format!("champion unavailable: {e}")),
                        );
                    }
                }
            }
            other => {
                let reason = match &other {
                    LanePhase::Terminated { reason } => format!("lane terminated: {reason}"),
                    _ => format!("lane {} is not ready for round {round}", self.lane),
                };
                self.phase = other;
                return PendingRound::settled(
                    self.report(round, LaneOutcome::Degraded, None)
                        .with_reason(reason),
                );
            }
        }

        loop {
            if let Step::Resolved(pending) = self.step(round).await {
                self.phase = LanePhase::Idle { round };
                return pending;
            }
        }
    }

    async fn step(&mut self, round: u32) -> Step {
        let current = std::mem::replace(
            &mut self.phase,
            LanePhase::Terminated {
                reason: String::new(),
            },
        );

        self.phase = match current {
            LanePhase::AwaitingChallenger { round, champion } => {
                if self.ctx.is_cancelled() {
                    return Step::Resolved(PendingRound::settled(
                        self.report(round, LaneOutcome::Cancelled, Some(champion.id))
                            .with_reason("cancelled before generation"),
                    ));
                }
                match self.request_challengers(round, &champion).await {
                    Ok(challengers) => LanePhase::AwaitingReview {
                        round,
                        champion,
                        challengers,
                    },
                    Err(e) => {
                        return Step::Resolved(PendingRound::settled(
                            self.report(round, LaneOutcome::Degraded, Some(champion.id))
                                .with_reason(e.to_string()),
                        ));
                    }
                }
            }

            LanePhase::AwaitingReview {
                round,
                champion,
                challengers,
            } => {
                let reviewed =
                    join_all(challengers.into_iter().map(|idea| self.review_challenger(idea)))
                        .await;
                LanePhase::Deciding {
                    round,
                    champion,
                    challengers: reviewed,
                }
            }

            LanePhase::Deciding {
                round,
                champion,
                challengers,
            } => {
                return Step::Resolved(PendingRound {
                    lane: self.lane,
                    round,
                    state: PendingState::Reviewed {
                        champion,
                        challengers,
                    },
                })
            }

            LanePhase::Seeding | LanePhase::Idle { .. } | LanePhase::Terminated { .. } => {
                return Step::Resolved(PendingRound::settled(
                    self.report(round, LaneOutcome::Degraded, None)
                        .with_reason("step called outside a round"),
                ));
            }
        };

        Step::Continue
    }

    // ── Phases ────────────────────────────────────────────────────────────

    /// Ask for `fanOut` challengers in parallel. Fails only if none arrived.
    async fn request_challengers(
        &self,
        round: u32,
        champion: &Idea,
    ) -> Result<Vec<Idea>, ProviderError> {
        let tournament = &self.ctx.tournament;
        let fan_out = tournament.settings.fan_out.max(1);
        let results = join_all((0..fan_out).map(|variant| {
            let context =
                GenerationContext::challenger(tournament, self.lane, round, champion, variant);
            async move { self.generate(&context).await }
        }))
        .await;

        let mut challengers = Vec::with_capacity(results.len());
        let mut last_error = None;
        for result in results {
            match result {
                Ok(draft) => {
                    challengers.push(Idea::new(&tournament.id, self.lane, round, draft));
                }
                Err(e) => {
                    warn!(
                        tournament_id = %tournament.id,
                        lane = self.lane,
                        round,
                        error = %e,
                        "Challenger generation failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        match (challengers.is_empty(), last_error) {
            (false, _) => Ok(challengers),
            (true, Some(e)) => Err(e),
            (true, None) => Err(ProviderError::permanent(
                "generate",
                "no challenger requested",
            )),
        }
    }

    async fn review_challenger(&self, idea: Idea) -> ReviewedIdea {
        let reviews = self.review_all(&idea).await;
        let idea = if reviews.is_empty() {
            warn!(
                tournament_id = %idea.tournament_id,
                lane = self.lane,
                round = idea.round,
                idea_id = %idea.id,
                "No reviews for challenger, leaving it unscored"
            );
            idea
        } else {
            let scores = self.ctx.tournament.settings.aggregator().aggregate(&reviews);
            idea.with_scores(scores)
        };
        ReviewedIdea { idea, reviews }
    }

    // ── Provider calls ────────────────────────────────────────────────────

    async fn generate(&self, context: &GenerationContext) -> Result<ConceptDraft, ProviderError> {
        let ctx = &*self.ctx;
        call_with_retry(
            "generate",
            &ctx.retry,
            ctx.call_timeout,
            &ctx.limiter,
            || ctx.generator.generate(context),
        )
        .await
    }

    /// Submit `idea` to every panel reviewer in parallel. Failed reviewers
    /// are dropped.
    async fn review_all(&self, idea: &Idea) -> Vec<Review> {
        let ctx = &*self.ctx;
        let calls = ctx.reviewers.iter().map(|reviewer| async move {
            let operation = format!("review:{}", reviewer.id);
            let result = call_with_retry(
                &operation,
                &ctx.retry,
                ctx.call_timeout,
                &ctx.limiter,
                || ctx.reviewer.review(idea, reviewer),
            )
            .await;
            (reviewer, result)
        });

        let mut reviews = Vec::with_capacity(ctx.reviewers.len());
        for (reviewer, result) in join_all(calls).await {
            match result {
                Ok(verdict) => reviews.push(Review::from_verdict(verdict, &idea.id, reviewer)),
                Err(e) => warn!(
                    tournament_id = %idea.tournament_id,
                    lane = idea.lane,
                    round = idea.round,
                    reviewer = %reviewer.id,
                    error = %e,
                    "Review failed"
                ),
            }
        }
        reviews
    }

    fn retain_reviews(&self, reviews: Vec<Review>) {
        for review in reviews {
            if let Err(e) = self.ctx.store.put_review(review) {
                warn!(error = %e, "Failed to retain review");
            }
        }
    }
}

/// Decide every lane's pending round and store them all in one write.
///
/// A promotion that lost a compare-and-swap (the champion changed since the
/// lane read it) re-reads the champions and decides once more. A second
/// failure is returned to the coordinator.
pub fn commit_round(
    ctx: &LaneContext,
    round: u32,
    mut pending: Vec<PendingRound>,
) -> TournamentResult<Vec<LaneRoundReport>> {
    let tournament_id = ctx.tournament_id();
    let policy = ctx.tournament.settings.promotion;
    let cancelled = ctx.is_cancelled();
    if cancelled {
        debug!(tournament_id, round, "Discarding round results");
    }
    pending.sort_by_key(PendingRound::lane);

    let resolve_all = |champions: &[Option<Idea>]| -> (Vec<LaneCommit>, Vec<LaneRoundReport>) {
        pending
            .iter()
            .zip(champions)
            .map(|(p, champion)| p.resolve(champion.as_ref(), &policy, cancelled))
            .unzip()
    };

    let (commits, mut reports) = resolve_all(&vec![None; pending.len()]);
    match ctx.store.commit_round(tournament_id, round, commits) {
        Ok(()) => {}
        Err(TournamentError::Conflict(message)) => {
            warn!(tournament_id, round, %message, "Champion changed, deciding again");
            let champions = pending
                .iter()
                .map(|p| match p.basis() {
                    Some(_) => ctx.store.current_champion(tournament_id, p.lane).map(Some),
                    None => Ok(None),
                })
                .collect::<TournamentResult<Vec<_>>>()?;
            let (commits, retried) = resolve_all(&champions);
            ctx.store.commit_round(tournament_id, round, commits)?;
            reports = retried;
        }
        Err(e) => return Err(e),
    }

    for (pending, report) in pending.iter().zip(&reports) {
        announce(ctx, pending, report);
    }
    Ok(reports)
}

/// Publish what a committed lane round stored and decided.
fn announce(ctx: &LaneContext, pending: &PendingRound, report: &LaneRoundReport) {
    let tournament_id = ctx.tournament_id();
    if let PendingState::Reviewed { challengers, .. } = &pending.state {
        if report.outcome != LaneOutcome::Cancelled {
            for ReviewedIdea { idea, .. } in challengers {
                ctx.events.publish(TournamentEvent::ChallengerStored {
                    tournament_id: tournament_id.to_string(),
                    lane: report.lane,
                    round: report.round,
                    idea_id: idea.id.clone(),
                    overall_score: idea.overall_score(),
                    timestamp: Utc::now(),
                });
            }
        }
    }
    ctx.events.publish(TournamentEvent::LaneDecided {
        tournament_id: tournament_id.to_string(),
        lane: report.lane,
        round: report.round,
        outcome: report.outcome,
        champion_id: report.champion_id.clone(),
        score_change: report.score_change,
        timestamp: Utc::now(),
    });
    match report.outcome {
        LaneOutcome::Degraded => warn!(
            tournament_id,
            lane = report.lane,
            round = report.round,
            reason = report.reason.as_deref().unwrap_or(""),
            "Lane round degraded"
        ),
        outcome => info!(
            tournament_id,
            lane = report.lane,
            round = report.round,
            %outcome,
            score_change = report.score_change,
            "Lane round resolved"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{EngineConfig, TournamentRequest};
    use crate::events::EventBus;
    use crate::providers::{ExpertReviewer, IdeaGenerator};
    use crate::scoring::{DimensionScores, ScoreCard, DEFAULT_NEUTRAL_SCORE};
    use crate::state::types::fixtures::draft;
    use crate::state::{IdeaStore, ReviewVerdict, StrategicGoal, TournamentStatus};

    struct CountingGenerator {
        calls: AtomicU32,
    }

    #[async_trait]
    impl IdeaGenerator for CountingGenerator {
        async fn generate(&self, ctx: &GenerationContext) -> Result<ConceptDraft, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(draft(&format!("lane {} round {} #{n}", ctx.lane, ctx.round)))
        }
    }

    struct FixedReviewer {
        score: f64,
        fail: bool,
    }

    #[async_trait]
    impl ExpertReviewer for FixedReviewer {
        async fn review(
            &self,
            _idea: &Idea,
            reviewer: &ReviewerSpec,
        ) -> Result<ReviewVerdict, ProviderError> {
            if self.fail {
                return Err(ProviderError::permanent(format!("review:{}", reviewer.id), "down"));
            }
            Ok(verdict(self.score))
        }
    }

    /// Promotes a competing idea scoring `intruder_score` behind the lane's
    /// back the first time it reviews a round-1 challenger.
    struct IntrudingReviewer {
        store: SharedIdeaStore,
        intruder_score: f64,
        intruded: AtomicBool,
    }

    #[async_trait]
    impl ExpertReviewer for IntrudingReviewer {
        async fn review(
            &self,
            idea: &Idea,
            _reviewer: &ReviewerSpec,
        ) -> Result<ReviewVerdict, ProviderError> {
            if idea.round == 1 && !self.intruded.swap(true, Ordering::SeqCst) {
                let champion = self.store.current_champion(&idea.tournament_id, idea.lane).unwrap();
                let intruder = Idea::new(&idea.tournament_id, idea.lane, 1, draft("intruder"))
                    .with_scores(ScoreCard::from_dimensions(
                        DimensionScores::uniform(self.intruder_score),
                        &Default::default(),
                    ));
                let id = self.store.append(intruder).unwrap();
                self.store
                    .promote(&idea.tournament_id, idea.lane, Some(&champion.id), &id)
                    .unwrap();
            }
            Ok(verdict(if idea.round == 0 { 3.0 } else { 4.0 }))
        }
    }

    fn verdict(score: f64) -> ReviewVerdict {
        ReviewVerdict {
            score,
            strengths: vec![],
            weaknesses: vec![],
            additional_metrics: Default::default(),
        }
    }

    fn intruding(store: &SharedIdeaStore, intruder_score: f64) -> Arc<IntrudingReviewer> {
        Arc::new(IntrudingReviewer {
            store: store.clone(),
            intruder_score,
            intruded: AtomicBool::new(false),
        })
    }

    /// Run one round on a single lane and commit it.
    async fn play(runner: &mut LaneRunner, ctx: &LaneContext, round: u32) -> LaneRoundReport {
        let pending = runner.run_round(round).await;
        let mut reports = commit_round(ctx, round, vec![pending]).unwrap();
        reports.remove(0)
    }

    fn context(store: SharedIdeaStore, reviewer: SharedReviewer) -> Arc<LaneContext> {
        let config = EngineConfig::default();
        let tournament = TournamentRequest {
            drug_name: "Ixekizumab".into(),
            indication: "Plaque psoriasis".into(),
            strategic_goals: vec![StrategicGoal {
                goal: "Label expansion".into(),
                weight: 1.0,
            }],
            study_phase_preference: Default::default(),
            geography: Default::default(),
            lane_count: 1,
            max_rounds: 2,
            settings: None,
        }
        .into_tournament(&config)
        .unwrap();
        store.create_tournament(tournament.clone()).unwrap();
        store
            .set_status(&tournament.id, TournamentStatus::Running, None)
            .unwrap();

        Arc::new(LaneContext {
            tournament,
            store,
            events: EventBus::new().shared(),
            generator: Arc::new(CountingGenerator {
                calls: AtomicU32::new(0),
            }),
            reviewer,
            reviewers: config.reviewers,
            retry: RetryPolicy::none(),
            call_timeout: Duration::from_secs(1),
            limiter: Arc::new(Semaphore::new(4)),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn seed_without_reviews_gets_neutral_scores() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store.clone(),
            Arc::new(FixedReviewer {
                score: 0.0,
                fail: true,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx.clone());
        let report = runner.seed().await.unwrap();
        assert_eq!(report.outcome, LaneOutcome::Seeded);

        let champion = store.current_champion(ctx.tournament_id(), 0).unwrap();
        assert_eq!(champion.overall_score(), Some(DEFAULT_NEUTRAL_SCORE));
        assert_eq!(champion.round, 0);
        assert!(champion.score_change.is_none());
    }

    #[tokio::test]
    async fn round_requires_seed_first() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store,
            Arc::new(FixedReviewer {
                score: 3.0,
                fail: false,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx);
        let pending = runner.run_round(1).await;
        match pending.state {
            PendingState::Settled(report) => assert!(report.is_degraded()),
            PendingState::Reviewed { .. } => panic!("unseeded lane reached review"),
        }
        assert!(!runner.is_terminated());
    }

    #[tokio::test]
    async fn equal_challenger_is_retained_and_stored() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store.clone(),
            Arc::new(FixedReviewer {
                score: 3.0,
                fail: false,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx.clone());
        let seed = runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();

        let report = play(&mut runner, &ctx, 1).await;
        assert_eq!(report.outcome, LaneOutcome::Retained);
        assert_eq!(report.champion_id, seed.champion_id);
        assert_eq!(report.challenger_ids.len(), 1);
        assert_eq!(report.score_change, Some(0.0));
        assert_eq!(store.ideas(ctx.tournament_id()).unwrap().len(), 2);
        assert_eq!(
            store.reviews_for(&report.challenger_ids[0]).unwrap().len(),
            ctx.reviewers.len()
        );
    }

    #[tokio::test]
    async fn pending_round_is_invisible_until_committed() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store.clone(),
            Arc::new(FixedReviewer {
                score: 4.0,
                fail: false,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx.clone());
        let seed = runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();

        let pending = runner.run_round(1).await;
        assert_eq!(store.ideas(ctx.tournament_id()).unwrap().len(), 1);
        assert_eq!(store.lane_rounds(ctx.tournament_id(), 0).unwrap().len(), 1);
        assert_eq!(
            Some(store.current_champion(ctx.tournament_id(), 0).unwrap().id),
            seed.champion_id
        );

        let reports = commit_round(&ctx, 1, vec![pending]).unwrap();
        assert!(reports[0].is_promoted());
        assert_eq!(store.ideas(ctx.tournament_id()).unwrap().len(), 2);
        assert_eq!(
            Some(store.current_champion(ctx.tournament_id(), 0).unwrap().id),
            reports[0].champion_id
        );
    }

    #[tokio::test]
    async fn lost_promotion_race_rereads_champion_once() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(store.clone(), intruding(&store, 5.0));
        let mut runner = LaneRunner::new(0, ctx.clone());
        runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();

        // The challenger (4.0) beats the seed (3.0) but not the intruder (5.0).
        let report = play(&mut runner, &ctx, 1).await;
        assert_eq!(report.outcome, LaneOutcome::Retained);
        let champion = store.current_champion(ctx.tournament_id(), 0).unwrap();
        assert_eq!(champion.title, "intruder");
        assert_eq!(report.champion_id, Some(champion.id));
        assert!((report.score_change.unwrap() + 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn score_change_follows_the_champion_actually_beaten() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(store.clone(), intruding(&store, 3.5));
        let mut runner = LaneRunner::new(0, ctx.clone());
        runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();

        // Decided against the seed (3.0), then again against the intruder (3.5).
        let report = play(&mut runner, &ctx, 1).await;
        assert!(report.is_promoted());
        let champion = store.current_champion(ctx.tournament_id(), 0).unwrap();
        assert_eq!(report.champion_id.as_ref(), Some(&champion.id));
        assert_ne!(champion.title, "intruder");

        let change = champion.score_change.unwrap();
        assert!((change - 0.5).abs() < 1e-9, "stored score change {change}");
        assert!((report.score_change.unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancelled_round_discards_results() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store.clone(),
            Arc::new(FixedReviewer {
                score: 4.0,
                fail: false,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx.clone());
        runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();
        ctx.cancel.cancel();

        let report = play(&mut runner, &ctx, 1).await;
        assert_eq!(report.outcome, LaneOutcome::Cancelled);
        assert_eq!(store.ideas(ctx.tournament_id()).unwrap().len(), 1);
        let rounds = store.lane_rounds(ctx.tournament_id(), 0).unwrap();
        assert_eq!(rounds.last().map(|r| r.outcome), Some(LaneOutcome::Cancelled));
    }

    #[tokio::test]
    async fn review_cancelled_mid_round_stores_no_challengers() {
        let store = IdeaStore::in_memory().shared();
        let ctx = context(
            store.clone(),
            Arc::new(FixedReviewer {
                score: 4.0,
                fail: false,
            }),
        );
        let mut runner = LaneRunner::new(0, ctx.clone());
        runner.seed().await.unwrap();
        store.begin_round(ctx.tournament_id(), 1).unwrap();

        let pending = runner.run_round(1).await;
        assert!(matches!(pending.state, PendingState::Reviewed { .. }));
        ctx.cancel.cancel();

        let reports = commit_round(&ctx, 1, vec![pending]).unwrap();
        assert_eq!(reports[0].outcome, LaneOutcome::Cancelled);
        assert_eq!(reports[0].reason.as_deref(), Some("cancelled before decision"));
        assert_eq!(store.ideas(ctx.tournament_id()).unwrap().len(), 1);
    }
}
