//! End-to-end tournament runs against scripted in-process providers.
//!
//! Covers: controller ↔ round coordinator ↔ lane runners ↔ idea store ↔
//! event bus running together, with deterministic generators and reviewers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use tournament_engine::state::{
    ConceptDesign, EnrollmentRisk, FeasibilityEstimate, LaneOutcome, Swot,
};
use tournament_engine::{
    ConceptDraft, EngineConfig, EventBus, ExpertReviewer, GenerationContext, Idea,
    IdeaGenerator, IdeaStore, PromotionPolicy, ProviderError, RetryPolicy, ReviewVerdict,
    ReviewerSpec, SharedIdeaStore, Stage, TournamentController, TournamentEvent,
    TournamentRequest, TournamentSettings, TournamentStatus,
};

// ── Scripted providers ─────────────────────────────────────────────────────

fn draft(title: String) -> ConceptDraft {
    ConceptDraft {
        title,
        design: ConceptDesign {
            population: "Adults with type 2 diabetes and established CVD".to_string(),
            intervention: "Study drug 1mg SC weekly".to_string(),
            comparator: "Standard of care".to_string(),
            outcomes: vec!["Time to first MACE".to_string()],
            feasibility: FeasibilityEstimate {
                sample_size: 3000,
                duration_months: 36,
                site_count: 250,
                enrollment_risk: EnrollmentRisk::Medium,
            },
            swot: Swot::default(),
            rationale: "Cardiovascular outcomes support label expansion".to_string(),
        },
    }
}

/// Generator that checks the round barrier on every challenger request.
struct ScriptedGenerator {
    store: SharedIdeaStore,
    lane_count: u32,
    /// Lane and round whose request panics.
    panic_at: Option<(u32, u32)>,
    /// Challenger requests wait for this when set.
    gate: Option<CancellationToken>,
    /// Restricts the gate to one lane.
    gate_lane: Option<u32>,
    /// Lane and round whose requests always fail.
    fail_at: Option<(u32, u32)>,
    /// Lane and round whose first request fails with a retriable error.
    flaky_at: Option<(u32, u32)>,
    flaked: AtomicBool,
    violations: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(store: SharedIdeaStore, lane_count: u32) -> Self {
        Self {
            store,
            lane_count,
            panic_at: None,
            gate: None,
            gate_lane: None,
            fail_at: None,
            flaky_at: None,
            flaked: AtomicBool::new(false),
            violations: Mutex::new(Vec::new()),
        }
    }

    fn violations(&self) -> Vec<String> {
        self.violations.lock().unwrap().clone()
    }

    fn check_barrier(&self, ctx: &GenerationContext) {
        let mut violations = self.violations.lock().unwrap();
        let tournament = self.store.tournament(&ctx.tournament_id).unwrap();
        if tournament.current_round != ctx.round {
            violations.push(format!(
                "lane {} asked for round {} while currentRound is {}",
                ctx.lane, ctx.round, tournament.current_round
            ));
        }
        let previous = ctx.round - 1;
        for lane in 0..self.lane_count {
            let rounds = self.store.lane_rounds(&ctx.tournament_id, lane).unwrap();
            if !rounds.iter().any(|r| r.round == previous) {
                violations.push(format!(
                    "lane {} asked for round {} before lane {lane} resolved round {previous}",
                    ctx.lane, ctx.round
                ));
            }
        }
    }
}

#[async_trait]
impl IdeaGenerator for ScriptedGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> Result<ConceptDraft, ProviderError> {
        if !ctx.is_seed() {
            self.check_barrier(ctx);
            if let Some(gate) = &self.gate {
                if self.gate_lane.map_or(true, |lane| lane == ctx.lane) {
                    gate.cancelled().await;
                }
            }
        }
        let at = Some((ctx.lane, ctx.round));
        if self.panic_at == at {
            panic!("scripted generator panic in lane {} round {}", ctx.lane, ctx.round);
        }
        if self.fail_at == at {
            return Err(ProviderError::transient("generate", "model overloaded"));
        }
        if self.flaky_at == at && !self.flaked.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::transient("generate", "connection reset"));
        }
        // Stagger lanes so they finish rounds in different orders.
        let delay = u64::from((ctx.lane * 7 + ctx.round * 3) % 5);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        Ok(draft(format!(
            "Lane {} round {} variant {}",
            ctx.lane, ctx.round, ctx.variant
        )))
    }
}

type ScoreFn = dyn Fn(&Idea, &ReviewerSpec) -> Result<f64, ProviderError> + Send + Sync;

/// Reviewer whose score for each (idea, reviewer) pair is a closure.
struct ScriptedReviewer {
    score: Box<ScoreFn>,
}

impl ScriptedReviewer {
    fn new(
        score: impl Fn(&Idea, &ReviewerSpec) -> Result<f64, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            score: Box::new(score),
        }
    }
}

#[async_trait]
impl ExpertReviewer for ScriptedReviewer {
    async fn review(
        &self,
        idea: &Idea,
        reviewer: &ReviewerSpec,
    ) -> Result<ReviewVerdict, ProviderError> {
        let score = (self.score)(idea, reviewer)?;
        Ok(ReviewVerdict {
            score,
            strengths: vec![format!("{} likes {}", reviewer.id, idea.title)],
            weaknesses: vec![],
            additional_metrics: Default::default(),
        })
    }
}

fn reviewer_down(reviewer: &ReviewerSpec) -> ProviderError {
    ProviderError::permanent(format!("review:{}", reviewer.id), "reviewer unavailable")
}

// ── Harness ────────────────────────────────────────────────────────────────

fn engine_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_retries: 1,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2,
        },
        call_timeout_ms: 5_000,
        ..EngineConfig::default()
    }
}

fn request(lanes: u32, rounds: u32) -> TournamentRequest {
    TournamentRequest {
        drug_name: "Semaglutide".to_string(),
        indication: "Type 2 diabetes".to_string(),
        strategic_goals: vec![tournament_engine::state::StrategicGoal {
            goal: "Cardiovascular outcomes claim".to_string(),
            weight: 1.0,
        }],
        study_phase_preference: Default::default(),
        geography: ["us".to_string(), "eu".to_string()].into_iter().collect(),
        lane_count: lanes,
        max_rounds: rounds,
        settings: None,
    }
}

struct Harness {
    events: tournament_engine::SharedEventBus,
    generator: Arc<ScriptedGenerator>,
    controller: TournamentController,
}

fn harness(store: SharedIdeaStore, generator: ScriptedGenerator, reviewer: ScriptedReviewer) -> Harness {
    let events = EventBus::new().shared();
    let generator = Arc::new(generator);
    let controller = TournamentController::new(
        engine_config(),
        store,
        events.clone(),
        generator.clone(),
        Arc::new(reviewer),
    )
    .unwrap();
    Harness {
        events,
        generator,
        controller,
    }
}

fn champions(ideas: &[Idea], lane: u32) -> Vec<&Idea> {
    ideas
        .iter()
        .filter(|i| i.lane == lane && i.is_champion)
        .collect()
}

/// Champion score after each round `0..=through`, from the champion log.
fn champion_scores(store: &IdeaStore, tournament_id: &str, lane: u32, through: u32) -> Vec<f64> {
    (0..=through)
        .map(|round| {
            let id = store
                .champion_at(tournament_id, lane, round)
                .unwrap()
                .expect("champion after round 0");
            store.idea(&id).unwrap().overall_score().unwrap()
        })
        .collect()
}

fn assert_scores_consistent(ideas: &[Idea], settings: &TournamentSettings) {
    for idea in ideas {
        if let Some(scores) = idea.scores {
            assert!(
                scores.is_consistent_with(&settings.weights),
                "idea {} overall {} does not match its sub-scores",
                idea.id,
                scores.overall_score
            );
        }
    }
}

// ── Scenarios ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_all_lanes_succeed() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 3),
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64 * 0.5 + idea.lane as f64 * 0.1)),
    );

    let id = h.controller.create(request(3, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();

    assert_eq!(done.status, TournamentStatus::Completed);
    assert_eq!(done.current_round, 2);
    assert!(done.failure_reason.is_none());
    assert!(h.generator.violations().is_empty(), "{:?}", h.generator.violations());

    let ideas = h.controller.ideas(&id).unwrap();
    assert_eq!(ideas.len(), 9);
    for lane in 0..3 {
        let lane_champions = champions(&ideas, lane);
        assert_eq!(lane_champions.len(), 1, "lane {lane}");
        assert_eq!(lane_champions[0].round, 2);
        let change = lane_champions[0].score_change.unwrap();
        assert!((change - 0.5).abs() < 1e-9);
    }
    assert!(ideas.iter().filter(|i| i.round == 0).all(|i| i.score_change.is_none()));
    assert_scores_consistent(&ideas, &done.settings);

    let view = h.controller.status(&id).unwrap();
    assert_eq!(view.progress.percent, 100);
    assert_eq!(view.progress.stage, Stage::Completed);
    assert!(view
        .lanes
        .iter()
        .all(|l| l.last_outcome == Some(LaneOutcome::Promoted)));

    let seed = ideas.iter().find(|i| i.lane == 0 && i.round == 0).unwrap();
    let review = h.controller.review_for(&seed.id, "clinical").unwrap();
    assert_eq!(review.score, 2.0);
    assert!(h.controller.review_for(&seed.id, "nobody").is_err());
}

#[tokio::test]
async fn scenario_b_one_lane_degrades_others_proceed() {
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 3),
        ScriptedReviewer::new(|idea, reviewer| {
            if idea.lane == 1 && idea.round == 1 {
                Err(reviewer_down(reviewer))
            } else {
                Ok(2.0 + idea.round as f64 * 0.5)
            }
        }),
    );

    let id = h.controller.create(request(3, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);

    let rounds = store.lane_rounds(&id, 1).unwrap();
    let round_one = rounds.iter().find(|r| r.round == 1).unwrap();
    assert_eq!(round_one.outcome, LaneOutcome::Degraded);
    let seed_id = store.champion_at(&id, 1, 0).unwrap();
    assert_eq!(round_one.champion_id, seed_id);

    let history = h.controller.lane_history(&id, 1, Some(1)).unwrap();
    let unscored = history.iter().find(|i| i.round == 1).unwrap();
    assert!(unscored.scores.is_none());
    assert!(unscored.score_change.is_none());
    assert!(!unscored.is_champion);

    for lane in [0, 2] {
        let rounds = store.lane_rounds(&id, lane).unwrap();
        assert_eq!(
            rounds.iter().find(|r| r.round == 1).unwrap().outcome,
            LaneOutcome::Promoted
        );
    }
    // The degraded lane takes part in round 2 again.
    let round_two = rounds_of(&store, &id, 1, 2);
    assert_eq!(round_two, Some(LaneOutcome::Promoted));
}

fn rounds_of(store: &IdeaStore, id: &str, lane: u32, round: u32) -> Option<LaneOutcome> {
    store
        .lane_rounds(id, lane)
        .unwrap()
        .into_iter()
        .find(|r| r.round == round)
        .map(|r| r.outcome)
}

#[tokio::test]
async fn scenario_c_all_reviews_fail_tournament_fails() {
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 3),
        ScriptedReviewer::new(|idea, reviewer| {
            if idea.round >= 1 {
                Err(reviewer_down(reviewer))
            } else {
                Ok(3.0)
            }
        }),
    );

    let id = h.controller.create(request(3, 3)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();

    assert_eq!(done.status, TournamentStatus::Failed);
    assert_eq!(done.current_round, 1);
    assert!(done
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("all lanes degraded in round 1"));

    // Last consistent state stays readable.
    let ideas = h.controller.ideas(&id).unwrap();
    assert_eq!(ideas.len(), 6);
    for lane in 0..3 {
        let lane_champions = champions(&ideas, lane);
        assert_eq!(lane_champions.len(), 1);
        assert_eq!(lane_champions[0].round, 0);
    }
    let view = h.controller.status(&id).unwrap();
    assert_eq!(view.progress.stage, Stage::Failed);
}

#[tokio::test]
async fn scenario_d_higher_challenger_promotes_outright() {
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 1),
        ScriptedReviewer::new(|idea, _| Ok(if idea.round == 0 { 3.8 } else { 4.0 })),
    );
    let mut req = request(1, 1);
    req.settings = Some(TournamentSettings {
        promotion: PromotionPolicy { epsilon: 0.1 },
        ..TournamentSettings::default()
    });

    let id = h.controller.create(req).unwrap();
    h.controller.wait(&id).await.unwrap();

    assert_eq!(rounds_of(&store, &id, 0, 1), Some(LaneOutcome::Promoted));
    let champion = store.current_champion(&id, 0).unwrap();
    assert_eq!(champion.round, 1);
    assert!((champion.score_change.unwrap() - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn feasibility_tie_break_drops_score_by_at_most_epsilon() {
    let store = IdeaStore::in_memory().shared();
    // Seed: 4.0 / 4.0 / 4.0 / feasibility 3.2 → 3.8.
    // Challenger: 3.65 / 3.65 / 3.65 / feasibility 4.0 → 3.7375.
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 1),
        ScriptedReviewer::new(|idea, reviewer| {
            Ok(match (idea.round, reviewer.id.as_str()) {
                (0, "operations") => 3.2,
                (0, _) => 4.0,
                (_, "operations") => 4.0,
                (_, _) => 3.65,
            })
        }),
    );
    let mut req = request(1, 1);
    req.settings = Some(TournamentSettings {
        promotion: PromotionPolicy { epsilon: 0.1 },
        ..TournamentSettings::default()
    });

    let id = h.controller.create(req).unwrap();
    h.controller.wait(&id).await.unwrap();

    assert_eq!(rounds_of(&store, &id, 0, 1), Some(LaneOutcome::Promoted));
    let scores = champion_scores(&store, &id, 0, 1);
    assert!(scores[1] < scores[0]);
    assert!(scores[0] - scores[1] <= 0.1);
}

#[tokio::test]
async fn champion_scores_never_drop_beyond_epsilon() {
    let store = IdeaStore::in_memory().shared();
    // Scores wobble by round so lanes mix promotions and retentions.
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 3),
        ScriptedReviewer::new(|idea, reviewer| {
            let wobble = [0.0, 0.6, -0.4, 0.3, 0.02][idea.round as usize % 5];
            let base = if reviewer.id == "operations" { 3.0 } else { 2.5 };
            Ok(base + wobble + idea.lane as f64 * 0.05)
        }),
    );

    let id = h.controller.create(request(3, 4)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);

    let epsilon = done.settings.promotion.epsilon;
    for lane in 0..3 {
        let scores = champion_scores(&store, &id, lane, 4);
        for pair in scores.windows(2) {
            assert!(pair[1] >= pair[0] - epsilon, "lane {lane}: {scores:?}");
        }
        // Retained rounds keep every challenger as history.
        assert_eq!(h.controller.lane_history(&id, lane, None).unwrap().len(), 5);
    }
    assert_scores_consistent(&h.controller.ideas(&id).unwrap(), &done.settings);
}

#[tokio::test]
async fn round_barrier_holds_in_event_order() {
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 4),
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64 * 0.3)),
    );
    let mut rx = h.events.subscribe();

    let id = h.controller.create(request(4, 3)).unwrap();
    h.controller.wait(&id).await.unwrap();

    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(n)) => panic!("lagged by {n} events"),
        }
    }

    assert!(matches!(events.first(), Some(TournamentEvent::TournamentCreated { .. })));
    assert!(matches!(events.last(), Some(TournamentEvent::TournamentFinished { .. })));

    for round in 1..=3u32 {
        let started = events
            .iter()
            .position(|e| matches!(e, TournamentEvent::RoundStarted { round: r, .. } if *r == round))
            .unwrap();
        let completed = events
            .iter()
            .position(|e| matches!(e, TournamentEvent::RoundCompleted { round: r, .. } if *r == round))
            .unwrap();
        for (index, event) in events.iter().enumerate() {
            let in_round = match event {
                TournamentEvent::ChallengerStored { round: r, .. }
                | TournamentEvent::LaneDecided { round: r, .. } => *r == round,
                _ => false,
            };
            if in_round {
                assert!(started < index && index < completed, "{event:?} outside round {round}");
            }
        }
    }
    assert!(h.generator.violations().is_empty(), "{:?}", h.generator.violations());
}

#[tokio::test]
async fn early_stop_completes_after_stale_rounds() {
    let store = IdeaStore::in_memory().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 2),
        ScriptedReviewer::new(|_, _| Ok(3.0)),
    );
    let mut req = request(2, 5);
    let mut settings = TournamentSettings::default();
    settings.early_stop.enabled = true;
    settings.early_stop.stale_rounds = 2;
    req.settings = Some(settings);

    let id = h.controller.create(req).unwrap();
    let done = h.controller.wait(&id).await.unwrap();

    assert_eq!(done.status, TournamentStatus::Completed);
    assert_eq!(done.current_round, 2);
    assert_eq!(h.controller.ideas(&id).unwrap().len(), 6);
    assert_eq!(rounds_of(&store, &id, 0, 2), Some(LaneOutcome::Retained));
}

#[tokio::test]
async fn cancellation_mid_round_discards_challengers() {
    let store = IdeaStore::in_memory().shared();
    let gate = CancellationToken::new();
    let mut generator = ScriptedGenerator::new(store.clone(), 2);
    generator.gate = Some(gate.clone());
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64)),
    );
    let mut rx = h.events.subscribe();

    let id = h.controller.create(request(2, 3)).unwrap();
    loop {
        if let TournamentEvent::RoundStarted { round: 1, .. } = rx.recv().await.unwrap() {
            break;
        }
    }
    h.controller.cancel(&id).unwrap();
    gate.cancel();

    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Cancelled);
    assert_eq!(done.failure_reason.as_deref(), Some("cancelled after round 1"));
    // Only the seeds survive; round-1 results were discarded.
    let ideas = h.controller.ideas(&id).unwrap();
    assert_eq!(ideas.len(), 2);
    assert!(ideas.iter().all(|i| i.round == 0 && i.is_champion));
    assert_eq!(rounds_of(&store, &id, 0, 1), Some(LaneOutcome::Cancelled));

    assert!(h.controller.cancel(&id).is_err());
}

#[tokio::test]
async fn panicking_lane_is_terminated_and_others_finish() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let store = IdeaStore::in_memory().shared();
    let mut generator = ScriptedGenerator::new(store.clone(), 3);
    generator.panic_at = Some((1, 1));
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64 * 0.5)),
    );

    let id = h.controller.create(request(3, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);

    let lane_one = store.lane_rounds(&id, 1).unwrap();
    let terminated = lane_one.iter().find(|r| r.round == 1).unwrap();
    assert_eq!(terminated.outcome, LaneOutcome::Degraded);
    assert!(terminated.reason.as_deref().unwrap().contains("lane task failed"));
    assert!(lane_one.iter().all(|r| r.round < 2), "terminated lane ran again");

    assert_eq!(rounds_of(&store, &id, 0, 2), Some(LaneOutcome::Promoted));
    assert_eq!(rounds_of(&store, &id, 2, 2), Some(LaneOutcome::Promoted));
    let ideas = h.controller.ideas(&id).unwrap();
    assert_eq!(champions(&ideas, 1).len(), 1);
    assert_eq!(champions(&ideas, 1)[0].round, 0);
}

#[tokio::test]
async fn persisted_state_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concept-state.json");

    let store = IdeaStore::open(&path).unwrap().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 2),
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64 * 0.5)),
    );
    let id = h.controller.create(request(2, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();
    let before = store.snapshot(&id).unwrap();

    let reloaded = IdeaStore::open(&path).unwrap();
    assert_eq!(reloaded.tournament(&id).unwrap(), done);
    assert_eq!(reloaded.snapshot(&id).unwrap(), before);
    assert_eq!(
        reloaded.champion_at(&id, 0, 1).unwrap(),
        store.champion_at(&id, 0, 1).unwrap()
    );
    let seed = &before.ideas[0];
    assert_eq!(
        reloaded.reviews_for(&seed.id).unwrap(),
        store.reviews_for(&seed.id).unwrap()
    );
}

#[tokio::test]
async fn restart_marks_interrupted_tournaments_failed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concept-state.json");

    let tournament = request(2, 2).into_tournament(&engine_config()).unwrap();
    {
        let store = IdeaStore::open(&path).unwrap();
        store.create_tournament(tournament.clone()).unwrap();
        store
            .set_status(&tournament.id, TournamentStatus::Running, None)
            .unwrap();
        store.flush().unwrap();
    }

    let store = IdeaStore::open(&path).unwrap().shared();
    let h = harness(
        store.clone(),
        ScriptedGenerator::new(store.clone(), 2),
        ScriptedReviewer::new(|_, _| Ok(3.0)),
    );
    assert_eq!(h.controller.recover().unwrap(), vec![tournament.id.clone()]);

    let reloaded = IdeaStore::open(&path).unwrap();
    let failed = reloaded.tournament(&tournament.id).unwrap();
    assert_eq!(failed.status, TournamentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("interrupted by restart"));
}

#[tokio::test]
async fn polls_never_see_a_partly_committed_round() {
    let store = IdeaStore::in_memory().shared();
    let gate = CancellationToken::new();
    let lane_zero_reviewed = CancellationToken::new();
    let mut generator = ScriptedGenerator::new(store.clone(), 2);
    generator.gate = Some(gate.clone());
    generator.gate_lane = Some(1);
    let reviewed = lane_zero_reviewed.clone();
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(move |idea, _| {
            if idea.lane == 0 && idea.round == 1 {
                reviewed.cancel();
            }
            Ok(2.0 + idea.round as f64)
        }),
    );

    let id = h.controller.create(request(2, 1)).unwrap();

    // Watch every snapshot for lanes that disagree on the last round.
    let watcher = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let mut mixed = Vec::new();
            loop {
                let snapshot = store.snapshot(&id).unwrap();
                let rounds: Vec<Option<u32>> = snapshot.lanes.iter().map(|l| l.last_round).collect();
                if rounds.iter().all(Option::is_some) && rounds.windows(2).any(|w| w[0] != w[1]) {
                    mixed.push(rounds);
                }
                if snapshot.tournament.status.is_terminal() {
                    return mixed;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    // Lane 0 has finished round 1 while lane 1 is still waiting for its challenger.
    lane_zero_reviewed.cancelled().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = h.controller.status(&id).unwrap();
    assert_eq!(view.current_round, 1);
    assert!(
        view.lanes.iter().all(|l| l.last_round == Some(0)),
        "{:?}",
        view.lanes
    );
    let ideas = h.controller.ideas(&id).unwrap();
    assert!(ideas.iter().all(|i| i.round == 0));
    for lane in 0..2 {
        assert_eq!(champions(&ideas, lane)[0].round, 0, "lane {lane}");
    }

    gate.cancel();
    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);
    let ideas = h.controller.ideas(&id).unwrap();
    for lane in 0..2 {
        assert_eq!(champions(&ideas, lane)[0].round, 1, "lane {lane}");
    }

    let mixed = watcher.await.unwrap();
    assert!(mixed.is_empty(), "lanes seen on different rounds: {mixed:?}");
}

#[tokio::test]
async fn seed_generation_failure_fails_tournament() {
    let store = IdeaStore::in_memory().shared();
    let mut generator = ScriptedGenerator::new(store.clone(), 2);
    generator.fail_at = Some((1, 0));
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(|_, _| Ok(3.0)),
    );

    let id = h.controller.create(request(2, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();

    assert_eq!(done.status, TournamentStatus::Failed);
    assert_eq!(done.current_round, 0);
    let reason = done.failure_reason.as_deref().unwrap();
    assert!(reason.contains("lane 1 seeding failed"), "{reason}");
    assert!(store.ideas(&id).unwrap().iter().all(|i| i.lane != 1));
    assert_eq!(h.controller.status(&id).unwrap().progress.stage, Stage::Failed);
}

#[tokio::test]
async fn challenger_generation_failure_degrades_only_that_lane() {
    let store = IdeaStore::in_memory().shared();
    let mut generator = ScriptedGenerator::new(store.clone(), 3);
    generator.fail_at = Some((2, 1));
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64 * 0.5)),
    );

    let id = h.controller.create(request(3, 2)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);

    let rounds = store.lane_rounds(&id, 2).unwrap();
    let round_one = rounds.iter().find(|r| r.round == 1).unwrap();
    assert_eq!(round_one.outcome, LaneOutcome::Degraded);
    assert!(round_one.challenger_ids.is_empty());
    assert!(round_one.reason.as_deref().unwrap().contains("model overloaded"));
    assert_eq!(round_one.champion_id, store.champion_at(&id, 2, 0).unwrap());
    assert!(store
        .list_by_lane(&id, 2, 1)
        .unwrap()
        .iter()
        .all(|i| i.round != 1));

    for lane in [0, 1] {
        assert_eq!(rounds_of(&store, &id, lane, 1), Some(LaneOutcome::Promoted));
    }
    // The lane generates again in the next round.
    assert_eq!(rounds_of(&store, &id, 2, 2), Some(LaneOutcome::Promoted));
    assert!(h.generator.violations().is_empty(), "{:?}", h.generator.violations());
}

#[tokio::test]
async fn transient_generation_failure_recovers_on_retry() {
    let store = IdeaStore::in_memory().shared();
    let mut generator = ScriptedGenerator::new(store.clone(), 1);
    generator.flaky_at = Some((0, 1));
    let h = harness(
        store.clone(),
        generator,
        ScriptedReviewer::new(|idea, _| Ok(2.0 + idea.round as f64)),
    );

    let id = h.controller.create(request(1, 1)).unwrap();
    let done = h.controller.wait(&id).await.unwrap();

    assert_eq!(done.status, TournamentStatus::Completed);
    assert!(h.generator.flaked.load(Ordering::SeqCst));
    assert_eq!(rounds_of(&store, &id, 0, 1), Some(LaneOutcome::Promoted));
    assert_eq!(store.current_champion(&id, 0).unwrap().round, 1);
}
