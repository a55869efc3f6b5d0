//! External capabilities the engine depends on.
//!
//! Both providers are black boxes that may be slow, rate limited or fail.
//! Callers wrap every call in [`crate::retry::call_with_retry`]; implementors
//! only classify their failures through [`ProviderError`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ReviewerSpec;
use crate::error::ProviderError;
use crate::state::{
    ConceptDraft, Idea, ReviewVerdict, StrategicGoal, StudyPhase, Tournament, TournamentId,
};

/// Everything an idea generator sees for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub tournament_id: TournamentId,
    pub drug_name: String,
    pub indication: String,
    pub strategic_goals: Vec<StrategicGoal>,
    pub geography: Vec<String>,
    pub study_phase: StudyPhase,
    /// Current champion to improve on; absent when seeding.
    pub seed_idea: Option<Idea>,
    pub round: u32,
    pub lane: u32,
    /// Position of this request within the round's fan-out.
    pub variant: u32,
}

impl GenerationContext {
    /// Context for a lane's round-0 idea: static tournament context only.
    pub fn seed(tournament: &Tournament, lane: u32) -> Self {
        Self {
            tournament_id: tournament.id.clone(),
            drug_name: tournament.drug_name.clone(),
            indication: tournament.indication.clone(),
            strategic_goals: tournament.strategic_goals.clone(),
            geography: tournament.geography.iter().cloned().collect(),
            study_phase: tournament.study_phase_preference,
            seed_idea: None,
            round: 0,
            lane,
            variant: 0,
        }
    }

    /// Context for a challenger to `champion` in `round`.
    pub fn challenger(
        tournament: &Tournament,
        lane: u32,
        round: u32,
        champion: &Idea,
        variant: u32,
    ) -> Self {
        Self {
            seed_idea: Some(champion.clone()),
            round,
            variant,
            ..Self::seed(tournament, lane)
        }
    }

    pub fn is_seed(&self) -> bool {
        self.seed_idea.is_none()
    }
}

/// Produces candidate study concepts.
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    /// Generate one concept draft for `context`.
    async fn generate(&self, context: &GenerationContext) -> Result<ConceptDraft, ProviderError>;
}

/// Scores a concept from one reviewer's perspective.
#[async_trait]
pub trait ExpertReviewer: Send + Sync {
    /// Review `idea` as `reviewer`.
    async fn review(
        &self,
        idea: &Idea,
        reviewer: &ReviewerSpec,
    ) -> Result<ReviewVerdict, ProviderError>;
}

pub type SharedGenerator = Arc<dyn IdeaGenerator>;
pub type SharedReviewer = Arc<dyn ExpertReviewer>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, TournamentRequest};
    use crate::state::types::fixtures::draft;

    #[test]
    fn challenger_context_carries_champion_and_round() {
        let tournament = TournamentRequest {
            drug_name: "Ixekizumab".into(),
            indication: "Psoriatic arthritis".into(),
            strategic_goals: vec![StrategicGoal {
                goal: "First-line positioning".into(),
                weight: 0.7,
            }],
            study_phase_preference: StudyPhase::Phase2,
            geography: ["jp".to_string()].into_iter().collect(),
            lane_count: 2,
            max_rounds: 3,
            settings: None,
        }
        .into_tournament(&EngineConfig::default())
        .unwrap();

        let seed = GenerationContext::seed(&tournament, 1);
        assert!(seed.is_seed());
        assert_eq!(seed.round, 0);
        assert_eq!(seed.geography, vec!["JP".to_string()]);

        let champion = Idea::new(&tournament.id, 1, 0, draft("Seed concept"));
        let ctx = GenerationContext::challenger(&tournament, 1, 2, &champion, 1);
        assert!(!ctx.is_seed());
        assert_eq!((ctx.lane, ctx.round, ctx.variant), (1, 2, 1));
        assert_eq!(ctx.study_phase, StudyPhase::Phase2);
    }
}
