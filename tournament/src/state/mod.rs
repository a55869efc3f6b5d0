//! State for running tournaments.
//!
//! The [`IdeaStore`] keeps:
//! - tournament records (status, current round, frozen settings)
//! - every idea ever produced, append-only, indexed per lane in round order
//! - the per-lane champion log behind historical champion queries
//! - per-lane round outcomes and the retained reviews
//!
//! # Usage
//!
//! ```ignore
//! use tournament_engine::state::IdeaStore;
//!
//! let store = IdeaStore::open("./concept-state.json")?.shared();
//! store.create_tournament(tournament)?;
//! let seed_id = store.append(seed)?;
//! store.promote(&tournament_id, 0, None, &seed_id)?;
//! store.flush()?;
//! ```

pub mod store;
pub mod types;

pub use store::{
    IdeaStore, LaneCommit, LaneSummary, Promotion, SharedIdeaStore, TournamentSnapshot,
};
pub use types::{
    ChampionChange, ConceptDesign, ConceptDraft, EnrollmentRisk, FeasibilityEstimate, Idea,
    IdeaId, LaneOutcome, LaneRoundRecord, Review, ReviewVerdict, ReviewerId, StrategicGoal,
    StudyPhase, Swot, Tournament, TournamentId, TournamentStatus,
};
