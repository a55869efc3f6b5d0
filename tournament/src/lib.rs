//! Study-concept tournament engine
//!
//! Runs several independent lanes of generate → review → compare over a
//! fixed number of synchronized rounds and keeps every idea it ever saw.
//!
//! # Pieces
//!
//! - [`state::IdeaStore`]: append-only ideas, per-lane champions with
//!   compare-and-swap promotion, whole-round commits, JSON snapshot on disk
//! - [`scoring::ReviewAggregator`]: reviewer verdicts → MCDA [`scoring::ScoreCard`]
//! - [`lane::LaneRunner`]: one lane's state machine for a round
//! - [`round::RoundCoordinator`]: seeding and the round barrier
//! - [`controller::TournamentController`]: lifecycle, cancellation, polling reads
//! - [`events::EventBus`]: broadcast of what lanes and rounds did
//!
//! Idea generation and expert review are external; implement
//! [`providers::IdeaGenerator`] and [`providers::ExpertReviewer`].
//!
//! # Usage
//!
//! ```ignore
//! let controller = TournamentController::new(config, store, events, generator, reviewer)?
//!     .shared();
//! let id = controller.create(request)?;
//! let view = controller.status(&id)?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod lane;
pub mod progress;
pub mod providers;
pub mod retry;
pub mod round;
pub mod scoring;
pub mod state;

// Re-export key engine types
pub use config::{
    EarlyStopPolicy, EngineConfig, EngineLimits, PromotionPolicy, ReviewerSpec, TournamentRequest,
    TournamentSettings,
};
pub use controller::{SharedTournamentController, TournamentController, TournamentStatusView};
pub use error::{ProviderError, ProviderErrorKind, TournamentError, TournamentResult};
pub use progress::{Progress, Stage};
pub use providers::{ExpertReviewer, GenerationContext, IdeaGenerator};
pub use retry::RetryPolicy;
pub use round::{RoundCoordinator, TournamentOutcome};

// Re-export key state types
pub use state::{
    ConceptDesign, ConceptDraft, Idea, IdeaStore, LaneOutcome, Review, ReviewVerdict,
    SharedIdeaStore, Tournament, TournamentId, TournamentStatus,
};

// Re-export key scoring types
pub use scoring::{Dimension, DimensionScores, ReviewAggregator, ScoreCard, ScoreWeights};

// Re-export key event types
pub use events::{EventBus, EventFilter, SharedEventBus, TournamentEvent};
