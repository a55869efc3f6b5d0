//! Review aggregation: per-reviewer scores → one deterministic [`ScoreCard`].
//!
//! Each dimension is the mean of every review tagged for it. A dimension with
//! no contributing reviews falls back to the neutral midpoint, so a missing
//! reviewer never blocks a decision. Contributions are summed in a canonical
//! order, which makes the result independent of the order reviews arrived in.

use tracing::debug;

use crate::state::Review;

use super::{
    Dimension, DimensionScores, ScoreCard, ScoreWeights, DEFAULT_NEUTRAL_SCORE, SCORE_SCALE_MAX,
    SCORE_SCALE_MIN,
};

/// Combines independent reviews into a composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewAggregator {
    weights: ScoreWeights,
    neutral_score: f64,
}

impl Default for ReviewAggregator {
    fn default() -> Self {
        Self::new(ScoreWeights::default(), DEFAULT_NEUTRAL_SCORE)
    }
}

impl ReviewAggregator {
    pub fn new(weights: ScoreWeights, neutral_score: f64) -> Self {
        Self {
            weights,
            neutral_score: neutral_score.clamp(SCORE_SCALE_MIN, SCORE_SCALE_MAX),
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Score card with every dimension at the neutral midpoint.
    pub fn neutral(&self) -> ScoreCard {
        ScoreCard::from_dimensions(DimensionScores::uniform(self.neutral_score), &self.weights)
    }

    pub fn aggregate(&self, reviews: &[Review]) -> ScoreCard {
        let mut dimensions = DimensionScores::uniform(self.neutral_score);

        for dimension in Dimension::all() {
            let mut contributions: Vec<(&str, f64)> = reviews
                .iter()
                .filter(|r| r.score.is_finite())
                .filter(|r| r.dimensions.contains(dimension))
                .map(|r| {
                    (
                        r.reviewer_id.as_str(),
                        r.score.clamp(SCORE_SCALE_MIN, SCORE_SCALE_MAX),
                    )
                })
                .collect();

            if contributions.is_empty() {
                debug!(%dimension, neutral = self.neutral_score, "no reviews for dimension");
                continue;
            }

            contributions.sort_by(|a, b| a.0.cmp(b.0).then(a.1.total_cmp(&b.1)));
            let sum: f64 = contributions.iter().map(|(_, s)| s).sum();
            dimensions.set(*dimension, sum / contributions.len() as f64);
        }

        ScoreCard::from_dimensions(dimensions, &self.weights)
    }
}
