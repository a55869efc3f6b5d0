//! MCDA scoring: the four review dimensions, their weights, and the
//! [`ScoreCard`] that binds sub-scores to the derived overall score.
//!
//! A `ScoreCard` can only be built from sub-scores plus weights, so the
//! stored `overallScore` is never independent of the dimensions it came from.

pub mod aggregator;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use aggregator::ReviewAggregator;

/// Lower bound of the review scale.
pub const SCORE_SCALE_MIN: f64 = 0.0;
/// Upper bound of the review scale.
pub const SCORE_SCALE_MAX: f64 = 5.0;
/// Default score for a dimension nobody reviewed.
pub const DEFAULT_NEUTRAL_SCORE: f64 = 2.5;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const OVERALL_TOLERANCE: f64 = 1e-9;

/// A scoring dimension a reviewer can contribute to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    ScientificValidity,
    ClinicalImpact,
    CommercialValue,
    Feasibility,
}

impl Dimension {
    pub fn all() -> &'static [Dimension] {
        &[
            Self::ScientificValidity,
            Self::ClinicalImpact,
            Self::CommercialValue,
            Self::Feasibility,
        ]
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScientificValidity => write!(f, "scientific_validity"),
            Self::ClinicalImpact => write!(f, "clinical_impact"),
            Self::CommercialValue => write!(f, "commercial_value"),
            Self::Feasibility => write!(f, "feasibility"),
        }
    }
}

/// One value per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    pub scientific_validity: f64,
    pub clinical_impact: f64,
    pub commercial_value: f64,
    pub feasibility: f64,
}

impl DimensionScores {
    pub fn uniform(value: f64) -> Self {
        Self {
            scientific_validity: value,
            clinical_impact: value,
            commercial_value: value,
            feasibility: value,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::ScientificValidity => self.scientific_validity,
            Dimension::ClinicalImpact => self.clinical_impact,
            Dimension::CommercialValue => self.commercial_value,
            Dimension::Feasibility => self.feasibility,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::ScientificValidity => self.scientific_validity = value,
            Dimension::ClinicalImpact => self.clinical_impact = value,
            Dimension::CommercialValue => self.commercial_value = value,
            Dimension::Feasibility => self.feasibility = value,
        }
    }
}

/// Relative weight of each dimension in the overall score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreWeights {
    #[serde(alias = "scientific_validity")]
    pub scientific_validity: f64,
    #[serde(alias = "clinical_impact")]
    pub clinical_impact: f64,
    #[serde(alias = "commercial_value")]
    pub commercial_value: f64,
    pub feasibility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            scientific_validity: 0.25,
            clinical_impact: 0.25,
            commercial_value: 0.25,
            feasibility: 0.25,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::ScientificValidity => self.scientific_validity,
            Dimension::ClinicalImpact => self.clinical_impact,
            Dimension::CommercialValue => self.commercial_value,
            Dimension::Feasibility => self.feasibility,
        }
    }

    /// Check that every weight is finite, non-negative, and that they sum to 1.
    pub fn validate(&self) -> Result<(), String> {
        let mut sum = 0.0;
        for dimension in Dimension::all() {
            let weight = self.get(*dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("weight for {dimension} must be a non-negative number"));
            }
            sum += weight;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("score weights must sum to 1.0 (got {sum:.4})"));
        }
        Ok(())
    }

    /// Weighted sum of the four sub-scores, always evaluated in dimension order.
    pub fn overall(&self, scores: &DimensionScores) -> f64 {
        Dimension::all()
            .iter()
            .map(|d| self.get(*d) * scores.get(*d))
            .sum()
    }
}

/// Sub-scores of one candidate plus the overall score derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    #[serde(flatten)]
    pub dimensions: DimensionScores,
    pub overall_score: f64,
}

impl ScoreCard {
    pub fn from_dimensions(dimensions: DimensionScores, weights: &ScoreWeights) -> Self {
        Self {
            overall_score: weights.overall(&dimensions),
            dimensions,
        }
    }

    pub fn feasibility(&self) -> f64 {
        self.dimensions.feasibility
    }

    /// Whether the stored overall score is what `weights` produce.
    pub fn is_consistent_with(&self, weights: &ScoreWeights) -> bool {
        (weights.overall(&self.dimensions) - self.overall_score).abs() <= OVERALL_TOLERANCE
    }
}
