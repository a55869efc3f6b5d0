//! Champion-vs-challenger decision.

use crate::config::PromotionPolicy;
use crate::scoring::ScoreCard;
use crate::state::Idea;

/// Whether `challenger` should replace `champion`.
///
/// A strictly higher overall score promotes. Inside the epsilon band (at or
/// below the champion's score) the challenger still wins if it is strictly
/// more feasible.
pub fn should_promote(
    champion: &ScoreCard,
    challenger: &ScoreCard,
    policy: &PromotionPolicy,
) -> bool {
    let diff = challenger.overall_score - champion.overall_score;
    if diff > 0.0 {
        return true;
    }
    diff.abs() <= policy.epsilon && challenger.feasibility() > champion.feasibility()
}

/// Best scored challenger: highest overall, then highest feasibility, then
/// the earliest in `challengers`. Unscored challengers never win.
pub fn select_best(challengers: &[Idea]) -> Option<&Idea> {
    challengers
        .iter()
        .filter_map(|idea| idea.scores.map(|s| (idea, s)))
        .fold(None::<(&Idea, ScoreCard)>, |best, (idea, scores)| match best {
            Some((_, best_scores))
                if scores.overall_score < best_scores.overall_score
                    || (scores.overall_score == best_scores.overall_score
                        && scores.feasibility() <= best_scores.feasibility()) =>
            {
                best
            }
            _ => Some((idea, scores)),
        })
        .map(|(idea, _)| idea)
}

/// Outcome of comparing a round's challengers with the champion.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Replace the champion with this challenger.
    Promote { challenger_id: String, score_change: f64 },
    /// Keep the champion; `best` is the strongest scored challenger, if any.
    Retain { best_id: Option<String> },
}

/// Decide the round for `champion` against the already-scored `challengers`.
pub fn decide(champion: &Idea, challengers: &[Idea], policy: &PromotionPolicy) -> Decision {
    let Some(best) = select_best(challengers) else {
        return Decision::Retain { best_id: None };
    };
    let Some(best_scores) = best.scores else {
        return Decision::Retain { best_id: None };
    };
    let promote = match champion.scores {
        Some(champion_scores) => should_promote(&champion_scores, &best_scores, policy),
        None => true,
    };
    if promote {
        Decision::Promote {
            challenger_id: best.id.clone(),
            score_change: score_change(champion, best).unwrap_or(best_scores.overall_score),
        }
    } else {
        Decision::Retain {
            best_id: Some(best.id.clone()),
        }
    }
}

/// `challenger.overall - champion.overall`, when both are scored.
pub fn score_change(champion: &Idea, challenger: &Idea) -> Option<f64> {
    Some(challenger.overall_score()? - champion.overall_score()?)
}
