//! Influence-weighted link scoring with optional time decay.
//!
//! Pure functions: deterministic given the same weights and clock value,
//! no side effects. The explanation trail records every step so a ranked
//! link can always say why it scored what it did.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use emberline_common::minutes_since;

/// One sharer's contribution to a link's score.
pub fn weight_contribution(weight: f64) -> f64 {
    (weight * 10.0 + 1.0).ln()
}

/// Score a link from its distinct sharers and the time since its first
/// contributing post.
///
/// Sharers missing from `weights` are no longer tracked in the universe:
/// they contribute 0 but still get an explanation line. With zero sharers
/// the result is `(0.0, [])` and decay is skipped entirely, so a zero
/// original score never turns into a division.
///
/// Decay multiplies the summed score by `(1 - 1/window_hours)` once per
/// whole elapsed hour, applied iteratively so rounding accumulates the
/// same way it always has. `first_shared` of `None` (no surviving posts)
/// also skips decay.
pub fn score_link(
    sharer_ids: &[String],
    weights: &HashMap<String, f64>,
    first_shared: Option<DateTime<Utc>>,
    decay: bool,
    window_hours: u32,
    now: DateTime<Utc>,
) -> (f64, Vec<String>) {
    let mut score = 0.0_f64;
    let mut explanation = Vec::new();

    for id in sharer_ids {
        let weight = weights.get(id).copied().unwrap_or(0.0);
        let contribution = weight_contribution(weight);
        score += contribution;
        explanation.push(format!(
            "sharer {id} with weight {weight:.2} raises score {contribution:.2} to {score:.2}"
        ));
    }

    if explanation.is_empty() {
        return (0.0, explanation);
    }

    // window_hours of 0 would make the factor negative; treat as no decay.
    if decay && window_hours >= 1 {
        if let Some(first) = first_shared {
            let decay_factor = 1.0 - 1.0 / f64::from(window_hours);
            let minutes = minutes_since(first, now);
            let hours = minutes / 60;

            let original = score;
            let velocity = score / (minutes as f64 + 1.0);
            for _ in 0..hours {
                score *= decay_factor;
            }

            let of_original = if original != 0.0 {
                score / original
            } else {
                score
            };
            explanation.push(format!(
                "decay for {hours} hours drops score to {score:.2} ({of_original:.2} of original). \
                 Velocity of {velocity:.2}"
            ));
        }
    }

    (score, explanation)
}
