use super::engine::{AssessmentScores, RecognitionResult};
use crate::model::FeedbackScores;

/// Fold one recording pass into a feedback record.
///
/// Only the top-ranked alternative of the last result counts. Returns
/// `None` when there are no results or that alternative lacks any of the
/// four scores; a record is never partial.
pub fn reduce_feedback(results: &[RecognitionResult]) -> Option<FeedbackScores> {
    let best = results.last()?.alternatives.first()?;
    let AssessmentScores {
        accuracy,
        fluency,
        completeness,
        pronunciation,
    } = best.scores?;

    Some(FeedbackScores {
        pronunciation_score: bounded(pronunciation?)?,
        accuracy_score: bounded(accuracy?)?,
        fluency_score: bounded(fluency?)?,
        completeness_score: bounded(completeness?)?,
    })
}

fn bounded(score: f64) -> Option<f64> {
    if score.is_nan() {
        None
    } else {
        Some(score.clamp(0.0, 100.0))
    }
}
