// src/services/scoring.rs

use std::collections::BTreeSet;

use crate::{error::AppError, models::question::QuestionType};

/// Scores one answered question.
///
/// * `m-choice`: full mark iff exactly one option is selected and it is the
///   single correct option.
/// * `m-select`: zero if anything outside the correct set is selected,
///   otherwise `total_mark * |selected| / |correct|` (recall-weighted credit).
/// * `numeric`: never scored.
///
/// Selected options are treated as a set, and an empty selection scores 0
/// for every type. An `m-choice` question whose frozen answer key does not
/// hold exactly one option is a data-integrity violation and is reported as
/// an error instead of being scored.
pub fn score(
    question_type: QuestionType,
    correct: &[i32],
    selected: &[i32],
    total_mark: f64,
) -> Result<f64, AppError> {
    let selected: BTreeSet<i32> = selected.iter().copied().collect();
    let correct_set: BTreeSet<i32> = correct.iter().copied().collect();

    if question_type == QuestionType::MultipleChoice && correct_set.len() != 1 {
        return Err(AppError::InternalServerError(format!(
            "m-choice question has {} correct options",
            correct_set.len()
        )));
    }

    if selected.is_empty() {
        return Ok(0.0);
    }

    let scored = match question_type {
        QuestionType::MultipleChoice => {
            if selected == correct_set {
                total_mark
            } else {
                0.0
            }
        }
        QuestionType::MultipleSelect => {
            if !selected.is_subset(&correct_set) {
                0.0
            } else {
                total_mark * (selected.len() as f64 / correct_set.len() as f64)
            }
        }
        QuestionType::Numeric => 0.0,
    };

    // Float products can overshoot by an ulp.
    Ok(scored.min(total_mark))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m_choice_full_or_nothing() {
        let t = QuestionType::MultipleChoice;
        assert_eq!(score(t, &[2], &[2], 1.0).unwrap(), 1.0);
        assert_eq!(score(t, &[2], &[1], 1.0).unwrap(), 0.0);
        assert_eq!(score(t, &[2], &[2, 1], 1.0).unwrap(), 0.0);
        assert_eq!(score(t, &[2], &[2, 2], 3.0).unwrap(), 3.0);
    }

    #[test]
    fn test_m_choice_with_ambiguous_key_is_flagged() {
        let err = score(QuestionType::MultipleChoice, &[0, 1], &[0], 1.0).unwrap_err();
        assert!(matches!(err, AppError::InternalServerError(_)));
    }

    #[test]
    fn test_m_select_partial_credit_by_recall() {
        let t = QuestionType::MultipleSelect;
        assert_eq!(score(t, &[0, 1], &[0], 2.0).unwrap(), 1.0);
        assert_eq!(score(t, &[0, 1], &[0, 1], 2.0).unwrap(), 2.0);
        assert_eq!(score(t, &[0, 1, 2, 3], &[1, 3, 0], 4.0).unwrap(), 3.0);
    }

    #[test]
    fn test_m_select_wrong_inclusion_zeroes() {
        let t = QuestionType::MultipleSelect;
        assert_eq!(score(t, &[0, 1], &[0, 2], 2.0).unwrap(), 0.0);
        assert_eq!(score(t, &[0, 1], &[0, 1, 2], 2.0).unwrap(), 0.0);
    }

    #[test]
    fn test_m_select_monotonic_toward_full_set() {
        let correct = [0, 1, 2, 3, 4];
        let mut previous = 0.0;
        for k in 0..=correct.len() {
            let s = score(QuestionType::MultipleSelect, &correct, &correct[..k], 1.0).unwrap();
            assert!(s >= previous);
            assert!(s <= 1.0);
            previous = s;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_empty_selection_scores_zero() {
        assert_eq!(score(QuestionType::MultipleChoice, &[0], &[], 1.0).unwrap(), 0.0);
        assert_eq!(score(QuestionType::MultipleSelect, &[0, 1], &[], 1.0).unwrap(), 0.0);
        assert_eq!(score(QuestionType::Numeric, &[0], &[], 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_numeric_is_never_scored() {
        assert_eq!(score(QuestionType::Numeric, &[3], &[3], 5.0).unwrap(), 0.0);
    }
}
