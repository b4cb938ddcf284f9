// src/services/stats.rs

use serde::Serialize;
use sqlx::PgConnection;

use crate::error::AppError;

/// Descriptive statistics over every finished attempt on a question set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionSetStats {
    pub attempts: usize,
    pub average_score: f64,
    pub top_score: f64,
    /// All finished scores, ascending, for percentile display.
    pub scores: Vec<f64>,
}

impl QuestionSetStats {
    pub fn from_scores(mut scores: Vec<f64>) -> Self {
        scores.sort_by(|a, b| a.total_cmp(b));
        let attempts = scores.len();
        let average_score = if attempts == 0 {
            0.0
        } else {
            scores.iter().sum::<f64>() / attempts as f64
        };
        let top_score = scores.last().copied().unwrap_or(0.0);
        Self {
            attempts,
            average_score,
            top_score,
            scores,
        }
    }

    /// `1 + number of attempts that scored strictly higher`.
    pub fn rank_of(&self, score: f64) -> i32 {
        1 + self.scores.iter().filter(|s| **s > score).count() as i32
    }

    /// Percentage of attempts that scored strictly lower.
    pub fn percentile_of(&self, score: f64) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        let below = self.scores.iter().filter(|s| **s < score).count();
        below as f64 * 100.0 / self.attempts as f64
    }
}

/// Loads the scores of all finished sessions on a question set.
pub async fn finished_scores(
    conn: &mut PgConnection,
    question_set_id: i64,
) -> Result<Vec<f64>, AppError> {
    let scores = sqlx::query_scalar::<_, f64>(
        r#"
        SELECT scored_marks
        FROM test_sessions
        WHERE question_set_id = $1 AND finished = TRUE
        ORDER BY scored_marks ASC
        "#,
    )
    .bind(question_set_id)
    .fetch_all(conn)
    .await?;

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_over_scores() {
        let stats = QuestionSetStats::from_scores(vec![3.0, 1.0, 2.0]);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.average_score, 2.0);
        assert_eq!(stats.top_score, 3.0);
        assert_eq!(stats.scores, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_stats() {
        let stats = QuestionSetStats::from_scores(vec![]);
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.average_score, 0.0);
        assert_eq!(stats.percentile_of(5.0), 0.0);
    }

    #[test]
    fn test_highest_score_ranks_first() {
        let stats = QuestionSetStats::from_scores(vec![4.0, 9.5, 7.0, 1.0]);
        assert_eq!(stats.rank_of(9.5), 1);
        assert_eq!(stats.rank_of(7.0), 2);
        assert_eq!(stats.rank_of(1.0), 4);
    }

    #[test]
    fn test_ties_share_rank() {
        let stats = QuestionSetStats::from_scores(vec![5.0, 5.0, 3.0]);
        assert_eq!(stats.rank_of(5.0), 1);
        assert_eq!(stats.rank_of(3.0), 3);
    }

    #[test]
    fn test_percentile_counts_strictly_lower() {
        let stats = QuestionSetStats::from_scores(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.percentile_of(4.0), 75.0);
        assert_eq!(stats.percentile_of(1.0), 0.0);
    }
}
