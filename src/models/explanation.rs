// src/models/explanation.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A user's own explanation for a question, joined with the question it
/// belongs to.
#[derive(Debug, Serialize, FromRow)]
pub struct SavedExplanation {
    pub question_id: i64,
    pub question: String,
    pub question_type: String,
    pub options: Vec<String>,
    pub correct_options: Vec<i32>,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for saving (or overwriting) an explanation.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveExplanationRequest {
    #[validate(range(min = 1))]
    pub question_id: i64,
    #[validate(length(min = 1, max = 10000))]
    pub explanation: String,
}

/// DTO for editing an explanation that already exists.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateExplanationRequest {
    #[validate(length(min = 1, max = 10000))]
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_needs_text_and_question() {
        let ok = SaveExplanationRequest {
            question_id: 4,
            explanation: "Because".into(),
        };
        assert!(ok.validate().is_ok());

        let empty = SaveExplanationRequest {
            question_id: 4,
            explanation: String::new(),
        };
        assert!(empty.validate().is_err());

        let no_question = SaveExplanationRequest {
            question_id: 0,
            explanation: "Because".into(),
        };
        assert!(no_question.validate().is_err());
    }
}
