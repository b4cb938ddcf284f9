// src/models/question_set.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

use crate::error::AppError;

/// Represents the 'question_sets' table joined with creator and counts.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionSet {
    pub id: i64,
    pub name: String,
    /// 'practice', 'exam' or 'timed'.
    pub mode: String,
    pub subject: String,
    pub exam: Option<String>,
    pub language: String,
    /// Minutes.
    pub time_duration: Option<i32>,
    pub description: Option<String>,
    pub associated_resource: Option<String>,
    pub cover_image: Option<String>,
    pub created_by_id: i64,
    pub created_by_name: String,
    pub total_questions: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const QUESTION_SET_SELECT: &str = r#"
    SELECT
        qs.id, qs.name, qs.mode, qs.subject, qs.exam, qs.language,
        qs.time_duration, qs.description, qs.associated_resource, qs.cover_image,
        qs.created_by_id, u.name AS created_by_name,
        (SELECT COUNT(*) FROM question_set_questions qq WHERE qq.question_set_id = qs.id) AS total_questions,
        ARRAY(
            SELECT t.name FROM question_set_tags qst
            JOIN tags t ON t.id = qst.tag_id
            WHERE qst.question_set_id = qs.id
            ORDER BY t.name
        ) AS tags,
        qs.created_at, qs.updated_at
    FROM question_sets qs
    JOIN users u ON qs.created_by_id = u.id
"#;

/// One question of a set with its mark weight, in set order.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionSetEntry {
    pub question_id: i64,
    pub mark: f64,
    pub position: i32,
}

/// Full detail view for a single question set.
#[derive(Debug, Serialize)]
pub struct QuestionSetDetail {
    #[serde(flatten)]
    pub set: QuestionSet,
    pub questions: Vec<QuestionSetEntry>,
    pub test_sessions_taken: i64,
}

/// DTO for creating or fully replacing a question set.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionSetRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(custom(function = validate_set_mode))]
    pub mode: String,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(max = 255))]
    pub exam: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub language: String,
    #[validate(range(min = 1, max = 1440))]
    pub time_duration: Option<i32>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 2000))]
    pub associated_resource: Option<String>,
    #[validate(custom(function = validate_url))]
    pub cover_image: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub question_ids: Vec<i64>,
    /// Per-question marks; used only when the length matches `question_ids`.
    pub marks: Option<Vec<f64>>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
}

impl QuestionSetRequest {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        let mut seen = std::collections::HashSet::new();
        if !self.question_ids.iter().all(|id| seen.insert(*id)) {
            return Err(AppError::BadRequest(
                "Question ids must not repeat".to_string(),
            ));
        }
        let bad_mark = self
            .marks
            .as_ref()
            .is_some_and(|marks| marks.iter().any(|m| !m.is_finite() || *m <= 0.0));
        if bad_mark {
            return Err(AppError::BadRequest("Marks must be positive".to_string()));
        }
        Ok(())
    }

    /// `(question_id, mark, position)` triples in request order.
    pub fn weighted_questions(&self) -> Vec<(i64, f64, i32)> {
        let marks = self
            .marks
            .as_ref()
            .filter(|m| m.len() == self.question_ids.len());
        self.question_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mark = marks.map(|m| m[i]).unwrap_or(1.0);
                (*id, mark, i as i32)
            })
            .collect()
    }
}

fn validate_set_mode(mode: &str) -> Result<(), validator::ValidationError> {
    match mode {
        "practice" | "exam" | "timed" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_mode")),
    }
}

fn validate_url(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// Query parameters for listing question sets.
#[derive(Debug, Deserialize)]
pub struct QuestionSetListParams {
    pub subject: Option<String>,
    pub exam: Option<String>,
    pub language: Option<String>,
    /// Comma separated; a set must carry all of them.
    pub tags: Option<String>,
    pub search: Option<String>,
    pub created_by: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionSetPage {
    pub data: Vec<QuestionSet>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(marks: Option<Vec<f64>>) -> QuestionSetRequest {
        QuestionSetRequest {
            name: "Algebra I".into(),
            mode: "practice".into(),
            subject: "math".into(),
            exam: None,
            language: "en".into(),
            time_duration: None,
            description: None,
            associated_resource: None,
            cover_image: None,
            question_ids: vec![10, 11, 12],
            marks,
            tags: vec![],
        }
    }

    #[test]
    fn test_marks_apply_only_when_lengths_match() {
        let weighted = request(Some(vec![1.0, 2.0, 3.0])).weighted_questions();
        assert_eq!(weighted, vec![(10, 1.0, 0), (11, 2.0, 1), (12, 3.0, 2)]);

        let defaulted = request(Some(vec![5.0])).weighted_questions();
        assert!(defaulted.iter().all(|(_, mark, _)| *mark == 1.0));
    }

    #[test]
    fn test_duplicate_question_ids_rejected() {
        let mut req = request(None);
        req.question_ids = vec![1, 1];
        assert!(matches!(req.check(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_invalid_mode_and_cover_rejected() {
        let mut req = request(None);
        req.mode = "speedrun".into();
        assert!(req.check().is_err());

        let mut req = request(None);
        req.cover_image = Some("not a url".into());
        assert!(req.check().is_err());
    }

    #[test]
    fn test_pagination_rounds_up() {
        let p = Pagination::new(1, 10, 21);
        assert_eq!(p.total_pages, 3);
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
    }
}
