// src/models/question.rs

use std::{collections::BTreeSet, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::error::AppError;

/// How a question is answered and scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    /// Exactly one correct option.
    #[serde(rename = "m-choice")]
    MultipleChoice,
    /// One or more correct options, partial credit by recall.
    #[serde(rename = "m-select")]
    MultipleSelect,
    #[serde(rename = "numeric")]
    Numeric,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "m-choice",
            QuestionType::MultipleSelect => "m-select",
            QuestionType::Numeric => "numeric",
        }
    }
}

impl FromStr for QuestionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "m-choice" => Ok(QuestionType::MultipleChoice),
            "m-select" => Ok(QuestionType::MultipleSelect),
            "numeric" => Ok(QuestionType::Numeric),
            other => Err(AppError::InternalServerError(format!(
                "Unknown question type '{}' in database",
                other
            ))),
        }
    }
}

/// Represents the 'questions' table joined with its tag names.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The prompt shown to the test taker (sanitised HTML).
    pub question: String,

    pub subject: String,
    pub exam: Option<String>,
    pub language: String,
    pub difficulty: i32,

    /// 'm-choice', 'm-select' or 'numeric'.
    pub question_type: String,

    pub options: Vec<String>,

    /// Zero-based indexes into `options`.
    pub correct_options: Vec<i32>,

    pub explanation: Option<String>,

    pub tags: Vec<String>,

    pub created_by_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Select list producing a [`Question`] from `questions q`.
pub const QUESTION_SELECT: &str = r#"
    SELECT
        q.id, q.question, q.subject, q.exam, q.language, q.difficulty,
        q.question_type, q.options, q.correct_options, q.explanation,
        COALESCE(
            ARRAY(
                SELECT t.name FROM question_tags qt
                JOIN tags t ON t.id = qt.tag_id
                WHERE qt.question_id = q.id
                ORDER BY t.name
            ),
            '{}'
        ) AS tags,
        q.created_by_id, q.created_at, q.updated_at
    FROM questions q
"#;

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 10000))]
    pub question: String,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(max = 255))]
    pub exam: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub language: String,
    #[validate(range(min = 1, max = 10))]
    pub difficulty: i32,
    pub question_type: QuestionType,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_options: Vec<i32>,
    #[validate(length(max = 10000))]
    pub explanation: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
}

impl CreateQuestionRequest {
    /// Field validation plus the cross-field answer-key rules.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        check_answer_key(self.question_type, self.options.len(), &self.correct_options)
            .map_err(AppError::BadRequest)
    }
}

/// Accepts either one question object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.trim().is_empty() || opt.len() > 2000 {
            return Err(validator::ValidationError::new("invalid_option"));
        }
    }
    Ok(())
}

/// Rules tying `correct_options` to the option list and question type.
pub fn check_answer_key(
    question_type: QuestionType,
    n_options: usize,
    correct: &[i32],
) -> Result<(), String> {
    if correct.is_empty() {
        return Err("At least one correct option is required".to_string());
    }
    if correct.iter().any(|&i| i < 0 || i as usize >= n_options) {
        return Err("Correct option index out of range".to_string());
    }
    let distinct: BTreeSet<i32> = correct.iter().copied().collect();
    if distinct.len() != correct.len() {
        return Err("Correct options must not repeat".to_string());
    }
    if question_type == QuestionType::MultipleChoice && correct.len() != 1 {
        return Err("An m-choice question must have exactly one correct option".to_string());
    }
    Ok(())
}

/// Query parameters for listing questions.
#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub subject: Option<String>,
    pub exam: Option<String>,
    pub language: Option<String>,
    /// Comma separated tag names; a question matching any of them is kept.
    pub tags: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// 'asc' or 'desc' (default) by creation time.
    pub sort: Option<String>,
}

/// Splits a comma separated query value into trimmed, non-empty names.
pub fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Highest page a listing will serve; keeps the offset arithmetic in range.
pub const MAX_PAGE: i64 = 1_000_000;

/// Normalises `page`/`limit` query values into `(page, limit, offset)`.
pub fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let limit = limit.unwrap_or(10).clamp(1, 100);
    (page, limit, (page - 1) * limit)
}
