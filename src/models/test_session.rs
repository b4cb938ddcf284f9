// src/models/test_session.rs

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, services::stats::QuestionSetStats};

/// How a session is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    Practice,
    Exam,
    TimedPractice,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Practice => "practice",
            SessionMode::Exam => "exam",
            SessionMode::TimedPractice => "timed-practice",
        }
    }

    /// Exam sessions hide the answer key until they are finished.
    pub fn reveals_answers_early(&self) -> bool {
        !matches!(self, SessionMode::Exam)
    }
}

impl FromStr for SessionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" => Ok(SessionMode::Practice),
            "exam" => Ok(SessionMode::Exam),
            "timed-practice" => Ok(SessionMode::TimedPractice),
            other => Err(AppError::InternalServerError(format!(
                "Unknown session mode '{}' in database",
                other
            ))),
        }
    }
}

/// Represents the 'test_sessions' table: one row per attempt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TestSession {
    pub id: Uuid,
    pub name: String,
    pub question_set_id: i64,
    pub taken_by_id: i64,
    pub mode: String,
    pub n_total_questions: i32,
    /// 0-based cursor; reset to 0 on finish.
    pub current_question_num: i32,
    pub n_correctly_answered: i32,
    pub finished: bool,
    pub started: bool,
    pub total_marks: f64,
    pub scored_marks: f64,
    /// 1 is best; populated on finish.
    pub rank: Option<i32>,
    pub started_time: DateTime<Utc>,
    pub finished_time: Option<DateTime<Utc>>,
    pub updated_time: DateTime<Utc>,
}

pub const TEST_SESSION_COLUMNS: &str = "id, name, question_set_id, taken_by_id, mode, \
     n_total_questions, current_question_num, n_correctly_answered, finished, started, \
     total_marks, scored_marks, rank, started_time, finished_time, updated_time";

/// A ledger row from 'test_session_question_answers' joined with the
/// question type it is scored by.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub question_id: i64,
    pub position: i32,
    pub question_type: String,
    /// Frozen at session creation.
    pub correct_answer_list: Vec<i32>,
    pub selected_answer_list: Vec<i32>,
    pub questions_total_mark: f64,
    pub questions_scored_mark: f64,
    pub answered: bool,
}

/// Ledger row joined with question content, for the session view.
#[derive(Debug, Clone, FromRow)]
pub struct SessionQuestionRow {
    pub question_id: i64,
    pub position: i32,
    pub question: String,
    pub question_type: String,
    pub options: Vec<String>,
    pub explanation: Option<String>,
    pub correct_answer_list: Vec<i32>,
    pub selected_answer_list: Vec<i32>,
    pub questions_total_mark: f64,
    pub questions_scored_mark: f64,
    pub answered: bool,
}

/// Per-question state as returned to the test taker.
#[derive(Debug, Serialize)]
pub struct SessionQuestionView {
    pub id: i64,
    pub position: i32,
    pub question: String,
    pub question_type: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_list: Option<Vec<i32>>,
    pub selected_answer_list: Vec<i32>,
    pub questions_total_mark: f64,
    /// Withheld with the answer key: a score would give the key away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_scored_mark: Option<f64>,
    pub answered: bool,
}

impl SessionQuestionView {
    pub fn from_row(row: SessionQuestionRow, reveal: bool) -> Self {
        Self {
            id: row.question_id,
            position: row.position,
            question: row.question,
            question_type: row.question_type,
            options: row.options,
            explanation: if reveal { row.explanation } else { None },
            correct_answer_list: reveal.then_some(row.correct_answer_list),
            selected_answer_list: row.selected_answer_list,
            questions_total_mark: row.questions_total_mark,
            questions_scored_mark: reveal.then_some(row.questions_scored_mark),
            answered: row.answered,
        }
    }
}

/// DTO for starting a test session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub question_set_id: i64,
    pub mode: SessionMode,
    #[serde(default)]
    pub randomize_questions: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub test_session: Uuid,
    pub question_set: String,
    pub mode: SessionMode,
    /// Question ids in the order the session presents them.
    pub question_ids: Vec<i64>,
    pub randomized: bool,
}

/// One answered (or drafted) question in an update request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerRecord {
    pub question_id: i64,
    #[serde(alias = "selected_answer_list")]
    #[validate(length(max = 64))]
    pub selected_options: Vec<i32>,
    pub answered: bool,
}

/// DTO for saving progress in a session.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    #[validate(length(max = 500), nested)]
    pub answers: Vec<AnswerRecord>,
    #[validate(range(min = 0))]
    pub current_question_index: i32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// The session had already been finished; nothing was written.
    Finished { message: String },
    Success {
        current_question_num: i32,
        scored_marks: f64,
        total_marks: f64,
        newly_answered: usize,
    },
}

/// Outcome counts over a session's ledger.
#[derive(Debug, Clone, Default, FromRow, Serialize, PartialEq)]
pub struct OutcomeTally {
    pub total_marks: f64,
    pub scored_marks: f64,
    pub n_answered: i64,
    pub n_correct: i64,
    pub n_wrong: i64,
    pub n_unanswered: i64,
}

#[derive(Debug, Serialize)]
pub struct FinishSummary {
    pub test_session_id: Uuid,
    pub started_time: DateTime<Utc>,
    pub finished_time: DateTime<Utc>,
    #[serde(flatten)]
    pub tally: OutcomeTally,
    pub rank: i32,
    /// Share of finished attempts on the set that scored strictly lower.
    pub percentile: f64,
    pub stats: QuestionSetStats,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub test_session: TestSession,
    pub questions: Vec<SessionQuestionView>,
    pub current_question_index: i32,
    pub current_question_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QuestionSetStats>,
}

/// Query parameters for the test history listing.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub subject: Option<String>,
    pub exam: Option<String>,
    /// Day the session was started on.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, FromRow, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub name: String,
    pub question_set_id: i64,
    pub finished: bool,
    pub started: bool,
    pub mode: String,
    pub total_marks: f64,
    pub scored_marks: f64,
    pub rank: Option<i32>,
    pub subject: String,
    pub exam: Option<String>,
    pub language: String,
    pub cover_image: Option<String>,
    pub started_time: DateTime<Utc>,
    pub finished_time: Option<DateTime<Utc>>,
    pub updated_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub page: i64,
    pub limit: i64,
    pub count: usize,
    pub has_more: bool,
    pub history: Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wire_names() {
        let mode: SessionMode = serde_json::from_str("\"timed-practice\"").unwrap();
        assert_eq!(mode, SessionMode::TimedPractice);
        assert_eq!(mode.as_str(), "timed-practice");
        assert!(serde_json::from_str::<SessionMode>("\"speedrun\"").is_err());
    }

    #[test]
    fn test_update_request_accepts_legacy_field_name() {
        let req: UpdateSessionRequest = serde_json::from_str(
            r#"{"answers":[{"question_id":3,"selected_answer_list":[1],"answered":true}],
                "current_question_index":1}"#,
        )
        .unwrap();
        assert_eq!(req.answers[0].selected_options, vec![1]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_negative_cursor_is_invalid() {
        let req = UpdateSessionRequest {
            answers: vec![],
            current_question_index: -1,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_exam_view_withholds_answer_key() {
        let row = SessionQuestionRow {
            question_id: 9,
            position: 0,
            question: "Q".into(),
            question_type: "m-choice".into(),
            options: vec!["a".into(), "b".into()],
            explanation: Some("because".into()),
            correct_answer_list: vec![1],
            selected_answer_list: vec![1],
            questions_total_mark: 1.0,
            questions_scored_mark: 1.0,
            answered: true,
        };
        let hidden = SessionQuestionView::from_row(row.clone(), false);
        assert!(hidden.correct_answer_list.is_none());
        assert!(hidden.explanation.is_none());
        assert!(hidden.questions_scored_mark.is_none());

        let json = serde_json::to_value(&hidden).unwrap();
        assert!(json.get("questions_scored_mark").is_none());
        assert!(json.get("correct_answer_list").is_none());
        assert_eq!(json["selected_answer_list"], serde_json::json!([1]));

        let shown = SessionQuestionView::from_row(row, true);
        assert_eq!(shown.correct_answer_list, Some(vec![1]));
        assert_eq!(shown.questions_scored_mark, Some(1.0));
    }

    #[test]
    fn test_update_request_caps_answer_count() {
        let record = AnswerRecord {
            question_id: 1,
            selected_options: vec![0],
            answered: true,
        };
        let req = UpdateSessionRequest {
            answers: vec![record; 501],
            current_question_index: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_request_checks_each_answer() {
        let req = UpdateSessionRequest {
            answers: vec![AnswerRecord {
                question_id: 1,
                selected_options: (0..65).collect(),
                answered: true,
            }],
            current_question_index: 0,
        };
        assert!(req.validate().is_err());
    }
}
