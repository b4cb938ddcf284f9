// src/services/test_session.rs

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{QuestionType, page_window},
        test_session::{
            AnswerRecord, CreateSessionRequest, CreatedSession, FinishSummary, HistoryEntry,
            HistoryPage, HistoryParams, LedgerEntry, OutcomeTally, SessionDetail, SessionMode,
            SessionQuestionRow, SessionQuestionView, TEST_SESSION_COLUMNS, TestSession,
            UpdateOutcome, UpdateSessionRequest,
        },
        user::User,
    },
    services::{
        quota::{self, QuotaGate},
        scoring,
        stats::{self, QuestionSetStats},
    },
};

/// A question of a set, as it is frozen into a new session.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SetQuestion {
    question_id: i64,
    mark: f64,
    correct_options: Vec<i32>,
}

/// New state for one ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub question_id: i64,
    pub selected: Vec<i32>,
    pub scored: f64,
    pub answered: bool,
}

/// Everything an update will write, computed before touching the database.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub changes: Vec<RowChange>,
    /// `(question_id, answered_correctly)` for rows that become answered.
    pub newly_answered: Vec<(i64, bool)>,
    pub total_marks: f64,
    pub scored_marks: f64,
}

/// Scores an update payload against the session's ledger.
///
/// Rows not mentioned in `answers` keep their stored score, so the returned
/// totals always cover the whole ledger. A record with `answered = false`
/// keeps its selection but scores 0.
pub fn plan_update(ledger: &[LedgerEntry], answers: &[AnswerRecord]) -> Result<UpdatePlan, AppError> {
    let by_id: HashMap<i64, &LedgerEntry> = ledger.iter().map(|e| (e.question_id, e)).collect();
    let mut seen = HashSet::with_capacity(answers.len());
    let mut changes = Vec::with_capacity(answers.len());
    let mut newly_answered = Vec::new();

    for record in answers {
        if !seen.insert(record.question_id) {
            return Err(AppError::BadRequest(format!(
                "Question {} appears more than once",
                record.question_id
            )));
        }
        let entry = by_id.get(&record.question_id).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Question {} is not part of this test session",
                record.question_id
            ))
        })?;

        let mut selected = record.selected_options.clone();
        selected.sort_unstable();
        selected.dedup();

        let scored = if record.answered {
            let question_type: QuestionType = entry.question_type.parse()?;
            scoring::score(
                question_type,
                &entry.correct_answer_list,
                &selected,
                entry.questions_total_mark,
            )
            .inspect_err(|e| {
                tracing::error!(question_id = entry.question_id, "Unscorable question: {:?}", e);
            })?
        } else {
            0.0
        };

        if record.answered && !entry.answered {
            newly_answered.push((entry.question_id, scored > 0.0));
        }

        changes.push(RowChange {
            question_id: entry.question_id,
            selected,
            scored,
            answered: record.answered,
        });
    }

    let changed: HashMap<i64, f64> = changes.iter().map(|c| (c.question_id, c.scored)).collect();
    let total_marks: f64 = ledger.iter().map(|e| e.questions_total_mark).sum();
    let scored_marks: f64 = ledger
        .iter()
        .map(|e| {
            changed
                .get(&e.question_id)
                .copied()
                .unwrap_or(e.questions_scored_mark)
        })
        .sum();

    Ok(UpdatePlan {
        changes,
        newly_answered,
        total_marks,
        scored_marks,
    })
}

fn shuffle_questions(questions: &mut [SetQuestion]) {
    questions.shuffle(&mut rand::rng());
}

fn ensure_owner(session: &TestSession, user: &User) -> Result<(), AppError> {
    if session.taken_by_id != user.id {
        tracing::warn!(
            test_session = %session.id,
            user_id = user.id,
            "Access to another user's test session"
        );
        return Err(AppError::AuthError(
            "You are not the owner of this test session".to_string(),
        ));
    }
    Ok(())
}

/// Drives the create / update / finish lifecycle of test sessions.
#[derive(Clone)]
pub struct TestSessionService {
    pool: PgPool,
    quota: QuotaGate,
}

impl TestSessionService {
    pub fn new(pool: PgPool, daily_question_limit: i64) -> Self {
        Self {
            pool,
            quota: QuotaGate::new(daily_question_limit),
        }
    }

    async fn load_session(
        conn: &mut PgConnection,
        id: Uuid,
        for_update: bool,
    ) -> Result<TestSession, AppError> {
        let sql = format!(
            "SELECT {} FROM test_sessions WHERE id = $1{}",
            TEST_SESSION_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, TestSession>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Test session not found".to_string()))
    }

    /// Freezes the set's questions into a new session.
    pub async fn create(
        &self,
        user: &User,
        req: CreateSessionRequest,
    ) -> Result<CreatedSession, AppError> {
        let set_name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM question_sets WHERE id = $1 AND deleted = FALSE",
        )
        .bind(req.question_set_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question set not found".to_string()))?;

        let mut tx = self.pool.begin().await?;

        let mut questions = sqlx::query_as::<_, SetQuestion>(
            r#"
            SELECT qsq.question_id, qsq.mark, q.correct_options
            FROM question_set_questions qsq
            JOIN questions q ON q.id = qsq.question_id
            WHERE qsq.question_set_id = $1 AND q.deleted = FALSE
            ORDER BY qsq.position ASC, qsq.question_id ASC
            "#,
        )
        .bind(req.question_set_id)
        .fetch_all(&mut *tx)
        .await?;

        if questions.is_empty() {
            return Err(AppError::NotFound(
                "Question set has no questions".to_string(),
            ));
        }

        if req.randomize_questions {
            shuffle_questions(&mut questions);
        }

        let session_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO test_sessions (id, name, question_set_id, taken_by_id, mode, n_total_questions)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session_id)
        .bind(&set_name)
        .bind(req.question_set_id)
        .bind(user.id)
        .bind(req.mode.as_str())
        .bind(questions.len() as i32)
        .execute(&mut *tx)
        .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO test_session_question_answers \
             (test_session_id, question_id, position, correct_answer_list, questions_total_mark) ",
        );
        builder.push_values(questions.iter().enumerate(), |mut row, (position, q)| {
            row.push_bind(session_id)
                .push_bind(q.question_id)
                .push_bind(position as i32)
                .push_bind(q.correct_options.clone())
                .push_bind(q.mark);
        });
        builder.build().execute(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!(
            test_session = %session_id,
            user_id = user.id,
            question_set_id = req.question_set_id,
            n_questions = questions.len(),
            "Test session created"
        );

        Ok(CreatedSession {
            test_session: session_id,
            question_set: set_name,
            mode: req.mode,
            question_ids: questions.iter().map(|q| q.question_id).collect(),
            randomized: req.randomize_questions,
        })
    }

    pub async fn get(&self, user: &User, id: Uuid) -> Result<SessionDetail, AppError> {
        let mut conn = self.pool.acquire().await?;
        let session = Self::load_session(&mut conn, id, false).await?;
        ensure_owner(&session, user)?;

        let rows = sqlx::query_as::<_, SessionQuestionRow>(
            r#"
            SELECT a.question_id, a.position, q.question, q.question_type, q.options, q.explanation,
                   a.correct_answer_list, a.selected_answer_list,
                   a.questions_total_mark, a.questions_scored_mark, a.answered
            FROM test_session_question_answers a
            JOIN questions q ON q.id = a.question_id
            WHERE a.test_session_id = $1
            ORDER BY a.position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let mode: SessionMode = session.mode.parse()?;
        let reveal = session.finished || mode.reveals_answers_early();
        let questions: Vec<SessionQuestionView> = rows
            .into_iter()
            .map(|row| SessionQuestionView::from_row(row, reveal))
            .collect();

        let current_question_id = questions
            .iter()
            .find(|q| q.position == session.current_question_num)
            .map(|q| q.id);

        let stats = if session.finished {
            let scores = stats::finished_scores(&mut conn, session.question_set_id).await?;
            Some(QuestionSetStats::from_scores(scores))
        } else {
            None
        };

        Ok(SessionDetail {
            current_question_index: session.current_question_num,
            current_question_id,
            test_session: session,
            questions,
            stats,
        })
    }

    /// Saves answers and moves the cursor. Finished sessions are left untouched.
    pub async fn update(
        &self,
        user: &User,
        id: Uuid,
        req: UpdateSessionRequest,
    ) -> Result<UpdateOutcome, AppError> {
        req.validate()?;

        let mut tx = self.pool.begin().await?;
        let session = Self::load_session(&mut tx, id, true).await?;
        ensure_owner(&session, user)?;

        if session.finished {
            return Ok(UpdateOutcome::Finished {
                message: "Test session already finished".to_string(),
            });
        }

        if req.current_question_index >= session.n_total_questions {
            return Err(AppError::BadRequest(format!(
                "current_question_index must be below {}",
                session.n_total_questions
            )));
        }

        let ledger = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT a.question_id, a.position, q.question_type,
                   a.correct_answer_list, a.selected_answer_list,
                   a.questions_total_mark, a.questions_scored_mark, a.answered
            FROM test_session_question_answers a
            JOIN questions q ON q.id = a.question_id
            WHERE a.test_session_id = $1
            ORDER BY a.position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let plan = plan_update(&ledger, &req.answers)?;

        self.quota
            .check(&mut tx, user, plan.newly_answered.len())
            .await?;

        for change in &plan.changes {
            sqlx::query(
                r#"
                UPDATE test_session_question_answers
                SET selected_answer_list = $1, questions_scored_mark = $2, answered = $3
                WHERE test_session_id = $4 AND question_id = $5
                "#,
            )
            .bind(&change.selected)
            .bind(change.scored)
            .bind(change.answered)
            .bind(id)
            .bind(change.question_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE test_sessions
            SET current_question_num = $1, scored_marks = $2, total_marks = $3,
                started = TRUE, updated_time = NOW()
            WHERE id = $4
            "#,
        )
        .bind(req.current_question_index)
        .bind(plan.scored_marks)
        .bind(plan.total_marks)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        quota::record_answers(&mut tx, user.id, &plan.newly_answered).await?;

        tx.commit().await?;

        tracing::debug!(
            test_session = %id,
            changed = plan.changes.len(),
            newly_answered = plan.newly_answered.len(),
            "Test session updated"
        );

        Ok(UpdateOutcome::Success {
            current_question_num: req.current_question_index,
            scored_marks: plan.scored_marks,
            total_marks: plan.total_marks,
            newly_answered: plan.newly_answered.len(),
        })
    }

    /// Closes the session, stores its final score and ranks it on the set.
    pub async fn finish(&self, user: &User, id: Uuid) -> Result<FinishSummary, AppError> {
        let mut tx = self.pool.begin().await?;
        let session = Self::load_session(&mut tx, id, true).await?;
        ensure_owner(&session, user)?;

        if session.finished {
            return Err(AppError::BadRequest(
                "Test session already finished".to_string(),
            ));
        }

        let tally = sqlx::query_as::<_, OutcomeTally>(
            r#"
            SELECT
                COALESCE(SUM(questions_total_mark), 0)::FLOAT8 AS total_marks,
                COALESCE(SUM(questions_scored_mark), 0)::FLOAT8 AS scored_marks,
                COUNT(*) FILTER (WHERE answered) AS n_answered,
                COUNT(*) FILTER (WHERE questions_scored_mark > 0) AS n_correct,
                COUNT(*) FILTER (WHERE answered AND questions_scored_mark = 0) AS n_wrong,
                COUNT(*) FILTER (WHERE NOT answered) AS n_unanswered
            FROM test_session_question_answers
            WHERE test_session_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let finished_time = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE test_sessions
            SET finished = TRUE, finished_time = NOW(), updated_time = NOW(),
                total_marks = $2, scored_marks = $3, n_correctly_answered = $4,
                current_question_num = 0
            WHERE id = $1 AND finished = FALSE
            RETURNING finished_time
            "#,
        )
        .bind(id)
        .bind(tally.total_marks)
        .bind(tally.scored_marks)
        .bind(tally.n_correct as i32)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::BadRequest("Test session already finished".to_string()))?;

        let scores = stats::finished_scores(&mut tx, session.question_set_id).await?;
        let stats = QuestionSetStats::from_scores(scores);
        let rank = stats.rank_of(tally.scored_marks);
        let percentile = stats.percentile_of(tally.scored_marks);

        sqlx::query("UPDATE test_sessions SET rank = $1 WHERE id = $2")
            .bind(rank)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        quota::record_test_completed(&mut tx, user.id).await?;

        tx.commit().await?;

        tracing::info!(
            test_session = %id,
            user_id = user.id,
            scored_marks = tally.scored_marks,
            total_marks = tally.total_marks,
            rank,
            "Test session finished"
        );

        Ok(FinishSummary {
            test_session_id: id,
            started_time: session.started_time,
            finished_time,
            tally,
            rank,
            percentile,
            stats,
        })
    }

    /// The user's sessions, newest first.
    pub async fn history(&self, user: &User, params: HistoryParams) -> Result<HistoryPage, AppError> {
        let (page, limit, offset) = page_window(params.page, params.limit);

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT ts.id, ts.name, ts.question_set_id, ts.finished, ts.started, ts.mode,
                   ts.total_marks, ts.scored_marks, ts.rank,
                   qs.subject, qs.exam, qs.language, qs.cover_image,
                   ts.started_time, ts.finished_time, ts.updated_time
            FROM test_sessions ts
            JOIN question_sets qs ON qs.id = ts.question_set_id
            WHERE ts.taken_by_id = "#,
        );
        builder.push_bind(user.id);

        if let Some(subject) = params.subject.filter(|s| !s.is_empty()) {
            builder.push(" AND qs.subject = ").push_bind(subject);
        }
        if let Some(exam) = params.exam.filter(|s| !s.is_empty()) {
            builder.push(" AND qs.exam = ").push_bind(exam);
        }
        if let Some(date) = params.date {
            builder.push(" AND ts.started_time::date = ").push_bind(date);
        }

        // One extra row tells us whether another page exists.
        builder
            .push(" ORDER BY ts.started_time DESC LIMIT ")
            .push_bind(limit + 1)
            .push(" OFFSET ")
            .push_bind(offset);

        let mut history = builder
            .build_query_as::<HistoryEntry>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch test history: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        let has_more = history.len() as i64 > limit;
        history.truncate(limit as usize);

        Ok(HistoryPage {
            page,
            limit,
            count: history.len(),
            has_more,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question_id: i64, question_type: &str, correct: Vec<i32>, mark: f64) -> LedgerEntry {
        LedgerEntry {
            question_id,
            position: (question_id - 1) as i32,
            question_type: question_type.to_string(),
            correct_answer_list: correct,
            selected_answer_list: vec![],
            questions_total_mark: mark,
            questions_scored_mark: 0.0,
            answered: false,
        }
    }

    fn answer(question_id: i64, selected: Vec<i32>, answered: bool) -> AnswerRecord {
        AnswerRecord {
            question_id,
            selected_options: selected,
            answered,
        }
    }

    fn two_question_ledger() -> Vec<LedgerEntry> {
        vec![
            entry(1, "m-choice", vec![0], 1.0),
            entry(2, "m-select", vec![0, 1], 2.0),
        ]
    }

    /// Applies a plan the way the update query does.
    fn apply(ledger: &mut [LedgerEntry], plan: &UpdatePlan) {
        for change in &plan.changes {
            let row = ledger
                .iter_mut()
                .find(|e| e.question_id == change.question_id)
                .unwrap();
            row.selected_answer_list = change.selected.clone();
            row.questions_scored_mark = change.scored;
            row.answered = change.answered;
        }
    }

    #[test]
    fn test_two_question_scenario() {
        let ledger = two_question_ledger();
        let plan = plan_update(
            &ledger,
            &[answer(1, vec![0], true), answer(2, vec![0], true)],
        )
        .unwrap();

        assert_eq!(plan.changes[0].scored, 1.0);
        assert_eq!(plan.changes[1].scored, 1.0);
        assert_eq!(plan.total_marks, 3.0);
        assert_eq!(plan.scored_marks, 2.0);
        assert_eq!(plan.newly_answered, vec![(1, true), (2, true)]);
    }

    #[test]
    fn test_identical_update_is_idempotent() {
        let mut ledger = two_question_ledger();
        let answers = [answer(1, vec![0], true), answer(2, vec![0], true)];

        let first = plan_update(&ledger, &answers).unwrap();
        apply(&mut ledger, &first);
        let second = plan_update(&ledger, &answers).unwrap();

        assert_eq!(second.scored_marks, first.scored_marks);
        assert!(second.newly_answered.is_empty());
    }

    #[test]
    fn test_partial_payload_keeps_running_score() {
        let mut ledger = two_question_ledger();
        let first = plan_update(&ledger, &[answer(1, vec![0], true)]).unwrap();
        apply(&mut ledger, &first);

        let second = plan_update(&ledger, &[answer(2, vec![0, 1], true)]).unwrap();
        assert_eq!(second.scored_marks, 3.0);
        assert_eq!(second.newly_answered, vec![(2, true)]);
    }

    #[test]
    fn test_draft_selection_scores_zero() {
        let ledger = two_question_ledger();
        let plan = plan_update(&ledger, &[answer(1, vec![0], false)]).unwrap();
        assert_eq!(plan.changes[0].selected, vec![0]);
        assert_eq!(plan.changes[0].scored, 0.0);
        assert!(plan.newly_answered.is_empty());
    }

    #[test]
    fn test_wrong_answer_is_charged_but_not_correct() {
        let ledger = two_question_ledger();
        let plan = plan_update(&ledger, &[answer(1, vec![1], true)]).unwrap();
        assert_eq!(plan.newly_answered, vec![(1, false)]);
        assert_eq!(plan.scored_marks, 0.0);
    }

    #[test]
    fn test_duplicate_question_rejected() {
        let ledger = two_question_ledger();
        let err = plan_update(
            &ledger,
            &[answer(1, vec![0], true), answer(1, vec![1], true)],
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_foreign_question_rejected() {
        let ledger = two_question_ledger();
        let err = plan_update(&ledger, &[answer(99, vec![0], true)]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_ambiguous_m_choice_key_fails_update() {
        let ledger = vec![entry(1, "m-choice", vec![0, 1], 1.0)];
        let err = plan_update(&ledger, &[answer(1, vec![0], true)]).unwrap_err();
        assert!(matches!(err, AppError::InternalServerError(_)));
    }

    #[test]
    fn test_scored_never_exceeds_total() {
        let ledger = two_question_ledger();
        let plan = plan_update(
            &ledger,
            &[answer(1, vec![0, 0], true), answer(2, vec![1, 0, 1], true)],
        )
        .unwrap();
        assert!(plan.scored_marks <= plan.total_marks);
        assert_eq!(plan.scored_marks, 3.0);
    }

    #[test]
    fn test_shuffle_keeps_every_question_once() {
        let mut questions: Vec<SetQuestion> = (1..=30)
            .map(|id| SetQuestion {
                question_id: id,
                mark: 1.0,
                correct_options: vec![0],
            })
            .collect();
        shuffle_questions(&mut questions);

        let mut ids: Vec<i64> = questions.iter().map(|q| q.question_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=30).collect::<Vec<i64>>());
    }
}
