// src/services/quota.rs

use chrono::Utc;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{error::AppError, models::user::User};

/// Where a user stands against today's question quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub answered_today: i64,
    pub limit: i64,
}

impl QuotaUsage {
    /// Rejects the request if answering `newly_answered` more distinct
    /// questions would take the user past the limit.
    pub fn admit(&self, newly_answered: usize) -> Result<(), AppError> {
        let requested = self.answered_today + newly_answered as i64;
        if newly_answered > 0 && requested > self.limit {
            return Err(AppError::QuotaExceeded(format!(
                "Daily question limit of {} reached ({} answered today)",
                self.limit, self.answered_today
            )));
        }
        Ok(())
    }
}

/// Daily quota gate for non-premium users.
///
/// The check and the later append run inside the caller's transaction but
/// are not serialised against other sessions of the same user, so two
/// concurrent updates can both pass the check. The quota is soft.
#[derive(Debug, Clone, Copy)]
pub struct QuotaGate {
    default_limit: i64,
}

impl QuotaGate {
    pub fn new(default_limit: i64) -> Self {
        Self { default_limit }
    }

    /// Distinct questions the user has answered since midnight (database time).
    pub async fn answered_today(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
    ) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT question_id)
            FROM user_daily_questions
            WHERE user_id = $1 AND answered_at::date = CURRENT_DATE
            "#,
        )
        .bind(user_id)
        .fetch_one(conn)
        .await?;

        Ok(count)
    }

    /// Today's per-user override, or the configured default.
    pub async fn limit_for(&self, conn: &mut PgConnection, user_id: i64) -> Result<i64, AppError> {
        let override_limit = sqlx::query_scalar::<_, Option<i32>>(
            r#"
            SELECT questions_limit
            FROM user_daily_activity
            WHERE user_id = $1 AND activity_date = CURRENT_DATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .flatten();

        Ok(override_limit.map(i64::from).unwrap_or(self.default_limit))
    }

    pub async fn usage(&self, conn: &mut PgConnection, user_id: i64) -> Result<QuotaUsage, AppError> {
        let answered_today = self.answered_today(&mut *conn, user_id).await?;
        let limit = self.limit_for(conn, user_id).await?;
        Ok(QuotaUsage {
            answered_today,
            limit,
        })
    }

    /// Premium users always pass; everyone else is checked against today's usage.
    pub async fn check(
        &self,
        conn: &mut PgConnection,
        user: &User,
        newly_answered: usize,
    ) -> Result<(), AppError> {
        if newly_answered == 0 || user.has_active_premium(Utc::now()) {
            return Ok(());
        }

        let usage = self.usage(conn, user.id).await?;
        usage.admit(newly_answered).inspect_err(|_| {
            tracing::warn!(
                user_id = user.id,
                answered_today = usage.answered_today,
                limit = usage.limit,
                requested = newly_answered,
                "Daily question quota exceeded"
            );
        })
    }
}

/// Appends one quota-ledger row per newly answered question.
pub async fn record_answers(
    conn: &mut PgConnection,
    user_id: i64,
    answers: &[(i64, bool)],
) -> Result<(), AppError> {
    if answers.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO user_daily_questions (user_id, question_id, answered_correct) ",
    );
    builder.push_values(answers, |mut row, (question_id, correct)| {
        row.push_bind(user_id)
            .push_bind(*question_id)
            .push_bind(*correct);
    });
    builder.push(" ON CONFLICT DO NOTHING");

    builder.build().execute(conn).await?;
    Ok(())
}

/// Sets today's quota override for a user.
pub async fn set_daily_limit(
    conn: &mut PgConnection,
    user_id: i64,
    questions_limit: i32,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO user_daily_activity (user_id, activity_date, questions_limit)
        VALUES ($1, CURRENT_DATE, $2)
        ON CONFLICT (user_id, activity_date) DO UPDATE SET questions_limit = EXCLUDED.questions_limit
        "#,
    )
    .bind(user_id)
    .bind(questions_limit)
    .execute(conn)
    .await?;
    Ok(())
}

/// Bumps today's completed-test counter.
pub async fn record_test_completed(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO user_daily_activity (user_id, activity_date, tests_completed)
        VALUES ($1, CURRENT_DATE, 1)
        ON CONFLICT (user_id, activity_date) DO UPDATE
            SET tests_completed = user_daily_activity.tests_completed + 1
        "#,
    )
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn tests_completed_today(conn: &mut PgConnection, user_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i32>(
        "SELECT tests_completed FROM user_daily_activity WHERE user_id = $1 AND activity_date = CURRENT_DATE",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(count.map(i64::from).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_up_to_the_limit() {
        let usage = QuotaUsage {
            answered_today: 18,
            limit: 20,
        };
        assert!(usage.admit(2).is_ok());
        assert!(matches!(usage.admit(3), Err(AppError::QuotaExceeded(_))));
    }

    #[test]
    fn test_user_at_limit_cannot_answer_new_question() {
        let usage = QuotaUsage {
            answered_today: 20,
            limit: 20,
        };
        assert!(matches!(usage.admit(1), Err(AppError::QuotaExceeded(_))));
    }

    #[test]
    fn test_re_answers_pass_even_at_limit() {
        let usage = QuotaUsage {
            answered_today: 25,
            limit: 20,
        };
        assert!(usage.admit(0).is_ok());
    }
}
