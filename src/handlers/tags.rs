// src/handlers/tags.rs

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::error::AppError;

/// Lower-cased, trimmed, de-duplicated tag names.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut names: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && t.len() <= 64)
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Returns the ids of the named tags, creating missing ones.
async fn upsert_tags(conn: &mut PgConnection, names: &[String]) -> Result<Vec<i64>, AppError> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        // DO UPDATE (not DO NOTHING) so RETURNING yields existing rows too
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO tags (name) VALUES ($1) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Links tags to a question.
pub(crate) async fn tag_question(
    conn: &mut PgConnection,
    question_id: i64,
    tags: &[String],
) -> Result<(), AppError> {
    link(conn, "question_tags", "question_id", question_id, tags).await
}

/// Replaces the tag links of a question set.
pub(crate) async fn retag_question_set(
    conn: &mut PgConnection,
    question_set_id: i64,
    tags: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM question_set_tags WHERE question_set_id = $1")
        .bind(question_set_id)
        .execute(&mut *conn)
        .await?;
    link(conn, "question_set_tags", "question_set_id", question_set_id, tags).await
}

async fn link(
    conn: &mut PgConnection,
    table: &'static str,
    owner_column: &'static str,
    owner_id: i64,
    tags: &[String],
) -> Result<(), AppError> {
    let names = normalize_tags(tags);
    if names.is_empty() {
        return Ok(());
    }
    let tag_ids = upsert_tags(&mut *conn, &names).await?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}, tag_id) ", table, owner_column));
    builder.push_values(tag_ids, |mut row, tag_id| {
        row.push_bind(owner_id).push_bind(tag_id);
    });
    builder.push(" ON CONFLICT DO NOTHING");
    builder.build().execute(conn).await?;
    Ok(())
}
