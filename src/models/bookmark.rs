// src/models/bookmark.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A bookmarked question, joined with enough content to list it.
#[derive(Debug, Serialize, FromRow)]
pub struct BookmarkedQuestion {
    pub question_id: i64,
    pub question: String,
    pub subject: String,
    pub question_type: String,
    pub bookmarked_at: DateTime<Utc>,
}
