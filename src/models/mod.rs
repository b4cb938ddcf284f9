// src/models/mod.rs

pub mod bookmark;
pub mod explanation;
pub mod question;
pub mod question_set;
pub mod test_session;
pub mod user;
