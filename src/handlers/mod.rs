// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod bookmark;
pub mod explanation;
pub mod question;
pub mod question_set;
mod tags;
pub mod test_session;
