// src/services/mod.rs

pub mod quota;
pub mod scoring;
pub mod stats;
pub mod test_session;
