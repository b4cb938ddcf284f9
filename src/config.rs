// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Fallback daily question quota for non-premium users.
pub const DEFAULT_DAILY_QUESTION_LIMIT: i64 = 20;

/// Default token lifetime (72 hours).
pub const DEFAULT_JWT_EXPIRATION_SECS: u64 = 72 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub server_port: u16,
    pub daily_question_limit: i64,
    pub cors_origins: Vec<String>,
    pub owner_email: Option<String>,
    pub owner_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION_SECS);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let daily_question_limit = env::var("DAILY_QUESTION_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DAILY_QUESTION_LIMIT);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            server_port,
            daily_question_limit,
            cors_origins,
            owner_email: env::var("OWNER_EMAIL").ok(),
            owner_password: env::var("OWNER_PASSWORD").ok(),
        }
    }
}

/// Splits a comma separated origin list, dropping blanks.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
