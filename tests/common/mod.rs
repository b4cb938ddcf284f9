// tests/common/mod.rs

#![allow(dead_code)]

use quiz_backend::{config::Config, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: reqwest::Client,
}

pub fn test_config(database_url: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        server_port: 0,
        daily_question_limit: 20,
        cors_origins: vec!["http://localhost:3000".to_string()],
        owner_email: None,
        owner_password: None,
    }
}

/// Spawns the app on a random port against DATABASE_URL.
///
/// Returns `None` (and the calling test passes trivially) when no database
/// is configured.
pub async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database-backed test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let state = AppState::new(pool.clone(), test_config(&database_url));
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    })
}

/// A registered, logged-in user.
pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register_and_login(&self) -> TestUser {
        let email = format!("u_{}@example.com", uuid::Uuid::new_v4().simple());
        let password = "password123";

        let registered: Value = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "name": "Test User", "email": email, "password": password }))
            .send()
            .await
            .expect("Register failed")
            .json()
            .await
            .expect("Failed to parse register json");
        let id = registered["id"].as_i64().expect("User id not found");

        let login: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");
        let token = login["token"].as_str().expect("Token not found").to_string();

        TestUser { id, email, token }
    }

    pub async fn send(
        &self,
        user: &TestUser,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", user.token));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Creates questions and returns their ids in order.
    pub async fn create_questions(&self, user: &TestUser, questions: Value) -> Vec<i64> {
        let (status, body) = self
            .send(user, reqwest::Method::POST, "/api/questions", Some(questions))
            .await;
        assert_eq!(status, 201, "create questions failed: {}", body);
        body["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect()
    }

    pub async fn create_set(&self, user: &TestUser, question_ids: &[i64], marks: &[f64]) -> i64 {
        let (status, body) = self
            .send(
                user,
                reqwest::Method::POST,
                "/api/question_sets",
                Some(json!({
                    "name": "Scenario set",
                    "mode": "practice",
                    "subject": "math",
                    "language": "en",
                    "question_ids": question_ids,
                    "marks": marks,
                    "tags": ["scenario"]
                })),
            )
            .await;
        assert_eq!(status, 201, "create set failed: {}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn start_session(&self, user: &TestUser, question_set_id: i64) -> String {
        let (status, body) = self
            .send(
                user,
                reqwest::Method::POST,
                "/api/test_session",
                Some(json!({ "question_set_id": question_set_id, "mode": "practice" })),
            )
            .await;
        assert_eq!(status, 201, "create session failed: {}", body);
        body["test_session"].as_str().unwrap().to_string()
    }
}

/// Q1 m-choice (correct [0]) and Q2 m-select (correct [0, 1]).
pub fn scenario_questions() -> Value {
    json!([
        {
            "question": "Pick the first option",
            "subject": "math",
            "language": "en",
            "difficulty": 1,
            "question_type": "m-choice",
            "options": ["a", "b"],
            "correct_options": [0]
        },
        {
            "question": "Pick the first two options",
            "subject": "math",
            "language": "en",
            "difficulty": 2,
            "question_type": "m-select",
            "options": ["a", "b", "c"],
            "correct_options": [0, 1],
            "tags": ["Sets"]
        }
    ])
}

pub fn numbered_questions(n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| {
                json!({
                    "question": format!("Question {}", i),
                    "subject": "math",
                    "language": "en",
                    "difficulty": 1,
                    "question_type": "m-choice",
                    "options": ["a", "b"],
                    "correct_options": [0]
                })
            })
            .collect(),
    )
}
