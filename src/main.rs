// src/main.rs

use dotenvy::dotenv;
use quiz_backend::config::Config;
use quiz_backend::routes;
use quiz_backend::state::AppState;
use quiz_backend::utils::hash::hash_password;
use quiz_backend::utils::permissions::Role;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_owner(&pool, &config).await {
        tracing::error!("Failed to seed owner account: {:?}", e);
    }

    tracing::info!(
        daily_question_limit = config.daily_question_limit,
        "Daily quota configured"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let app = routes::create_router(AppState::new(pool, config));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app).await.unwrap();
}

/// Creates the `owner` account named by OWNER_EMAIL / OWNER_PASSWORD if it
/// does not exist yet.
async fn seed_owner(pool: &PgPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(email), Some(password)) = (&config.owner_email, &config.owner_password) {
        let email = email.trim().to_lowercase();
        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(pool)
            .await?;

        if existing.is_none() {
            tracing::info!("Seeding owner account: {}", email);
            let hashed_password = hash_password(password)?;

            sqlx::query(
                "INSERT INTO users (name, email, password, role, verified) VALUES ($1, $2, $3, $4, TRUE)",
            )
            .bind("Owner")
            .bind(&email)
            .bind(hashed_password)
            .bind(Role::Owner.as_str())
            .execute(pool)
            .await?;
            tracing::info!("Owner account created successfully.");
        }
    }
    Ok(())
}
