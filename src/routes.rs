// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, bookmark, explanation, question, question_set, test_session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Public routes: register and login.
/// * Everything else requires a valid bearer token; `/api/admin` also
///   requires the user-management capability.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me).put(auth::update_me))
                .route("/password", put(auth::change_password))
                .layer(require_auth.clone()),
        );

    let question_routes = Router::new()
        .route(
            "/",
            get(question::list_questions).post(question::create_questions),
        )
        .route(
            "/{id}",
            get(question::get_question).delete(question::delete_question),
        )
        .layer(require_auth.clone());

    let question_set_routes = Router::new()
        .route(
            "/",
            get(question_set::list_question_sets).post(question_set::create_question_set),
        )
        .route(
            "/{id}",
            get(question_set::get_question_set)
                .put(question_set::update_question_set)
                .delete(question_set::delete_question_set),
        )
        .layer(require_auth.clone());

    let test_session_routes = Router::new()
        .route("/", post(test_session::create_test_session))
        .route("/history", get(test_session::test_history))
        .route(
            "/{id}",
            get(test_session::get_test_session).put(test_session::update_test_session),
        )
        .route("/finish/{id}", put(test_session::finish_test_session))
        .layer(require_auth.clone());

    let bookmark_routes = Router::new()
        .route("/", get(bookmark::list_bookmarks))
        .route(
            "/{question_id}",
            post(bookmark::add_bookmark).delete(bookmark::remove_bookmark),
        )
        .layer(require_auth.clone());

    let explanation_routes = Router::new()
        .route(
            "/",
            get(explanation::list_explanations).post(explanation::save_explanation),
        )
        .route(
            "/{question_id}",
            put(explanation::update_explanation).delete(explanation::remove_explanation),
        )
        .layer(require_auth.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}/premium", put(admin::set_premium))
        .route("/users/{id}/daily_limit", put(admin::set_daily_limit))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(require_auth);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/question_sets", question_set_routes)
        .nest("/api/test_session", test_session_routes)
        .nest("/api/bookmarks", bookmark_routes)
        .nest("/api/explanations", explanation_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
