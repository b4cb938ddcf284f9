// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::user::{USER_COLUMNS, User},
    utils::permissions::Capability,
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role at signing time (e.g., 'user', 'admin').
    pub role: String,
    /// Issued-at as Unix timestamp; compared against `password_changed_at`.
    pub iat: usize,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token payload".to_string()))
    }
}

fn now_secs() -> Result<usize, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize)
}

/// Signs a new JWT for the user.
///
/// Arguments:
/// * `id`: User ID.
/// * `role`: User role.
/// * `expiration_seconds`: lifetime of the token from now.
pub fn sign_jwt(
    id: i64,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let issued_at = now_secs()?;

    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        iat: issued_at,
        exp: issued_at + expiration_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// A token signed before the last password change is stale.
pub fn token_predates_password_change(claims: &Claims, user: &User) -> bool {
    user.password_changed_at.timestamp() > claims.iat as i64
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header, loads the
/// non-deleted user it names and rejects tokens issued before the user's
/// last password change. On success the `User` is injected into the
/// request extensions for handlers to use.
pub async fn auth_middleware(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::AuthError("No token provided".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND deleted = FALSE",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::AuthError("User not found".to_string()))?;

    if token_predates_password_change(&claims, &user) {
        return Err(AppError::AuthError(
            "Token invalid: password was changed after the token was issued".to_string(),
        ));
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. Requires the `ManageUsers`
/// capability on the injected `User`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<User>()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    if !user.role().can(Capability::ManageUsers) {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_sign_then_verify() {
        let token = sign_jwt(42, "admin", SECRET, 60).unwrap();
        let claims = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = sign_jwt(1, "user", SECRET, 60).unwrap();
        assert!(matches!(
            verify_jwt(&token, "other-secret"),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn test_password_change_invalidates_older_tokens() {
        let changed = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let user = User {
            id: 1,
            name: "n".into(),
            email: "n@example.com".into(),
            password: String::new(),
            role: "user".into(),
            verified: false,
            is_premium: false,
            premium_expiry: None,
            password_changed_at: changed,
            about: None,
            deleted: false,
            created_at: changed,
            updated_at: changed,
        };
        let mut claims = Claims {
            sub: "1".into(),
            role: "user".into(),
            iat: changed.timestamp() as usize - 10,
            exp: changed.timestamp() as usize + 1000,
        };
        assert!(token_predates_password_change(&claims, &user));

        claims.iat = changed.timestamp() as usize;
        assert!(!token_predates_password_change(&claims, &user));
    }
}
