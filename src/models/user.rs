// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::permissions::Role;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Unique login email.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// User role: 'user', 'admin' or 'owner'.
    pub role: String,

    pub verified: bool,

    pub is_premium: bool,

    pub premium_expiry: Option<DateTime<Utc>>,

    /// Tokens issued before this instant are rejected.
    pub password_changed_at: DateTime<Utc>,

    pub about: Option<String>,

    #[serde(skip)]
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Parsed role; unknown values degrade to the least privileged role.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    /// Premium is active while the flag is set and the expiry (if any) lies ahead.
    pub fn has_active_premium(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expiry.is_none_or(|expiry| expiry > now)
    }
}

/// Column list matching [`User`], shared by every query that loads a user.
pub const USER_COLUMNS: &str = "id, name, email, password, role, verified, is_premium, \
     premium_expiry, password_changed_at, about, deleted, created_at, updated_at";

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 1,
        max = 128,
        message = "Name length must be between 1 and 128 characters."
    ))]
    pub name: String,
    #[validate(email(message = "Email address is not valid."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for editing the caller's own profile.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub about: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub new_password: String,
}

/// Today's activity figures shown alongside the profile.
#[derive(Debug, Serialize)]
pub struct ActivityOverview {
    pub questions_answered_today: i64,
    pub daily_question_limit: i64,
    pub tests_completed_today: i64,
    pub premium: bool,
}

/// Aggregated profile data for the current user.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub activity: ActivityOverview,
}

/// Query parameters for the admin user listing.
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// DTO for granting or revoking premium access.
#[derive(Debug, Deserialize)]
pub struct SetPremiumRequest {
    pub is_premium: bool,
    pub premium_expiry: Option<DateTime<Utc>>,
}

/// DTO for overriding a user's question quota for the current day.
#[derive(Debug, Deserialize, Validate)]
pub struct SetDailyLimitRequest {
    #[validate(range(min = 0, max = 100000))]
    pub questions_limit: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(is_premium: bool, expiry: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: 1,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: String::new(),
            role: "user".into(),
            verified: true,
            is_premium,
            premium_expiry: expiry,
            password_changed_at: now,
            about: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_premium_without_expiry_is_active() {
        assert!(user(true, None).has_active_premium(Utc::now()));
    }

    #[test]
    fn test_expired_premium_is_inactive() {
        let now = Utc::now();
        assert!(!user(true, Some(now - Duration::days(1))).has_active_premium(now));
        assert!(user(true, Some(now + Duration::days(1))).has_active_premium(now));
        assert!(!user(false, None).has_active_premium(now));
    }

    #[test]
    fn test_register_request_rejects_bad_email() {
        let req = RegisterRequest {
            name: "Ada".into(),
            email: "not-an-email".into(),
            password: "secret123".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_unknown_role_degrades_to_user() {
        let mut u = user(false, None);
        u.role = "superuser".into();
        assert_eq!(u.role(), Role::User);
    }
}
