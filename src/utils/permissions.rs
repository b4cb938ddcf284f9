// src/utils/permissions.rs

use std::str::FromStr;

use crate::{error::AppError, models::user::User};

/// Account roles stored in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
    Owner,
}

/// Things a role may be allowed to do beyond touching its own content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// List users, grant premium, override quotas.
    ManageUsers,
    /// Edit or delete questions and question sets created by others.
    ManageAnyContent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageUsers | Capability::ManageAnyContent => {
                matches!(self, Role::Admin | Role::Owner)
            }
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(AppError::BadRequest(format!("Unknown role '{}'", other))),
        }
    }
}

/// True if `user` created the resource or may manage anyone's content.
pub fn can_manage(user: &User, owner_id: i64) -> bool {
    user.id == owner_id || user.role().can(Capability::ManageAnyContent)
}

/// Same as [`can_manage`], turned into a `Forbidden` error.
pub fn ensure_can_manage(user: &User, owner_id: i64, what: &str) -> Result<(), AppError> {
    if can_manage(user, owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "You are not allowed to modify this {}",
            what
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_role(id: i64, role: &str) -> User {
        let now = Utc::now();
        User {
            id,
            name: "t".into(),
            email: "t@example.com".into(),
            password: String::new(),
            role: role.into(),
            verified: false,
            is_premium: false,
            premium_expiry: None,
            password_changed_at: now,
            about: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_creator_can_manage_own_content() {
        assert!(can_manage(&user_with_role(7, "user"), 7));
        assert!(!can_manage(&user_with_role(7, "user"), 8));
    }

    #[test]
    fn test_staff_can_manage_any_content() {
        assert!(can_manage(&user_with_role(1, "admin"), 99));
        assert!(can_manage(&user_with_role(1, "owner"), 99));
    }

    #[test]
    fn test_only_staff_manage_users() {
        assert!(!Role::User.can(Capability::ManageUsers));
        assert!(Role::Admin.can(Capability::ManageUsers));
        assert!(Role::Owner.can(Capability::ManageUsers));
    }

    #[test]
    fn test_role_names_match_stored_values() {
        for role in [Role::User, Role::Admin, Role::Owner] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_ensure_can_manage_is_forbidden_for_strangers() {
        let err = ensure_can_manage(&user_with_role(2, "user"), 3, "question").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
