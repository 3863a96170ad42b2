// src/models/user.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const ROLE_REGISTERED: &str = "registered";
pub const ROLE_LEARNER: &str = "learner";
pub const ROLE_INSTRUCTOR: &str = "instructor";

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub email: Option<String>,

    pub created_at: NaiveDateTime,
}

/// Represents the 'profiles' table (1:1 with users).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub user_id: i64,
    pub full_name: Option<String>,
    pub about: Option<String>,
}

/// Aggregated profile data for the current user.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub full_name: Option<String>,
    pub about: Option<String>,
    pub created_at: NaiveDateTime,
    pub enroll_count: i64,
}

/// DTO for creating a new user (Registration).
///
/// Self-registration always yields a learner. Unknown fields such as `role`
/// are ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[validate(length(max = 2000))]
    pub about: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: Option<&str>) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: "password123".to_string(),
            email: email.map(str::to_string),
            full_name: None,
        }
    }

    #[test]
    fn test_registration_validates() {
        assert!(request("learner01", None).validate().is_ok());
        assert!(request("learner01", Some("l@example.com")).validate().is_ok());
    }

    #[test]
    fn test_registration_rejects_bad_fields() {
        assert!(request("yo", None).validate().is_err());
        assert!(request("learner01", Some("not-an-email")).validate().is_err());
    }

    #[test]
    fn test_role_field_is_ignored() {
        let payload: CreateUserRequest = serde_json::from_str(
            r#"{"username":"mallory","password":"password123","role":"instructor"}"#,
        )
        .unwrap();
        assert_eq!(payload.username, "mallory");
        assert!(payload.validate().is_ok());
    }
}
