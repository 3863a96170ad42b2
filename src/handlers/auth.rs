// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        CreateUserRequest, LoginRequest, MeResponse, Profile, ROLE_INSTRUCTOR, ROLE_LEARNER,
        ROLE_REGISTERED,
        UpdateProfileRequest, User,
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

const USER_COLUMNS: &str = "id, username, password, email, created_at";

/// Role identifiers held by a user, alphabetically.
pub async fn load_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT identifier FROM user_roles WHERE user_id = ? ORDER BY identifier")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
}

/// Creates a user with the `registered` role plus `role`, and an empty profile.
pub async fn create_user_with_roles(
    conn: &mut SqliteConnection,
    username: &str,
    password: &str,
    email: Option<&str>,
    full_name: Option<&str>,
    role: &str,
) -> Result<User, AppError> {
    let hashed_password = hash_password(password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, password, email) VALUES (?, ?, ?) RETURNING {USER_COLUMNS}"
    ))
    .bind(username)
    .bind(&hashed_password)
    .bind(email)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    for identifier in [ROLE_REGISTERED, role] {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, identifier) VALUES (?, ?)")
            .bind(user.id)
            .bind(identifier)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("INSERT INTO profiles (user_id, full_name) VALUES (?, ?)")
        .bind(user.id)
        .bind(full_name)
        .execute(&mut *conn)
        .await?;

    Ok(user)
}

/// Creates the instructor account named by ADMIN_USERNAME / ADMIN_PASSWORD
/// if it does not exist yet. This is the only way to obtain the role without
/// an existing instructor.
pub async fn seed_instructor(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if user_exists.is_none() {
        tracing::info!("Seeding instructor: {}", username);
        let mut tx = pool.begin().await?;
        create_user_with_roles(&mut tx, username, password, None, None, ROLE_INSTRUCTOR).await?;
        tx.commit().await?;
        tracing::info!("Instructor created successfully.");
    }
    Ok(())
}

/// Registers a new learner.
///
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let user = create_user_with_roles(
        &mut tx,
        &payload.username,
        &payload.password,
        payload.email.as_deref(),
        payload.full_name.as_deref(),
        ROLE_LEARNER,
    )
    .await?;
    let roles = load_roles(&mut tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "roles": roles,
            "created_at": user.created_at,
        })),
    ))
}

/// Authenticates a user and returns a JWT token carrying their roles.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(&payload.username)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    let roles = load_roles(&mut conn, user.id).await?;
    let token = sign_jwt(user.id, &roles, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "roles": roles,
    })))
}

/// Returns the current user's account, roles and profile.
pub async fn me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let profile = sqlx::query_as::<_, Profile>(
        "SELECT user_id, full_name, about FROM profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let enroll_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrolls WHERE learner_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    let roles = load_roles(&mut conn, user_id).await?;
    let (full_name, about) = profile
        .map(|p| (p.full_name, p.about))
        .unwrap_or((None, None));

    Ok(Json(MeResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        roles,
        full_name,
        about,
        created_at: user.created_at,
        enroll_count,
    }))
}

/// Updates the caller's profile. Omitted fields are left untouched.
pub async fn update_profile(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let profile = sqlx::query_as::<_, Profile>(
        r#"
        INSERT INTO profiles (user_id, full_name, about) VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            full_name = COALESCE(excluded.full_name, profiles.full_name),
            about = COALESCE(excluded.about, profiles.about),
            updated_at = CURRENT_TIMESTAMP
        RETURNING user_id, full_name, about
        "#,
    )
    .bind(user_id)
    .bind(&payload.full_name)
    .bind(&payload.about)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(email) = &payload.email {
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(profile))
}
