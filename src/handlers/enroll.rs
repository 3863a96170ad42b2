// src/handlers/enroll.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::enroll::{
        CreateEnrollRequest, Enroll, EnrollDetail, EnrollListItem, EnrollSessionView,
    },
    services::lifecycle,
    utils::jwt::Claims,
};

/// Enrolls the caller in a course session.
///
/// Returns 201 when a new session binding (and its first simulation) was
/// created, 200 when the learner was already bound to that session.
pub async fn create_enroll(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateEnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let outcome =
        lifecycle::enroll(&mut tx, learner_id, payload.course_id, payload.course_session_id)
            .await?;
    tx.commit().await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome)))
}

/// Lists the caller's enrollments, newest first.
pub async fn list_enrolls(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let enrolls = sqlx::query_as::<_, EnrollListItem>(
        r#"
        SELECT
            e.id,
            e.course_id,
            c.label AS course_label,
            e.created_at,
            (SELECT COUNT(*) FROM enroll_sessions es WHERE es.enroll_id = e.id) AS session_count
        FROM enrolls e
        JOIN courses c ON c.id = e.course_id
        WHERE e.learner_id = ?
        ORDER BY e.created_at DESC, e.id DESC
        "#,
    )
    .bind(learner_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list enrolls: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(enrolls))
}

/// One enrollment with its session bindings and their active simulation.
pub async fn get_enroll(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let enroll = sqlx::query_as::<_, Enroll>(
        "SELECT id, learner_id, course_id, created_at FROM enrolls WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Enroll not found".to_string()))?;

    if enroll.learner_id != learner_id {
        return Err(AppError::Forbidden("Restricted!".to_string()));
    }

    let course_label: String = sqlx::query_scalar("SELECT label FROM courses WHERE id = ?")
        .bind(enroll.course_id)
        .fetch_one(&mut *conn)
        .await?;

    let sessions = sqlx::query_as::<_, EnrollSessionView>(
        r#"
        SELECT
            es.id,
            es.course_session_id,
            cs.start_date,
            cs.end_date,
            (SELECT s.id FROM simulations s
              WHERE s.enroll_session_id = es.id AND s.is_done = 0
              ORDER BY s.id DESC LIMIT 1) AS active_simulation_id
        FROM enroll_sessions es
        JOIN course_sessions cs ON cs.id = es.course_session_id
        WHERE es.enroll_id = ?
        ORDER BY cs.start_date
        "#,
    )
    .bind(enroll.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(EnrollDetail {
        id: enroll.id,
        course_id: enroll.course_id,
        course_label,
        created_at: enroll.created_at,
        sessions,
    }))
}

/// Withdraws from a course. Session bindings and simulations go with it.
pub async fn delete_enroll(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let owner: i64 = sqlx::query_scalar("SELECT learner_id FROM enrolls WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Enroll not found".to_string()))?;

    if owner != learner_id {
        return Err(AppError::Forbidden("Restricted!".to_string()));
    }

    sqlx::query("DELETE FROM enrolls WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete enroll: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
