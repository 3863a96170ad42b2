// src/handlers/simulation.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    config::Config,
    error::AppError,
    models::simulation::{Simulation, SimulationListParams, StartSimulationRequest},
    services::{certificate, lifecycle, scoring},
    utils::jwt::Claims,
};

/// Starts a new attempt on an enroll session, closing any running one.
pub async fn start_simulation(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartSimulationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let simulation =
        lifecycle::start_simulation(&mut tx, learner_id, payload.enroll_session_id).await?;
    let detail = lifecycle::simulation_detail(&mut tx, learner_id, simulation.id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Lists the caller's simulations for one enrollment, newest first.
pub async fn list_simulations(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SimulationListParams>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let simulations = sqlx::query_as::<_, Simulation>(&format!(
        "SELECT {} FROM simulations
         WHERE learner_id = ? AND enroll_id = ?
         ORDER BY id DESC",
        lifecycle::SIMULATION_COLUMNS
    ))
    .bind(learner_id)
    .bind(params.enroll_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list simulations: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(simulations))
}

pub async fn get_simulation(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let detail = lifecycle::simulation_detail(&mut tx, learner_id, id).await?;
    tx.commit().await?;

    Ok(Json(detail))
}

pub async fn delete_simulation(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let simulation = lifecycle::load_owned_simulation(&mut conn, learner_id, id).await?;

    sqlx::query("DELETE FROM simulations WHERE id = ?")
        .bind(simulation.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete simulation: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Survey and evaluate percentages of a simulation.
pub async fn get_score(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let simulation = lifecycle::load_owned_simulation(&mut conn, learner_id, id).await?;
    let report = scoring::score(&mut conn, simulation.id).await?;

    Ok(Json(report))
}

pub async fn mark_chapter_done(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((id, chapter_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    lifecycle::mark_chapter_done(&mut tx, learner_id, id, chapter_id).await?;
    let detail = lifecycle::simulation_detail(&mut tx, learner_id, id).await?;
    tx.commit().await?;

    Ok(Json(detail))
}

pub async fn finish_simulation(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let simulation = lifecycle::finish_simulation(&mut tx, learner_id, id).await?;
    tx.commit().await?;

    tracing::info!(simulation_id = simulation.id, "Simulation finished");

    Ok(Json(simulation))
}

/// Renders the certificate of a simulation whose evaluate quiz is done.
pub async fn generate_certificate(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let issued = certificate::generate(&mut tx, &config, learner_id, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(issued)))
}
