// src/handlers/quiz.rs
//
// Answering the quiz slots of a simulation.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError, models::simulation::SubmitAnswersRequest, services::lifecycle,
    utils::jwt::Claims,
};

/// Questions of a simulation quiz in display order.
///
/// Choices are returned without their `is_true` flag; the learner's current
/// answer (if any) is included per question.
pub async fn get_questions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let questions = lifecycle::quiz_questions(&mut conn, learner_id, id).await?;

    Ok(Json(questions))
}

/// Saves a batch of answers. The whole batch is rejected if any answer
/// references a question outside the quiz or a foreign choice.
pub async fn submit_answers(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let result = lifecycle::submit_answers(&mut tx, learner_id, id, &payload.answers).await?;
    tx.commit().await?;

    tracing::info!(
        user_id = learner_id,
        simulation_quiz_id = id,
        saved = result.saved,
        "Answers submitted"
    );

    Ok(Json(result))
}
