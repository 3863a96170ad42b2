// src/handlers/certificate.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{config::Config, error::AppError, services::certificate};

/// Public certificate verification, reached by scanning the QR code.
pub async fn verify_certificate(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let found = certificate::find_by_uuid(&mut conn, &config, &uuid).await?;

    Ok(Json(found))
}
