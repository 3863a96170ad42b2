// src/services/certificate.rs

use std::path::Path;

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::{
        quiz::Position,
        simulation::{
            ATTACHMENT_CERTIFICATE, ATTACHMENT_QRCODE, CertificateResponse, SimulationAttachment,
        },
    },
    services::{lifecycle, scoring},
    utils::certificate::{
        CertificateFields, DEFAULT_TEMPLATE, render_certificate, render_qr_png, render_qr_svg,
    },
};

const ATTACHMENT_COLUMNS: &str =
    "id, uuid, simulation_id, identifier, file_path, created_at, updated_at";

#[derive(FromRow)]
struct Holder {
    learner_name: String,
    course_label: String,
}

async fn load_holder(
    conn: &mut SqliteConnection,
    simulation_id: i64,
) -> Result<Holder, sqlx::Error> {
    sqlx::query_as::<_, Holder>(
        r#"
        SELECT
            COALESCE(NULLIF(TRIM(p.full_name), ''), u.username) AS learner_name,
            c.label AS course_label
        FROM simulations s
        JOIN users u ON u.id = s.learner_id
        LEFT JOIN profiles p ON p.user_id = u.id
        JOIN courses c ON c.id = s.course_id
        WHERE s.id = ?
        "#,
    )
    .bind(simulation_id)
    .fetch_one(&mut *conn)
    .await
}

async fn find_attachment(
    conn: &mut SqliteConnection,
    simulation_id: i64,
    identifier: &str,
) -> Result<Option<SimulationAttachment>, sqlx::Error> {
    sqlx::query_as::<_, SimulationAttachment>(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM simulation_attachments
         WHERE simulation_id = ? AND identifier = ?"
    ))
    .bind(simulation_id)
    .bind(identifier)
    .fetch_optional(&mut *conn)
    .await
}

async fn upsert_attachment(
    conn: &mut SqliteConnection,
    uuid: &str,
    simulation_id: i64,
    identifier: &str,
    file_path: &str,
) -> Result<SimulationAttachment, sqlx::Error> {
    sqlx::query_as::<_, SimulationAttachment>(&format!(
        "INSERT INTO simulation_attachments (uuid, simulation_id, identifier, file_path)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(simulation_id, identifier) DO UPDATE SET
             file_path = excluded.file_path,
             updated_at = CURRENT_TIMESTAMP
         RETURNING {ATTACHMENT_COLUMNS}"
    ))
    .bind(uuid)
    .bind(simulation_id)
    .bind(identifier)
    .bind(file_path)
    .fetch_one(&mut *conn)
    .await
}

async fn write_media(media_root: &Path, relative: &str, bytes: &[u8]) -> Result<(), AppError> {
    let target = media_root.join(relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, bytes).await?;
    Ok(())
}

fn media_url(config: &Config, relative: &str) -> String {
    format!("{}/media/{}", config.public_url, relative)
}

/// Public URL encoded into the QR code of a certificate.
pub fn verification_url(config: &Config, uuid: &str) -> String {
    format!("{}/api/certificates/{}", config.public_url, uuid)
}

/// Renders (or re-renders) the certificate of a completed simulation.
///
/// Files are overwritten in place and attachment rows keep their UUID, so a
/// previously printed QR code stays valid.
pub async fn generate(
    conn: &mut SqliteConnection,
    config: &Config,
    learner_id: i64,
    simulation_id: i64,
) -> Result<CertificateResponse, AppError> {
    let simulation = lifecycle::load_owned_simulation(conn, learner_id, simulation_id).await?;

    let evaluate = scoring::position_score(conn, simulation.id, Position::Evaluate).await?;
    if !evaluate.is_done {
        return Err(AppError::Conflict(
            "Evaluate quiz must be completed before a certificate is issued".to_string(),
        ));
    }

    let holder = load_holder(conn, simulation.id).await?;

    let certificate_uuid = match find_attachment(conn, simulation.id, ATTACHMENT_CERTIFICATE).await? {
        Some(existing) => existing.uuid,
        None => Uuid::new_v4().to_string(),
    };
    let qrcode_uuid = match find_attachment(conn, simulation.id, ATTACHMENT_QRCODE).await? {
        Some(existing) => existing.uuid,
        None => Uuid::new_v4().to_string(),
    };

    let verify_url = verification_url(config, &certificate_uuid);

    // Paths follow the attachment UUIDs, so renames overwrite the same files.
    let qr_path = format!("qrcode/qrcode-{}.png", qrcode_uuid);
    write_media(&config.media_root, &qr_path, &render_qr_png(&verify_url)?).await?;

    let template = match &config.certificate_template {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => DEFAULT_TEMPLATE.to_string(),
    };
    let fields = CertificateFields {
        learner_name: holder.learner_name.clone(),
        course_name: holder.course_label.clone(),
        score: format!("{:.0}", evaluate.percentage),
        issued_at: Utc::now().format("%d %B %Y").to_string(),
    };
    let document = render_certificate(&template, &fields, &render_qr_svg(&verify_url)?);

    let certificate_path = format!("certificate/certificate-{}.svg", certificate_uuid);
    write_media(&config.media_root, &certificate_path, document.as_bytes()).await?;

    let qrcode = upsert_attachment(conn, &qrcode_uuid, simulation.id, ATTACHMENT_QRCODE, &qr_path)
        .await?;
    let certificate = upsert_attachment(
        conn,
        &certificate_uuid,
        simulation.id,
        ATTACHMENT_CERTIFICATE,
        &certificate_path,
    )
    .await?;

    tracing::info!(
        simulation_id = simulation.id,
        uuid = %certificate.uuid,
        score = evaluate.percentage,
        "Certificate generated"
    );

    Ok(CertificateResponse {
        uuid: certificate.uuid,
        simulation_id: simulation.id,
        learner_name: holder.learner_name,
        course_label: holder.course_label,
        score: evaluate.percentage,
        certificate_url: media_url(config, &certificate.file_path),
        qrcode_url: Some(media_url(config, &qrcode.file_path)),
        issued_at: certificate.updated_at,
    })
}

/// Public certificate lookup by the UUID encoded in its QR code.
pub async fn find_by_uuid(
    conn: &mut SqliteConnection,
    config: &Config,
    uuid: &str,
) -> Result<CertificateResponse, AppError> {
    let certificate = sqlx::query_as::<_, SimulationAttachment>(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM simulation_attachments
         WHERE uuid = ? AND identifier = ?"
    ))
    .bind(uuid)
    .bind(ATTACHMENT_CERTIFICATE)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Certificate not found".to_string()))?;

    let holder = load_holder(conn, certificate.simulation_id).await?;
    let evaluate =
        scoring::position_score(conn, certificate.simulation_id, Position::Evaluate).await?;
    let qrcode = find_attachment(conn, certificate.simulation_id, ATTACHMENT_QRCODE).await?;

    Ok(CertificateResponse {
        uuid: certificate.uuid,
        simulation_id: certificate.simulation_id,
        learner_name: holder.learner_name,
        course_label: holder.course_label,
        score: evaluate.percentage,
        certificate_url: media_url(config, &certificate.file_path),
        qrcode_url: qrcode.map(|q| media_url(config, &q.file_path)),
        issued_at: certificate.updated_at,
    })
}
