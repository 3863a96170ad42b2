// src/handlers/catalog.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{
        course::{
            Category, Chapter, ChapterDetail, Course, CourseDetail, CourseListItem,
            CourseListParams, CourseSession, Material,
        },
        quiz::{CourseQuizParams, CourseQuizView},
        user::ROLE_INSTRUCTOR,
    },
    utils::jwt::Claims,
};

pub const COURSE_COLUMNS: &str =
    "id, creator_id, category_id, label, description, cover, is_active, created_at";

/// First instant of `date` and first instant of the following month.
fn month_window(date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let start = date.and_hms_opt(0, 0, 0)?;
    let end = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    Some((start, end))
}

pub async fn load_course(conn: &mut SqliteConnection, id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))
}

pub async fn load_course_quizzes(
    conn: &mut SqliteConnection,
    course_id: i64,
    position: Option<&str>,
) -> Result<Vec<CourseQuizView>, sqlx::Error> {
    sqlx::query_as::<_, CourseQuizView>(
        r#"
        SELECT
            cq.id,
            cq.course_id,
            cq.quiz_id,
            q.label AS quiz_label,
            cq.position,
            cq.duration,
            (SELECT COUNT(*) FROM quiz_questions qq WHERE qq.quiz_id = cq.quiz_id) AS question_count
        FROM course_quizzes cq
        JOIN quizzes q ON q.id = cq.quiz_id
        WHERE cq.course_id = ? AND (? IS NULL OR cq.position = ?)
        ORDER BY cq.position DESC, cq.id
        "#,
    )
    .bind(course_id)
    .bind(position)
    .bind(position)
    .fetch_all(&mut *conn)
    .await
}

pub async fn load_chapters(
    conn: &mut SqliteConnection,
    course_id: i64,
) -> Result<Vec<ChapterDetail>, sqlx::Error> {
    let chapters = sqlx::query_as::<_, Chapter>(
        "SELECT id, course_id, label, number FROM chapters WHERE course_id = ? ORDER BY number, id",
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    let materials = sqlx::query_as::<_, Material>(
        "SELECT id, chapter_id, type, media, text FROM materials WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_chapter: HashMap<i64, Vec<Material>> = HashMap::new();
    for material in materials {
        by_chapter.entry(material.chapter_id).or_default().push(material);
    }

    Ok(chapters
        .into_iter()
        .map(|chapter| ChapterDetail {
            materials: by_chapter.remove(&chapter.id).unwrap_or_default(),
            chapter,
        })
        .collect())
}

/// Course with sessions, chapters (and materials) and quiz slots.
pub async fn course_detail(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<CourseDetail, AppError> {
    let course = load_course(conn, id).await?;

    let sessions = sqlx::query_as::<_, CourseSession>(
        "SELECT id, course_id, start_date, end_date FROM course_sessions
         WHERE course_id = ? ORDER BY start_date",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let chapters = load_chapters(conn, id).await?;
    let quizzes = load_course_quizzes(conn, id, None).await?;

    Ok(CourseDetail {
        course,
        sessions,
        chapters,
        quizzes,
    })
}

pub async fn list_categories(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, label, description, created_at FROM categories ORDER BY label",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(categories))
}

/// Lists active courses that have at least one session, annotated with the
/// caller's enrollment and active simulation.
pub async fn list_courses(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let window = match params.start_date {
        Some(date) => Some(
            month_window(date).ok_or(AppError::BadRequest("Invalid start_date".to_string()))?,
        ),
        None => None,
    };
    let (window_start, window_end) = window.unzip();
    let keyword = params.keyword.as_ref().map(|k| format!("%{}%", k));

    let courses = sqlx::query_as::<_, CourseListItem>(
        r#"
        SELECT * FROM (
            SELECT
                c.id,
                c.category_id,
                c.label,
                c.cover,
                c.created_at,
                (SELECT COUNT(*) FROM course_sessions s
                  WHERE s.course_id = c.id
                    AND (? IS NULL OR (s.start_date >= ? AND s.start_date < ?))) AS session_count,
                (SELECT e.id FROM enrolls e
                  WHERE e.course_id = c.id AND e.learner_id = ?) AS enroll_id,
                EXISTS(SELECT 1 FROM enrolls e
                  WHERE e.course_id = c.id AND e.learner_id = ?) AS is_enrolled,
                (SELECT sim.id FROM simulations sim
                  WHERE sim.course_id = c.id AND sim.learner_id = ? AND sim.is_done = 0
                  ORDER BY sim.id DESC LIMIT 1) AS active_simulation_id
            FROM courses c
            WHERE c.is_active = 1
              AND (? IS NULL OR c.label LIKE ?)
              AND (? IS NULL OR c.category_id = ?)
        ) AS listed
        WHERE session_count > 0
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(window_start)
    .bind(window_start)
    .bind(window_end)
    .bind(learner_id)
    .bind(learner_id)
    .bind(learner_id)
    .bind(&keyword)
    .bind(&keyword)
    .bind(params.category_id)
    .bind(params.category_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list courses: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(courses))
}

/// Retrieves a single course. Inactive courses are only visible to instructors.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let detail = course_detail(&mut conn, id).await?;

    if !detail.course.is_active && !claims.has_role(ROLE_INSTRUCTOR) {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(Json(detail))
}

pub async fn list_chapters(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    load_course(&mut conn, id).await?;
    let chapters = load_chapters(&mut conn, id).await?;

    Ok(Json(chapters))
}

/// Quiz slots of a course, optionally filtered by position.
pub async fn list_course_quizzes(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Query(params): Query<CourseQuizParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    load_course(&mut conn, id).await?;
    let quizzes =
        load_course_quizzes(&mut conn, id, params.position.map(|p| p.as_str())).await?;

    Ok(Json(quizzes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_window_mid_month() {
        let (start, end) = month_window(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()).unwrap();
        assert_eq!(start.to_string(), "2025-03-10 00:00:00");
        assert_eq!(end.to_string(), "2025-04-01 00:00:00");
    }

    #[test]
    fn test_month_window_december_rolls_year() {
        let (_, end) = month_window(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()).unwrap();
        assert_eq!(end.to_string(), "2025-01-01 00:00:00");
    }
}
