// src/handlers/instructor.rs
//
// Course and quiz authoring. Every route here sits behind
// `instructor_middleware`.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_foreign_key_violation, is_unique_violation},
    handlers::{
        auth::load_roles,
        catalog::{COURSE_COLUMNS, course_detail},
    },
    models::{
        course::{
            Category, Chapter, ChapterDetail, Course, CourseSession, CreateCategoryRequest,
            CreateChapterRequest, CreateCourseRequest, CreateSessionRequest, Material,
            UpdateChapterRequest, UpdateCourseRequest,
        },
        quiz::{
            AddQuizQuestionRequest, Choice, CourseQuiz, CreateCourseQuizRequest,
            CreateQuestionRequest, CreateQuizRequest, Question, QuestionWithChoices, Quiz,
            QuizQuestion, UpdateChoiceRequest, UpdateCourseQuizRequest,
        },
        user::ROLE_INSTRUCTOR,
    },
    services::lifecycle,
    utils::{html::clean_optional, jwt::Claims},
};

const CHOICE_COLUMNS: &str = "id, question_id, identifier, label, description, is_true";
const COURSE_QUIZ_COLUMNS: &str = "id, course_id, quiz_id, position, duration";

async fn question_with_choices(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<QuestionWithChoices, AppError> {
    let question = sqlx::query_as::<_, Question>(
        "SELECT id, label, description FROM questions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let choices = sqlx::query_as::<_, Choice>(&format!(
        "SELECT {CHOICE_COLUMNS} FROM choices WHERE question_id = ? ORDER BY identifier"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(QuestionWithChoices { question, choices })
}

pub async fn create_category(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (creator_id, label, description) VALUES (?, ?, ?)
         RETURNING id, label, description, created_at",
    )
    .bind(claims.user_id()?)
    .bind(&payload.label)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create category: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Creates a course owned by the calling instructor.
pub async fn create_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = sqlx::query_as::<_, Course>(&format!(
        "INSERT INTO courses (creator_id, category_id, label, description, cover, is_active)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(claims.user_id()?)
    .bind(payload.category_id)
    .bind(&payload.label)
    .bind(clean_optional(payload.description.clone()))
    .bind(&payload.cover)
    .bind(payload.is_active.unwrap_or(true))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::BadRequest("Category not found".to_string())
        } else {
            tracing::error!("Failed to create course: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    tracing::info!(course_id = course.id, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

/// Updates a course. Omitted fields are left untouched.
pub async fn update_course(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.label.is_none()
        && payload.description.is_none()
        && payload.cover.is_none()
        && payload.category_id.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE courses SET ");
    let mut separated = builder.separated(", ");

    if let Some(label) = payload.label {
        separated.push("label = ");
        separated.push_bind_unseparated(label);
    }

    if let Some(description) = clean_optional(payload.description) {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(cover) = payload.cover {
        separated.push("cover = ");
        separated.push_bind_unseparated(cover);
    }

    if let Some(category_id) = payload.category_id {
        separated.push("category_id = ");
        separated.push_bind_unseparated(category_id);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::BadRequest("Category not found".to_string())
        } else {
            tracing::error!("Failed to update course: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Full course view including inactive courses.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    Ok(Json(course_detail(&mut conn, id).await?))
}

pub async fn create_session(
    State(pool): State<SqlitePool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let session = sqlx::query_as::<_, CourseSession>(
        "INSERT INTO course_sessions (course_id, start_date, end_date) VALUES (?, ?, ?)
         RETURNING id, course_id, start_date, end_date",
    )
    .bind(course_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::NotFound("Course not found".to_string())
        } else {
            tracing::error!("Failed to create session: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Creates a chapter, optionally with its first material.
pub async fn create_chapter(
    State(pool): State<SqlitePool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let chapter = sqlx::query_as::<_, Chapter>(
        "INSERT INTO chapters (course_id, label, number) VALUES (?, ?, ?)
         RETURNING id, course_id, label, number",
    )
    .bind(course_id)
    .bind(&payload.label)
    .bind(&payload.number)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            AppError::NotFound("Course not found".to_string())
        } else {
            tracing::error!("Failed to create chapter: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let mut materials = Vec::new();
    if let Some(material) = payload.material {
        let created = sqlx::query_as::<_, Material>(
            "INSERT INTO materials (course_id, chapter_id, type, media, text) VALUES (?, ?, ?, ?, ?)
             RETURNING id, chapter_id, type, media, text",
        )
        .bind(course_id)
        .bind(chapter.id)
        .bind(&material.material_type)
        .bind(&material.media)
        .bind(clean_optional(material.text))
        .fetch_one(&mut *tx)
        .await?;
        materials.push(created);
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(ChapterDetail { chapter, materials })))
}

pub async fn update_chapter(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let chapter = sqlx::query_as::<_, Chapter>(
        "UPDATE chapters SET
             label = COALESCE(?, label),
             number = COALESCE(?, number)
         WHERE id = ?
         RETURNING id, course_id, label, number",
    )
    .bind(&payload.label)
    .bind(&payload.number)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    Ok(Json(chapter))
}

pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let quiz = sqlx::query_as::<_, Quiz>(
        "INSERT INTO quizzes (creator_id, label) VALUES (?, ?) RETURNING id, label",
    )
    .bind(claims.user_id()?)
    .bind(&payload.label)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Quiz with its ordered questions and their choices.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let quiz = sqlx::query_as::<_, Quiz>("SELECT id, label FROM quizzes WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let question_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT question_id FROM quiz_questions WHERE quiz_id = ? ORDER BY sort, id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let mut questions = Vec::with_capacity(question_ids.len());
    for question_id in question_ids {
        questions.push(question_with_choices(&mut conn, question_id).await?);
    }

    Ok(Json(json!({
        "id": quiz.id,
        "label": quiz.label,
        "questions": questions,
    })))
}

/// Creates a question with its choices, optionally appending it to a quiz.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let question_id: i64 = sqlx::query_scalar(
        "INSERT INTO questions (creator_id, label, description) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(claims.user_id()?)
    .bind(&payload.label)
    .bind(clean_optional(payload.description.clone()))
    .fetch_one(&mut *tx)
    .await?;

    for choice in &payload.choices {
        sqlx::query(
            "INSERT INTO choices (question_id, identifier, label, description, is_true)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(&choice.identifier)
        .bind(&choice.label)
        .bind(&choice.description)
        .bind(choice.is_true)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(quiz_id) = payload.quiz_id {
        let sort = match payload.sort {
            Some(sort) => sort,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COALESCE(MAX(sort), 0) + 1 FROM quiz_questions WHERE quiz_id = ?",
                )
                .bind(quiz_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        sqlx::query("INSERT INTO quiz_questions (quiz_id, question_id, sort) VALUES (?, ?, ?)")
            .bind(quiz_id)
            .bind(question_id)
            .bind(sort)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::NotFound("Quiz not found".to_string())
                } else {
                    AppError::from(e)
                }
            })?;
    }

    let created = question_with_choices(&mut tx, question_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    Ok(Json(question_with_choices(&mut conn, id).await?))
}

/// Edits a choice.
///
/// Marking a choice true clears its siblings so the question keeps exactly
/// one true choice. Cached answer correctness is recomputed afterwards.
pub async fn update_choice(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Choice>(&format!(
        "SELECT {CHOICE_COLUMNS} FROM choices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Choice not found".to_string()))?;

    if payload.is_true == Some(false) && current.is_true {
        return Err(AppError::BadRequest(
            "A question must keep exactly one true choice; mark another choice true instead"
                .to_string(),
        ));
    }

    if payload.is_true == Some(true) && !current.is_true {
        sqlx::query("UPDATE choices SET is_true = (id = ?) WHERE question_id = ?")
            .bind(id)
            .bind(current.question_id)
            .execute(&mut *tx)
            .await?;
    }

    let updated = sqlx::query_as::<_, Choice>(&format!(
        "UPDATE choices SET
             label = COALESCE(?, label),
             description = COALESCE(?, description)
         WHERE id = ?
         RETURNING {CHOICE_COLUMNS}"
    ))
    .bind(&payload.label)
    .bind(&payload.description)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let resynced = lifecycle::resync_answers_for_question(&mut tx, current.question_id).await?;
    tx.commit().await?;

    tracing::info!(choice_id = id, resynced, "Choice updated");

    Ok(Json(updated))
}

/// Attaches an existing question to a quiz.
pub async fn add_quiz_question(
    State(pool): State<SqlitePool>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<AddQuizQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let link = sqlx::query_as::<_, QuizQuestion>(
        "INSERT INTO quiz_questions (quiz_id, question_id, sort) VALUES (?, ?, ?)
         RETURNING id, quiz_id, question_id, sort",
    )
    .bind(quiz_id)
    .bind(payload.question_id)
    .bind(payload.sort)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Question is already part of this quiz".to_string())
        } else if is_foreign_key_violation(&e) {
            AppError::NotFound("Quiz or question not found".to_string())
        } else {
            tracing::error!("Failed to add quiz question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(link)))
}

/// Places a quiz on a course as its survey or evaluate quiz.
pub async fn create_course_quiz(
    State(pool): State<SqlitePool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateCourseQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course_quiz = sqlx::query_as::<_, CourseQuiz>(&format!(
        "INSERT INTO course_quizzes (course_id, quiz_id, position, duration) VALUES (?, ?, ?, ?)
         RETURNING {COURSE_QUIZ_COLUMNS}"
    ))
    .bind(course_id)
    .bind(payload.quiz_id)
    .bind(payload.position.as_str())
    .bind(payload.duration.unwrap_or(15))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!(
                "Quiz is already the {} quiz of this course",
                payload.position
            ))
        } else if is_foreign_key_violation(&e) {
            AppError::NotFound("Course or quiz not found".to_string())
        } else {
            tracing::error!("Failed to create course quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(course_quiz)))
}

/// Changes a course quiz's position or duration. Moving position updates
/// the cached position of every answer already given for it.
pub async fn update_course_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, CourseQuiz>(&format!(
        "SELECT {COURSE_QUIZ_COLUMNS} FROM course_quizzes WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Course quiz not found".to_string()))?;

    let updated = sqlx::query_as::<_, CourseQuiz>(&format!(
        "UPDATE course_quizzes SET
             position = COALESCE(?, position),
             duration = COALESCE(?, duration)
         WHERE id = ?
         RETURNING {COURSE_QUIZ_COLUMNS}"
    ))
    .bind(payload.position.map(|p| p.as_str()))
    .bind(payload.duration)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Quiz already occupies that position".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    if updated.position != current.position {
        let resynced = lifecycle::resync_answers_for_course_quiz(&mut tx, id).await?;
        tracing::info!(course_quiz_id = id, resynced, "Answer positions resynced");
    }

    tx.commit().await?;

    Ok(Json(updated))
}

/// Grants the instructor role to an existing user. The user has to log in
/// again for the new role to show up in their token.
pub async fn grant_instructor(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, identifier) VALUES (?, ?)")
        .bind(user_id)
        .bind(ROLE_INSTRUCTOR)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::NotFound("User not found".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    let roles = load_roles(&mut conn, user_id).await?;
    tracing::info!(user_id, granted_by = claims.user_id()?, "Instructor role granted");

    Ok(Json(json!({ "user_id": user_id, "roles": roles })))
}
