// src/models/course.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::{Validate, ValidationError};

pub const MATERIAL_MEDIA: &str = "media";
pub const MATERIAL_TEXT: &str = "text";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Course {
    pub id: i64,
    pub creator_id: Option<i64>,
    pub category_id: Option<i64>,
    pub label: String,
    pub description: Option<String>,
    /// URL of the cover image.
    pub cover: Option<String>,
    /// Available for public or not.
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// A course row annotated with the caller's enrollment state.
#[derive(Debug, Serialize, FromRow)]
pub struct CourseListItem {
    pub id: i64,
    pub category_id: Option<i64>,
    pub label: String,
    pub cover: Option<String>,
    pub created_at: NaiveDateTime,
    pub session_count: i64,
    pub enroll_id: Option<i64>,
    pub is_enrolled: bool,
    pub active_simulation_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CourseSession {
    pub id: i64,
    pub course_id: i64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chapter {
    pub id: i64,
    pub course_id: i64,
    pub label: String,
    /// Display number, e.g. "1" or "2.a".
    pub number: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Material {
    pub id: i64,
    pub chapter_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub material_type: String,
    pub media: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChapterDetail {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub materials: Vec<Material>,
}

/// Full course view: sessions, chapters and quiz slots.
#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub sessions: Vec<CourseSession>,
    pub chapters: Vec<ChapterDetail>,
    pub quizzes: Vec<crate::models::quiz::CourseQuizView>,
}

/// Query parameters for the learner course catalog.
#[derive(Debug, Deserialize)]
pub struct CourseListParams {
    /// Substring of the course label.
    pub keyword: Option<String>,
    pub category_id: Option<i64>,
    /// Only courses with a session starting in this date's month, on or after it.
    pub start_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub cover: Option<String>,
    pub category_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: Option<String>,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub cover: Option<String>,
    pub category_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_session_range))]
pub struct CreateSessionRequest {
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialRequest {
    #[serde(rename = "type")]
    #[validate(custom(function = validate_material_type))]
    pub material_type: String,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub media: Option<String>,
    #[validate(length(max = 100000))]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChapterRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(min = 1, max = 15))]
    pub number: String,
    #[validate(nested)]
    pub material: Option<CreateMaterialRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChapterRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: Option<String>,
    #[validate(length(min = 1, max = 15))]
    pub number: Option<String>,
}

fn validate_url_string(url: &str) -> Result<(), ValidationError> {
    if Url::parse(url).is_err() {
        return Err(ValidationError::new("invalid_url"));
    }
    Ok(())
}

fn validate_material_type(value: &str) -> Result<(), ValidationError> {
    match value {
        MATERIAL_MEDIA | MATERIAL_TEXT => Ok(()),
        _ => Err(ValidationError::new("invalid_material_type")),
    }
}

fn validate_session_range(req: &CreateSessionRequest) -> Result<(), ValidationError> {
    if req.end_date <= req.start_date {
        return Err(ValidationError::new("end_before_start"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_session_range() {
        let ok = CreateSessionRequest { start_date: at(1), end_date: at(5) };
        assert!(ok.validate().is_ok());

        let inverted = CreateSessionRequest { start_date: at(5), end_date: at(1) };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_cover_must_be_url() {
        let req = CreateCourseRequest {
            label: "Rust".to_string(),
            description: None,
            cover: Some("not a url".to_string()),
            category_id: None,
            is_active: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_material_type() {
        let req = CreateMaterialRequest {
            material_type: "video".to_string(),
            media: None,
            text: None,
        };
        assert!(req.validate().is_err());
    }
}
