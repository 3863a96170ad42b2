// src/models/enroll.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A learner's course-level registration, unique per (learner, course).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Enroll {
    pub id: i64,
    pub learner_id: i64,
    pub course_id: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct EnrollSessionView {
    pub id: i64,
    pub course_session_id: i64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub active_simulation_id: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct EnrollListItem {
    pub id: i64,
    pub course_id: i64,
    pub course_label: String,
    pub created_at: NaiveDateTime,
    pub session_count: i64,
}

#[derive(Debug, Serialize)]
pub struct EnrollDetail {
    pub id: i64,
    pub course_id: i64,
    pub course_label: String,
    pub created_at: NaiveDateTime,
    pub sessions: Vec<EnrollSessionView>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEnrollRequest {
    pub course_id: i64,
    pub course_session_id: i64,
}

/// Result of an enroll call: ids of everything that now exists.
#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    pub enroll_id: i64,
    pub enroll_session_id: i64,
    pub simulation_id: i64,
    /// False when the learner was already bound to this session.
    pub created: bool,
}
