// src/models/simulation.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::quiz::{PublicChoice, Question};

pub const ATTACHMENT_CERTIFICATE: &str = "certificate";
pub const ATTACHMENT_QRCODE: &str = "qrcode";

/// One attempt of a learner through a course session.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Simulation {
    pub id: i64,
    pub learner_id: i64,
    pub enroll_id: i64,
    pub enroll_session_id: i64,
    pub course_id: i64,
    pub repeat_number: i64,
    pub is_done: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SimulationChapter {
    pub id: i64,
    pub simulation_id: i64,
    pub chapter_id: i64,
    pub chapter_label: String,
    pub chapter_number: String,
    pub is_done: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SimulationQuiz {
    pub id: i64,
    pub simulation_id: i64,
    pub course_id: i64,
    pub course_quiz_id: i64,
    pub quiz_id: i64,
    pub is_done: bool,
}

/// A quiz slot as listed on a simulation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SimulationQuizView {
    pub simulation_quiz_id: i64,
    pub course_quiz_id: i64,
    pub quiz_id: i64,
    pub label: String,
    pub position: String,
    pub duration: i64,
    pub is_done: bool,
}

#[derive(Debug, Serialize, Default)]
pub struct QuizSlots {
    pub survey: Option<SimulationQuizView>,
    pub evaluate: Option<SimulationQuizView>,
}

#[derive(Debug, Serialize)]
pub struct SimulationDetail {
    #[serde(flatten)]
    pub simulation: Simulation,
    pub course_label: String,
    pub quiz: QuizSlots,
    pub chapters: Vec<SimulationChapter>,
}

/// A question of a simulation quiz, with the learner's current answer if any.
#[derive(Debug, Serialize)]
pub struct SimulationQuestion {
    pub sort: i64,
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<PublicChoice>,
    pub answer_id: Option<i64>,
    pub answer_choice_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SimulationListParams {
    pub enroll_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StartSimulationRequest {
    pub enroll_session_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerInput {
    pub question_id: i64,
    pub choice_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswersRequest {
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswersResponse {
    pub simulation_quiz_id: i64,
    pub saved: usize,
    pub answered: i64,
    pub total_questions: i64,
    pub is_done: bool,
}

/// Generated certificate or QR code file.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SimulationAttachment {
    pub id: i64,
    pub uuid: String,
    pub simulation_id: i64,
    pub identifier: String,
    pub file_path: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub uuid: String,
    pub simulation_id: i64,
    pub learner_name: String,
    pub course_label: String,
    pub score: f64,
    pub certificate_url: String,
    pub qrcode_url: Option<String>,
    pub issued_at: NaiveDateTime,
}
