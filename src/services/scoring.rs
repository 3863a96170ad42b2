// src/services/scoring.rs

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

use crate::models::quiz::Position;

/// Score of one quiz position (survey or evaluate) within a simulation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PositionScore {
    pub position: Position,
    pub total_questions: i64,
    pub answered: i64,
    pub true_answers: i64,
    pub percentage: f64,
    /// True once every slot of this position has been completed.
    pub is_done: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub simulation_id: i64,
    pub survey: PositionScore,
    pub evaluate: PositionScore,
}

#[derive(FromRow)]
struct SlotTotals {
    slot_count: i64,
    done_count: i64,
    total_questions: i64,
}

#[derive(FromRow)]
struct AnswerTotals {
    answered: i64,
    true_answers: i64,
}

/// 100 x true_answers / total_questions; a quiz without questions scores 0.
pub fn percentage(true_answers: i64, total_questions: i64) -> f64 {
    if total_questions <= 0 {
        return 0.0;
    }
    let raw = true_answers as f64 / total_questions as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Aggregates the answers of one position within a simulation.
pub async fn position_score(
    conn: &mut SqliteConnection,
    simulation_id: i64,
    position: Position,
) -> Result<PositionScore, sqlx::Error> {
    let slots = sqlx::query_as::<_, SlotTotals>(
        r#"
        SELECT
            COUNT(*) AS slot_count,
            COALESCE(SUM(slot.done), 0) AS done_count,
            COALESCE(SUM(slot.question_count), 0) AS total_questions
        FROM (
            SELECT
                CASE WHEN sq.is_done THEN 1 ELSE 0 END AS done,
                (SELECT COUNT(*) FROM quiz_questions qq WHERE qq.quiz_id = sq.quiz_id) AS question_count
            FROM simulation_quizzes sq
            JOIN course_quizzes cq ON cq.id = sq.course_quiz_id
            WHERE sq.simulation_id = ? AND cq.position = ?
        ) AS slot
        "#,
    )
    .bind(simulation_id)
    .bind(position.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let answers = sqlx::query_as::<_, AnswerTotals>(
        r#"
        SELECT
            COUNT(*) AS answered,
            COALESCE(SUM(CASE WHEN is_true THEN 1 ELSE 0 END), 0) AS true_answers
        FROM answers
        WHERE simulation_id = ? AND position = ?
        "#,
    )
    .bind(simulation_id)
    .bind(position.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(PositionScore {
        position,
        total_questions: slots.total_questions,
        answered: answers.answered,
        true_answers: answers.true_answers,
        percentage: percentage(answers.true_answers, slots.total_questions),
        is_done: slots.slot_count > 0 && slots.done_count == slots.slot_count,
    })
}

/// Survey and evaluate scores of a simulation.
pub async fn score(
    conn: &mut SqliteConnection,
    simulation_id: i64,
) -> Result<ScoreReport, sqlx::Error> {
    let survey = position_score(conn, simulation_id, Position::Survey).await?;
    let evaluate = position_score(conn, simulation_id, Position::Evaluate).await?;

    Ok(ScoreReport {
        simulation_id,
        survey,
        evaluate,
    })
}
