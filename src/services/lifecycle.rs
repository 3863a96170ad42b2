// src/services/lifecycle.rs
//
// Enrollment and simulation state transitions. Every function takes a
// connection so callers can run several steps inside one transaction.

use std::collections::HashMap;

use sqlx::{FromRow, SqliteConnection};

use crate::{
    error::AppError,
    models::{
        enroll::EnrollOutcome,
        quiz::{Choice, Position, PublicChoice, Question},
        simulation::{
            AnswerInput, QuizSlots, Simulation, SimulationChapter, SimulationDetail,
            SimulationQuestion, SimulationQuiz, SimulationQuizView, SubmitAnswersResponse,
        },
    },
};

pub const SIMULATION_COLUMNS: &str = "\
    id, learner_id, enroll_id, enroll_session_id, course_id, repeat_number, is_done, \
    created_at, updated_at";

#[derive(FromRow)]
struct EnrollSessionOwner {
    enroll_id: i64,
    learner_id: i64,
    course_id: i64,
}

#[derive(FromRow)]
struct QuestionRow {
    sort: i64,
    id: i64,
    label: String,
    description: Option<String>,
    answer_id: Option<i64>,
    answer_choice_id: Option<i64>,
}

/// Registers a learner for a course session.
///
/// The enroll and enroll-session rows are get-or-create. A new session
/// binding starts the learner's first simulation for it.
pub async fn enroll(
    conn: &mut SqliteConnection,
    learner_id: i64,
    course_id: i64,
    course_session_id: i64,
) -> Result<EnrollOutcome, AppError> {
    let is_active: bool = sqlx::query_scalar("SELECT is_active FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    if !is_active {
        return Err(AppError::BadRequest("Course is not available".to_string()));
    }

    let session_course: i64 =
        sqlx::query_scalar("SELECT course_id FROM course_sessions WHERE id = ?")
            .bind(course_session_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::NotFound("Course session not found".to_string()))?;

    if session_course != course_id {
        return Err(AppError::BadRequest(
            "Session does not belong to this course".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO enrolls (learner_id, course_id) VALUES (?, ?)
         ON CONFLICT(learner_id, course_id) DO NOTHING",
    )
    .bind(learner_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    let enroll_id: i64 =
        sqlx::query_scalar("SELECT id FROM enrolls WHERE learner_id = ? AND course_id = ?")
            .bind(learner_id)
            .bind(course_id)
            .fetch_one(&mut *conn)
            .await?;

    let inserted = sqlx::query(
        "INSERT INTO enroll_sessions (enroll_id, course_session_id) VALUES (?, ?)
         ON CONFLICT(enroll_id, course_session_id) DO NOTHING",
    )
    .bind(enroll_id)
    .bind(course_session_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let enroll_session_id: i64 = sqlx::query_scalar(
        "SELECT id FROM enroll_sessions WHERE enroll_id = ? AND course_session_id = ?",
    )
    .bind(enroll_id)
    .bind(course_session_id)
    .fetch_one(&mut *conn)
    .await?;

    let created = inserted > 0;
    let simulation_id = if created {
        start_simulation(conn, learner_id, enroll_session_id).await?.id
    } else {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM simulations
             WHERE learner_id = ? AND enroll_session_id = ?
             ORDER BY is_done ASC, id DESC
             LIMIT 1",
        )
        .bind(learner_id)
        .bind(enroll_session_id)
        .fetch_optional(&mut *conn)
        .await?;

        match latest {
            Some(id) => id,
            None => start_simulation(conn, learner_id, enroll_session_id).await?.id,
        }
    };

    tracing::info!(
        learner_id,
        enroll_id,
        enroll_session_id,
        simulation_id,
        created,
        "Learner enrolled"
    );

    Ok(EnrollOutcome {
        enroll_id,
        enroll_session_id,
        simulation_id,
        created,
    })
}

/// Starts a new attempt for (learner, enroll, session).
///
/// Any undone attempt for the same triple is closed first, so at most one
/// simulation stays active. `repeat_number` counts every attempt so far.
pub async fn start_simulation(
    conn: &mut SqliteConnection,
    learner_id: i64,
    enroll_session_id: i64,
) -> Result<Simulation, AppError> {
    let owner = sqlx::query_as::<_, EnrollSessionOwner>(
        r#"
        SELECT es.enroll_id, e.learner_id, e.course_id
        FROM enroll_sessions es
        JOIN enrolls e ON e.id = es.enroll_id
        WHERE es.id = ?
        "#,
    )
    .bind(enroll_session_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Enroll session not found".to_string()))?;

    if owner.learner_id != learner_id {
        return Err(AppError::Forbidden("Restricted!".to_string()));
    }

    let closed = sqlx::query(
        "UPDATE simulations SET is_done = 1, updated_at = CURRENT_TIMESTAMP
         WHERE learner_id = ? AND enroll_id = ? AND enroll_session_id = ? AND is_done = 0",
    )
    .bind(learner_id)
    .bind(owner.enroll_id)
    .bind(enroll_session_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let previous: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM simulations
         WHERE learner_id = ? AND enroll_id = ? AND enroll_session_id = ?",
    )
    .bind(learner_id)
    .bind(owner.enroll_id)
    .bind(enroll_session_id)
    .fetch_one(&mut *conn)
    .await?;

    let simulation = sqlx::query_as::<_, Simulation>(&format!(
        "INSERT INTO simulations (learner_id, enroll_id, enroll_session_id, course_id, repeat_number)
         VALUES (?, ?, ?, ?, ?)
         RETURNING {SIMULATION_COLUMNS}"
    ))
    .bind(learner_id)
    .bind(owner.enroll_id)
    .bind(enroll_session_id)
    .bind(owner.course_id)
    .bind(previous + 1)
    .fetch_one(&mut *conn)
    .await?;

    sync_slots(conn, &simulation).await?;

    tracing::info!(
        simulation_id = simulation.id,
        repeat_number = simulation.repeat_number,
        closed_previous = closed,
        "Simulation started"
    );

    Ok(simulation)
}

/// Materialises quiz slots and chapter flags for course content that the
/// simulation does not track yet.
pub async fn sync_slots(
    conn: &mut SqliteConnection,
    simulation: &Simulation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO simulation_quizzes (simulation_id, course_id, course_quiz_id, quiz_id)
         SELECT ?, course_id, id, quiz_id FROM course_quizzes WHERE course_id = ?",
    )
    .bind(simulation.id)
    .bind(simulation.course_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO simulation_chapters (simulation_id, course_id, chapter_id)
         SELECT ?, course_id, id FROM chapters WHERE course_id = ?",
    )
    .bind(simulation.id)
    .bind(simulation.course_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a simulation, checking that it belongs to the learner.
pub async fn load_owned_simulation(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_id: i64,
) -> Result<Simulation, AppError> {
    let simulation = sqlx::query_as::<_, Simulation>(&format!(
        "SELECT {SIMULATION_COLUMNS} FROM simulations WHERE id = ?"
    ))
    .bind(simulation_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Simulation not found".to_string()))?;

    if simulation.learner_id != learner_id {
        return Err(AppError::Forbidden("Restricted!".to_string()));
    }

    Ok(simulation)
}

/// Loads a quiz slot together with its simulation, checking ownership.
pub async fn load_owned_simulation_quiz(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_quiz_id: i64,
) -> Result<(SimulationQuiz, Simulation), AppError> {
    let slot = sqlx::query_as::<_, SimulationQuiz>(
        "SELECT id, simulation_id, course_id, course_quiz_id, quiz_id, is_done
         FROM simulation_quizzes WHERE id = ?",
    )
    .bind(simulation_quiz_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Simulation quiz not found".to_string()))?;

    let simulation = load_owned_simulation(conn, learner_id, slot.simulation_id).await?;
    Ok((slot, simulation))
}

pub async fn simulation_detail(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_id: i64,
) -> Result<SimulationDetail, AppError> {
    let simulation = load_owned_simulation(conn, learner_id, simulation_id).await?;

    if !simulation.is_done {
        sync_slots(conn, &simulation).await?;
    }

    let course_label: String = sqlx::query_scalar("SELECT label FROM courses WHERE id = ?")
        .bind(simulation.course_id)
        .fetch_one(&mut *conn)
        .await?;

    let slots = sqlx::query_as::<_, SimulationQuizView>(
        r#"
        SELECT
            sq.id AS simulation_quiz_id,
            sq.course_quiz_id,
            sq.quiz_id,
            q.label,
            cq.position,
            cq.duration,
            sq.is_done
        FROM simulation_quizzes sq
        JOIN course_quizzes cq ON cq.id = sq.course_quiz_id
        JOIN quizzes q ON q.id = sq.quiz_id
        WHERE sq.simulation_id = ?
        ORDER BY sq.id
        "#,
    )
    .bind(simulation.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut quiz = QuizSlots::default();
    for slot in slots {
        match slot.position.parse::<Position>() {
            Ok(Position::Survey) if quiz.survey.is_none() => quiz.survey = Some(slot),
            Ok(Position::Evaluate) if quiz.evaluate.is_none() => quiz.evaluate = Some(slot),
            _ => {}
        }
    }

    let chapters = sqlx::query_as::<_, SimulationChapter>(
        r#"
        SELECT
            sc.id,
            sc.simulation_id,
            sc.chapter_id,
            c.label AS chapter_label,
            c.number AS chapter_number,
            sc.is_done
        FROM simulation_chapters sc
        JOIN chapters c ON c.id = sc.chapter_id
        WHERE sc.simulation_id = ?
        ORDER BY c.number, c.id
        "#,
    )
    .bind(simulation.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SimulationDetail {
        simulation,
        course_label,
        quiz,
        chapters,
    })
}

/// Flags a chapter as read within a running simulation.
pub async fn mark_chapter_done(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_id: i64,
    chapter_id: i64,
) -> Result<(), AppError> {
    let simulation = load_owned_simulation(conn, learner_id, simulation_id).await?;
    if simulation.is_done {
        return Err(AppError::Conflict("Simulation is already done".to_string()));
    }

    let chapter_course: i64 = sqlx::query_scalar("SELECT course_id FROM chapters WHERE id = ?")
        .bind(chapter_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    if chapter_course != simulation.course_id {
        return Err(AppError::BadRequest(
            "Chapter does not belong to this course".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO simulation_chapters (simulation_id, course_id, chapter_id, is_done)
         VALUES (?, ?, ?, 1)
         ON CONFLICT(simulation_id, chapter_id) DO UPDATE SET is_done = 1",
    )
    .bind(simulation.id)
    .bind(simulation.course_id)
    .bind(chapter_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Questions of a quiz slot in display order, with the learner's answers.
pub async fn quiz_questions(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_quiz_id: i64,
) -> Result<Vec<SimulationQuestion>, AppError> {
    let (slot, _) = load_owned_simulation_quiz(conn, learner_id, simulation_quiz_id).await?;

    let rows = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT
            qq.sort,
            q.id,
            q.label,
            q.description,
            a.id AS answer_id,
            a.choice_id AS answer_choice_id
        FROM quiz_questions qq
        JOIN questions q ON q.id = qq.question_id
        LEFT JOIN answers a ON a.simulation_quiz_id = ? AND a.question_id = q.id
        WHERE qq.quiz_id = ?
        ORDER BY qq.sort, qq.id
        "#,
    )
    .bind(slot.id)
    .bind(slot.quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    let choices = sqlx::query_as::<_, Choice>(
        r#"
        SELECT c.id, c.question_id, c.identifier, c.label, c.description, c.is_true
        FROM choices c
        JOIN quiz_questions qq ON qq.question_id = c.question_id
        WHERE qq.quiz_id = ?
        ORDER BY c.identifier
        "#,
    )
    .bind(slot.quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<i64, Vec<PublicChoice>> = HashMap::new();
    for choice in choices {
        by_question
            .entry(choice.question_id)
            .or_default()
            .push(PublicChoice::from(choice));
    }

    Ok(rows
        .into_iter()
        .map(|row| SimulationQuestion {
            sort: row.sort,
            choices: by_question.remove(&row.id).unwrap_or_default(),
            question: Question {
                id: row.id,
                label: row.label,
                description: row.description,
            },
            answer_id: row.answer_id,
            answer_choice_id: row.answer_choice_id,
        })
        .collect())
}

/// Records answers for a quiz slot.
///
/// Each answer caches the chosen choice's `is_true` and the slot's position.
/// Re-answering a question replaces the previous answer, also after the slot
/// is done, until the simulation is finished. The slot is marked done once
/// every question of its quiz has an answer.
pub async fn submit_answers(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_quiz_id: i64,
    answers: &[AnswerInput],
) -> Result<SubmitAnswersResponse, AppError> {
    if answers.is_empty() {
        return Err(AppError::BadRequest("No answers submitted".to_string()));
    }

    let (slot, simulation) =
        load_owned_simulation_quiz(conn, learner_id, simulation_quiz_id).await?;

    if simulation.is_done {
        return Err(AppError::Conflict("Simulation is already done".to_string()));
    }

    let position: String = sqlx::query_scalar("SELECT position FROM course_quizzes WHERE id = ?")
        .bind(slot.course_quiz_id)
        .fetch_one(&mut *conn)
        .await?;

    for input in answers {
        let in_quiz: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM quiz_questions WHERE quiz_id = ? AND question_id = ?",
        )
        .bind(slot.quiz_id)
        .bind(input.question_id)
        .fetch_optional(&mut *conn)
        .await?;

        if in_quiz.is_none() {
            return Err(AppError::BadRequest(format!(
                "Question {} is not part of this quiz",
                input.question_id
            )));
        }

        let is_true: bool =
            sqlx::query_scalar("SELECT is_true FROM choices WHERE id = ? AND question_id = ?")
                .bind(input.choice_id)
                .bind(input.question_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Choice {} does not belong to question {}",
                        input.choice_id, input.question_id
                    ))
                })?;

        sqlx::query(
            r#"
            INSERT INTO answers (
                learner_id, simulation_id, simulation_quiz_id, course_id, course_quiz_id,
                quiz_id, question_id, choice_id, position, is_true
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(simulation_quiz_id, question_id) DO UPDATE SET
                choice_id = excluded.choice_id,
                position = excluded.position,
                is_true = excluded.is_true,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(learner_id)
        .bind(simulation.id)
        .bind(slot.id)
        .bind(slot.course_id)
        .bind(slot.course_quiz_id)
        .bind(slot.quiz_id)
        .bind(input.question_id)
        .bind(input.choice_id)
        .bind(&position)
        .bind(is_true)
        .execute(&mut *conn)
        .await?;
    }

    let answered: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE simulation_quiz_id = ?")
            .bind(slot.id)
            .fetch_one(&mut *conn)
            .await?;

    let total_questions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM quiz_questions WHERE quiz_id = ?")
            .bind(slot.quiz_id)
            .fetch_one(&mut *conn)
            .await?;

    let is_done = total_questions > 0 && answered >= total_questions;
    if is_done {
        sqlx::query("UPDATE simulation_quizzes SET is_done = 1 WHERE id = ?")
            .bind(slot.id)
            .execute(&mut *conn)
            .await?;
        tracing::info!(simulation_quiz_id = slot.id, %position, "Quiz slot completed");
    }

    Ok(SubmitAnswersResponse {
        simulation_quiz_id: slot.id,
        saved: answers.len(),
        answered,
        total_questions,
        is_done,
    })
}

/// Closes a simulation once every quiz slot is done.
pub async fn finish_simulation(
    conn: &mut SqliteConnection,
    learner_id: i64,
    simulation_id: i64,
) -> Result<Simulation, AppError> {
    let simulation = load_owned_simulation(conn, learner_id, simulation_id).await?;
    if simulation.is_done {
        return Err(AppError::Conflict("Simulation is already done".to_string()));
    }

    sync_slots(conn, &simulation).await?;

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM simulation_quizzes WHERE simulation_id = ? AND is_done = 0",
    )
    .bind(simulation.id)
    .fetch_one(&mut *conn)
    .await?;

    if pending > 0 {
        return Err(AppError::Conflict(format!(
            "{} quiz(zes) must be completed first",
            pending
        )));
    }

    let finished = sqlx::query_as::<_, Simulation>(&format!(
        "UPDATE simulations SET is_done = 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?
         RETURNING {SIMULATION_COLUMNS}"
    ))
    .bind(simulation.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(finished)
}

/// Re-derives cached `answers.is_true` after the choices of a question changed.
pub async fn resync_answers_for_question(
    conn: &mut SqliteConnection,
    question_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE answers
         SET is_true = (SELECT c.is_true FROM choices c WHERE c.id = answers.choice_id),
             updated_at = CURRENT_TIMESTAMP
         WHERE question_id = ?",
    )
    .bind(question_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Re-derives cached `answers.position` after a course quiz moved slot.
pub async fn resync_answers_for_course_quiz(
    conn: &mut SqliteConnection,
    course_quiz_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE answers
         SET position = (SELECT cq.position FROM course_quizzes cq WHERE cq.id = answers.course_quiz_id),
             updated_at = CURRENT_TIMESTAMP
         WHERE course_quiz_id = ?",
    )
    .bind(course_quiz_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
