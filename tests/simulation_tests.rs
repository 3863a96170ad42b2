// tests/simulation_tests.rs

mod common;

use academy::error::is_unique_violation;
use common::{enroll, seed_course, slot_ids, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn full_course_flow_issues_certificate() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;

    let learner = app.register_and_login("leo").await;
    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (survey_slot, evaluate_slot) = slot_ids(&app, &learner, simulation_id).await;

    // Learners never see which choice is true.
    let questions: Value = app
        .get(&learner, &format!("/api/simulation-quizzes/{}/questions", survey_slot))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(questions.as_array().unwrap().len(), 2);
    assert_eq!(questions[0]["choices"].as_array().unwrap().len(), 3);
    assert!(questions[0]["choices"][0].get("is_true").is_none());
    assert!(questions[0]["answer_id"].is_null());

    // Survey: one right, one wrong.
    let response = app
        .post(
            &learner,
            &format!("/api/simulation-quizzes/{}/answers", survey_slot),
            json!({ "answers": [
                { "question_id": seeded.survey[0].0, "choice_id": seeded.survey[0].1 },
                { "question_id": seeded.survey[1].0, "choice_id": seeded.survey[1].2 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["is_done"], true);
    assert_eq!(body["answered"], 2);

    // Certificate needs the evaluate quiz first.
    let response = app
        .post(&learner, &format!("/api/simulations/{}/certificate", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .put(
            &learner,
            &format!("/api/simulations/{}/chapters/{}", simulation_id, seeded.chapter_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["chapters"][0]["is_done"], true);

    // Evaluate: both right, answered one at a time.
    for (question_id, true_choice, _) in &seeded.evaluate {
        let response = app
            .post(
                &learner,
                &format!("/api/simulation-quizzes/{}/answers", evaluate_slot),
                json!({ "answers": [{ "question_id": question_id, "choice_id": true_choice }] }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["percentage"], 50.0);
    assert_eq!(score["survey"]["true_answers"], 1);
    assert_eq!(score["evaluate"]["percentage"], 100.0);
    assert_eq!(score["evaluate"]["is_done"], true);

    let response = app
        .post(&learner, &format!("/api/simulations/{}/certificate", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let certificate: Value = response.json().await.unwrap();
    let uuid = certificate["uuid"].as_str().unwrap().to_string();
    assert_eq!(certificate["learner_name"], "leo Tester");
    assert_eq!(certificate["score"], 100.0);

    // The rendered file is served under /media.
    let certificate_url = certificate["certificate_url"].as_str().unwrap();
    let response = app.client.get(certificate_url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let svg = response.text().await.unwrap();
    // Text fields are entity-encoded.
    assert!(svg.contains("leo&#32;Tester"));
    assert!(svg.contains("Rust&#32;101"));

    let qrcode_url = certificate["qrcode_url"].as_str().unwrap();
    let response = app.client.get(qrcode_url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Regenerating keeps the UUID so printed QR codes stay valid.
    let again: Value = app
        .post(&learner, &format!("/api/simulations/{}/certificate", simulation_id), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["uuid"], uuid.as_str());

    // Public verification, no token.
    let response = app
        .client
        .get(app.url(&format!("/api/certificates/{}", uuid)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let verified: Value = response.json().await.unwrap();
    assert_eq!(verified["course_label"], "Rust 101");
    assert_eq!(verified["simulation_id"], simulation_id);

    let response = app
        .client
        .get(app.url("/api/certificates/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // Finishing closes the simulation; further answers are rejected.
    let response = app
        .post(&learner, &format!("/api/simulations/{}/finish", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let finished: Value = response.json().await.unwrap();
    assert_eq!(finished["is_done"], true);

    let response = app
        .post(
            &learner,
            &format!("/api/simulation-quizzes/{}/answers", survey_slot),
            json!({ "answers": [
                { "question_id": seeded.survey[1].0, "choice_id": seeded.survey[1].1 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn reenrolling_returns_existing_simulation() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (enroll_id, _, simulation_id) = enroll(&app, &learner, &seeded).await;

    let response = app
        .post(
            &learner,
            "/api/enrolls",
            json!({ "course_id": seeded.course_id, "course_session_id": seeded.session_id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["created"], false);
    assert_eq!(body["enroll_id"], enroll_id);
    assert_eq!(body["simulation_id"], simulation_id);

    let enrolls: Value = app.get(&learner, "/api/enrolls").await.json().await.unwrap();
    assert_eq!(enrolls.as_array().unwrap().len(), 1);
    assert_eq!(enrolls[0]["session_count"], 1);
}

#[tokio::test]
async fn new_simulation_closes_the_running_one() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (enroll_id, enroll_session_id, first_id) = enroll(&app, &learner, &seeded).await;

    let response = app
        .post(&learner, "/api/simulations", json!({ "enroll_session_id": enroll_session_id }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let second: Value = response.json().await.unwrap();
    let second_id = second["id"].as_i64().unwrap();
    assert_ne!(second_id, first_id);
    assert_eq!(second["repeat_number"], 2);
    assert_eq!(second["is_done"], false);
    assert!(second["quiz"]["survey"]["simulation_quiz_id"].is_i64());

    let first: Value = app
        .get(&learner, &format!("/api/simulations/{}", first_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["is_done"], true);

    let simulations: Value = app
        .get(&learner, &format!("/api/simulations?enroll_id={}", enroll_id))
        .await
        .json()
        .await
        .unwrap();
    let active: Vec<&Value> = simulations
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["is_done"] == false)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], second_id);

    let detail: Value = app
        .get(&learner, &format!("/api/enrolls/{}", enroll_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["sessions"][0]["active_simulation_id"], second_id);
}

#[tokio::test]
async fn simulations_are_private_to_their_learner() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;

    let owner = app.register_and_login("leo").await;
    let (enroll_id, enroll_session_id, simulation_id) = enroll(&app, &owner, &seeded).await;
    let (survey_slot, _) = slot_ids(&app, &owner, simulation_id).await;

    let intruder = app.register_and_login("mallory").await;

    let response = app
        .get(&intruder, &format!("/api/simulations/{}", simulation_id))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .get(&intruder, &format!("/api/simulation-quizzes/{}/questions", survey_slot))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .post(&intruder, "/api/simulations", json!({ "enroll_session_id": enroll_session_id }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get(&intruder, &format!("/api/enrolls/{}", enroll_id)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get(&intruder, "/api/simulations/999999").await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn answers_must_match_quiz_and_question() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (survey_slot, _) = slot_ids(&app, &learner, simulation_id).await;
    let path = format!("/api/simulation-quizzes/{}/answers", survey_slot);

    // Evaluate question submitted to the survey slot.
    let response = app
        .post(
            &learner,
            &path,
            json!({ "answers": [
                { "question_id": seeded.evaluate[0].0, "choice_id": seeded.evaluate[0].1 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // Choice belonging to a different question.
    let response = app
        .post(
            &learner,
            &path,
            json!({ "answers": [
                { "question_id": seeded.survey[0].0, "choice_id": seeded.survey[1].1 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.post(&learner, &path, json!({ "answers": [] })).await;
    assert_eq!(response.status().as_u16(), 400);

    // Nothing was stored by the rejected batches.
    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["answered"], 0);
}

#[tokio::test]
async fn reanswering_replaces_previous_answer() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (survey_slot, _) = slot_ids(&app, &learner, simulation_id).await;
    let path = format!("/api/simulation-quizzes/{}/answers", survey_slot);
    let (question_id, true_choice, false_choice) = seeded.survey[0];

    for choice_id in [false_choice, true_choice] {
        let response = app
            .post(
                &learner,
                &path,
                json!({ "answers": [{ "question_id": question_id, "choice_id": choice_id }] }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["answered"], 1);
        assert_eq!(body["is_done"], false);
    }

    let questions: Value = app
        .get(&learner, &format!("/api/simulation-quizzes/{}/questions", survey_slot))
        .await
        .json()
        .await
        .unwrap();
    let answered = questions
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["id"] == question_id)
        .unwrap();
    assert_eq!(answered["answer_choice_id"], true_choice);

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["true_answers"], 1);
}

#[tokio::test]
async fn instructor_edits_resync_cached_answers() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (survey_slot, _) = slot_ids(&app, &learner, simulation_id).await;
    let (question_id, _, false_choice) = seeded.survey[0];

    let response = app
        .post(
            &learner,
            &format!("/api/simulation-quizzes/{}/answers", survey_slot),
            json!({ "answers": [{ "question_id": question_id, "choice_id": false_choice }] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // The learner's choice becomes the true one.
    let response = app
        .put(
            &instructor,
            &format!("/api/instructor/choices/{}", false_choice),
            json!({ "is_true": true }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let question: Value = app
        .get(&instructor, &format!("/api/instructor/questions/{}", question_id))
        .await
        .json()
        .await
        .unwrap();
    let true_count = question["choices"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_true"] == true)
        .count();
    assert_eq!(true_count, 1);

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["true_answers"], 1);
    assert_eq!(score["survey"]["percentage"], 50.0);

    // Moving the survey quiz to evaluate moves its answers too.
    let response = app
        .put(
            &instructor,
            &format!("/api/instructor/course-quizzes/{}", seeded.survey_course_quiz_id),
            json!({ "position": "evaluate" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["answered"], 0);
    assert_eq!(score["evaluate"]["true_answers"], 1);
}

#[tokio::test]
async fn finish_requires_every_quiz() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;

    let response = app
        .post(&learner, &format!("/api/simulations/{}/finish", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn chapter_from_other_course_is_rejected() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let rust = seed_course(&app, &instructor, "Rust 101").await;
    let go = seed_course(&app, &instructor, "Go 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &rust).await;

    let response = app
        .put(
            &learner,
            &format!("/api/simulations/{}/chapters/{}", simulation_id, go.chapter_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn completed_quiz_can_be_reanswered_until_finish() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (survey_slot, _) = slot_ids(&app, &learner, simulation_id).await;
    let path = format!("/api/simulation-quizzes/{}/answers", survey_slot);

    let response = app
        .post(
            &learner,
            &path,
            json!({ "answers": [
                { "question_id": seeded.survey[0].0, "choice_id": seeded.survey[0].2 },
                { "question_id": seeded.survey[1].0, "choice_id": seeded.survey[1].2 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["is_done"], true);

    // The slot is done, but the learner may still change their mind.
    let response = app
        .post(
            &learner,
            &path,
            json!({ "answers": [
                { "question_id": seeded.survey[0].0, "choice_id": seeded.survey[0].1 },
            ]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["is_done"], true);
    assert_eq!(body["answered"], 2);

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["survey"]["true_answers"], 1);
    assert_eq!(score["survey"]["percentage"], 50.0);
}

#[tokio::test]
async fn quiz_without_questions_blocks_finish_and_certificate() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;

    let response = app
        .post(&instructor, "/api/instructor/courses", json!({ "label": "Hollow" }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let course_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = app
        .post(
            &instructor,
            &format!("/api/instructor/courses/{}/sessions", course_id),
            json!({ "start_date": "2025-03-10T09:00:00", "end_date": "2025-03-20T17:00:00" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let session_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = app
        .post(&instructor, "/api/instructor/quizzes", json!({ "label": "Empty" }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let quiz_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = app
        .post(
            &instructor,
            &format!("/api/instructor/courses/{}/quizzes", course_id),
            json!({ "quiz_id": quiz_id, "position": "evaluate" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let learner = app.register_and_login("leo").await;
    let response = app
        .post(
            &learner,
            "/api/enrolls",
            json!({ "course_id": course_id, "course_session_id": session_id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let simulation_id = response.json::<Value>().await.unwrap()["simulation_id"]
        .as_i64()
        .unwrap();

    let score: Value = app
        .get(&learner, &format!("/api/simulations/{}/score", simulation_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(score["evaluate"]["total_questions"], 0);
    assert_eq!(score["evaluate"]["percentage"], 0.0);
    assert_eq!(score["evaluate"]["is_done"], false);

    let response = app
        .post(&learner, &format!("/api/simulations/{}/finish", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .post(&learner, &format!("/api/simulations/{}/certificate", simulation_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn database_allows_one_running_simulation_per_session() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;

    let (learner_id, enroll_id, enroll_session_id, course_id): (i64, i64, i64, i64) =
        sqlx::query_as(
            "SELECT learner_id, enroll_id, enroll_session_id, course_id
             FROM simulations WHERE id = ?",
        )
        .bind(simulation_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();

    let insert = "INSERT INTO simulations
        (learner_id, enroll_id, enroll_session_id, course_id, repeat_number, is_done)
        VALUES (?, ?, ?, ?, 2, ?)";

    let err = sqlx::query(insert)
        .bind(learner_id)
        .bind(enroll_id)
        .bind(enroll_session_id)
        .bind(course_id)
        .bind(false)
        .execute(&app.pool)
        .await
        .unwrap_err();
    assert!(is_unique_violation(&err));

    // Finished simulations are not limited.
    for _ in 0..2 {
        sqlx::query(insert)
            .bind(learner_id)
            .bind(enroll_id)
            .bind(enroll_session_id)
            .bind(course_id)
            .bind(true)
            .execute(&app.pool)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn renamed_learner_regenerates_the_same_certificate_files() {
    let app = spawn_app().await;
    let instructor = app.instructor_token().await;
    let seeded = seed_course(&app, &instructor, "Rust 101").await;
    let learner = app.register_and_login("leo").await;

    let (_, _, simulation_id) = enroll(&app, &learner, &seeded).await;
    let (_, evaluate_slot) = slot_ids(&app, &learner, simulation_id).await;

    let answers: Vec<Value> = seeded
        .evaluate
        .iter()
        .map(|(question_id, true_choice, _)| {
            json!({ "question_id": question_id, "choice_id": true_choice })
        })
        .collect();
    let response = app
        .post(
            &learner,
            &format!("/api/simulation-quizzes/{}/answers", evaluate_slot),
            json!({ "answers": answers }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let certificate_path = format!("/api/simulations/{}/certificate", simulation_id);
    let first: Value = app
        .post(&learner, &certificate_path, json!({}))
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .put(&learner, "/api/auth/profile", json!({ "full_name": "Leonie Renamed" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let second: Value = app
        .post(&learner, &certificate_path, json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["learner_name"], "Leonie Renamed");
    assert_eq!(second["certificate_url"], first["certificate_url"]);
    assert_eq!(second["qrcode_url"], first["qrcode_url"]);

    for dir in ["certificate", "qrcode"] {
        let files = std::fs::read_dir(app.media_dir.path().join(dir)).unwrap().count();
        assert_eq!(files, 1, "stale files left in {}", dir);
    }

    let svg = app
        .client
        .get(second["certificate_url"].as_str().unwrap())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(svg.contains("Leonie&#32;Renamed"));
}
