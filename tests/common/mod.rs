// tests/common/mod.rs

#![allow(dead_code)]

use academy::{config::Config, handlers::auth::seed_instructor, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tempfile::TempDir;

/// Username and password of the instructor seeded by `spawn_app`.
pub const INSTRUCTOR: (&str, &str) = ("ingrid", "password123");

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    /// Shares the server's single connection; use between requests only.
    pub pool: SqlitePool,
    /// Kept alive so generated media survive until the test ends.
    pub media_dir: TempDir,
}

/// Spawns the app on a random port against a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // A single, never-recycled connection keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let media_dir = tempfile::tempdir().expect("Failed to create media dir");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: Some(INSTRUCTOR.0.to_string()),
        admin_password: Some(INSTRUCTOR.1.to_string()),
        media_root: media_dir.path().to_path_buf(),
        public_url: address.clone(),
        certificate_template: None,
        bind_addr: "127.0.0.1:0".to_string(),
    };

    seed_instructor(&pool, &config)
        .await
        .expect("Failed to seed instructor");

    let app = routes::create_router(AppState {
        pool: pool.clone(),
        config,
    });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        pool,
        media_dir,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Self-registers a learner and returns a bearer token.
    pub async fn register_and_login(&self, username: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "password": "password123",
                "full_name": format!("{} Tester", username),
            }))
            .send()
            .await
            .expect("Failed to register");
        assert_eq!(response.status().as_u16(), 201);

        self.login(username, "password123").await
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to login");
        assert_eq!(response.status().as_u16(), 200);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Token of the seeded instructor account.
    pub async fn instructor_token(&self) -> String {
        self.login(INSTRUCTOR.0, INSTRUCTOR.1).await
    }

    pub async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// A course with one session, one chapter, and a two-question survey and
/// evaluate quiz each.
pub struct SeededCourse {
    pub course_id: i64,
    pub session_id: i64,
    pub chapter_id: i64,
    /// (question_id, true_choice_id, false_choice_id) per survey question.
    pub survey: Vec<(i64, i64, i64)>,
    pub evaluate: Vec<(i64, i64, i64)>,
    pub survey_course_quiz_id: i64,
    pub evaluate_course_quiz_id: i64,
}

async fn create_question(app: &TestApp, token: &str, quiz_id: i64, label: &str) -> (i64, i64, i64) {
    let response = app
        .post(
            token,
            "/api/instructor/questions",
            json!({
                "label": label,
                "quiz_id": quiz_id,
                "choices": [
                    { "identifier": "A", "label": "Right", "is_true": true },
                    { "identifier": "B", "label": "Wrong" },
                    { "identifier": "C", "label": "Also wrong" },
                ],
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    let choices = body["choices"].as_array().unwrap();
    let true_choice = choices.iter().find(|c| c["is_true"] == true).unwrap();
    let false_choice = choices.iter().find(|c| c["is_true"] == false).unwrap();

    (
        body["id"].as_i64().unwrap(),
        true_choice["id"].as_i64().unwrap(),
        false_choice["id"].as_i64().unwrap(),
    )
}

pub async fn seed_course(app: &TestApp, token: &str, label: &str) -> SeededCourse {
    let response = app
        .post(
            token,
            "/api/instructor/courses",
            json!({ "label": label, "description": "<p>Intro</p><script>x()</script>" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let course_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = app
        .post(
            token,
            &format!("/api/instructor/courses/{}/sessions", course_id),
            json!({ "start_date": "2025-03-10T09:00:00", "end_date": "2025-03-20T17:00:00" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let session_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = app
        .post(
            token,
            &format!("/api/instructor/courses/{}/chapters", course_id),
            json!({
                "label": "Ownership",
                "number": "1",
                "material": { "type": "text", "text": "<p>Move semantics</p>" },
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let chapter_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let mut quiz_ids = Vec::new();
    for quiz_label in ["Pre-test", "Post-test"] {
        let response = app
            .post(token, "/api/instructor/quizzes", json!({ "label": quiz_label }))
            .await;
        assert_eq!(response.status().as_u16(), 201);
        quiz_ids.push(response.json::<Value>().await.unwrap()["id"].as_i64().unwrap());
    }

    let survey = vec![
        create_question(app, token, quiz_ids[0], "Survey Q1").await,
        create_question(app, token, quiz_ids[0], "Survey Q2").await,
    ];
    let evaluate = vec![
        create_question(app, token, quiz_ids[1], "Evaluate Q1").await,
        create_question(app, token, quiz_ids[1], "Evaluate Q2").await,
    ];

    let mut course_quiz_ids = Vec::new();
    for (quiz_id, position) in [(quiz_ids[0], "survey"), (quiz_ids[1], "evaluate")] {
        let response = app
            .post(
                token,
                &format!("/api/instructor/courses/{}/quizzes", course_id),
                json!({ "quiz_id": quiz_id, "position": position, "duration": 10 }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        course_quiz_ids.push(response.json::<Value>().await.unwrap()["id"].as_i64().unwrap());
    }

    SeededCourse {
        course_id,
        session_id,
        chapter_id,
        survey,
        evaluate,
        survey_course_quiz_id: course_quiz_ids[0],
        evaluate_course_quiz_id: course_quiz_ids[1],
    }
}

/// Enrolls the learner and returns (enroll_id, enroll_session_id, simulation_id).
pub async fn enroll(app: &TestApp, token: &str, seeded: &SeededCourse) -> (i64, i64, i64) {
    let response = app
        .post(
            token,
            "/api/enrolls",
            json!({ "course_id": seeded.course_id, "course_session_id": seeded.session_id }),
        )
        .await;
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    (
        body["enroll_id"].as_i64().unwrap(),
        body["enroll_session_id"].as_i64().unwrap(),
        body["simulation_id"].as_i64().unwrap(),
    )
}

/// Returns the (survey, evaluate) simulation quiz ids of a simulation.
pub async fn slot_ids(app: &TestApp, token: &str, simulation_id: i64) -> (i64, i64) {
    let response = app
        .get(token, &format!("/api/simulations/{}", simulation_id))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    (
        body["quiz"]["survey"]["simulation_quiz_id"].as_i64().unwrap(),
        body["quiz"]["evaluate"]["simulation_quiz_id"].as_i64().unwrap(),
    )
}
