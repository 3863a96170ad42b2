// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{auth, catalog, certificate, enroll, instructor, quiz, simulation},
    state::AppState,
    utils::jwt::{auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Public: registration, login, certificate verification, generated media.
/// * Authenticated: catalog, enrollment, simulations, quiz answering.
/// * Instructor: course and quiz authoring.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ["http://localhost:3000", "http://127.0.0.1:3000"]
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route("/profile", put(auth::update_profile))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let learner_routes = Router::new()
        .route("/categories", get(catalog::list_categories))
        .route("/courses", get(catalog::list_courses))
        .route("/courses/{id}", get(catalog::get_course))
        .route("/courses/{id}/chapters", get(catalog::list_chapters))
        .route("/courses/{id}/quizzes", get(catalog::list_course_quizzes))
        .route(
            "/enrolls",
            get(enroll::list_enrolls).post(enroll::create_enroll),
        )
        .route(
            "/enrolls/{id}",
            get(enroll::get_enroll).delete(enroll::delete_enroll),
        )
        .route(
            "/simulations",
            get(simulation::list_simulations).post(simulation::start_simulation),
        )
        .route(
            "/simulations/{id}",
            get(simulation::get_simulation).delete(simulation::delete_simulation),
        )
        .route("/simulations/{id}/score", get(simulation::get_score))
        .route(
            "/simulations/{id}/chapters/{chapter_id}",
            put(simulation::mark_chapter_done),
        )
        .route("/simulations/{id}/finish", post(simulation::finish_simulation))
        .route(
            "/simulations/{id}/certificate",
            post(simulation::generate_certificate),
        )
        .route("/simulation-quizzes/{id}/questions", get(quiz::get_questions))
        .route("/simulation-quizzes/{id}/answers", post(quiz::submit_answers))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let instructor_routes = Router::new()
        .route("/categories", post(instructor::create_category))
        .route("/courses", post(instructor::create_course))
        .route(
            "/courses/{id}",
            get(instructor::get_course).put(instructor::update_course),
        )
        .route("/courses/{id}/sessions", post(instructor::create_session))
        .route("/courses/{id}/chapters", post(instructor::create_chapter))
        .route("/courses/{id}/quizzes", post(instructor::create_course_quiz))
        .route("/chapters/{id}", put(instructor::update_chapter))
        .route("/quizzes", post(instructor::create_quiz))
        .route("/quizzes/{id}", get(instructor::get_quiz))
        .route("/quizzes/{id}/questions", post(instructor::add_quiz_question))
        .route("/questions", post(instructor::create_question))
        .route("/questions/{id}", get(instructor::get_question))
        .route("/choices/{id}", put(instructor::update_choice))
        .route("/course-quizzes/{id}", put(instructor::update_course_quiz))
        .route("/users/{id}/instructor", post(instructor::grant_instructor))
        // Auth first, then the instructor role check
        .layer(middleware::from_fn(instructor_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public_routes = Router::new()
        .route("/certificates/{uuid}", get(certificate::verify_certificate));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", learner_routes.merge(public_routes))
        .nest("/api/instructor", instructor_routes)
        .nest_service("/media", ServeDir::new(&state.config.media_root))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
