// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        admin, analytics, attempts, auth, documents, groups, publishing, questions, quizzes,
    },
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Public routes: registration and login.
/// * Authenticated routes, split by role: admin, teacher (teachers and admins) and student.
/// * Global middleware: Trace, CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    // Any signed-in user; handlers check ownership themselves.
    let shared_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/quizzes/{id}/leaderboard", get(analytics::leaderboard))
        .route("/api/responses/{id}", get(attempts::get_response))
        .route("/api/responses/{id}/insights", post(attempts::request_insights))
        .route_layer(auth());

    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/api/admin/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        // Auth first, then the role check
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(auth());

    let teacher_routes = Router::new()
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/api/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/quizzes", get(quizzes::list_quizzes).post(quizzes::create_quiz))
        .route("/api/quizzes/generate", post(quizzes::generate_quiz))
        .route(
            "/api/quizzes/{id}",
            get(quizzes::get_quiz)
                .put(quizzes::update_quiz)
                .delete(quizzes::delete_quiz),
        )
        .route("/api/quizzes/{id}/questions", post(questions::create_question))
        .route("/api/quizzes/{id}/questions/order", put(questions::reorder_questions))
        .route(
            "/api/questions/{id}",
            put(questions::update_question).delete(questions::delete_question),
        )
        .route("/api/quizzes/{id}/publish", post(publishing::publish_quiz))
        .route("/api/quizzes/{id}/publications", get(publishing::list_publications))
        .route("/api/publications/{id}", delete(publishing::cancel_publication))
        .route("/api/quizzes/{id}/analytics", get(analytics::quiz_analytics))
        .route("/api/quizzes/{id}/responses", get(analytics::quiz_responses))
        .route("/api/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/api/groups/{id}",
            get(groups::get_group)
                .put(groups::update_group)
                .delete(groups::delete_group),
        )
        .route("/api/groups/{id}/members", post(groups::add_members))
        .route(
            "/api/groups/{id}/members/{student_id}",
            delete(groups::remove_member),
        )
        .route_layer(middleware::from_fn(teacher_middleware))
        .route_layer(auth());

    let student_routes = Router::new()
        .route("/api/student/quizzes", get(attempts::list_available))
        .route("/api/student/quizzes/{id}/start", post(attempts::start_attempt))
        .route("/api/student/responses", get(attempts::list_history))
        .route("/api/student/analytics", get(analytics::student_analytics))
        .route("/api/responses/{id}/answers", put(attempts::save_answer))
        .route("/api/responses/{id}/submit", post(attempts::submit_attempt))
        .route_layer(middleware::from_fn(student_middleware))
        .route_layer(auth());

    Router::new()
        .merge(public_routes)
        .merge(shared_routes)
        .merge(admin_routes)
        .merge(teacher_routes)
        .merge(student_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
