use crate::{
    AppState,
    handlers::{accounts, catalog, community},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Catalog reads filter by visibility in
/// the handler: anonymous callers only ever see published, active rows.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // --- Account gateway ---
        .route("/auth/register", post(accounts::register))
        .route(
            "/auth/verify-email/{uidb64}/{token}",
            get(accounts::verify_email),
        )
        .route(
            "/auth/resend-verification",
            post(accounts::resend_verification),
        )
        // POST /auth/token
        // Email + password login. Returns the access token in the body and sets the
        // refresh token as an HttpOnly cookie scoped to /auth.
        .route("/auth/token", post(accounts::login))
        // POST /auth/token/refresh
        // Rotates the refresh cookie. The presented token is blacklisted, so a
        // replayed cookie fails with 401.
        .route("/auth/token/refresh", post(accounts::refresh_token))
        .route("/auth/logout", post(accounts::logout))
        .route(
            "/auth/verify-new-email/{uidb64}/{token}/{email_b64}",
            get(accounts::verify_new_email),
        )
        .route("/auth/password-reset", post(accounts::request_password_reset))
        .route(
            "/auth/password-reset/{uidb64}/{token}",
            post(accounts::confirm_password_reset),
        )
        // --- Catalog reads ---
        .route("/course-categories", get(catalog::list_categories))
        .route("/course-categories/{id}", get(catalog::get_category))
        .route("/course-types", get(catalog::list_course_types))
        .route("/course-types/{id}", get(catalog::get_course_type))
        // GET /courses?course_category=...&search=...
        // Published courses for everyone, plus the caller's own drafts when signed in.
        .route("/courses", get(catalog::list_courses))
        .route("/courses/{id}", get(catalog::get_course))
        // GET /courses/slug/{slug}
        // The detail page lookup. Each hit counts as a view.
        .route("/courses/slug/{slug}", get(catalog::get_course_by_slug))
        .route("/course-lessons", get(catalog::list_lessons))
        .route("/course-lessons/{id}", get(catalog::get_lesson))
        .route("/topic-types", get(catalog::list_topic_types))
        .route("/topic-types/{id}", get(catalog::get_topic_type))
        .route("/lesson-topics", get(catalog::list_topics))
        .route("/lesson-topics/{id}", get(catalog::get_topic))
        // --- Community reads ---
        .route("/comments", get(community::list_comments))
        .route("/comments/{id}", get(community::get_comment))
        .route("/courses/{id}/ratings", get(community::list_ratings))
        .route(
            "/courses/{id}/ratings/summary",
            get(community::rating_summary),
        )
        .route("/courses/{id}/authors", get(community::list_authors))
        .route(
            "/author-details/{id}/contacts",
            get(community::list_contacts),
        )
}
