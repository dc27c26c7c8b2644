use crate::{
    AppState,
    handlers::{accounts, catalog, community},
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`. Ownership and co-author
/// checks are done in the handlers; the layer only guarantees a live session.
/// Paths shared with the public router (`/courses/{id}`, `/comments/{id}`, ...)
/// only register the write methods here and are merged by method.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Profile & account ---
        .route("/auth/profile", get(accounts::get_profile))
        .route("/auth/update-profile", put(accounts::update_profile))
        .route("/auth/update-username", put(accounts::update_username))
        .route("/auth/update-avatar", put(accounts::update_avatar))
        // PUT /auth/change-password
        // Also revokes every refresh token of the account.
        .route("/auth/change-password", put(accounts::change_password))
        .route("/auth/change-email", post(accounts::change_email))
        // GET /auth/export
        // Zip archive of everything stored about the caller.
        .route("/auth/export", get(accounts::export_account))
        .route("/auth/delete-account", delete(accounts::delete_account))
        // POST /upload/presigned
        // Short-lived PUT URL for avatars and course banners. The returned key is
        // what the client later stores on the profile or course.
        .route("/upload/presigned", post(catalog::get_presigned_url))
        // --- Authoring ---
        .route("/me/courses", get(catalog::get_my_courses))
        .route("/courses", post(catalog::create_course))
        .route(
            "/courses/{id}",
            put(catalog::update_course).delete(catalog::delete_course),
        )
        .route("/course-lessons", post(catalog::create_lesson))
        .route(
            "/course-lessons/{id}",
            put(catalog::update_lesson).delete(catalog::delete_lesson),
        )
        .route("/topic-types", post(catalog::create_topic_type))
        .route(
            "/topic-types/{id}",
            put(catalog::update_topic_type).delete(catalog::delete_topic_type),
        )
        .route("/lesson-topics", post(catalog::create_topic))
        .route(
            "/lesson-topics/{id}",
            put(catalog::update_topic).delete(catalog::delete_topic),
        )
        // --- Comments & ratings ---
        .route("/comments", post(community::create_comment))
        .route(
            "/comments/{id}",
            put(community::update_comment).delete(community::delete_comment),
        )
        // POST/DELETE /courses/{id}/ratings
        // One rating per user and course; posting again replaces it.
        .route(
            "/courses/{id}/ratings",
            post(community::rate_course).delete(community::delete_rating),
        )
        // --- Co-authors ---
        .route("/courses/{id}/authors", post(community::add_author))
        .route("/me/co-authorships", get(community::get_my_co_authorships))
        .route("/author-details/{id}/consent", put(community::set_consent))
        .route(
            "/author-details/{id}",
            put(community::update_author).delete(community::delete_author),
        )
        .route(
            "/author-details/{id}/contacts",
            post(community::create_contact),
        )
        .route("/contact-details/{id}", delete(community::delete_contact))
}
