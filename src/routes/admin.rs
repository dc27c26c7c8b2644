use crate::{AppState, handlers::admin};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/admin`. The router is wrapped in the authentication layer and
/// every handler additionally requires `is_superuser`, answering 403 otherwise.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Dashboard counters: users, verified users, courses, published courses,
        // comments, ratings.
        .route("/stats", get(admin::get_admin_stats))
        .route("/users", get(admin::list_users))
        // Category and course-type management. Listings include inactive rows.
        .route(
            "/course-categories",
            get(admin::admin_list_categories).post(admin::admin_create_category),
        )
        .route(
            "/course-categories/{id}",
            axum::routing::put(admin::admin_update_category).delete(admin::admin_delete_category),
        )
        .route(
            "/course-types",
            get(admin::admin_list_course_types).post(admin::admin_create_course_type),
        )
        .route(
            "/course-types/{id}",
            axum::routing::put(admin::admin_update_course_type)
                .delete(admin::admin_delete_course_type),
        )
}
