use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain services shared by the handlers.
pub mod accounts;
pub mod catalog;
pub mod export;
pub mod permissions;

// Infrastructure: persistence, object storage, mail, credentials.
pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod password;
pub mod repository;
pub mod storage;
pub mod tokens;

// Wire types and helpers.
pub mod models;
pub mod pagination;
pub mod slug;

// HTTP layer, split by access level.
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use handlers::{accounts as account_handlers, admin, catalog as catalog_handlers, community};
use routes::{admin as admin_routes, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{ConsoleMailer, HttpMailer, MailerState, MockMailer};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler, served at
/// `/api-docs/openapi.json` and rendered by the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        account_handlers::register, account_handlers::verify_email,
        account_handlers::resend_verification, account_handlers::login,
        account_handlers::refresh_token, account_handlers::logout,
        account_handlers::get_profile, account_handlers::update_profile,
        account_handlers::update_username, account_handlers::update_avatar,
        account_handlers::change_password, account_handlers::change_email,
        account_handlers::verify_new_email, account_handlers::request_password_reset,
        account_handlers::confirm_password_reset, account_handlers::export_account,
        account_handlers::delete_account,
        catalog_handlers::list_categories, catalog_handlers::get_category,
        catalog_handlers::list_course_types, catalog_handlers::get_course_type,
        catalog_handlers::list_courses, catalog_handlers::get_course,
        catalog_handlers::get_course_by_slug, catalog_handlers::create_course,
        catalog_handlers::update_course, catalog_handlers::delete_course,
        catalog_handlers::get_my_courses, catalog_handlers::list_lessons,
        catalog_handlers::get_lesson, catalog_handlers::create_lesson,
        catalog_handlers::update_lesson, catalog_handlers::delete_lesson,
        catalog_handlers::list_topic_types, catalog_handlers::get_topic_type,
        catalog_handlers::create_topic_type, catalog_handlers::update_topic_type,
        catalog_handlers::delete_topic_type, catalog_handlers::list_topics,
        catalog_handlers::get_topic, catalog_handlers::create_topic,
        catalog_handlers::update_topic, catalog_handlers::delete_topic,
        catalog_handlers::get_presigned_url,
        community::list_comments, community::get_comment, community::create_comment,
        community::update_comment, community::delete_comment, community::rate_course,
        community::list_ratings, community::rating_summary, community::delete_rating,
        community::add_author, community::list_authors, community::get_my_co_authorships,
        community::set_consent, community::update_author, community::delete_author,
        community::list_contacts, community::create_contact, community::delete_contact,
        admin::get_admin_stats, admin::list_users, admin::admin_list_categories,
        admin::admin_create_category, admin::admin_update_category,
        admin::admin_delete_category, admin::admin_list_course_types,
        admin::admin_create_course_type, admin::admin_update_course_type,
        admin::admin_delete_course_type,
    ),
    components(
        schemas(
            models::CourseCategory, models::CourseType, models::CourseView, models::LessonView,
            models::TopicType, models::TopicView, models::CommentView, models::CourseRating,
            models::RatingSummary, models::AuthorDetails, models::ContactDetail,
            models::RegisterRequest, models::RegisterResponse, models::LoginRequest,
            models::TokenResponse, models::MessageResponse, models::EmailRequest,
            models::UpdateProfileRequest, models::UpdateUsernameRequest,
            models::UpdateAvatarRequest, models::ChangePasswordRequest,
            models::ChangeEmailRequest, models::PasswordResetConfirmRequest,
            models::TaxonomyRequest, models::UpdateTaxonomyRequest,
            models::CreateCourseRequest, models::UpdateCourseRequest,
            models::CreateLessonRequest, models::UpdateLessonRequest, models::TopicTypeRequest,
            models::UpdateTopicTypeRequest, models::CreateTopicRequest,
            models::UpdateTopicRequest, models::CreateCommentRequest,
            models::UpdateCommentRequest, models::RateCourseRequest, models::AddAuthorRequest,
            models::UpdateAuthorRequest, models::ConsentRequest, models::CreateContactRequest,
            models::UploadPurpose, models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::UserProfile, models::AdminUserView, models::AdminDashboardStats,
            error::FieldErrors,
        )
    ),
    tags(
        (name = "course-portal", description = "Course publishing and accounts API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cloneable container for the services every request needs.
#[derive(Clone)]
pub struct AppState {
    /// Users, tokens, catalog and community persistence.
    pub repo: RepositoryState,
    /// Object storage for avatars and course banners.
    pub storage: StorageState,
    /// Outbound mail (verification, reset, invitations).
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for the protected routers. Extracting `AuthUser` validates the
/// bearer token and the account; a failure rejects the request with 401 before
/// the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the authentication layers, observability and CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin_routes::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id so every log line of one
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
