use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::RepoResult,
    models::{
        AdminDashboardStats, AuthorDetails, ContactDetail, Course, CourseComment, CourseLesson,
        CourseRating, LessonTopic, NewAuthorDetails, NewComment, NewContactDetail, NewCourse,
        NewLesson, NewTaxonomyTerm, NewTopic, NewTopicType, NewUser, OutstandingToken,
        RatingSummary, TaxonomyKind, TaxonomyTerm, TopicType, User,
    },
    pagination::ListQuery,
    permissions::Visibility,
    slug::SlugScope,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

// --- Filters ---

/// CourseFilter
///
/// Filters accepted by the course listing. `visibility` is always applied.
#[derive(Debug, Clone)]
pub struct CourseFilter {
    pub visibility: Visibility,
    pub category_id: Option<i64>,
    pub category_slug: Option<String>,
    // Case-insensitive match on title or description.
    pub search: Option<String>,
}

impl CourseFilter {
    pub fn visible_to(visibility: Visibility) -> Self {
        Self {
            visibility,
            category_id: None,
            category_slug: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LessonFilter {
    pub visibility: Visibility,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TopicFilter {
    pub visibility: Visibility,
    pub lesson_id: Option<i64>,
}

/// AccountRepository
///
/// Persistence for users and the refresh-token ledger.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    // Case-insensitive.
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Persists every mutable column of `user`.
    async fn update_user(&self, user: &User) -> RepoResult<User>;
    /// Cascades to the user's courses, comments, ratings, co-authorships and tokens.
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;
    async fn list_users(&self, query: &ListQuery) -> RepoResult<(Vec<User>, i64)>;

    // --- Refresh tokens ---
    async fn record_outstanding_token(&self, token: OutstandingToken) -> RepoResult<()>;
    async fn get_outstanding_token(&self, jti: Uuid) -> RepoResult<Option<OutstandingToken>>;
    /// Returns true only when the token was not blacklisted before this call.
    async fn blacklist_token(&self, jti: Uuid) -> RepoResult<bool>;
    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool>;
    /// Blacklists every outstanding token of the user; returns how many were newly blacklisted.
    async fn blacklist_user_tokens(&self, user_id: Uuid) -> RepoResult<u64>;

    // --- Admin ---
    async fn get_stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// CatalogRepository
///
/// Persistence for the course catalog, community features and co-authors.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn slug_exists(&self, scope: SlugScope, slug: &str) -> RepoResult<bool>;

    // --- Categories & course types ---
    async fn list_terms(
        &self,
        kind: TaxonomyKind,
        active_only: bool,
        query: &ListQuery,
    ) -> RepoResult<(Vec<TaxonomyTerm>, i64)>;
    async fn get_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<Option<TaxonomyTerm>>;
    async fn get_terms_by_ids(&self, kind: TaxonomyKind, ids: &[i64]) -> RepoResult<Vec<TaxonomyTerm>>;
    async fn create_term(&self, kind: TaxonomyKind, term: NewTaxonomyTerm) -> RepoResult<TaxonomyTerm>;
    async fn update_term(&self, kind: TaxonomyKind, term: &TaxonomyTerm) -> RepoResult<TaxonomyTerm>;
    async fn delete_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<bool>;

    // --- Courses ---
    async fn list_courses(&self, filter: &CourseFilter, query: &ListQuery) -> RepoResult<(Vec<Course>, i64)>;
    async fn get_course(&self, id: i64) -> RepoResult<Option<Course>>;
    async fn get_course_by_slug(&self, slug: &str) -> RepoResult<Option<Course>>;
    async fn get_courses_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Course>>;
    async fn create_course(&self, course: NewCourse) -> RepoResult<Course>;
    /// Persists mutable columns and refreshes `updated_at`.
    async fn update_course(&self, course: &Course) -> RepoResult<Course>;
    async fn delete_course(&self, id: i64) -> RepoResult<bool>;
    async fn increment_course_views(&self, id: i64) -> RepoResult<()>;

    // --- Lessons ---
    async fn list_lessons(&self, filter: &LessonFilter, query: &ListQuery) -> RepoResult<(Vec<CourseLesson>, i64)>;
    async fn get_lesson(&self, id: i64) -> RepoResult<Option<CourseLesson>>;
    async fn get_lessons_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<CourseLesson>>;
    async fn create_lesson(&self, lesson: NewLesson) -> RepoResult<CourseLesson>;
    async fn update_lesson(&self, lesson: &CourseLesson) -> RepoResult<CourseLesson>;
    async fn delete_lesson(&self, id: i64) -> RepoResult<bool>;

    // --- Topic types ---
    async fn list_topic_types(&self, active_only: bool, query: &ListQuery) -> RepoResult<(Vec<TopicType>, i64)>;
    async fn get_topic_type(&self, id: i64) -> RepoResult<Option<TopicType>>;
    async fn get_topic_types_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<TopicType>>;
    async fn create_topic_type(&self, topic_type: NewTopicType) -> RepoResult<TopicType>;
    async fn update_topic_type(&self, topic_type: &TopicType) -> RepoResult<TopicType>;
    async fn delete_topic_type(&self, id: i64) -> RepoResult<bool>;

    // --- Topics ---
    async fn list_topics(&self, filter: &TopicFilter, query: &ListQuery) -> RepoResult<(Vec<LessonTopic>, i64)>;
    async fn get_topic(&self, id: i64) -> RepoResult<Option<LessonTopic>>;
    async fn create_topic(&self, topic: NewTopic) -> RepoResult<LessonTopic>;
    async fn update_topic(&self, topic: &LessonTopic) -> RepoResult<LessonTopic>;
    async fn delete_topic(&self, id: i64) -> RepoResult<bool>;

    // --- Comments ---
    /// Top-level comments of a course, newest first.
    async fn list_root_comments(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseComment>, i64)>;
    /// Every reply of a course's threads, oldest first.
    async fn list_replies(&self, course_id: i64) -> RepoResult<Vec<CourseComment>>;
    async fn get_comment(&self, id: i64) -> RepoResult<Option<CourseComment>>;
    async fn create_comment(&self, comment: NewComment) -> RepoResult<CourseComment>;
    async fn update_comment(&self, id: i64, content: &str) -> RepoResult<Option<CourseComment>>;
    /// Cascades to replies.
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
    async fn comments_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseComment>>;

    // --- Ratings ---
    /// Inserts or replaces the user's rating of the course.
    async fn upsert_rating(
        &self,
        course_id: i64,
        user_id: Uuid,
        rating: i32,
        review: Option<String>,
    ) -> RepoResult<CourseRating>;
    async fn list_ratings(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseRating>, i64)>;
    async fn rating_summary(&self, course_id: i64) -> RepoResult<RatingSummary>;
    async fn delete_rating(&self, course_id: i64, user_id: Uuid) -> RepoResult<bool>;
    async fn ratings_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseRating>>;

    // --- Co-authors ---
    async fn create_author(&self, author: NewAuthorDetails) -> RepoResult<AuthorDetails>;
    async fn get_author(&self, id: i64) -> RepoResult<Option<AuthorDetails>>;
    async fn get_author_for(&self, course_id: i64, user_id: Uuid) -> RepoResult<Option<AuthorDetails>>;
    /// `public_only` keeps consented, active records.
    async fn list_course_authors(&self, course_id: i64, public_only: bool) -> RepoResult<Vec<AuthorDetails>>;
    async fn authors_by_user(&self, user_id: Uuid) -> RepoResult<Vec<AuthorDetails>>;
    async fn update_author(&self, author: &AuthorDetails) -> RepoResult<AuthorDetails>;
    async fn delete_author(&self, id: i64) -> RepoResult<bool>;

    // --- Contacts ---
    async fn list_contacts(&self, author_id: i64) -> RepoResult<Vec<ContactDetail>>;
    async fn get_contact(&self, id: i64) -> RepoResult<Option<ContactDetail>>;
    async fn create_contact(&self, contact: NewContactDetail) -> RepoResult<ContactDetail>;
    async fn delete_contact(&self, id: i64) -> RepoResult<bool>;
}

/// Repository
///
/// The full persistence contract handed to handlers.
pub trait Repository: AccountRepository + CatalogRepository {}

impl<T: AccountRepository + CatalogRepository> Repository for T {}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Current time with microsecond precision, matching what Postgres stores.
pub(crate) fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}
