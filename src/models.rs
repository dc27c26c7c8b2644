use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Accounts (Mapped to Database) ---

/// User
///
/// The canonical account record from the `users` table. The password hash never
/// leaves the server: it is skipped on serialization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    // Stored lowercased; uniqueness is case-insensitive.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    // S3 object key of the avatar image.
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Insert payload for a new account. The repository assigns id and `date_joined`.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// OutstandingToken
///
/// A refresh token issued to a user, tracked by its `jti` so it can be blacklisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutstandingToken {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// --- Catalog taxonomy ---

/// Which taxonomy table a term lives in. Categories and course types share the
/// same shape and differ only in column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomyKind {
    Category,
    CourseType,
}

/// TaxonomyTerm
///
/// Internal row shared by `course_categories` and `course_types`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct TaxonomyTerm {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTaxonomyTerm {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct CourseCategory {
    pub id: i64,
    pub category_name: String,
    pub category_slug: String,
    pub category_description: String,
    pub is_active: bool,
}

impl From<TaxonomyTerm> for CourseCategory {
    fn from(term: TaxonomyTerm) -> Self {
        Self {
            id: term.id,
            category_name: term.name,
            category_slug: term.slug,
            category_description: term.description,
            is_active: term.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct CourseType {
    pub id: i64,
    pub course_name: String,
    pub course_slug: String,
    pub course_description: String,
    pub is_active: bool,
}

impl From<TaxonomyTerm> for CourseType {
    fn from(term: TaxonomyTerm) -> Self {
        Self {
            id: term.id,
            course_name: term.name,
            course_slug: term.slug,
            course_description: term.description,
            is_active: term.is_active,
        }
    }
}

// --- Price ---

/// Price
///
/// A non-negative amount stored as integer cents (`BIGINT`). On the wire it is a
/// decimal string with two places (`"49.90"`); input accepts strings or JSON numbers
/// with at most two decimal places and ten digits overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Price(i64);

const MAX_PRICE_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceError(pub String);

impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PriceError {}

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn from_cents(cents: i64) -> Self {
        Price(cents.max(0))
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.starts_with('-') {
            return Err(PriceError("Ensure this value is greater than or equal to 0.".into()));
        }
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        let whole = if whole.is_empty() { "0" } else { whole };

        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PriceError("A valid number is required.".into()));
        }
        if fraction.len() > 2 {
            return Err(PriceError(
                "Ensure that there are no more than 2 decimal places.".into(),
            ));
        }
        let whole = whole.trim_start_matches('0');
        if whole.len() + 2 > MAX_PRICE_DIGITS {
            return Err(PriceError(format!(
                "Ensure that there are no more than {MAX_PRICE_DIGITS} digits in total."
            )));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| PriceError("A valid number is required.".into()))?
        };
        let fraction_value: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().unwrap_or(0) * 10,
            _ => fraction.parse::<i64>().unwrap_or(0),
        };

        Ok(Price(whole_value * 100 + fraction_value))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPrice {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match RawPrice::deserialize(deserializer)? {
            RawPrice::Text(text) => text,
            RawPrice::Number(number) => number.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

// --- Courses ---

/// Course
///
/// Row from the `courses` table. Foreign keys are plain ids here; the nested
/// representation returned by the API is `CourseView`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Course {
    pub id: i64,
    pub course_category_id: i64,
    pub course_type_id: i64,
    pub course_title: String,
    pub course_slug: String,
    pub course_description: String,
    // S3 object key of the banner image.
    pub course_banner: Option<String>,
    pub course_views: i32,
    pub is_free_course: bool,
    #[sqlx(rename = "course_price_cents")]
    pub course_price: Price,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub course_category_id: i64,
    pub course_type_id: i64,
    pub course_title: String,
    pub course_slug: String,
    pub course_description: String,
    pub course_banner: Option<String>,
    pub is_free_course: bool,
    pub course_price: Price,
    pub is_published: bool,
    pub created_by: Uuid,
}

/// CourseView
///
/// API representation of a course with its category and type nested.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseView {
    pub id: i64,
    pub course_category: CourseCategory,
    pub course_type: CourseType,
    pub course_title: String,
    pub course_slug: String,
    pub course_description: String,
    // Public URL of the banner, if any.
    pub course_banner: Option<String>,
    pub course_views: i32,
    pub is_free_course: bool,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "49.90")]
    pub course_price: Price,
    pub is_published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

// --- Lessons & Topics ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct CourseLesson {
    pub id: i64,
    pub course_id: i64,
    pub lesson_title: String,
    pub lesson_slug: String,
    pub lesson_description: String,
    pub lesson_order: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewLesson {
    pub course_id: i64,
    pub lesson_title: String,
    pub lesson_slug: String,
    pub lesson_description: String,
    pub lesson_order: i32,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LessonView {
    pub id: i64,
    pub course: CourseView,
    pub lesson_title: String,
    pub lesson_slug: String,
    pub lesson_description: String,
    pub lesson_order: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// TopicType
///
/// Kind of a lesson topic (video, reading, exercise...). Returned as-is by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct TopicType {
    pub id: i64,
    pub type_name: String,
    pub topic_slug: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub created_by: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTopicType {
    pub type_name: String,
    pub topic_slug: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct LessonTopic {
    pub id: i64,
    pub lesson_id: i64,
    pub type_id: i64,
    pub topic_order: i32,
    pub topic_title: String,
    pub topic_slug: String,
    pub topic_content: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTopic {
    pub lesson_id: i64,
    pub type_id: i64,
    pub topic_order: i32,
    pub topic_title: String,
    pub topic_slug: String,
    pub topic_content: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TopicView {
    pub id: i64,
    pub lesson: LessonView,
    #[serde(rename = "type")]
    pub topic_type: TopicType,
    pub topic_order: i32,
    pub topic_title: String,
    pub topic_slug: String,
    pub topic_content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

// --- Comments & Ratings ---

/// CourseComment
///
/// Row from `course_comments` joined with the author's username and avatar key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct CourseComment {
    pub id: i64,
    pub course_id: i64,
    pub user_id: Uuid,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub username: String,
    #[sqlx(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub course_id: i64,
    pub user_id: Uuid,
    pub parent_id: Option<i64>,
    pub content: String,
}

/// CommentView
///
/// A comment with its whole reply thread nested under `replies`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentView {
    pub id: i64,
    pub course: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub parent: Option<i64>,
    #[schema(no_recursion)]
    pub replies: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct CourseRating {
    pub id: i64,
    pub course_id: i64,
    pub user_id: Uuid,
    // 1 through 5.
    pub rating: i32,
    pub review: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct RatingSummary {
    pub course_id: i64,
    pub average: Option<f64>,
    pub count: i64,
}

// --- Co-authors ---

/// AuthorDetails
///
/// A co-author record on a course. Becomes visible to the public only once the
/// named user has given consent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AuthorDetails {
    pub id: i64,
    pub user_id: Uuid,
    pub course_id: i64,
    pub designation: String,
    pub is_active: bool,
    pub consent_given: bool,
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub consent_date: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub username: String,
}

impl AuthorDetails {
    /// Applies a consent decision. The consent date is stamped only when consent
    /// flips from not given to given; any other transition keeps the existing date.
    pub fn apply_consent(&mut self, consent_given: bool, now: DateTime<Utc>) {
        if consent_given && !self.consent_given {
            self.consent_date = Some(now);
        }
        self.consent_given = consent_given;
    }

    /// Consented, active co-authors may edit the course's lessons and topics.
    pub fn grants_editing(&self) -> bool {
        self.consent_given && self.is_active
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAuthorDetails {
    pub user_id: Uuid,
    pub course_id: i64,
    pub designation: String,
    pub consent_given: bool,
    pub consent_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ContactDetail {
    pub id: i64,
    pub author_id: i64,
    // e.g. "Email", "LinkedIn", "Phone"
    pub contact_type: String,
    pub contact_value: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewContactDetail {
    pub author_id: i64,
    pub contact_type: String,
    pub contact_value: String,
    pub created_by: Uuid,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of login and refresh responses. The refresh token travels in an HttpOnly cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of a successful registration (201).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUsernameRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAvatarRequest {
    /// Resource key returned by `POST /upload/presigned` with purpose `avatar`.
    pub avatar_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ChangeEmailRequest {
    pub new_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PasswordResetConfirmRequest {
    pub new_password: String,
    pub confirm_password: String,
}

/// Admin payload for categories and course types. Accepts either table's field names.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TaxonomyRequest {
    #[serde(alias = "category_name", alias = "course_name")]
    pub name: String,
    #[serde(default, alias = "category_description", alias = "course_description")]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTaxonomyRequest {
    #[serde(default, alias = "category_name", alias = "course_name")]
    pub name: Option<String>,
    #[serde(default, alias = "category_description", alias = "course_description")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCourseRequest {
    pub course_category: i64,
    pub course_type: i64,
    pub course_title: String,
    pub course_description: String,
    #[serde(default = "default_true")]
    pub is_free_course: bool,
    #[serde(default)]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>, example = "49.90")]
    pub course_price: Option<Price>,
    #[serde(default)]
    pub course_banner: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

/// Partial update; only provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCourseRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_category: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_free_course: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub course_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateLessonRequest {
    pub course: i64,
    pub lesson_title: String,
    #[serde(default)]
    pub lesson_description: String,
    #[serde(default)]
    pub lesson_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateLessonRequest {
    #[serde(default)]
    pub lesson_title: Option<String>,
    #[serde(default)]
    pub lesson_description: Option<String>,
    #[serde(default)]
    pub lesson_order: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TopicTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTopicTypeRequest {
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTopicRequest {
    pub lesson: i64,
    #[serde(rename = "type")]
    pub topic_type: i64,
    #[serde(default)]
    pub topic_order: i32,
    pub topic_title: String,
    #[serde(default)]
    pub topic_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTopicRequest {
    #[serde(default, rename = "type")]
    pub topic_type: Option<i64>,
    #[serde(default)]
    pub topic_order: Option<i32>,
    #[serde(default)]
    pub topic_title: Option<String>,
    #[serde(default)]
    pub topic_content: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub course: i64,
    pub content: String,
    #[serde(default)]
    pub parent: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RateCourseRequest {
    pub rating: i32,
    #[serde(default)]
    pub review: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AddAuthorRequest {
    pub username: String,
    pub designation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAuthorRequest {
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ConsentRequest {
    pub consent_given: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateContactRequest {
    pub contact_type: String,
    pub contact_value: String,
}

/// What an upload is for; decides the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum UploadPurpose {
    #[default]
    Avatar,
    CourseBanner,
}

impl UploadPurpose {
    pub fn prefix(self) -> &'static str {
        match self {
            UploadPurpose::Avatar => "avatars",
            UploadPurpose::CourseBanner => "course_banners",
        }
    }

    /// Key prefix reserved for objects uploaded by `user_id`.
    pub fn owner_prefix(self, user_id: Uuid) -> String {
        format!("{}/{}/", self.prefix(), user_id)
    }
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived S3 upload URL (POST /upload/presigned).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "banner.png")]
    pub filename: String,
    /// The MIME type; only images are accepted.
    #[schema(example = "image/png")]
    pub file_type: String,
    #[serde(default)]
    pub purpose: UploadPurpose,
}

/// PresignedUrlResponse
///
/// Output schema containing the secure, temporary URL for client-to-cloud file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The S3 object key to reference afterwards (avatar or course banner).
    pub resource_key: String,
}

// --- Profile & Admin Schemas (Output) ---

/// UserProfile
///
/// Output schema for the authenticated user's own profile (GET /auth/profile).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    // Public URL of the avatar image.
    pub avatar: Option<String>,
    pub is_verified: bool,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

/// Row of the admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminUserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for AdminUserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            is_verified: user.is_verified,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            date_joined: user.date_joined,
            last_login: user.last_login,
        }
    }
}

/// AdminDashboardStats
///
/// Output schema for the administrative statistics dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub verified_users: i64,
    pub total_courses: i64,
    pub published_courses: i64,
    pub total_comments: i64,
    pub total_ratings: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_parses_decimal_strings() {
        assert_eq!("49.90".parse::<Price>().unwrap().cents(), 4990);
        assert_eq!("12.5".parse::<Price>().unwrap().cents(), 1250);
        assert_eq!("7".parse::<Price>().unwrap().cents(), 700);
        assert_eq!(".99".parse::<Price>().unwrap().cents(), 99);
    }

    #[test]
    fn price_rejects_bad_input() {
        assert!("-1".parse::<Price>().is_err());
        assert!("1.999".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
        assert!("123456789.00".parse::<Price>().is_err());
        assert!("12345678.00".parse::<Price>().is_ok());
    }

    #[test]
    fn price_serializes_as_two_place_string() {
        let json = serde_json::to_string(&Price::from_cents(1205)).unwrap();
        assert_eq!(json, "\"12.05\"");
        let parsed: Price = serde_json::from_str("19.5").unwrap();
        assert_eq!(parsed.cents(), 1950);
    }

    #[test]
    fn consent_date_stamped_only_on_first_flip() {
        let mut author = AuthorDetails::default();
        let first = Utc::now();
        author.apply_consent(true, first);
        assert_eq!(author.consent_date, Some(first));

        let later = first + chrono::Duration::hours(1);
        author.apply_consent(true, later);
        assert_eq!(author.consent_date, Some(first));

        author.apply_consent(false, later);
        assert!(!author.consent_given);
        assert_eq!(author.consent_date, Some(first));

        author.apply_consent(true, later);
        assert_eq!(author.consent_date, Some(later));
    }

    #[test]
    fn topic_view_uses_type_key() {
        let view = TopicView::default();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("type").is_some());
        assert!(json.get("topic_type").is_none());
    }
}
