use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{AccountRepository, CatalogRepository, CourseFilter, LessonFilter, TopicFilter};
use crate::{
    error::{RepoResult, RepositoryError},
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

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, avatar, \
     is_active, is_verified, is_staff, is_superuser, date_joined, last_login";

const COURSE_COLUMNS: &str = "c.id, c.course_category_id, c.course_type_id, c.course_title, \
     c.course_slug, c.course_description, c.course_banner, c.course_views, c.is_free_course, \
     c.course_price_cents, c.is_published, c.created_at, c.created_by, c.updated_at, c.is_active";

const LESSON_COLUMNS: &str = "l.id, l.course_id, l.lesson_title, l.lesson_slug, \
     l.lesson_description, l.lesson_order, l.created_at, l.created_by, l.is_active";

const TOPIC_TYPE_COLUMNS: &str = "id, type_name, topic_slug, created_at, created_by, is_active";

const TOPIC_COLUMNS: &str = "t.id, t.lesson_id, t.type_id, t.topic_order, t.topic_title, \
     t.topic_slug, t.topic_content, t.created_at, t.created_by, t.is_active";

const COMMENT_SELECT: &str = "SELECT cc.id, cc.course_id, cc.user_id, cc.parent_id, cc.content, \
     cc.created_at, u.username, u.avatar FROM course_comments cc JOIN users u ON u.id = cc.user_id";

const RATING_SELECT: &str = "SELECT r.id, r.course_id, r.user_id, r.rating, r.review, \
     r.created_at, u.username FROM course_ratings r JOIN users u ON u.id = r.user_id";

const AUTHOR_SELECT: &str = "SELECT a.id, a.user_id, a.course_id, a.designation, a.is_active, \
     a.consent_given, a.created_at, a.consent_date, u.username \
     FROM author_details a JOIN users u ON u.id = a.user_id";

const CONTACT_COLUMNS: &str =
    "id, author_id, contact_type, contact_value, created_at, created_by, is_active";

/// Table and column names of a taxonomy kind.
struct TaxonomyTable {
    table: &'static str,
    name: &'static str,
    slug: &'static str,
    description: &'static str,
}

impl TaxonomyTable {
    fn of(kind: TaxonomyKind) -> Self {
        match kind {
            TaxonomyKind::Category => Self {
                table: "course_categories",
                name: "category_name",
                slug: "category_slug",
                description: "category_description",
            },
            TaxonomyKind::CourseType => Self {
                table: "course_types",
                name: "course_name",
                slug: "course_slug",
                description: "course_description",
            },
        }
    }

    /// SELECT list aliasing the kind's columns onto `TaxonomyTerm`.
    fn select(&self) -> String {
        format!(
            "SELECT id, {} AS name, {} AS slug, {} AS description, is_active FROM {}",
            self.name, self.slug, self.description, self.table
        )
    }
}

/// push_page
///
/// Appends ORDER BY (whitelisted columns, qualified with `prefix`) with an id
/// tie-breaker, then LIMIT/OFFSET binds.
fn push_page(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery, prefix: &str) {
    builder.push(" ORDER BY ");
    for order in &query.order {
        builder.push(format!(
            "{}{} {}, ",
            prefix,
            order.field,
            if order.descending { "DESC" } else { "ASC" }
        ));
    }
    builder.push(format!("{prefix}id ASC"));
    builder.push(" LIMIT ");
    builder.push_bind(query.limit);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset);
}

/// Appends the course visibility predicate for the `c` alias.
fn push_visibility(builder: &mut QueryBuilder<'_, Postgres>, visibility: Visibility) {
    match visibility {
        Visibility::Public => {
            builder.push("(c.is_published AND c.is_active)");
        }
        Visibility::PublicOr(user_id) => {
            builder.push("((c.is_published AND c.is_active) OR c.created_by = ");
            builder.push_bind(user_id);
            builder.push(")");
        }
        Visibility::Everything => {
            builder.push("TRUE");
        }
        Visibility::OwnedBy(user_id) => {
            builder.push("c.created_by = ");
            builder.push_bind(user_id);
        }
    }
}

fn push_course_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &CourseFilter) {
    builder.push(" WHERE ");
    push_visibility(builder, filter.visibility);

    if let Some(category_id) = filter.category_id {
        builder.push(" AND c.course_category_id = ");
        builder.push_bind(category_id);
    }
    if let Some(slug) = &filter.category_slug {
        builder.push(" AND c.course_category_id IN (SELECT id FROM course_categories WHERE category_slug = ");
        builder.push_bind(slug.clone());
        builder.push(")");
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        builder.push(" AND (c.course_title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR c.course_description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn push_lesson_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &LessonFilter) {
    builder.push(" WHERE ");
    push_visibility(builder, filter.visibility);
    if filter.visibility != Visibility::Everything {
        builder.push(" AND l.is_active");
    }
    if let Some(course_id) = filter.course_id {
        builder.push(" AND l.course_id = ");
        builder.push_bind(course_id);
    }
}

fn push_topic_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TopicFilter) {
    builder.push(" WHERE ");
    push_visibility(builder, filter.visibility);
    if filter.visibility != Visibility::Everything {
        builder.push(" AND l.is_active AND t.is_active");
    }
    if let Some(lesson_id) = filter.lesson_id {
        builder.push(" AND t.lesson_id = ");
        builder.push_bind(lesson_id);
    }
}

/// PostgresRepository
///
/// The concrete implementation of the repository traits, backed by PostgreSQL.
/// Queries are built at runtime; filters and ordering go through `QueryBuilder`
/// with bound parameters and whitelisted column names.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, mut builder: QueryBuilder<'_, Postgres>) -> RepoResult<i64> {
        builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn scalar_count(&self, sql: &str) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> RepoResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountRepository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    /// create_user
    ///
    /// Emails are stored lowercased; the unique index on `LOWER(email)` turns a
    /// case-insensitive duplicate into a conflict.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name, \
             is_active, is_verified, is_staff, is_superuser, date_joined) \
             VALUES ($1, $2, LOWER($3), $4, $5, $6, $7, $8, $9, $10, NOW()) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_user(&self, user: &User) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = $2, email = LOWER($3), password_hash = $4, \
             first_name = $5, last_name = $6, avatar = $7, is_active = $8, is_verified = $9, \
             is_staff = $10, is_superuser = $11, last_login = $12 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.avatar)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, query: &ListQuery) -> RepoResult<(Vec<User>, i64)> {
        let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_page(&mut builder, query, "");
        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        let total = self.scalar_count("SELECT COUNT(*) FROM users").await?;
        Ok((users, total))
    }

    async fn record_outstanding_token(&self, token: OutstandingToken) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO outstanding_tokens (jti, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(token.jti)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    async fn get_outstanding_token(&self, jti: Uuid) -> RepoResult<Option<OutstandingToken>> {
        sqlx::query_as::<_, OutstandingToken>(
            "SELECT jti, user_id, created_at, expires_at FROM outstanding_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    /// blacklist_token
    ///
    /// `ON CONFLICT DO NOTHING` makes the insert idempotent; the affected row count
    /// tells a first blacklisting apart from a repeated one.
    async fn blacklist_token(&self, jti: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO blacklisted_tokens (jti, blacklisted_at) \
             SELECT jti, NOW() FROM outstanding_tokens WHERE jti = $1 \
             ON CONFLICT DO NOTHING",
        )
        .bind(jti)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM blacklisted_tokens WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn blacklist_user_tokens(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "INSERT INTO blacklisted_tokens (jti, blacklisted_at) \
             SELECT jti, NOW() FROM outstanding_tokens WHERE user_id = $1 \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        Ok(AdminDashboardStats {
            total_users: self.scalar_count("SELECT COUNT(*) FROM users").await?,
            verified_users: self
                .scalar_count("SELECT COUNT(*) FROM users WHERE is_verified")
                .await?,
            total_courses: self.scalar_count("SELECT COUNT(*) FROM courses").await?,
            published_courses: self
                .scalar_count("SELECT COUNT(*) FROM courses WHERE is_published")
                .await?,
            total_comments: self.scalar_count("SELECT COUNT(*) FROM course_comments").await?,
            total_ratings: self.scalar_count("SELECT COUNT(*) FROM course_ratings").await?,
        })
    }
}

#[async_trait]
impl CatalogRepository for PostgresRepository {
    async fn slug_exists(&self, scope: SlugScope, slug: &str) -> RepoResult<bool> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
        match scope {
            SlugScope::Category => {
                builder.push("course_categories WHERE category_slug = ");
                builder.push_bind(slug.to_string());
            }
            SlugScope::CourseType => {
                builder.push("course_types WHERE course_slug = ");
                builder.push_bind(slug.to_string());
            }
            SlugScope::Course => {
                builder.push("courses WHERE course_slug = ");
                builder.push_bind(slug.to_string());
            }
            SlugScope::TopicType => {
                builder.push("topic_types WHERE topic_slug = ");
                builder.push_bind(slug.to_string());
            }
            SlugScope::Lesson { course_id } => {
                builder.push("course_lessons WHERE course_id = ");
                builder.push_bind(course_id);
                builder.push(" AND lesson_slug = ");
                builder.push_bind(slug.to_string());
            }
            SlugScope::Topic { lesson_id } => {
                builder.push("lesson_topics WHERE lesson_id = ");
                builder.push_bind(lesson_id);
                builder.push(" AND topic_slug = ");
                builder.push_bind(slug.to_string());
            }
        }
        builder.push(")");

        builder
            .build_query_scalar::<bool>()
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    // --- Categories & course types ---

    async fn list_terms(
        &self,
        kind: TaxonomyKind,
        active_only: bool,
        query: &ListQuery,
    ) -> RepoResult<(Vec<TaxonomyTerm>, i64)> {
        let table = TaxonomyTable::of(kind);
        let filter = if active_only { " WHERE is_active" } else { "" };

        let mut builder = QueryBuilder::new(format!("{}{}", table.select(), filter));
        push_page(&mut builder, query, "");
        let terms = builder
            .build_query_as::<TaxonomyTerm>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let total = self
            .scalar_count(&format!("SELECT COUNT(*) FROM {}{}", table.table, filter))
            .await?;
        Ok((terms, total))
    }

    async fn get_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<Option<TaxonomyTerm>> {
        let table = TaxonomyTable::of(kind);
        sqlx::query_as::<_, TaxonomyTerm>(&format!("{} WHERE id = $1", table.select()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_terms_by_ids(&self, kind: TaxonomyKind, ids: &[i64]) -> RepoResult<Vec<TaxonomyTerm>> {
        let table = TaxonomyTable::of(kind);
        sqlx::query_as::<_, TaxonomyTerm>(&format!("{} WHERE id = ANY($1)", table.select()))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn create_term(&self, kind: TaxonomyKind, term: NewTaxonomyTerm) -> RepoResult<TaxonomyTerm> {
        let table = TaxonomyTable::of(kind);
        sqlx::query_as::<_, TaxonomyTerm>(&format!(
            "INSERT INTO {table} ({name}, {slug}, {description}, is_active) VALUES ($1, $2, $3, $4) \
             RETURNING id, {name} AS name, {slug} AS slug, {description} AS description, is_active",
            table = table.table,
            name = table.name,
            slug = table.slug,
            description = table.description,
        ))
        .bind(term.name)
        .bind(term.slug)
        .bind(term.description)
        .bind(term.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_term(&self, kind: TaxonomyKind, term: &TaxonomyTerm) -> RepoResult<TaxonomyTerm> {
        let table = TaxonomyTable::of(kind);
        sqlx::query_as::<_, TaxonomyTerm>(&format!(
            "UPDATE {table} SET {name} = $2, {description} = $3, is_active = $4 WHERE id = $1 \
             RETURNING id, {name} AS name, {slug} AS slug, {description} AS description, is_active",
            table = table.table,
            name = table.name,
            slug = table.slug,
            description = table.description,
        ))
        .bind(term.id)
        .bind(&term.name)
        .bind(&term.description)
        .bind(term.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<bool> {
        self.delete_by_id(TaxonomyTable::of(kind).table, id).await
    }

    // --- Courses ---

    async fn list_courses(&self, filter: &CourseFilter, query: &ListQuery) -> RepoResult<(Vec<Course>, i64)> {
        let mut builder = QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses c"));
        push_course_filter(&mut builder, filter);
        push_page(&mut builder, query, "c.");
        let courses = builder
            .build_query_as::<Course>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let mut counter = QueryBuilder::new("SELECT COUNT(*) FROM courses c");
        push_course_filter(&mut counter, filter);
        let total = self.count(counter).await?;

        Ok((courses, total))
    }

    async fn get_course(&self, id: i64) -> RepoResult<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_course_by_slug(&self, slug: &str) -> RepoResult<Option<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE c.course_slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn get_courses_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Course>> {
        sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn create_course(&self, course: NewCourse) -> RepoResult<Course> {
        sqlx::query_as::<_, Course>(&format!(
            "INSERT INTO courses AS c (course_category_id, course_type_id, course_title, course_slug, \
             course_description, course_banner, course_views, is_free_course, course_price_cents, \
             is_published, created_at, created_by, updated_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, NOW(), $10, NOW(), TRUE) \
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(course.course_category_id)
        .bind(course.course_type_id)
        .bind(course.course_title)
        .bind(course.course_slug)
        .bind(course.course_description)
        .bind(course.course_banner)
        .bind(course.is_free_course)
        .bind(course.course_price)
        .bind(course.is_published)
        .bind(course.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_course(&self, course: &Course) -> RepoResult<Course> {
        sqlx::query_as::<_, Course>(&format!(
            "UPDATE courses c SET course_category_id = $2, course_type_id = $3, course_title = $4, \
             course_description = $5, course_banner = $6, is_free_course = $7, \
             course_price_cents = $8, is_published = $9, is_active = $10, updated_at = NOW() \
             WHERE c.id = $1 RETURNING {COURSE_COLUMNS}"
        ))
        .bind(course.id)
        .bind(course.course_category_id)
        .bind(course.course_type_id)
        .bind(&course.course_title)
        .bind(&course.course_description)
        .bind(&course.course_banner)
        .bind(course.is_free_course)
        .bind(course.course_price)
        .bind(course.is_published)
        .bind(course.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_course(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("courses", id).await
    }

    async fn increment_course_views(&self, id: i64) -> RepoResult<()> {
        sqlx::query("UPDATE courses SET course_views = course_views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    // --- Lessons ---

    async fn list_lessons(&self, filter: &LessonFilter, query: &ListQuery) -> RepoResult<(Vec<CourseLesson>, i64)> {
        const FROM: &str = " FROM course_lessons l JOIN courses c ON c.id = l.course_id";

        let mut builder = QueryBuilder::new(format!("SELECT {LESSON_COLUMNS}{FROM}"));
        push_lesson_filter(&mut builder, filter);
        push_page(&mut builder, query, "l.");
        let lessons = builder
            .build_query_as::<CourseLesson>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let mut counter = QueryBuilder::new(format!("SELECT COUNT(*){FROM}"));
        push_lesson_filter(&mut counter, filter);
        let total = self.count(counter).await?;

        Ok((lessons, total))
    }

    async fn get_lesson(&self, id: i64) -> RepoResult<Option<CourseLesson>> {
        sqlx::query_as::<_, CourseLesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM course_lessons l WHERE l.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn get_lessons_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<CourseLesson>> {
        sqlx::query_as::<_, CourseLesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM course_lessons l WHERE l.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn create_lesson(&self, lesson: NewLesson) -> RepoResult<CourseLesson> {
        sqlx::query_as::<_, CourseLesson>(&format!(
            "INSERT INTO course_lessons AS l (course_id, lesson_title, lesson_slug, lesson_description, \
             lesson_order, created_at, created_by, is_active) \
             VALUES ($1, $2, $3, $4, $5, NOW(), $6, TRUE) RETURNING {LESSON_COLUMNS}"
        ))
        .bind(lesson.course_id)
        .bind(lesson.lesson_title)
        .bind(lesson.lesson_slug)
        .bind(lesson.lesson_description)
        .bind(lesson.lesson_order)
        .bind(lesson.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_lesson(&self, lesson: &CourseLesson) -> RepoResult<CourseLesson> {
        sqlx::query_as::<_, CourseLesson>(&format!(
            "UPDATE course_lessons l SET lesson_title = $2, lesson_description = $3, \
             lesson_order = $4, is_active = $5 WHERE l.id = $1 RETURNING {LESSON_COLUMNS}"
        ))
        .bind(lesson.id)
        .bind(&lesson.lesson_title)
        .bind(&lesson.lesson_description)
        .bind(lesson.lesson_order)
        .bind(lesson.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_lesson(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("course_lessons", id).await
    }

    // --- Topic types ---

    async fn list_topic_types(&self, active_only: bool, query: &ListQuery) -> RepoResult<(Vec<TopicType>, i64)> {
        let filter = if active_only { " WHERE is_active" } else { "" };
        let mut builder = QueryBuilder::new(format!("SELECT {TOPIC_TYPE_COLUMNS} FROM topic_types{filter}"));
        push_page(&mut builder, query, "");
        let types = builder
            .build_query_as::<TopicType>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        let total = self
            .scalar_count(&format!("SELECT COUNT(*) FROM topic_types{filter}"))
            .await?;
        Ok((types, total))
    }

    async fn get_topic_type(&self, id: i64) -> RepoResult<Option<TopicType>> {
        sqlx::query_as::<_, TopicType>(&format!("SELECT {TOPIC_TYPE_COLUMNS} FROM topic_types WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_topic_types_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<TopicType>> {
        sqlx::query_as::<_, TopicType>(&format!(
            "SELECT {TOPIC_TYPE_COLUMNS} FROM topic_types WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn create_topic_type(&self, topic_type: NewTopicType) -> RepoResult<TopicType> {
        sqlx::query_as::<_, TopicType>(&format!(
            "INSERT INTO topic_types (type_name, topic_slug, created_at, created_by, is_active) \
             VALUES ($1, $2, NOW(), $3, TRUE) RETURNING {TOPIC_TYPE_COLUMNS}"
        ))
        .bind(topic_type.type_name)
        .bind(topic_type.topic_slug)
        .bind(topic_type.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_topic_type(&self, topic_type: &TopicType) -> RepoResult<TopicType> {
        sqlx::query_as::<_, TopicType>(&format!(
            "UPDATE topic_types SET type_name = $2, is_active = $3 WHERE id = $1 \
             RETURNING {TOPIC_TYPE_COLUMNS}"
        ))
        .bind(topic_type.id)
        .bind(&topic_type.type_name)
        .bind(topic_type.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_topic_type(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("topic_types", id).await
    }

    // --- Topics ---

    async fn list_topics(&self, filter: &TopicFilter, query: &ListQuery) -> RepoResult<(Vec<LessonTopic>, i64)> {
        const FROM: &str = " FROM lesson_topics t \
             JOIN course_lessons l ON l.id = t.lesson_id \
             JOIN courses c ON c.id = l.course_id";

        let mut builder = QueryBuilder::new(format!("SELECT {TOPIC_COLUMNS}{FROM}"));
        push_topic_filter(&mut builder, filter);
        push_page(&mut builder, query, "t.");
        let topics = builder
            .build_query_as::<LessonTopic>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let mut counter = QueryBuilder::new(format!("SELECT COUNT(*){FROM}"));
        push_topic_filter(&mut counter, filter);
        let total = self.count(counter).await?;

        Ok((topics, total))
    }

    async fn get_topic(&self, id: i64) -> RepoResult<Option<LessonTopic>> {
        sqlx::query_as::<_, LessonTopic>(&format!(
            "SELECT {TOPIC_COLUMNS} FROM lesson_topics t WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn create_topic(&self, topic: NewTopic) -> RepoResult<LessonTopic> {
        sqlx::query_as::<_, LessonTopic>(&format!(
            "INSERT INTO lesson_topics AS t (lesson_id, type_id, topic_order, topic_title, topic_slug, \
             topic_content, created_at, created_by, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7, TRUE) RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(topic.lesson_id)
        .bind(topic.type_id)
        .bind(topic.topic_order)
        .bind(topic.topic_title)
        .bind(topic.topic_slug)
        .bind(topic.topic_content)
        .bind(topic.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_topic(&self, topic: &LessonTopic) -> RepoResult<LessonTopic> {
        sqlx::query_as::<_, LessonTopic>(&format!(
            "UPDATE lesson_topics t SET type_id = $2, topic_order = $3, topic_title = $4, \
             topic_content = $5, is_active = $6 WHERE t.id = $1 RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(topic.id)
        .bind(topic.type_id)
        .bind(topic.topic_order)
        .bind(&topic.topic_title)
        .bind(&topic.topic_content)
        .bind(topic.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_topic(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("lesson_topics", id).await
    }

    // --- Comments ---

    async fn list_root_comments(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseComment>, i64)> {
        let mut builder = QueryBuilder::new(COMMENT_SELECT);
        builder.push(" WHERE cc.parent_id IS NULL AND cc.course_id = ");
        builder.push_bind(course_id);
        push_page(&mut builder, query, "cc.");
        let comments = builder
            .build_query_as::<CourseComment>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM course_comments WHERE parent_id IS NULL AND course_id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok((comments, total))
    }

    async fn list_replies(&self, course_id: i64) -> RepoResult<Vec<CourseComment>> {
        sqlx::query_as::<_, CourseComment>(&format!(
            "{COMMENT_SELECT} WHERE cc.parent_id IS NOT NULL AND cc.course_id = $1 \
             ORDER BY cc.created_at ASC, cc.id ASC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<CourseComment>> {
        sqlx::query_as::<_, CourseComment>(&format!("{COMMENT_SELECT} WHERE cc.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<CourseComment> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO course_comments (course_id, user_id, parent_id, content, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING id",
        )
        .bind(comment.course_id)
        .bind(comment.user_id)
        .bind(comment.parent_id)
        .bind(comment.content)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        self.get_comment(id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_comment(&self, id: i64, content: &str) -> RepoResult<Option<CourseComment>> {
        let updated = sqlx::query("UPDATE course_comments SET content = $2 WHERE id = $1")
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_comment(id).await
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("course_comments", id).await
    }

    async fn comments_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseComment>> {
        sqlx::query_as::<_, CourseComment>(&format!(
            "{COMMENT_SELECT} WHERE cc.user_id = $1 ORDER BY cc.created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    // --- Ratings ---

    async fn upsert_rating(
        &self,
        course_id: i64,
        user_id: Uuid,
        rating: i32,
        review: Option<String>,
    ) -> RepoResult<CourseRating> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO course_ratings (course_id, user_id, rating, review, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (course_id, user_id) \
             DO UPDATE SET rating = EXCLUDED.rating, review = EXCLUDED.review \
             RETURNING id",
        )
        .bind(course_id)
        .bind(user_id)
        .bind(rating)
        .bind(review)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        sqlx::query_as::<_, CourseRating>(&format!("{RATING_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn list_ratings(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseRating>, i64)> {
        let mut builder = QueryBuilder::new(RATING_SELECT);
        builder.push(" WHERE r.course_id = ");
        builder.push_bind(course_id);
        push_page(&mut builder, query, "r.");
        let ratings = builder
            .build_query_as::<CourseRating>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_ratings WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        Ok((ratings, total))
    }

    async fn rating_summary(&self, course_id: i64) -> RepoResult<RatingSummary> {
        let (average, count) = sqlx::query_as::<_, (Option<f64>, i64)>(
            "SELECT AVG(rating)::float8, COUNT(*) FROM course_ratings WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok(RatingSummary {
            course_id,
            average,
            count,
        })
    }

    async fn delete_rating(&self, course_id: i64, user_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM course_ratings WHERE course_id = $1 AND user_id = $2")
            .bind(course_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn ratings_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseRating>> {
        sqlx::query_as::<_, CourseRating>(&format!(
            "{RATING_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    // --- Co-authors ---

    async fn create_author(&self, author: NewAuthorDetails) -> RepoResult<AuthorDetails> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO author_details (user_id, course_id, designation, is_active, consent_given, \
             created_at, consent_date) VALUES ($1, $2, $3, TRUE, $4, NOW(), $5) RETURNING id",
        )
        .bind(author.user_id)
        .bind(author.course_id)
        .bind(author.designation)
        .bind(author.consent_given)
        .bind(author.consent_date)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        self.get_author(id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))
    }

    async fn get_author(&self, id: i64) -> RepoResult<Option<AuthorDetails>> {
        sqlx::query_as::<_, AuthorDetails>(&format!("{AUTHOR_SELECT} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn get_author_for(&self, course_id: i64, user_id: Uuid) -> RepoResult<Option<AuthorDetails>> {
        sqlx::query_as::<_, AuthorDetails>(&format!(
            "{AUTHOR_SELECT} WHERE a.course_id = $1 AND a.user_id = $2"
        ))
        .bind(course_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn list_course_authors(&self, course_id: i64, public_only: bool) -> RepoResult<Vec<AuthorDetails>> {
        let mut builder = QueryBuilder::new(AUTHOR_SELECT);
        builder.push(" WHERE a.course_id = ");
        builder.push_bind(course_id);
        if public_only {
            builder.push(" AND a.consent_given AND a.is_active");
        }
        builder.push(" ORDER BY a.created_at ASC, a.id ASC");

        builder
            .build_query_as::<AuthorDetails>()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)
    }

    async fn authors_by_user(&self, user_id: Uuid) -> RepoResult<Vec<AuthorDetails>> {
        sqlx::query_as::<_, AuthorDetails>(&format!(
            "{AUTHOR_SELECT} WHERE a.user_id = $1 ORDER BY a.created_at ASC, a.id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn update_author(&self, author: &AuthorDetails) -> RepoResult<AuthorDetails> {
        sqlx::query(
            "UPDATE author_details SET designation = $2, is_active = $3, consent_given = $4, \
             consent_date = $5 WHERE id = $1",
        )
        .bind(author.id)
        .bind(&author.designation)
        .bind(author.is_active)
        .bind(author.consent_given)
        .bind(author.consent_date)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        self.get_author(author.id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))
    }

    async fn delete_author(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("author_details", id).await
    }

    // --- Contacts ---

    async fn list_contacts(&self, author_id: i64) -> RepoResult<Vec<ContactDetail>> {
        sqlx::query_as::<_, ContactDetail>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_details \
             WHERE author_id = $1 AND is_active ORDER BY created_at ASC, id ASC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn get_contact(&self, id: i64) -> RepoResult<Option<ContactDetail>> {
        sqlx::query_as::<_, ContactDetail>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contact_details WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn create_contact(&self, contact: NewContactDetail) -> RepoResult<ContactDetail> {
        sqlx::query_as::<_, ContactDetail>(&format!(
            "INSERT INTO contact_details (author_id, contact_type, contact_value, created_at, \
             created_by, is_active) VALUES ($1, $2, $3, NOW(), $4, TRUE) RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(contact.author_id)
        .bind(contact.contact_type)
        .bind(contact.contact_value)
        .bind(contact.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn delete_contact(&self, id: i64) -> RepoResult<bool> {
        self.delete_by_id("contact_details", id).await
    }
}
