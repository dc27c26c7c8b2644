use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{cmp::Ordering, collections::HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AccountRepository, CatalogRepository, CourseFilter, LessonFilter, TopicFilter, now_micros,
};
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

// --- Sorting ---

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Int(i64),
    Text(String),
    Time(Option<DateTime<Utc>>),
}

/// Maps the whitelisted ordering fields onto row values.
trait Sortable {
    fn sort_value(&self, field: &str) -> SortValue;
}

impl Sortable for User {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "username" => SortValue::Text(self.username.clone()),
            "date_joined" => SortValue::Time(Some(self.date_joined)),
            _ => SortValue::Text(self.id.to_string()),
        }
    }
}

impl Sortable for TaxonomyTerm {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "name" => SortValue::Text(self.name.clone()),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for Course {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "course_title" => SortValue::Text(self.course_title.clone()),
            "created_at" => SortValue::Time(Some(self.created_at)),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for CourseLesson {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "lesson_title" => SortValue::Text(self.lesson_title.clone()),
            "lesson_order" => SortValue::Int(self.lesson_order.into()),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for TopicType {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "type_name" => SortValue::Text(self.type_name.clone()),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for LessonTopic {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "topic_title" => SortValue::Text(self.topic_title.clone()),
            "topic_order" => SortValue::Int(self.topic_order.into()),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for CourseComment {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "created_at" => SortValue::Time(Some(self.created_at)),
            _ => SortValue::Int(self.id),
        }
    }
}

impl Sortable for CourseRating {
    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "created_at" => SortValue::Time(Some(self.created_at)),
            "rating" => SortValue::Int(self.rating.into()),
            _ => SortValue::Int(self.id),
        }
    }
}

fn paginate<T: Sortable>(mut rows: Vec<T>, query: &ListQuery) -> (Vec<T>, i64) {
    rows.sort_by(|a, b| {
        for order in &query.order {
            let ordering = a.sort_value(order.field).cmp(&b.sort_value(order.field));
            let ordering = if order.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.sort_value("id").cmp(&b.sort_value("id"))
    });

    let total = rows.len() as i64;
    let offset = usize::try_from(query.offset).unwrap_or(0);
    let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
    (rows.into_iter().skip(offset).take(limit).collect(), total)
}

// --- Store ---

#[derive(Default)]
struct Store {
    next_id: i64,
    users: Vec<User>,
    tokens: Vec<OutstandingToken>,
    blacklisted: HashSet<Uuid>,
    categories: Vec<TaxonomyTerm>,
    course_types: Vec<TaxonomyTerm>,
    courses: Vec<Course>,
    lessons: Vec<CourseLesson>,
    topic_types: Vec<TopicType>,
    topics: Vec<LessonTopic>,
    comments: Vec<CourseComment>,
    ratings: Vec<CourseRating>,
    authors: Vec<AuthorDetails>,
    contacts: Vec<ContactDetail>,
}

fn conflict(constraint: &str) -> RepositoryError {
    RepositoryError::Conflict(constraint.to_string())
}

fn missing() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::RowNotFound)
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn terms(&self, kind: TaxonomyKind) -> &Vec<TaxonomyTerm> {
        match kind {
            TaxonomyKind::Category => &self.categories,
            TaxonomyKind::CourseType => &self.course_types,
        }
    }

    fn terms_mut(&mut self, kind: TaxonomyKind) -> &mut Vec<TaxonomyTerm> {
        match kind {
            TaxonomyKind::Category => &mut self.categories,
            TaxonomyKind::CourseType => &mut self.course_types,
        }
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn course(&self, id: i64) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    fn lesson(&self, id: i64) -> Option<&CourseLesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    fn course_visible(&self, course_id: i64, visibility: Visibility) -> bool {
        self.course(course_id)
            .is_some_and(|course| visibility.allows(course))
    }

    fn check_user_unique(&self, id: Uuid, username: &str, email: &str) -> RepoResult<()> {
        if self.users.iter().any(|u| u.id != id && u.username == username) {
            return Err(conflict("users_username_key"));
        }
        if self
            .users
            .iter()
            .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email))
        {
            return Err(conflict("users_email_lower_key"));
        }
        Ok(())
    }

    // Joined columns, resolved at read time.
    fn with_author(&self, mut comment: CourseComment) -> CourseComment {
        if let Some(user) = self.user(comment.user_id) {
            comment.username = user.username.clone();
            comment.avatar = user.avatar.clone();
        }
        comment
    }

    fn with_rater(&self, mut rating: CourseRating) -> CourseRating {
        if let Some(user) = self.user(rating.user_id) {
            rating.username = user.username.clone();
        }
        rating
    }

    fn with_username(&self, mut author: AuthorDetails) -> AuthorDetails {
        if let Some(user) = self.user(author.user_id) {
            author.username = user.username.clone();
        }
        author
    }

    // --- Cascades (mirror the ON DELETE CASCADE foreign keys) ---

    fn remove_course(&mut self, id: i64) {
        self.courses.retain(|c| c.id != id);
        let lessons: Vec<i64> = self
            .lessons
            .iter()
            .filter(|l| l.course_id == id)
            .map(|l| l.id)
            .collect();
        for lesson_id in lessons {
            self.remove_lesson(lesson_id);
        }
        self.comments.retain(|c| c.course_id != id);
        self.ratings.retain(|r| r.course_id != id);
        let authors: Vec<i64> = self
            .authors
            .iter()
            .filter(|a| a.course_id == id)
            .map(|a| a.id)
            .collect();
        for author_id in authors {
            self.remove_author(author_id);
        }
    }

    fn remove_lesson(&mut self, id: i64) {
        self.lessons.retain(|l| l.id != id);
        self.topics.retain(|t| t.lesson_id != id);
    }

    fn remove_topic_type(&mut self, id: i64) {
        self.topic_types.retain(|t| t.id != id);
        self.topics.retain(|t| t.type_id != id);
    }

    fn remove_comment(&mut self, id: i64) {
        let mut doomed = vec![id];
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            for reply in self.comments.iter().filter(|c| c.parent_id == Some(parent)) {
                doomed.push(reply.id);
                frontier.push(reply.id);
            }
        }
        self.comments.retain(|c| !doomed.contains(&c.id));
    }

    fn remove_author(&mut self, id: i64) {
        self.authors.retain(|a| a.id != id);
        self.contacts.retain(|c| c.author_id != id);
    }

    fn remove_term(&mut self, kind: TaxonomyKind, id: i64) {
        self.terms_mut(kind).retain(|t| t.id != id);
        let courses: Vec<i64> = self
            .courses
            .iter()
            .filter(|c| match kind {
                TaxonomyKind::Category => c.course_category_id == id,
                TaxonomyKind::CourseType => c.course_type_id == id,
            })
            .map(|c| c.id)
            .collect();
        for course_id in courses {
            self.remove_course(course_id);
        }
    }

    fn remove_user(&mut self, id: Uuid) {
        let courses: Vec<i64> = self
            .courses
            .iter()
            .filter(|c| c.created_by == id)
            .map(|c| c.id)
            .collect();
        for course_id in courses {
            self.remove_course(course_id);
        }
        let lessons: Vec<i64> = self
            .lessons
            .iter()
            .filter(|l| l.created_by == id)
            .map(|l| l.id)
            .collect();
        for lesson_id in lessons {
            self.remove_lesson(lesson_id);
        }
        let topic_types: Vec<i64> = self
            .topic_types
            .iter()
            .filter(|t| t.created_by == id)
            .map(|t| t.id)
            .collect();
        for type_id in topic_types {
            self.remove_topic_type(type_id);
        }
        self.topics.retain(|t| t.created_by != id);
        let comments: Vec<i64> = self
            .comments
            .iter()
            .filter(|c| c.user_id == id)
            .map(|c| c.id)
            .collect();
        for comment_id in comments {
            self.remove_comment(comment_id);
        }
        self.ratings.retain(|r| r.user_id != id);
        let authors: Vec<i64> = self
            .authors
            .iter()
            .filter(|a| a.user_id == id)
            .map(|a| a.id)
            .collect();
        for author_id in authors {
            self.remove_author(author_id);
        }
        self.contacts.retain(|c| c.created_by != id);

        let jtis: Vec<Uuid> = self
            .tokens
            .iter()
            .filter(|t| t.user_id == id)
            .map(|t| t.jti)
            .collect();
        self.tokens.retain(|t| t.user_id != id);
        for jti in jtis {
            self.blacklisted.remove(&jti);
        }
        self.users.retain(|u| u.id != id);
    }
}

/// InMemoryRepository
///
/// A complete, process-local implementation of the repository traits. Backs the
/// router tests and can serve a throwaway local instance. Enforces the same
/// unique constraints and cascades as the Postgres schema.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store.lock().await.user(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let store = self.store.lock().await;
        Ok(store.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store.lock().await;
        let id = Uuid::new_v4();
        store.check_user_unique(id, &user.username, &user.email)?;

        let created = User {
            id,
            username: user.username,
            email: user.email.to_lowercase(),
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            avatar: None,
            is_active: user.is_active,
            is_verified: user.is_verified,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            date_joined: now_micros(),
            last_login: None,
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> RepoResult<User> {
        let mut store = self.store.lock().await;
        store.check_user_unique(user.id, &user.username, &user.email)?;

        let row = store
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(missing)?;
        let date_joined = row.date_joined;
        *row = User {
            email: user.email.to_lowercase(),
            date_joined,
            ..user.clone()
        };
        Ok(row.clone())
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if store.user(id).is_none() {
            return Ok(false);
        }
        store.remove_user(id);
        Ok(true)
    }

    async fn list_users(&self, query: &ListQuery) -> RepoResult<(Vec<User>, i64)> {
        let store = self.store.lock().await;
        Ok(paginate(store.users.clone(), query))
    }

    async fn record_outstanding_token(&self, token: OutstandingToken) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        if store.tokens.iter().any(|t| t.jti == token.jti) {
            return Err(conflict("outstanding_tokens_pkey"));
        }
        store.tokens.push(token);
        Ok(())
    }

    async fn get_outstanding_token(&self, jti: Uuid) -> RepoResult<Option<OutstandingToken>> {
        let store = self.store.lock().await;
        Ok(store.tokens.iter().find(|t| t.jti == jti).cloned())
    }

    async fn blacklist_token(&self, jti: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if !store.tokens.iter().any(|t| t.jti == jti) {
            return Ok(false);
        }
        Ok(store.blacklisted.insert(jti))
    }

    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool> {
        Ok(self.store.lock().await.blacklisted.contains(&jti))
    }

    async fn blacklist_user_tokens(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut store = self.store.lock().await;
        let jtis: Vec<Uuid> = store
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.jti)
            .collect();
        let newly = jtis
            .into_iter()
            .filter(|jti| store.blacklisted.insert(*jti))
            .count();
        Ok(newly as u64)
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let store = self.store.lock().await;
        Ok(AdminDashboardStats {
            total_users: store.users.len() as i64,
            verified_users: store.users.iter().filter(|u| u.is_verified).count() as i64,
            total_courses: store.courses.len() as i64,
            published_courses: store.courses.iter().filter(|c| c.is_published).count() as i64,
            total_comments: store.comments.len() as i64,
            total_ratings: store.ratings.len() as i64,
        })
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn slug_exists(&self, scope: SlugScope, slug: &str) -> RepoResult<bool> {
        let store = self.store.lock().await;
        Ok(match scope {
            SlugScope::Category => store.categories.iter().any(|t| t.slug == slug),
            SlugScope::CourseType => store.course_types.iter().any(|t| t.slug == slug),
            SlugScope::Course => store.courses.iter().any(|c| c.course_slug == slug),
            SlugScope::TopicType => store.topic_types.iter().any(|t| t.topic_slug == slug),
            SlugScope::Lesson { course_id } => store
                .lessons
                .iter()
                .any(|l| l.course_id == course_id && l.lesson_slug == slug),
            SlugScope::Topic { lesson_id } => store
                .topics
                .iter()
                .any(|t| t.lesson_id == lesson_id && t.topic_slug == slug),
        })
    }

    // --- Categories & course types ---

    async fn list_terms(
        &self,
        kind: TaxonomyKind,
        active_only: bool,
        query: &ListQuery,
    ) -> RepoResult<(Vec<TaxonomyTerm>, i64)> {
        let store = self.store.lock().await;
        let rows = store
            .terms(kind)
            .iter()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    async fn get_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<Option<TaxonomyTerm>> {
        let store = self.store.lock().await;
        Ok(store.terms(kind).iter().find(|t| t.id == id).cloned())
    }

    async fn get_terms_by_ids(&self, kind: TaxonomyKind, ids: &[i64]) -> RepoResult<Vec<TaxonomyTerm>> {
        let store = self.store.lock().await;
        Ok(store
            .terms(kind)
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn create_term(&self, kind: TaxonomyKind, term: NewTaxonomyTerm) -> RepoResult<TaxonomyTerm> {
        let mut store = self.store.lock().await;
        if store.terms(kind).iter().any(|t| t.name == term.name) {
            return Err(conflict("taxonomy_name_key"));
        }
        if store.terms(kind).iter().any(|t| t.slug == term.slug) {
            return Err(conflict("taxonomy_slug_key"));
        }
        let created = TaxonomyTerm {
            id: store.next_id(),
            name: term.name,
            slug: term.slug,
            description: term.description,
            is_active: term.is_active,
        };
        store.terms_mut(kind).push(created.clone());
        Ok(created)
    }

    async fn update_term(&self, kind: TaxonomyKind, term: &TaxonomyTerm) -> RepoResult<TaxonomyTerm> {
        let mut store = self.store.lock().await;
        if store
            .terms(kind)
            .iter()
            .any(|t| t.id != term.id && t.name == term.name)
        {
            return Err(conflict("taxonomy_name_key"));
        }
        let row = store
            .terms_mut(kind)
            .iter_mut()
            .find(|t| t.id == term.id)
            .ok_or_else(missing)?;
        row.name = term.name.clone();
        row.description = term.description.clone();
        row.is_active = term.is_active;
        Ok(row.clone())
    }

    async fn delete_term(&self, kind: TaxonomyKind, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if !store.terms(kind).iter().any(|t| t.id == id) {
            return Ok(false);
        }
        store.remove_term(kind, id);
        Ok(true)
    }

    // --- Courses ---

    async fn list_courses(&self, filter: &CourseFilter, query: &ListQuery) -> RepoResult<(Vec<Course>, i64)> {
        let store = self.store.lock().await;
        let category_by_slug = filter.category_slug.as_ref().map(|slug| {
            store
                .categories
                .iter()
                .find(|t| &t.slug == slug)
                .map(|t| t.id)
        });
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let rows = store
            .courses
            .iter()
            .filter(|c| filter.visibility.allows(c))
            .filter(|c| filter.category_id.is_none_or(|id| c.course_category_id == id))
            .filter(|c| match category_by_slug {
                Some(Some(id)) => c.course_category_id == id,
                Some(None) => false,
                None => true,
            })
            .filter(|c| {
                search.as_ref().is_none_or(|needle| {
                    c.course_title.to_lowercase().contains(needle)
                        || c.course_description.to_lowercase().contains(needle)
                })
            })
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    async fn get_course(&self, id: i64) -> RepoResult<Option<Course>> {
        Ok(self.store.lock().await.course(id).cloned())
    }

    async fn get_course_by_slug(&self, slug: &str) -> RepoResult<Option<Course>> {
        let store = self.store.lock().await;
        Ok(store.courses.iter().find(|c| c.course_slug == slug).cloned())
    }

    async fn get_courses_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Course>> {
        let store = self.store.lock().await;
        Ok(store
            .courses
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn create_course(&self, course: NewCourse) -> RepoResult<Course> {
        let mut store = self.store.lock().await;
        if store.courses.iter().any(|c| c.course_slug == course.course_slug) {
            return Err(conflict("courses_course_slug_key"));
        }
        let now = now_micros();
        let created = Course {
            id: store.next_id(),
            course_category_id: course.course_category_id,
            course_type_id: course.course_type_id,
            course_title: course.course_title,
            course_slug: course.course_slug,
            course_description: course.course_description,
            course_banner: course.course_banner,
            course_views: 0,
            is_free_course: course.is_free_course,
            course_price: course.course_price,
            is_published: course.is_published,
            created_at: now,
            created_by: course.created_by,
            updated_at: now,
            is_active: true,
        };
        store.courses.push(created.clone());
        Ok(created)
    }

    async fn update_course(&self, course: &Course) -> RepoResult<Course> {
        let mut store = self.store.lock().await;
        let row = store
            .courses
            .iter_mut()
            .find(|c| c.id == course.id)
            .ok_or_else(missing)?;
        row.course_category_id = course.course_category_id;
        row.course_type_id = course.course_type_id;
        row.course_title = course.course_title.clone();
        row.course_description = course.course_description.clone();
        row.course_banner = course.course_banner.clone();
        row.is_free_course = course.is_free_course;
        row.course_price = course.course_price;
        row.is_published = course.is_published;
        row.is_active = course.is_active;
        row.updated_at = now_micros();
        Ok(row.clone())
    }

    async fn delete_course(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if store.course(id).is_none() {
            return Ok(false);
        }
        store.remove_course(id);
        Ok(true)
    }

    async fn increment_course_views(&self, id: i64) -> RepoResult<()> {
        let mut store = self.store.lock().await;
        if let Some(course) = store.courses.iter_mut().find(|c| c.id == id) {
            course.course_views += 1;
        }
        Ok(())
    }

    // --- Lessons ---

    async fn list_lessons(&self, filter: &LessonFilter, query: &ListQuery) -> RepoResult<(Vec<CourseLesson>, i64)> {
        let store = self.store.lock().await;
        let rows = store
            .lessons
            .iter()
            .filter(|l| filter.visibility == Visibility::Everything || l.is_active)
            .filter(|l| filter.course_id.is_none_or(|id| l.course_id == id))
            .filter(|l| store.course_visible(l.course_id, filter.visibility))
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    async fn get_lesson(&self, id: i64) -> RepoResult<Option<CourseLesson>> {
        Ok(self.store.lock().await.lesson(id).cloned())
    }

    async fn get_lessons_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<CourseLesson>> {
        let store = self.store.lock().await;
        Ok(store
            .lessons
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn create_lesson(&self, lesson: NewLesson) -> RepoResult<CourseLesson> {
        let mut store = self.store.lock().await;
        if store
            .lessons
            .iter()
            .any(|l| l.course_id == lesson.course_id && l.lesson_slug == lesson.lesson_slug)
        {
            return Err(conflict("course_lessons_course_id_lesson_slug_key"));
        }
        let created = CourseLesson {
            id: store.next_id(),
            course_id: lesson.course_id,
            lesson_title: lesson.lesson_title,
            lesson_slug: lesson.lesson_slug,
            lesson_description: lesson.lesson_description,
            lesson_order: lesson.lesson_order,
            created_at: now_micros(),
            created_by: lesson.created_by,
            is_active: true,
        };
        store.lessons.push(created.clone());
        Ok(created)
    }

    async fn update_lesson(&self, lesson: &CourseLesson) -> RepoResult<CourseLesson> {
        let mut store = self.store.lock().await;
        let row = store
            .lessons
            .iter_mut()
            .find(|l| l.id == lesson.id)
            .ok_or_else(missing)?;
        row.lesson_title = lesson.lesson_title.clone();
        row.lesson_description = lesson.lesson_description.clone();
        row.lesson_order = lesson.lesson_order;
        row.is_active = lesson.is_active;
        Ok(row.clone())
    }

    async fn delete_lesson(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if store.lesson(id).is_none() {
            return Ok(false);
        }
        store.remove_lesson(id);
        Ok(true)
    }

    // --- Topic types ---

    async fn list_topic_types(&self, active_only: bool, query: &ListQuery) -> RepoResult<(Vec<TopicType>, i64)> {
        let store = self.store.lock().await;
        let rows = store
            .topic_types
            .iter()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    async fn get_topic_type(&self, id: i64) -> RepoResult<Option<TopicType>> {
        let store = self.store.lock().await;
        Ok(store.topic_types.iter().find(|t| t.id == id).cloned())
    }

    async fn get_topic_types_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<TopicType>> {
        let store = self.store.lock().await;
        Ok(store
            .topic_types
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn create_topic_type(&self, topic_type: NewTopicType) -> RepoResult<TopicType> {
        let mut store = self.store.lock().await;
        if store
            .topic_types
            .iter()
            .any(|t| t.topic_slug == topic_type.topic_slug)
        {
            return Err(conflict("topic_types_topic_slug_key"));
        }
        let created = TopicType {
            id: store.next_id(),
            type_name: topic_type.type_name,
            topic_slug: topic_type.topic_slug,
            created_at: now_micros(),
            created_by: topic_type.created_by,
            is_active: true,
        };
        store.topic_types.push(created.clone());
        Ok(created)
    }

    async fn update_topic_type(&self, topic_type: &TopicType) -> RepoResult<TopicType> {
        let mut store = self.store.lock().await;
        let row = store
            .topic_types
            .iter_mut()
            .find(|t| t.id == topic_type.id)
            .ok_or_else(missing)?;
        row.type_name = topic_type.type_name.clone();
        row.is_active = topic_type.is_active;
        Ok(row.clone())
    }

    async fn delete_topic_type(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if !store.topic_types.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        store.remove_topic_type(id);
        Ok(true)
    }

    // --- Topics ---

    async fn list_topics(&self, filter: &TopicFilter, query: &ListQuery) -> RepoResult<(Vec<LessonTopic>, i64)> {
        let store = self.store.lock().await;
        let everything = filter.visibility == Visibility::Everything;
        let rows = store
            .topics
            .iter()
            .filter(|t| everything || t.is_active)
            .filter(|t| filter.lesson_id.is_none_or(|id| t.lesson_id == id))
            .filter(|t| {
                store.lesson(t.lesson_id).is_some_and(|lesson| {
                    (everything || lesson.is_active)
                        && store.course_visible(lesson.course_id, filter.visibility)
                })
            })
            .cloned()
            .collect();
        Ok(paginate(rows, query))
    }

    async fn get_topic(&self, id: i64) -> RepoResult<Option<LessonTopic>> {
        let store = self.store.lock().await;
        Ok(store.topics.iter().find(|t| t.id == id).cloned())
    }

    async fn create_topic(&self, topic: NewTopic) -> RepoResult<LessonTopic> {
        let mut store = self.store.lock().await;
        if store
            .topics
            .iter()
            .any(|t| t.lesson_id == topic.lesson_id && t.topic_slug == topic.topic_slug)
        {
            return Err(conflict("lesson_topics_lesson_id_topic_slug_key"));
        }
        let created = LessonTopic {
            id: store.next_id(),
            lesson_id: topic.lesson_id,
            type_id: topic.type_id,
            topic_order: topic.topic_order,
            topic_title: topic.topic_title,
            topic_slug: topic.topic_slug,
            topic_content: topic.topic_content,
            created_at: now_micros(),
            created_by: topic.created_by,
            is_active: true,
        };
        store.topics.push(created.clone());
        Ok(created)
    }

    async fn update_topic(&self, topic: &LessonTopic) -> RepoResult<LessonTopic> {
        let mut store = self.store.lock().await;
        let row = store
            .topics
            .iter_mut()
            .find(|t| t.id == topic.id)
            .ok_or_else(missing)?;
        row.type_id = topic.type_id;
        row.topic_order = topic.topic_order;
        row.topic_title = topic.topic_title.clone();
        row.topic_content = topic.topic_content.clone();
        row.is_active = topic.is_active;
        Ok(row.clone())
    }

    async fn delete_topic(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.topics.len();
        store.topics.retain(|t| t.id != id);
        Ok(store.topics.len() < before)
    }

    // --- Comments ---

    async fn list_root_comments(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseComment>, i64)> {
        let store = self.store.lock().await;
        let rows = store
            .comments
            .iter()
            .filter(|c| c.course_id == course_id && c.parent_id.is_none())
            .map(|c| store.with_author(c.clone()))
            .collect();
        Ok(paginate(rows, query))
    }

    async fn list_replies(&self, course_id: i64) -> RepoResult<Vec<CourseComment>> {
        let store = self.store.lock().await;
        let mut replies: Vec<CourseComment> = store
            .comments
            .iter()
            .filter(|c| c.course_id == course_id && c.parent_id.is_some())
            .map(|c| store.with_author(c.clone()))
            .collect();
        replies.sort_by_key(|c| (c.created_at, c.id));
        Ok(replies)
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Option<CourseComment>> {
        let store = self.store.lock().await;
        Ok(store
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| store.with_author(c.clone())))
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<CourseComment> {
        let mut store = self.store.lock().await;
        let created = CourseComment {
            id: store.next_id(),
            course_id: comment.course_id,
            user_id: comment.user_id,
            parent_id: comment.parent_id,
            content: comment.content,
            created_at: now_micros(),
            username: String::new(),
            avatar: None,
        };
        store.comments.push(created.clone());
        Ok(store.with_author(created))
    }

    async fn update_comment(&self, id: i64, content: &str) -> RepoResult<Option<CourseComment>> {
        let mut store = self.store.lock().await;
        let Some(row) = store.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        row.content = content.to_string();
        let updated = row.clone();
        Ok(Some(store.with_author(updated)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if !store.comments.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        store.remove_comment(id);
        Ok(true)
    }

    async fn comments_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseComment>> {
        let store = self.store.lock().await;
        Ok(store
            .comments
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| store.with_author(c.clone()))
            .collect())
    }

    // --- Ratings ---

    async fn upsert_rating(
        &self,
        course_id: i64,
        user_id: Uuid,
        rating: i32,
        review: Option<String>,
    ) -> RepoResult<CourseRating> {
        let mut store = self.store.lock().await;
        if let Some(index) = store
            .ratings
            .iter()
            .position(|r| r.course_id == course_id && r.user_id == user_id)
        {
            let row = &mut store.ratings[index];
            row.rating = rating;
            row.review = review;
            let updated = row.clone();
            return Ok(store.with_rater(updated));
        }

        let created = CourseRating {
            id: store.next_id(),
            course_id,
            user_id,
            rating,
            review,
            created_at: now_micros(),
            username: String::new(),
        };
        store.ratings.push(created.clone());
        Ok(store.with_rater(created))
    }

    async fn list_ratings(&self, course_id: i64, query: &ListQuery) -> RepoResult<(Vec<CourseRating>, i64)> {
        let store = self.store.lock().await;
        let rows = store
            .ratings
            .iter()
            .filter(|r| r.course_id == course_id)
            .map(|r| store.with_rater(r.clone()))
            .collect();
        Ok(paginate(rows, query))
    }

    async fn rating_summary(&self, course_id: i64) -> RepoResult<RatingSummary> {
        let store = self.store.lock().await;
        let ratings: Vec<i32> = store
            .ratings
            .iter()
            .filter(|r| r.course_id == course_id)
            .map(|r| r.rating)
            .collect();
        let count = ratings.len() as i64;
        let average = (count > 0).then(|| ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / count as f64);
        Ok(RatingSummary {
            course_id,
            average,
            count,
        })
    }

    async fn delete_rating(&self, course_id: i64, user_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.ratings.len();
        store
            .ratings
            .retain(|r| !(r.course_id == course_id && r.user_id == user_id));
        Ok(store.ratings.len() < before)
    }

    async fn ratings_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CourseRating>> {
        let store = self.store.lock().await;
        Ok(store
            .ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| store.with_rater(r.clone()))
            .collect())
    }

    // --- Co-authors ---

    async fn create_author(&self, author: NewAuthorDetails) -> RepoResult<AuthorDetails> {
        let mut store = self.store.lock().await;
        if store
            .authors
            .iter()
            .any(|a| a.course_id == author.course_id && a.user_id == author.user_id)
        {
            return Err(conflict("author_details_course_id_user_id_key"));
        }
        let created = AuthorDetails {
            id: store.next_id(),
            user_id: author.user_id,
            course_id: author.course_id,
            designation: author.designation,
            is_active: true,
            consent_given: author.consent_given,
            created_at: Some(now_micros()),
            consent_date: author.consent_date,
            username: String::new(),
        };
        store.authors.push(created.clone());
        Ok(store.with_username(created))
    }

    async fn get_author(&self, id: i64) -> RepoResult<Option<AuthorDetails>> {
        let store = self.store.lock().await;
        Ok(store
            .authors
            .iter()
            .find(|a| a.id == id)
            .map(|a| store.with_username(a.clone())))
    }

    async fn get_author_for(&self, course_id: i64, user_id: Uuid) -> RepoResult<Option<AuthorDetails>> {
        let store = self.store.lock().await;
        Ok(store
            .authors
            .iter()
            .find(|a| a.course_id == course_id && a.user_id == user_id)
            .map(|a| store.with_username(a.clone())))
    }

    async fn list_course_authors(&self, course_id: i64, public_only: bool) -> RepoResult<Vec<AuthorDetails>> {
        let store = self.store.lock().await;
        Ok(store
            .authors
            .iter()
            .filter(|a| a.course_id == course_id)
            .filter(|a| !public_only || a.grants_editing())
            .map(|a| store.with_username(a.clone()))
            .collect())
    }

    async fn authors_by_user(&self, user_id: Uuid) -> RepoResult<Vec<AuthorDetails>> {
        let store = self.store.lock().await;
        Ok(store
            .authors
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| store.with_username(a.clone()))
            .collect())
    }

    async fn update_author(&self, author: &AuthorDetails) -> RepoResult<AuthorDetails> {
        let mut store = self.store.lock().await;
        let row = store
            .authors
            .iter_mut()
            .find(|a| a.id == author.id)
            .ok_or_else(missing)?;
        row.designation = author.designation.clone();
        row.is_active = author.is_active;
        row.consent_given = author.consent_given;
        row.consent_date = author.consent_date;
        let updated = row.clone();
        Ok(store.with_username(updated))
    }

    async fn delete_author(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        if !store.authors.iter().any(|a| a.id == id) {
            return Ok(false);
        }
        store.remove_author(id);
        Ok(true)
    }

    // --- Contacts ---

    async fn list_contacts(&self, author_id: i64) -> RepoResult<Vec<ContactDetail>> {
        let store = self.store.lock().await;
        Ok(store
            .contacts
            .iter()
            .filter(|c| c.author_id == author_id && c.is_active)
            .cloned()
            .collect())
    }

    async fn get_contact(&self, id: i64) -> RepoResult<Option<ContactDetail>> {
        let store = self.store.lock().await;
        Ok(store.contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn create_contact(&self, contact: NewContactDetail) -> RepoResult<ContactDetail> {
        let mut store = self.store.lock().await;
        let created = ContactDetail {
            id: store.next_id(),
            author_id: contact.author_id,
            contact_type: contact.contact_type,
            contact_value: contact.contact_value,
            created_at: now_micros(),
            created_by: contact.created_by,
            is_active: true,
        };
        store.contacts.push(created.clone());
        Ok(created)
    }

    async fn delete_contact(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.lock().await;
        let before = store.contacts.len();
        store.contacts.retain(|c| c.id != id);
        Ok(store.contacts.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::OrderBy;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@Example.com"),
            password_hash: "hash".into(),
            is_active: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let repo = InMemoryRepository::new();
        let user = repo.create_user(new_user("alice")).await.unwrap();
        assert_eq!(user.email, "alice@example.com");

        let mut clash = new_user("alice2");
        clash.email = "ALICE@example.com".into();
        assert!(matches!(
            repo.create_user(clash).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(repo.get_user_by_email("Alice@Example.COM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blacklisting_reports_first_use_only() {
        let repo = InMemoryRepository::new();
        let user = repo.create_user(new_user("bob")).await.unwrap();
        let jti = Uuid::new_v4();
        repo.record_outstanding_token(OutstandingToken {
            jti,
            user_id: user.id,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        })
        .await
        .unwrap();

        assert!(repo.blacklist_token(jti).await.unwrap());
        assert!(!repo.blacklist_token(jti).await.unwrap());
        assert!(repo.is_token_blacklisted(jti).await.unwrap());
        assert!(!repo.blacklist_token(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_comment_removes_its_thread() {
        let repo = InMemoryRepository::new();
        let user = repo.create_user(new_user("carol")).await.unwrap();
        let root = repo
            .create_comment(NewComment {
                course_id: 1,
                user_id: user.id,
                parent_id: None,
                content: "root".into(),
            })
            .await
            .unwrap();
        let reply = repo
            .create_comment(NewComment {
                course_id: 1,
                user_id: user.id,
                parent_id: Some(root.id),
                content: "reply".into(),
            })
            .await
            .unwrap();
        repo.create_comment(NewComment {
            course_id: 1,
            user_id: user.id,
            parent_id: Some(reply.id),
            content: "nested".into(),
        })
        .await
        .unwrap();

        assert!(repo.delete_comment(root.id).await.unwrap());
        assert!(repo.list_replies(1).await.unwrap().is_empty());
    }

    #[test]
    fn paginate_orders_and_slices() {
        let rows: Vec<TaxonomyTerm> = ["b", "c", "a"]
            .iter()
            .enumerate()
            .map(|(i, name)| TaxonomyTerm {
                id: i as i64 + 1,
                name: name.to_string(),
                ..Default::default()
            })
            .collect();
        let query = ListQuery {
            order: vec![OrderBy::desc("name")],
            limit: 2,
            offset: 1,
        };
        let (page, total) = paginate(rows, &query);
        assert_eq!(total, 3);
        let names: Vec<_> = page.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
