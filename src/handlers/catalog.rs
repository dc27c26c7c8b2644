use axum::{
    Json,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use super::paginate;
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    catalog::{
        CATEGORY_ORDERING, COURSE_ORDERING, COURSE_TYPE_ORDERING, LESSON_ORDERING,
        TOPIC_ORDERING, TOPIC_TYPE_ORDERING, course_view, course_views, lesson_view, lesson_views,
        topic_view, topic_views,
    },
    error::{AppError, AppResult, FieldErrors},
    models::{
        Course, CourseCategory, CourseType, CourseView, CreateCourseRequest, CreateLessonRequest,
        CreateTopicRequest, LessonView, NewCourse, NewLesson, NewTopic, NewTopicType,
        PresignedUrlRequest, PresignedUrlResponse, Price, TaxonomyKind, TopicType,
        TopicTypeRequest, TopicView, UpdateCourseRequest, UpdateLessonRequest,
        UpdateTopicRequest, UpdateTopicTypeRequest, UploadPurpose,
    },
    pagination::{Page, PageParams},
    permissions::{Visibility, can_edit_course, ensure_can_manage},
    repository::{CourseFilter, LessonFilter, TopicFilter},
    slug::{MAX_SLUG_LENGTH, SlugScope, slugify, unique_slug},
};

const MAX_TYPE_NAME_LENGTH: usize = 100;

// --- Filter Structs ---

/// CourseListFilter
///
/// Query filters of `GET /courses`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CourseListFilter {
    /// Category id.
    pub course_category: Option<i64>,
    /// Category slug.
    #[serde(rename = "course_category__category_slug")]
    pub category_slug: Option<String>,
    /// Case-insensitive match on title or description.
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LessonListFilter {
    /// Course id.
    pub course: Option<i64>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopicListFilter {
    /// Lesson id.
    pub lesson: Option<i64>,
}

// --- Shared checks ---

fn does_not_exist(id: i64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

/// Rows below a course follow the course's visibility and are hidden while
/// inactive, except for superusers.
fn row_visible(visibility: Visibility, course: &Course, row_active: bool) -> bool {
    visibility.allows(course) && (visibility == Visibility::Everything || row_active)
}

fn check_title(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > MAX_SLUG_LENGTH {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_SLUG_LENGTH} characters."),
        );
    }
}

fn check_order(errors: &mut FieldErrors, field: &str, value: i32) {
    if value < 0 {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
    }
}

/// Banner keys must come from this user's `course_banners/` upload prefix.
fn check_banner(errors: &mut FieldErrors, banner: Option<&str>, user_id: Uuid) {
    if let Some(key) = banner {
        let prefix = UploadPurpose::CourseBanner.owner_prefix(user_id);
        if !key.starts_with(&prefix) || crate::storage::sanitize_key(key) != key {
            errors.add("course_banner", "Invalid banner key.");
        }
    }
}

async fn check_term(
    state: &AppState,
    errors: &mut FieldErrors,
    field: &str,
    kind: TaxonomyKind,
    id: i64,
) -> AppResult<()> {
    let active = state
        .repo
        .get_term(kind, id)
        .await?
        .is_some_and(|term| term.is_active);
    if !active {
        errors.add(field, does_not_exist(id));
    }
    Ok(())
}

async fn load_course(state: &AppState, id: i64) -> AppResult<Course> {
    state.repo.get_course(id).await?.ok_or(AppError::NotFound)
}

/// The owner, superusers and consenting active co-authors may edit lessons and topics.
async fn ensure_course_editor(state: &AppState, course: &Course, user: &AuthUser) -> AppResult<()> {
    let co_author = state.repo.get_author_for(course.id, user.id).await?;
    if can_edit_course(course, co_author.as_ref(), user) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

// --- Categories & course types ---

#[utoipa::path(
    get,
    path = "/course-categories",
    params(PageParams),
    responses((status = 200, description = "Active categories", body = Page<CourseCategory>))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseCategory>>> {
    let repo = &state.repo;
    let page = paginate(&state, &uri, &params, &CATEGORY_ORDERING, |query| async move {
        repo.list_terms(TaxonomyKind::Category, true, &query).await
    })
    .await?;
    Ok(Json(page.map(CourseCategory::from)))
}

#[utoipa::path(
    get,
    path = "/course-categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = CourseCategory),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CourseCategory>> {
    let term = state
        .repo
        .get_term(TaxonomyKind::Category, id)
        .await?
        .filter(|term| term.is_active)
        .ok_or(AppError::NotFound)?;
    Ok(Json(term.into()))
}

#[utoipa::path(
    get,
    path = "/course-types",
    params(PageParams),
    responses((status = 200, description = "Active course types", body = Page<CourseType>))
)]
pub async fn list_course_types(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseType>>> {
    let repo = &state.repo;
    let page = paginate(&state, &uri, &params, &COURSE_TYPE_ORDERING, |query| async move {
        repo.list_terms(TaxonomyKind::CourseType, true, &query).await
    })
    .await?;
    Ok(Json(page.map(CourseType::from)))
}

#[utoipa::path(
    get,
    path = "/course-types/{id}",
    params(("id" = i64, Path, description = "Course type ID")),
    responses(
        (status = 200, description = "Found", body = CourseType),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_course_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CourseType>> {
    let term = state
        .repo
        .get_term(TaxonomyKind::CourseType, id)
        .await?
        .filter(|term| term.is_active)
        .ok_or(AppError::NotFound)?;
    Ok(Json(term.into()))
}

// --- Courses ---

/// list_courses
///
/// [Public Route] Anonymous callers see published, active courses. Signed-in
/// callers also see their own drafts; superusers see everything.
#[utoipa::path(
    get,
    path = "/courses",
    params(PageParams, CourseListFilter),
    responses((status = 200, description = "Visible courses", body = Page<CourseView>))
)]
pub async fn list_courses(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
    Query(filter): Query<CourseListFilter>,
) -> AppResult<Json<Page<CourseView>>> {
    let filter = CourseFilter {
        visibility: Visibility::for_viewer(viewer.as_ref()),
        category_id: filter.course_category,
        category_slug: filter.category_slug.filter(|slug| !slug.is_empty()),
        search: filter
            .search
            .map(|search| search.trim().to_string())
            .filter(|search| !search.is_empty()),
    };

    let repo = &state.repo;
    let filter = &filter;
    let mut page = paginate(&state, &uri, &params, &COURSE_ORDERING, |query| async move {
        repo.list_courses(filter, &query).await
    })
    .await?;

    let rows = std::mem::take(&mut page.results);
    let views = course_views(&state.repo, state.storage.as_ref(), rows).await?;
    Ok(Json(page.with_results(views)))
}

#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Found", body = CourseView),
        (status = 404, description = "Not Found or not visible")
    )
)]
pub async fn get_course(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CourseView>> {
    let course = load_course(&state, id).await?;
    if !Visibility::for_viewer(viewer.as_ref()).allows(&course) {
        return Err(AppError::NotFound);
    }
    Ok(Json(course_view(&state.repo, state.storage.as_ref(), course).await?))
}

/// get_course_by_slug
///
/// [Public Route] The course page entry point; each successful read counts as a view.
#[utoipa::path(
    get,
    path = "/courses/slug/{slug}",
    params(("slug" = String, Path, description = "Course slug")),
    responses(
        (status = 200, description = "Found", body = CourseView),
        (status = 404, description = "Not Found or not visible")
    )
)]
pub async fn get_course_by_slug(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<CourseView>> {
    let mut course = state
        .repo
        .get_course_by_slug(&slug)
        .await?
        .ok_or(AppError::NotFound)?;
    if !Visibility::for_viewer(viewer.as_ref()).allows(&course) {
        return Err(AppError::NotFound);
    }

    state.repo.increment_course_views(course.id).await?;
    course.course_views += 1;
    Ok(Json(course_view(&state.repo, state.storage.as_ref(), course).await?))
}

/// create_course
///
/// [Authenticated Route] The caller becomes the owner. The slug is derived from
/// the title and made unique with a numeric suffix.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Created", body = CourseView),
        (status = 400, description = "Validation errors per field")
    )
)]
pub async fn create_course(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCourseRequest>,
) -> AppResult<(StatusCode, Json<CourseView>)> {
    let mut errors = FieldErrors::new();
    check_term(&state, &mut errors, "course_category", TaxonomyKind::Category, payload.course_category).await?;
    check_term(&state, &mut errors, "course_type", TaxonomyKind::CourseType, payload.course_type).await?;
    check_title(&mut errors, "course_title", &payload.course_title);
    if payload.course_description.trim().is_empty() {
        errors.add("course_description", "This field may not be blank.");
    }
    if !payload.is_free_course && payload.course_price.is_none() {
        errors.add("course_price", "A price is required for paid courses.");
    }
    check_banner(&mut errors, payload.course_banner.as_deref(), user.id);
    errors.into_result()?;

    let repo = &state.repo;
    let course_slug = unique_slug(&slugify(&payload.course_title), |candidate| async move {
        repo.slug_exists(SlugScope::Course, &candidate).await
    })
    .await?;

    let course_price = if payload.is_free_course {
        Price::ZERO
    } else {
        payload.course_price.unwrap_or(Price::ZERO)
    };

    let course = state
        .repo
        .create_course(NewCourse {
            course_category_id: payload.course_category,
            course_type_id: payload.course_type,
            course_title: payload.course_title.trim().to_string(),
            course_slug,
            course_description: payload.course_description,
            course_banner: payload.course_banner,
            is_free_course: payload.is_free_course,
            course_price,
            is_published: payload.is_published,
            created_by: user.id,
        })
        .await?;

    tracing::info!(course_id = course.id, user_id = %user.id, "course created");
    Ok((
        StatusCode::CREATED,
        Json(course_view(&state.repo, state.storage.as_ref(), course).await?),
    ))
}

/// update_course
///
/// [Authenticated Route] Partial update by the owner or a superuser. The slug
/// stays as first generated.
#[utoipa::path(
    put,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Updated", body = CourseView),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> AppResult<Json<CourseView>> {
    let mut course = load_course(&state, id).await?;
    ensure_can_manage(course.created_by, &user)?;

    let mut errors = FieldErrors::new();
    if let Some(category) = payload.course_category {
        check_term(&state, &mut errors, "course_category", TaxonomyKind::Category, category).await?;
    }
    if let Some(course_type) = payload.course_type {
        check_term(&state, &mut errors, "course_type", TaxonomyKind::CourseType, course_type).await?;
    }
    if let Some(title) = &payload.course_title {
        check_title(&mut errors, "course_title", title);
    }
    if payload
        .course_description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        errors.add("course_description", "This field may not be blank.");
    }
    check_banner(&mut errors, payload.course_banner.as_deref(), course.created_by);
    // A free course carries no price, so turning it paid needs one.
    let becomes_paid = course.is_free_course && payload.is_free_course == Some(false);
    if becomes_paid && payload.course_price.is_none() {
        errors.add("course_price", "A price is required for paid courses.");
    }
    errors.into_result()?;

    if let Some(category) = payload.course_category {
        course.course_category_id = category;
    }
    if let Some(course_type) = payload.course_type {
        course.course_type_id = course_type;
    }
    if let Some(title) = payload.course_title {
        course.course_title = title.trim().to_string();
    }
    if let Some(description) = payload.course_description {
        course.course_description = description;
    }
    if let Some(banner) = payload.course_banner {
        course.course_banner = Some(banner);
    }
    if let Some(is_free) = payload.is_free_course {
        course.is_free_course = is_free;
    }
    if let Some(price) = payload.course_price {
        course.course_price = price;
    }
    if course.is_free_course {
        course.course_price = Price::ZERO;
    }
    if let Some(published) = payload.is_published {
        course.is_published = published;
    }
    if let Some(active) = payload.is_active {
        course.is_active = active;
    }

    let course = state.repo.update_course(&course).await?;
    Ok(Json(course_view(&state.repo, state.storage.as_ref(), course).await?))
}

#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let course = load_course(&state, id).await?;
    ensure_can_manage(course.created_by, &user)?;

    if !state.repo.delete_course(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(course_id = id, user_id = %user.id, "course deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// get_my_courses
///
/// [Authenticated Route] The caller's own courses, drafts and inactive ones included.
#[utoipa::path(
    get,
    path = "/me/courses",
    params(PageParams),
    responses((status = 200, description = "My Courses", body = Page<CourseView>))
)]
pub async fn get_my_courses(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseView>>> {
    let filter = CourseFilter::visible_to(Visibility::OwnedBy(id));
    let repo = &state.repo;
    let filter = &filter;
    let mut page = paginate(&state, &uri, &params, &COURSE_ORDERING, |query| async move {
        repo.list_courses(filter, &query).await
    })
    .await?;

    let rows = std::mem::take(&mut page.results);
    let views = course_views(&state.repo, state.storage.as_ref(), rows).await?;
    Ok(Json(page.with_results(views)))
}

// --- Lessons ---

#[utoipa::path(
    get,
    path = "/course-lessons",
    params(PageParams, LessonListFilter),
    responses((status = 200, description = "Visible lessons", body = Page<LessonView>))
)]
pub async fn list_lessons(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
    Query(filter): Query<LessonListFilter>,
) -> AppResult<Json<Page<LessonView>>> {
    let filter = LessonFilter {
        visibility: Visibility::for_viewer(viewer.as_ref()),
        course_id: filter.course,
    };
    let repo = &state.repo;
    let filter = &filter;
    let mut page = paginate(&state, &uri, &params, &LESSON_ORDERING, |query| async move {
        repo.list_lessons(filter, &query).await
    })
    .await?;

    let rows = std::mem::take(&mut page.results);
    let views = lesson_views(&state.repo, state.storage.as_ref(), rows).await?;
    Ok(Json(page.with_results(views)))
}

#[utoipa::path(
    get,
    path = "/course-lessons/{id}",
    params(("id" = i64, Path, description = "Lesson ID")),
    responses(
        (status = 200, description = "Found", body = LessonView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_lesson(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<LessonView>> {
    let lesson = state.repo.get_lesson(id).await?.ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;
    if !row_visible(Visibility::for_viewer(viewer.as_ref()), &course, lesson.is_active) {
        return Err(AppError::NotFound);
    }
    Ok(Json(lesson_view(&state.repo, state.storage.as_ref(), lesson).await?))
}

#[utoipa::path(
    post,
    path = "/course-lessons",
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Created", body = LessonView),
        (status = 403, description = "Not a course editor")
    )
)]
pub async fn create_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateLessonRequest>,
) -> AppResult<(StatusCode, Json<LessonView>)> {
    let course = state
        .repo
        .get_course(payload.course)
        .await?
        .ok_or_else(|| FieldErrors::single("course", does_not_exist(payload.course)))?;
    ensure_course_editor(&state, &course, &user).await?;

    let mut errors = FieldErrors::new();
    check_title(&mut errors, "lesson_title", &payload.lesson_title);
    check_order(&mut errors, "lesson_order", payload.lesson_order);
    errors.into_result()?;

    let repo = &state.repo;
    let scope = SlugScope::Lesson { course_id: course.id };
    let lesson_slug = unique_slug(&slugify(&payload.lesson_title), |candidate| async move {
        repo.slug_exists(scope, &candidate).await
    })
    .await?;

    let lesson = state
        .repo
        .create_lesson(NewLesson {
            course_id: course.id,
            lesson_title: payload.lesson_title.trim().to_string(),
            lesson_slug,
            lesson_description: payload.lesson_description,
            lesson_order: payload.lesson_order,
            created_by: user.id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(lesson_view(&state.repo, state.storage.as_ref(), lesson).await?),
    ))
}

#[utoipa::path(
    put,
    path = "/course-lessons/{id}",
    params(("id" = i64, Path, description = "Lesson ID")),
    request_body = UpdateLessonRequest,
    responses(
        (status = 200, description = "Updated", body = LessonView),
        (status = 403, description = "Not a course editor"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> AppResult<Json<LessonView>> {
    let mut lesson = state.repo.get_lesson(id).await?.ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;
    ensure_course_editor(&state, &course, &user).await?;

    let mut errors = FieldErrors::new();
    if let Some(title) = &payload.lesson_title {
        check_title(&mut errors, "lesson_title", title);
    }
    if let Some(order) = payload.lesson_order {
        check_order(&mut errors, "lesson_order", order);
    }
    errors.into_result()?;

    if let Some(title) = payload.lesson_title {
        lesson.lesson_title = title.trim().to_string();
    }
    if let Some(description) = payload.lesson_description {
        lesson.lesson_description = description;
    }
    if let Some(order) = payload.lesson_order {
        lesson.lesson_order = order;
    }
    if let Some(active) = payload.is_active {
        lesson.is_active = active;
    }

    let lesson = state.repo.update_lesson(&lesson).await?;
    Ok(Json(lesson_view(&state.repo, state.storage.as_ref(), lesson).await?))
}

#[utoipa::path(
    delete,
    path = "/course-lessons/{id}",
    params(("id" = i64, Path, description = "Lesson ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a course editor"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let lesson = state.repo.get_lesson(id).await?.ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;
    ensure_course_editor(&state, &course, &user).await?;

    state.repo.delete_lesson(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Topic types ---

#[utoipa::path(
    get,
    path = "/topic-types",
    params(PageParams),
    responses((status = 200, description = "Active topic types", body = Page<TopicType>))
)]
pub async fn list_topic_types(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<TopicType>>> {
    let repo = &state.repo;
    let page = paginate(&state, &uri, &params, &TOPIC_TYPE_ORDERING, |query| async move {
        repo.list_topic_types(true, &query).await
    })
    .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/topic-types/{id}",
    params(("id" = i64, Path, description = "Topic type ID")),
    responses(
        (status = 200, description = "Found", body = TopicType),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_topic_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<TopicType>> {
    let topic_type = state
        .repo
        .get_topic_type(id)
        .await?
        .filter(|t| t.is_active)
        .ok_or(AppError::NotFound)?;
    Ok(Json(topic_type))
}

fn check_type_name(errors: &mut FieldErrors, name: &str) {
    if name.trim().is_empty() {
        errors.add("type_name", "This field may not be blank.");
    } else if name.chars().count() > MAX_TYPE_NAME_LENGTH {
        errors.add(
            "type_name",
            format!("Ensure this field has no more than {MAX_TYPE_NAME_LENGTH} characters."),
        );
    }
}

#[utoipa::path(
    post,
    path = "/topic-types",
    request_body = TopicTypeRequest,
    responses((status = 201, description = "Created", body = TopicType))
)]
pub async fn create_topic_type(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<TopicTypeRequest>,
) -> AppResult<(StatusCode, Json<TopicType>)> {
    let mut errors = FieldErrors::new();
    check_type_name(&mut errors, &payload.type_name);
    errors.into_result()?;

    let repo = &state.repo;
    let topic_slug = unique_slug(&slugify(&payload.type_name), |candidate| async move {
        repo.slug_exists(SlugScope::TopicType, &candidate).await
    })
    .await?;

    let topic_type = state
        .repo
        .create_topic_type(NewTopicType {
            type_name: payload.type_name.trim().to_string(),
            topic_slug,
            created_by: user.id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(topic_type)))
}

#[utoipa::path(
    put,
    path = "/topic-types/{id}",
    params(("id" = i64, Path, description = "Topic type ID")),
    request_body = UpdateTopicTypeRequest,
    responses(
        (status = 200, description = "Updated", body = TopicType),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_topic_type(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTopicTypeRequest>,
) -> AppResult<Json<TopicType>> {
    let mut topic_type = state.repo.get_topic_type(id).await?.ok_or(AppError::NotFound)?;
    ensure_can_manage(topic_type.created_by, &user)?;

    if let Some(name) = payload.type_name {
        let mut errors = FieldErrors::new();
        check_type_name(&mut errors, &name);
        errors.into_result()?;
        topic_type.type_name = name.trim().to_string();
    }
    if let Some(active) = payload.is_active {
        topic_type.is_active = active;
    }

    Ok(Json(state.repo.update_topic_type(&topic_type).await?))
}

#[utoipa::path(
    delete,
    path = "/topic-types/{id}",
    params(("id" = i64, Path, description = "Topic type ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_topic_type(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let topic_type = state.repo.get_topic_type(id).await?.ok_or(AppError::NotFound)?;
    ensure_can_manage(topic_type.created_by, &user)?;

    state.repo.delete_topic_type(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Topics ---

#[utoipa::path(
    get,
    path = "/lesson-topics",
    params(PageParams, TopicListFilter),
    responses((status = 200, description = "Visible topics", body = Page<TopicView>))
)]
pub async fn list_topics(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
    Query(filter): Query<TopicListFilter>,
) -> AppResult<Json<Page<TopicView>>> {
    let filter = TopicFilter {
        visibility: Visibility::for_viewer(viewer.as_ref()),
        lesson_id: filter.lesson,
    };
    let repo = &state.repo;
    let filter = &filter;
    let mut page = paginate(&state, &uri, &params, &TOPIC_ORDERING, |query| async move {
        repo.list_topics(filter, &query).await
    })
    .await?;

    let rows = std::mem::take(&mut page.results);
    let views = topic_views(&state.repo, state.storage.as_ref(), rows).await?;
    Ok(Json(page.with_results(views)))
}

#[utoipa::path(
    get,
    path = "/lesson-topics/{id}",
    params(("id" = i64, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Found", body = TopicView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_topic(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<TopicView>> {
    let topic = state.repo.get_topic(id).await?.ok_or(AppError::NotFound)?;
    let lesson = state
        .repo
        .get_lesson(topic.lesson_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;

    let visible = row_visible(
        Visibility::for_viewer(viewer.as_ref()),
        &course,
        topic.is_active && lesson.is_active,
    );
    if !visible {
        return Err(AppError::NotFound);
    }
    Ok(Json(topic_view(&state.repo, state.storage.as_ref(), topic).await?))
}

async fn check_topic_type(state: &AppState, errors: &mut FieldErrors, id: i64) -> AppResult<()> {
    let active = state
        .repo
        .get_topic_type(id)
        .await?
        .is_some_and(|t| t.is_active);
    if !active {
        errors.add("type", does_not_exist(id));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/lesson-topics",
    request_body = CreateTopicRequest,
    responses(
        (status = 201, description = "Created", body = TopicView),
        (status = 403, description = "Not a course editor")
    )
)]
pub async fn create_topic(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTopicRequest>,
) -> AppResult<(StatusCode, Json<TopicView>)> {
    let lesson = state
        .repo
        .get_lesson(payload.lesson)
        .await?
        .ok_or_else(|| FieldErrors::single("lesson", does_not_exist(payload.lesson)))?;
    let course = load_course(&state, lesson.course_id).await?;
    ensure_course_editor(&state, &course, &user).await?;

    let mut errors = FieldErrors::new();
    check_topic_type(&state, &mut errors, payload.topic_type).await?;
    check_title(&mut errors, "topic_title", &payload.topic_title);
    check_order(&mut errors, "topic_order", payload.topic_order);
    errors.into_result()?;

    let repo = &state.repo;
    let scope = SlugScope::Topic { lesson_id: lesson.id };
    let topic_slug = unique_slug(&slugify(&payload.topic_title), |candidate| async move {
        repo.slug_exists(scope, &candidate).await
    })
    .await?;

    let topic = state
        .repo
        .create_topic(NewTopic {
            lesson_id: lesson.id,
            type_id: payload.topic_type,
            topic_order: payload.topic_order,
            topic_title: payload.topic_title.trim().to_string(),
            topic_slug,
            topic_content: payload.topic_content,
            created_by: user.id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(topic_view(&state.repo, state.storage.as_ref(), topic).await?),
    ))
}

#[utoipa::path(
    put,
    path = "/lesson-topics/{id}",
    params(("id" = i64, Path, description = "Topic ID")),
    request_body = UpdateTopicRequest,
    responses(
        (status = 200, description = "Updated", body = TopicView),
        (status = 403, description = "Not a course editor"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_topic(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTopicRequest>,
) -> AppResult<Json<TopicView>> {
    let mut topic = state.repo.get_topic(id).await?.ok_or(AppError::NotFound)?;
    let lesson = state
        .repo
        .get_lesson(topic.lesson_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;
    ensure_course_editor(&state, &course, &user).await?;

    let mut errors = FieldErrors::new();
    if let Some(type_id) = payload.topic_type {
        check_topic_type(&state, &mut errors, type_id).await?;
    }
    if let Some(title) = &payload.topic_title {
        check_title(&mut errors, "topic_title", title);
    }
    if let Some(order) = payload.topic_order {
        check_order(&mut errors, "topic_order", order);
    }
    errors.into_result()?;

    if let Some(type_id) = payload.topic_type {
        topic.type_id = type_id;
    }
    if let Some(order) = payload.topic_order {
        topic.topic_order = order;
    }
    if let Some(title) = payload.topic_title {
        topic.topic_title = title.trim().to_string();
    }
    if let Some(content) = payload.topic_content {
        topic.topic_content = content;
    }
    if let Some(active) = payload.is_active {
        topic.is_active = active;
    }

    let topic = state.repo.update_topic(&topic).await?;
    Ok(Json(topic_view(&state.repo, state.storage.as_ref(), topic).await?))
}

#[utoipa::path(
    delete,
    path = "/lesson-topics/{id}",
    params(("id" = i64, Path, description = "Topic ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a course editor"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_topic(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let topic = state.repo.get_topic(id).await?.ok_or(AppError::NotFound)?;
    let lesson = state
        .repo
        .get_lesson(topic.lesson_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let course = load_course(&state, lesson.course_id).await?;
    ensure_course_editor(&state, &course, &user).await?;

    state.repo.delete_topic(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Uploads ---

/// upload_extension
///
/// Lowercased alphanumeric extension of the filename, falling back to the MIME
/// subtype (`image/png` → `png`).
fn upload_extension(filename: &str, file_type: &str) -> String {
    let from_name = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let from_mime = file_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name
        .or(from_mime)
        .unwrap_or("bin")
        .to_ascii_lowercase()
}

/// get_presigned_url
///
/// [Authenticated Route] Issues a 10-minute upload URL for an avatar or course
/// banner. Keys live under the caller's own prefix so later references can be
/// checked against it.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 400, description = "Not an image")
    )
)]
pub async fn get_presigned_url(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> AppResult<Json<PresignedUrlResponse>> {
    if !payload.file_type.starts_with("image/") {
        return Err(FieldErrors::single("file_type", "Only image uploads are allowed."));
    }

    let object_key = format!(
        "{}{}.{}",
        payload.purpose.owner_prefix(id),
        Uuid::new_v4(),
        upload_extension(&payload.filename, &payload.file_type)
    );

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await
        .map_err(AppError::Storage)?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_extension_prefers_filename() {
        assert_eq!(upload_extension("Banner.PNG", "image/png"), "png");
        assert_eq!(upload_extension("photo", "image/jpeg"), "jpeg");
        assert_eq!(upload_extension("weird.p?g", "image/svg+xml"), "bin");
    }
}
