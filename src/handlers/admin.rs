use axum::{
    Json,
    extract::{OriginalUri, Path, Query, State},
    http::{StatusCode, Uri},
};

use super::paginate;
use crate::{
    AppState,
    auth::AuthUser,
    catalog::{CATEGORY_ORDERING, COURSE_TYPE_ORDERING},
    error::{AppError, AppResult, FieldErrors},
    models::{
        AdminDashboardStats, AdminUserView, CourseCategory, CourseType, NewTaxonomyTerm,
        TaxonomyKind, TaxonomyRequest, TaxonomyTerm, UpdateTaxonomyRequest,
    },
    pagination::{OrderBy, OrderingSpec, Page, PageParams},
    permissions::ensure_superuser,
    slug::{MAX_SLUG_LENGTH, SlugScope, slugify, unique_slug},
};

pub const USER_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("username", "username"), ("date_joined", "date_joined")],
    default: &[OrderBy {
        field: "date_joined",
        descending: true,
    }],
};

/// get_admin_stats
///
/// [Admin Route] Core dashboard counters.
///
/// *Authorization*: superusers only (403 otherwise).
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 403, description = "Not a superuser")
    )
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<AdminDashboardStats>> {
    ensure_superuser(&user)?;
    Ok(Json(state.repo.get_stats().await?))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    params(PageParams),
    responses(
        (status = 200, description = "All users", body = Page<AdminUserView>),
        (status = 403, description = "Not a superuser")
    )
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<AdminUserView>>> {
    ensure_superuser(&user)?;
    let repo = &state.repo;
    let page = paginate(&state, &uri, &params, &USER_ORDERING, |query| async move {
        repo.list_users(&query).await
    })
    .await?;
    Ok(Json(page.map(AdminUserView::from)))
}

// --- Taxonomy management ---
// Categories and course types share one implementation; the handlers below
// only pin the table and the response shape.

fn check_term_name(errors: &mut FieldErrors, name: &str) {
    if name.trim().is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > MAX_SLUG_LENGTH {
        errors.add(
            "name",
            format!("Ensure this field has no more than {MAX_SLUG_LENGTH} characters."),
        );
    }
}

fn slug_scope(kind: TaxonomyKind) -> SlugScope {
    match kind {
        TaxonomyKind::Category => SlugScope::Category,
        TaxonomyKind::CourseType => SlugScope::CourseType,
    }
}

async fn list_terms(
    state: &AppState,
    uri: &Uri,
    params: &PageParams,
    kind: TaxonomyKind,
) -> AppResult<Page<TaxonomyTerm>> {
    let ordering = match kind {
        TaxonomyKind::Category => &CATEGORY_ORDERING,
        TaxonomyKind::CourseType => &COURSE_TYPE_ORDERING,
    };
    let repo = &state.repo;
    paginate(state, uri, params, ordering, |query| async move {
        repo.list_terms(kind, false, &query).await
    })
    .await
}

/// create_term
///
/// Names are unique per table (409 from the repository); the slug is derived
/// from the name with a numeric suffix when taken.
async fn create_term(state: &AppState, kind: TaxonomyKind, payload: TaxonomyRequest) -> AppResult<TaxonomyTerm> {
    let mut errors = FieldErrors::new();
    check_term_name(&mut errors, &payload.name);
    errors.into_result()?;

    let repo = &state.repo;
    let scope = slug_scope(kind);
    let slug = unique_slug(&slugify(&payload.name), |candidate| async move {
        repo.slug_exists(scope, &candidate).await
    })
    .await?;

    let term = state
        .repo
        .create_term(
            kind,
            NewTaxonomyTerm {
                name: payload.name.trim().to_string(),
                slug,
                description: payload.description,
                is_active: payload.is_active,
            },
        )
        .await?;
    tracing::info!(term_id = term.id, ?kind, "taxonomy term created");
    Ok(term)
}

async fn update_term(
    state: &AppState,
    kind: TaxonomyKind,
    id: i64,
    payload: UpdateTaxonomyRequest,
) -> AppResult<TaxonomyTerm> {
    let mut term = state.repo.get_term(kind, id).await?.ok_or(AppError::NotFound)?;

    if let Some(name) = payload.name {
        let mut errors = FieldErrors::new();
        check_term_name(&mut errors, &name);
        errors.into_result()?;
        term.name = name.trim().to_string();
    }
    if let Some(description) = payload.description {
        term.description = description;
    }
    if let Some(active) = payload.is_active {
        term.is_active = active;
    }

    Ok(state.repo.update_term(kind, &term).await?)
}

async fn delete_term(state: &AppState, kind: TaxonomyKind, id: i64) -> AppResult<StatusCode> {
    if state.repo.delete_term(kind, id).await? {
        tracing::info!(term_id = id, ?kind, "taxonomy term deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/admin/course-categories",
    params(PageParams),
    responses((status = 200, description = "All categories, inactive included", body = Page<CourseCategory>))
)]
pub async fn admin_list_categories(
    user: AuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseCategory>>> {
    ensure_superuser(&user)?;
    let page = list_terms(&state, &uri, &params, TaxonomyKind::Category).await?;
    Ok(Json(page.map(CourseCategory::from)))
}

#[utoipa::path(
    post,
    path = "/admin/course-categories",
    request_body = TaxonomyRequest,
    responses(
        (status = 201, description = "Created", body = CourseCategory),
        (status = 409, description = "Name already used")
    )
)]
pub async fn admin_create_category(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<TaxonomyRequest>,
) -> AppResult<(StatusCode, Json<CourseCategory>)> {
    ensure_superuser(&user)?;
    let term = create_term(&state, TaxonomyKind::Category, payload).await?;
    Ok((StatusCode::CREATED, Json(term.into())))
}

#[utoipa::path(
    put,
    path = "/admin/course-categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = UpdateTaxonomyRequest,
    responses(
        (status = 200, description = "Updated", body = CourseCategory),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Name already used")
    )
)]
pub async fn admin_update_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTaxonomyRequest>,
) -> AppResult<Json<CourseCategory>> {
    ensure_superuser(&user)?;
    let term = update_term(&state, TaxonomyKind::Category, id, payload).await?;
    Ok(Json(term.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/course-categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_delete_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ensure_superuser(&user)?;
    delete_term(&state, TaxonomyKind::Category, id).await
}

// --- Course types ---

#[utoipa::path(
    get,
    path = "/admin/course-types",
    params(PageParams),
    responses((status = 200, description = "All course types, inactive included", body = Page<CourseType>))
)]
pub async fn admin_list_course_types(
    user: AuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseType>>> {
    ensure_superuser(&user)?;
    let page = list_terms(&state, &uri, &params, TaxonomyKind::CourseType).await?;
    Ok(Json(page.map(CourseType::from)))
}

#[utoipa::path(
    post,
    path = "/admin/course-types",
    request_body = TaxonomyRequest,
    responses(
        (status = 201, description = "Created", body = CourseType),
        (status = 409, description = "Name already used")
    )
)]
pub async fn admin_create_course_type(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<TaxonomyRequest>,
) -> AppResult<(StatusCode, Json<CourseType>)> {
    ensure_superuser(&user)?;
    let term = create_term(&state, TaxonomyKind::CourseType, payload).await?;
    Ok((StatusCode::CREATED, Json(term.into())))
}

#[utoipa::path(
    put,
    path = "/admin/course-types/{id}",
    params(("id" = i64, Path, description = "Course type ID")),
    request_body = UpdateTaxonomyRequest,
    responses(
        (status = 200, description = "Updated", body = CourseType),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Name already used")
    )
)]
pub async fn admin_update_course_type(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTaxonomyRequest>,
) -> AppResult<Json<CourseType>> {
    ensure_superuser(&user)?;
    let term = update_term(&state, TaxonomyKind::CourseType, id, payload).await?;
    Ok(Json(term.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/course-types/{id}",
    params(("id" = i64, Path, description = "Course type ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_delete_course_type(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ensure_superuser(&user)?;
    delete_term(&state, TaxonomyKind::CourseType, id).await
}
