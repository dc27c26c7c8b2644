use axum::{
    Json,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::paginate;
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    catalog::{COMMENT_ORDERING, RATING_ORDERING, comment_thread, comment_threads},
    error::{AppError, AppResult, FieldErrors},
    mailer::EmailMessage,
    models::{
        AddAuthorRequest, AuthorDetails, CommentView, ConsentRequest, ContactDetail, Course,
        CourseComment, CourseRating, CreateCommentRequest, CreateContactRequest,
        NewAuthorDetails, NewComment, NewContactDetail, RateCourseRequest, RatingSummary,
        UpdateAuthorRequest, UpdateCommentRequest,
    },
    pagination::{Page, PageParams},
    permissions::{Visibility, can_manage, ensure_can_manage},
};

const MAX_COMMENT_LENGTH: usize = 255;
/// Deepest allowed reply; a top-level comment sits at depth 0.
pub const MAX_REPLY_DEPTH: usize = 10;
const MAX_DESIGNATION_LENGTH: usize = 100;
const MAX_CONTACT_TYPE_LENGTH: usize = 50;
const MAX_CONTACT_VALUE_LENGTH: usize = 255;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommentListFilter {
    /// Course id (required).
    pub course: Option<i64>,
}

/// Loads a course the viewer is allowed to see; hidden courses are a 404.
async fn visible_course(state: &AppState, id: i64, viewer: Option<&AuthUser>) -> AppResult<Course> {
    state
        .repo
        .get_course(id)
        .await?
        .filter(|course| Visibility::for_viewer(viewer).allows(course))
        .ok_or(AppError::NotFound)
}

/// Depth of `comment` in its thread, counting at most `MAX_REPLY_DEPTH + 1` hops.
async fn thread_depth(state: &AppState, comment: &CourseComment) -> AppResult<usize> {
    let mut depth = 0;
    let mut parent = comment.parent_id;
    while let Some(id) = parent {
        depth += 1;
        if depth > MAX_REPLY_DEPTH {
            break;
        }
        parent = state.repo.get_comment(id).await?.and_then(|c| c.parent_id);
    }
    Ok(depth)
}

fn check_length(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this field has no more than {max} characters."),
        );
    }
}

// --- Comments ---

/// list_comments
///
/// [Public Route] Top-level comments of a course, newest first, each carrying
/// its whole reply thread.
#[utoipa::path(
    get,
    path = "/comments",
    params(PageParams, CommentListFilter),
    responses(
        (status = 200, description = "Comment threads", body = Page<CommentView>),
        (status = 400, description = "Missing course parameter")
    )
)]
pub async fn list_comments(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
    Query(filter): Query<CommentListFilter>,
) -> AppResult<Json<Page<CommentView>>> {
    let course_id = filter
        .course
        .ok_or_else(|| FieldErrors::single("course", "This query parameter is required."))?;
    visible_course(&state, course_id, viewer.as_ref()).await?;

    let repo = &state.repo;
    let mut page = paginate(&state, &uri, &params, &COMMENT_ORDERING, |query| async move {
        repo.list_root_comments(course_id, &query).await
    })
    .await?;

    let roots = std::mem::take(&mut page.results);
    let replies = state.repo.list_replies(course_id).await?;
    Ok(Json(page.with_results(comment_threads(
        state.storage.as_ref(),
        roots,
        replies,
    ))))
}

#[utoipa::path(
    get,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Comment with replies", body = CommentView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_comment(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CommentView>> {
    let comment = state.repo.get_comment(id).await?.ok_or(AppError::NotFound)?;
    visible_course(&state, comment.course_id, viewer.as_ref()).await?;

    let replies = state.repo.list_replies(comment.course_id).await?;
    Ok(Json(comment_thread(state.storage.as_ref(), comment, replies)))
}

/// create_comment
///
/// [Authenticated Route] Posts a comment, or a reply when `parent` is given.
/// Replies must stay within the parent's course.
#[utoipa::path(
    post,
    path = "/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = CommentView),
        (status = 400, description = "Validation errors per field")
    )
)]
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let mut errors = FieldErrors::new();
    let content = payload.content.trim().to_string();
    check_length(&mut errors, "content", &content, MAX_COMMENT_LENGTH);

    let course = state
        .repo
        .get_course(payload.course)
        .await?
        .filter(|course| Visibility::for_viewer(Some(&user)).allows(course));
    if course.is_none() {
        errors.add(
            "course",
            format!("Invalid pk \"{}\" - object does not exist.", payload.course),
        );
    }

    if let Some(parent_id) = payload.parent {
        match state.repo.get_comment(parent_id).await? {
            Some(parent) if parent.course_id == payload.course => {
                if thread_depth(&state, &parent).await? >= MAX_REPLY_DEPTH {
                    errors.add(
                        "parent",
                        format!("Replies cannot be nested more than {MAX_REPLY_DEPTH} levels deep."),
                    );
                }
            }
            _ => errors.add("parent", "Parent comment must belong to the same course."),
        }
    }
    errors.into_result()?;

    let comment = state
        .repo
        .create_comment(NewComment {
            course_id: payload.course,
            user_id: user.id,
            parent_id: payload.parent,
            content,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(comment_thread(state.storage.as_ref(), comment, Vec::new())),
    ))
}

#[utoipa::path(
    put,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = CommentView),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> AppResult<Json<CommentView>> {
    let comment = state.repo.get_comment(id).await?.ok_or(AppError::NotFound)?;
    if comment.user_id != user.id {
        return Err(AppError::forbidden());
    }

    let content = payload.content.trim().to_string();
    let mut errors = FieldErrors::new();
    check_length(&mut errors, "content", &content, MAX_COMMENT_LENGTH);
    errors.into_result()?;

    let comment = state
        .repo
        .update_comment(id, &content)
        .await?
        .ok_or(AppError::NotFound)?;
    let replies = state.repo.list_replies(comment.course_id).await?;
    Ok(Json(comment_thread(state.storage.as_ref(), comment, replies)))
}

/// delete_comment
///
/// [Authenticated Route] Allowed for the comment's author, the course owner and
/// superusers. Replies go with it.
#[utoipa::path(
    delete,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let comment = state.repo.get_comment(id).await?.ok_or(AppError::NotFound)?;
    let course_owner = state
        .repo
        .get_course(comment.course_id)
        .await?
        .map(|course| course.created_by);

    let allowed = can_manage(comment.user_id, &user) || course_owner == Some(user.id);
    if !allowed {
        return Err(AppError::forbidden());
    }

    state.repo.delete_comment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Ratings ---

/// rate_course
///
/// [Authenticated Route] One rating per user and course; posting again replaces it.
#[utoipa::path(
    post,
    path = "/courses/{id}/ratings",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = RateCourseRequest,
    responses(
        (status = 200, description = "Rating stored", body = CourseRating),
        (status = 400, description = "Rating out of range"),
        (status = 404, description = "Course Not Found")
    )
)]
pub async fn rate_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
    Json(payload): Json<RateCourseRequest>,
) -> AppResult<Json<CourseRating>> {
    let course = visible_course(&state, course_id, Some(&user)).await?;
    if !(1..=5).contains(&payload.rating) {
        return Err(FieldErrors::single(
            "rating",
            "Ensure this value is between 1 and 5.",
        ));
    }
    let review = payload
        .review
        .map(|review| review.trim().to_string())
        .filter(|review| !review.is_empty());

    let rating = state
        .repo
        .upsert_rating(course.id, user.id, payload.rating, review)
        .await?;
    Ok(Json(rating))
}

#[utoipa::path(
    get,
    path = "/courses/{id}/ratings",
    params(("id" = i64, Path, description = "Course ID"), PageParams),
    responses((status = 200, description = "Ratings", body = Page<CourseRating>))
)]
pub async fn list_ratings(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(course_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<CourseRating>>> {
    visible_course(&state, course_id, viewer.as_ref()).await?;
    let repo = &state.repo;
    let page = paginate(&state, &uri, &params, &RATING_ORDERING, |query| async move {
        repo.list_ratings(course_id, &query).await
    })
    .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/courses/{id}/ratings/summary",
    params(("id" = i64, Path, description = "Course ID")),
    responses((status = 200, description = "Average and count", body = RatingSummary))
)]
pub async fn rating_summary(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> AppResult<Json<RatingSummary>> {
    let course = visible_course(&state, course_id, viewer.as_ref()).await?;
    Ok(Json(state.repo.rating_summary(course.id).await?))
}

#[utoipa::path(
    delete,
    path = "/courses/{id}/ratings",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No rating by the caller")
    )
)]
pub async fn delete_rating(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> AppResult<StatusCode> {
    if state.repo.delete_rating(course_id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

// --- Co-authors ---

/// add_author
///
/// [Authenticated Route] The course owner (or a superuser) names a co-author.
/// The record stays private until the named user consents. The invitation
/// email is best effort.
#[utoipa::path(
    post,
    path = "/courses/{id}/authors",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = AddAuthorRequest,
    responses(
        (status = 201, description = "Co-author added, consent pending", body = AuthorDetails),
        (status = 400, description = "Unknown user or the course creator"),
        (status = 403, description = "Not Owner"),
        (status = 409, description = "Already a co-author")
    )
)]
pub async fn add_author(
    user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
    Json(payload): Json<AddAuthorRequest>,
) -> AppResult<(StatusCode, Json<AuthorDetails>)> {
    let course = state.repo.get_course(course_id).await?.ok_or(AppError::NotFound)?;
    ensure_can_manage(course.created_by, &user)?;

    let mut errors = FieldErrors::new();
    check_length(&mut errors, "designation", &payload.designation, MAX_DESIGNATION_LENGTH);
    let target = state
        .repo
        .get_user_by_username(payload.username.trim())
        .await?;
    if target.is_none() {
        errors.add("username", "User not found.");
    }
    errors.into_result()?;
    let Some(target) = target else {
        return Err(AppError::NotFound);
    };

    if target.id == course.created_by {
        return Err(AppError::BadRequest(
            "The course creator cannot be added as a co-author.".to_string(),
        ));
    }
    if state.repo.get_author_for(course.id, target.id).await?.is_some() {
        return Err(AppError::Conflict(
            "This user is already a co-author of this course.".to_string(),
        ));
    }

    let author = state
        .repo
        .create_author(NewAuthorDetails {
            user_id: target.id,
            course_id: course.id,
            designation: payload.designation.trim().to_string(),
            consent_given: false,
            consent_date: None,
        })
        .await?;

    let invitation = EmailMessage {
        to: target.email.clone(),
        subject: format!("You have been added as a co-author of \"{}\"", course.course_title),
        text: format!(
            "Hi {},\n\n{} added you as a co-author ({}) of the course \"{}\".\nYou will only be listed once you give your consent:\n\n{}/co-authorships\n",
            target.username,
            user.username,
            author.designation,
            course.course_title,
            state.config.frontend_url.trim_end_matches('/'),
        ),
    };
    if let Err(e) = state.mailer.send(invitation).await {
        tracing::error!(author_id = author.id, error = %e, "co-author invitation email failed");
    }

    tracing::info!(author_id = author.id, course_id = course.id, "co-author added");
    Ok((StatusCode::CREATED, Json(author)))
}

/// list_authors
///
/// [Public Route] Consented, active co-authors; the course owner and superusers
/// also see pending and deactivated records.
#[utoipa::path(
    get,
    path = "/courses/{id}/authors",
    params(("id" = i64, Path, description = "Course ID")),
    responses((status = 200, description = "Co-authors", body = [AuthorDetails]))
)]
pub async fn list_authors(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> AppResult<Json<Vec<AuthorDetails>>> {
    let course = visible_course(&state, course_id, viewer.as_ref()).await?;
    let manager = viewer
        .as_ref()
        .is_some_and(|user| can_manage(course.created_by, user));
    Ok(Json(state.repo.list_course_authors(course.id, !manager).await?))
}

#[utoipa::path(
    get,
    path = "/me/co-authorships",
    responses((status = 200, description = "My co-author records", body = [AuthorDetails]))
)]
pub async fn get_my_co_authorships(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AuthorDetails>>> {
    Ok(Json(state.repo.authors_by_user(id).await?))
}

/// set_consent
///
/// [Authenticated Route] Only the named co-author decides. The consent date is
/// stamped when consent is first given.
#[utoipa::path(
    put,
    path = "/author-details/{id}/consent",
    params(("id" = i64, Path, description = "Author details ID")),
    request_body = ConsentRequest,
    responses(
        (status = 200, description = "Consent recorded", body = AuthorDetails),
        (status = 403, description = "Not the named co-author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn set_consent(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ConsentRequest>,
) -> AppResult<Json<AuthorDetails>> {
    let mut author = state.repo.get_author(id).await?.ok_or(AppError::NotFound)?;
    if author.user_id != user_id {
        return Err(AppError::forbidden());
    }

    author.apply_consent(payload.consent_given, Utc::now());
    let author = state.repo.update_author(&author).await?;
    tracing::info!(author_id = author.id, consent = author.consent_given, "co-author consent updated");
    Ok(Json(author))
}

#[utoipa::path(
    put,
    path = "/author-details/{id}",
    params(("id" = i64, Path, description = "Author details ID")),
    request_body = UpdateAuthorRequest,
    responses(
        (status = 200, description = "Updated", body = AuthorDetails),
        (status = 403, description = "Not the course owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_author(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAuthorRequest>,
) -> AppResult<Json<AuthorDetails>> {
    let mut author = state.repo.get_author(id).await?.ok_or(AppError::NotFound)?;
    let course = state
        .repo
        .get_course(author.course_id)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_can_manage(course.created_by, &user)?;

    if let Some(designation) = payload.designation {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "designation", &designation, MAX_DESIGNATION_LENGTH);
        errors.into_result()?;
        author.designation = designation.trim().to_string();
    }
    if let Some(active) = payload.is_active {
        author.is_active = active;
    }

    Ok(Json(state.repo.update_author(&author).await?))
}

#[utoipa::path(
    delete,
    path = "/author-details/{id}",
    params(("id" = i64, Path, description = "Author details ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_author(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let author = state.repo.get_author(id).await?.ok_or(AppError::NotFound)?;
    let course_owner = state
        .repo
        .get_course(author.course_id)
        .await?
        .map(|course| course.created_by);

    let allowed = author.user_id == user.id
        || course_owner.is_some_and(|owner| can_manage(owner, &user))
        || user.is_superuser;
    if !allowed {
        return Err(AppError::forbidden());
    }

    state.repo.delete_author(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Contact details ---

/// list_contacts
///
/// [Public Route] Contacts of a consented co-author. Pending records are only
/// visible to the co-author and the course's managers.
#[utoipa::path(
    get,
    path = "/author-details/{id}/contacts",
    params(("id" = i64, Path, description = "Author details ID")),
    responses(
        (status = 200, description = "Contacts", body = [ContactDetail]),
        (status = 404, description = "Not Found")
    )
)]
pub async fn list_contacts(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<ContactDetail>>> {
    let author = state.repo.get_author(id).await?.ok_or(AppError::NotFound)?;
    let course = visible_course(&state, author.course_id, viewer.as_ref()).await?;

    let privileged = viewer
        .as_ref()
        .is_some_and(|user| user.id == author.user_id || can_manage(course.created_by, user));
    if !author.grants_editing() && !privileged {
        return Err(AppError::NotFound);
    }

    Ok(Json(state.repo.list_contacts(author.id).await?))
}

#[utoipa::path(
    post,
    path = "/author-details/{id}/contacts",
    params(("id" = i64, Path, description = "Author details ID")),
    request_body = CreateContactRequest,
    responses(
        (status = 201, description = "Created", body = ContactDetail),
        (status = 403, description = "Not the co-author")
    )
)]
pub async fn create_contact(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateContactRequest>,
) -> AppResult<(StatusCode, Json<ContactDetail>)> {
    let author = state.repo.get_author(id).await?.ok_or(AppError::NotFound)?;
    if author.user_id != user_id {
        return Err(AppError::forbidden());
    }

    let mut errors = FieldErrors::new();
    check_length(&mut errors, "contact_type", &payload.contact_type, MAX_CONTACT_TYPE_LENGTH);
    check_length(&mut errors, "contact_value", &payload.contact_value, MAX_CONTACT_VALUE_LENGTH);
    errors.into_result()?;

    let contact = state
        .repo
        .create_contact(NewContactDetail {
            author_id: author.id,
            contact_type: payload.contact_type.trim().to_string(),
            contact_value: payload.contact_value.trim().to_string(),
            created_by: user_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[utoipa::path(
    delete,
    path = "/contact-details/{id}",
    params(("id" = i64, Path, description = "Contact ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_contact(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let contact = state.repo.get_contact(id).await?.ok_or(AppError::NotFound)?;
    ensure_can_manage(contact.created_by, &user)?;

    state.repo.delete_contact(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
