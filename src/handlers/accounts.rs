use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    AppState, accounts,
    auth::{AuthUser, TokenPair, clear_refresh_cookie, refresh_cookie, refresh_token_from_headers},
    error::{AppError, AppResult},
    models::{
        ChangeEmailRequest, ChangePasswordRequest, EmailRequest, LoginRequest, MessageResponse,
        PasswordResetConfirmRequest, RegisterRequest, RegisterResponse, TokenResponse,
        UpdateAvatarRequest, UpdateProfileRequest, UpdateUsernameRequest, UserProfile,
    },
};

// --- Response helpers ---

type SessionResponse = (
    StatusCode,
    [(header::HeaderName, HeaderValue); 1],
    Json<TokenResponse>,
);

fn session_response(state: &AppState, pair: TokenPair) -> SessionResponse {
    let cookie = refresh_cookie(
        &pair.refresh,
        state.config.refresh_token_ttl_secs,
        state.config.is_production(),
    );
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(TokenResponse { access: pair.access }),
    )
}

fn cleared_cookie(state: &AppState) -> [(header::HeaderName, HeaderValue); 1] {
    [(
        header::SET_COOKIE,
        clear_refresh_cookie(state.config.is_production()),
    )]
}

fn archive_headers(filename: &str) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(headers)
}

// --- Registration & verification ---

/// register
///
/// [Public Route] Creates an inactive account and mails the verification link.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered, verification email sent", body = RegisterResponse),
        (status = 400, description = "Validation errors per field")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::register(&state, payload, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email to verify your account."
                .to_string(),
            user: accounts::profile_of(&state, user),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/auth/verify-email/{uidb64}/{token}",
    params(
        ("uidb64" = String, Path, description = "Encoded user id"),
        ("token" = String, Path, description = "Verification token")
    ),
    responses(
        (status = 200, description = "Verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired link")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let message = accounts::verify_email(&state, &uidb64, &token, Utc::now()).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// resend_verification
///
/// [Public Route] Answers 200 whether or not the address is known.
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = EmailRequest,
    responses((status = 200, description = "Accepted", body = MessageResponse))
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    accounts::resend_verification(&state, &payload.email, Utc::now()).await?;
    Ok(Json(MessageResponse::new(
        "If an unverified account exists for this email, a new verification link has been sent.",
    )))
}

// --- Sessions ---

/// login
///
/// [Public Route] Returns the access token in the body and sets the refresh cookie.
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh token set as HttpOnly cookie", body = TokenResponse),
        (status = 400, description = "Invalid credentials, unverified or inactive account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let pair = accounts::login(&state, payload, Utc::now()).await?;
    Ok(session_response(&state, pair))
}

/// refresh_token
///
/// [Public Route] Rotates the refresh cookie and issues a new access token.
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    responses(
        (status = 200, description = "New access token; refresh cookie rotated", body = TokenResponse),
        (status = 401, description = "Missing, invalid or reused refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let pair = accounts::refresh(&state, refresh_token_from_headers(&headers), Utc::now()).await?;
    Ok(session_response(&state, pair))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out; refresh cookie cleared", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    accounts::logout(&state, refresh_token_from_headers(&headers)).await?;
    Ok((
        cleared_cookie(&state),
        Json(MessageResponse::new("Logged out successfully.")),
    ))
}

// --- Profile ---

#[utoipa::path(
    get,
    path = "/auth/profile",
    responses(
        (status = 200, description = "Profile of the caller", body = UserProfile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    let user = state.repo.get_user(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(accounts::profile_of(&state, user)))
}

#[utoipa::path(
    put,
    path = "/auth/update-profile",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = UserProfile))
)]
pub async fn update_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::update_profile(&state, id, payload).await?))
}

#[utoipa::path(
    put,
    path = "/auth/update-username",
    request_body = UpdateUsernameRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Invalid or taken username")
    )
)]
pub async fn update_username(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateUsernameRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::update_username(&state, id, &payload.username).await?))
}

/// update_avatar
///
/// [Authenticated Route] Points the profile at an avatar previously uploaded
/// through `POST /upload/presigned`.
#[utoipa::path(
    put,
    path = "/auth/update-avatar",
    request_body = UpdateAvatarRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Key not issued for this user")
    )
)]
pub async fn update_avatar(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateAvatarRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(accounts::update_avatar(&state, id, &payload.avatar_key).await?))
}

// --- Credential changes ---

/// change_password
///
/// [Authenticated Route] Every refresh token of the user is blacklisted, so all
/// sessions end, and the cookie of this one is cleared.
#[utoipa::path(
    put,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong old password or weak new password")
    )
)]
pub async fn change_password(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    accounts::change_password(&state, id, payload).await?;
    Ok((
        cleared_cookie(&state),
        Json(MessageResponse::new(
            "Password changed successfully. Please log in again.",
        )),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/change-email",
    request_body = ChangeEmailRequest,
    responses(
        (status = 200, description = "Confirmation sent to the new address", body = MessageResponse),
        (status = 400, description = "Invalid, unchanged or taken address")
    )
)]
pub async fn change_email(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangeEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    accounts::change_email(&state, id, payload, Utc::now()).await?;
    Ok(Json(MessageResponse::new(
        "A confirmation link has been sent to your new email address.",
    )))
}

#[utoipa::path(
    get,
    path = "/auth/verify-new-email/{uidb64}/{token}/{email_b64}",
    params(
        ("uidb64" = String, Path, description = "Encoded user id"),
        ("token" = String, Path, description = "Email change token"),
        ("email_b64" = String, Path, description = "Encoded new address")
    ),
    responses(
        (status = 200, description = "Email changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired link")
    )
)]
pub async fn verify_new_email(
    State(state): State<AppState>,
    Path((uidb64, token, email_b64)): Path<(String, String, String)>,
) -> AppResult<Json<MessageResponse>> {
    accounts::verify_new_email(&state, &uidb64, &token, &email_b64, Utc::now()).await?;
    Ok(Json(MessageResponse::new(
        "Email address updated successfully. Please log in again.",
    )))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = EmailRequest,
    responses((status = 200, description = "Accepted", body = MessageResponse))
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    accounts::request_password_reset(&state, &payload.email, Utc::now()).await?;
    Ok(Json(MessageResponse::new(
        "If an account exists for this email, a password reset link has been sent.",
    )))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset/{uidb64}/{token}",
    params(
        ("uidb64" = String, Path, description = "Encoded user id"),
        ("token" = String, Path, description = "Reset token")
    ),
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password set", body = MessageResponse),
        (status = 400, description = "Invalid link or password")
    )
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> AppResult<Json<MessageResponse>> {
    accounts::confirm_password_reset(&state, &uidb64, &token, payload, Utc::now()).await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset successfully. You can now log in.",
    )))
}

// --- Export & deletion ---

#[utoipa::path(
    get,
    path = "/auth/export",
    responses((status = 200, description = "Zip archive of the account's data", content_type = "application/zip", body = Vec<u8>))
)]
pub async fn export_account(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let (filename, archive) = accounts::export_account(&state, id, Utc::now()).await?;
    Ok((archive_headers(&filename)?, archive))
}

/// delete_account
///
/// [Authenticated Route] Deletes the account and everything it owns. The data
/// archive is the response body.
#[utoipa::path(
    delete,
    path = "/auth/delete-account",
    responses((status = 200, description = "Account deleted; zip archive of its data", content_type = "application/zip", body = Vec<u8>))
)]
pub async fn delete_account(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let (filename, archive) = accounts::delete_account(&state, id, Utc::now()).await?;
    let mut headers = archive_headers(&filename)?;
    headers.insert(
        header::SET_COOKIE,
        clear_refresh_cookie(state.config.is_production()),
    );
    Ok((headers, archive))
}
