//! Account lifecycle: registration, verification, sessions, credential changes
//! and deletion. Handlers in `handlers::accounts` are thin wrappers over these.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{JwtKeys, TokenPair, TokenType},
    error::{AppError, AppResult, FieldErrors, NON_FIELD_ERRORS},
    export,
    mailer::EmailMessage,
    models::{
        ChangeEmailRequest, ChangePasswordRequest, LoginRequest, NewUser, OutstandingToken,
        PasswordResetConfirmRequest, RegisterRequest, UpdateProfileRequest, UploadPurpose, User,
        UserProfile,
    },
    password::{hash_password, validate_password, verify_password},
    storage::sanitize_key,
    tokens::{EmailTokenGenerator, EmailTokenPurpose, decode_text, decode_uid, encode_text, encode_uid},
};

pub const MAX_NAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

// --- Field validation ---

pub fn validate_username(username: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push("This field may not be blank.".to_string());
    } else if username.chars().count() > MAX_NAME_LENGTH {
        errors.push(format!(
            "Ensure this field has no more than {MAX_NAME_LENGTH} characters."
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.push("Username can only contain letters, numbers, and underscores.".to_string());
    }
    errors
}

/// Structural check only: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !domain.ends_with('.')
}

fn check_name_length(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
        );
    }
}

fn email_tokens(state: &AppState) -> EmailTokenGenerator {
    EmailTokenGenerator::new(&state.config.jwt_secret, state.config.email_token_ttl_secs)
}

fn frontend_link(state: &AppState, path: &str) -> String {
    format!("{}{}", state.config.frontend_url.trim_end_matches('/'), path)
}

async fn load_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    state.repo.get_user(user_id).await?.ok_or(AppError::NotFound)
}

/// Resolves the user named by a `uidb64` link segment.
async fn user_from_uid(state: &AppState, uidb64: &str) -> AppResult<Option<User>> {
    match decode_uid(uidb64) {
        Some(id) => Ok(state.repo.get_user(id).await?),
        None => Ok(None),
    }
}

// --- Registration & verification ---

async fn send_verification(state: &AppState, user: &User, now: DateTime<Utc>) -> AppResult<()> {
    let token = email_tokens(state).make_token(user, &EmailTokenPurpose::VerifyEmail, now);
    let link = frontend_link(
        state,
        &format!("/verify-email/{}/{}", encode_uid(user.id), token),
    );
    state
        .mailer
        .send(EmailMessage {
            to: user.email.clone(),
            subject: "Verify your email address".to_string(),
            text: format!(
                "Hi {},\n\nPlease confirm your email address by opening the link below:\n\n{}\n\nIf you did not create an account, you can ignore this message.",
                user.username, link
            ),
        })
        .await?;
    Ok(())
}

/// register
///
/// Validates the payload, creates an inactive and unverified account and mails
/// the verification link. A failed delivery is logged; the user can ask for a
/// new link through `resend_verification`.
pub async fn register(state: &AppState, req: RegisterRequest, now: DateTime<Utc>) -> AppResult<User> {
    let mut errors = FieldErrors::new();
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    errors.extend("username", validate_username(&username));
    if errors.get("username").is_none() && state.repo.get_user_by_username(&username).await?.is_some() {
        errors.add("username", "A user with that username already exists.");
    }

    if !is_valid_email(&email) {
        errors.add("email", "Enter a valid email address.");
    } else if state.repo.get_user_by_email(&email).await?.is_some() {
        errors.add("email", "A user with that email already exists.");
    }

    check_name_length(&mut errors, "first_name", &req.first_name);
    check_name_length(&mut errors, "last_name", &req.last_name);

    errors.extend("password", validate_password(&req.password, &username, &email));
    if req.password != req.confirm_password {
        errors.add(NON_FIELD_ERRORS, "Passwords do not match.");
    }
    errors.into_result()?;

    let user = state
        .repo
        .create_user(NewUser {
            username,
            email,
            password_hash: hash_password(&req.password)?,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            is_active: false,
            is_verified: false,
            is_staff: false,
            is_superuser: false,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    if let Err(e) = send_verification(state, &user, now).await {
        tracing::error!(user_id = %user.id, error = %e, "verification email failed");
    }
    Ok(user)
}

/// verify_email
///
/// Returns the success message. Already-verified accounts succeed without
/// checking the token.
pub async fn verify_email(
    state: &AppState,
    uidb64: &str,
    token: &str,
    now: DateTime<Utc>,
) -> AppResult<&'static str> {
    let invalid = || AppError::BadRequest("Invalid or expired verification link.".to_string());
    let mut user = user_from_uid(state, uidb64).await?.ok_or_else(invalid)?;

    if user.is_verified {
        return Ok("Email already verified.");
    }
    if !email_tokens(state).check_token(&user, &EmailTokenPurpose::VerifyEmail, token, now) {
        tracing::warn!(user_id = %user.id, "email verification token rejected");
        return Err(invalid());
    }

    user.is_verified = true;
    user.is_active = true;
    state.repo.update_user(&user).await?;
    tracing::info!(user_id = %user.id, "email verified");
    Ok("Email verified successfully. You can now log in.")
}

/// Silent for unknown or already verified addresses.
pub async fn resend_verification(state: &AppState, email: &str, now: DateTime<Utc>) -> AppResult<()> {
    if let Some(user) = state.repo.get_user_by_email(email.trim()).await? {
        if !user.is_verified {
            if let Err(e) = send_verification(state, &user, now).await {
                tracing::error!(user_id = %user.id, error = %e, "verification email failed");
            }
        }
    }
    Ok(())
}

// --- Sessions ---

async fn issue_session(state: &AppState, user_id: Uuid, now: DateTime<Utc>) -> AppResult<TokenPair> {
    let pair = JwtKeys::from_config(&state.config).issue_pair(user_id, now)?;
    state
        .repo
        .record_outstanding_token(OutstandingToken {
            jti: pair.refresh_jti,
            user_id,
            created_at: pair.refresh_issued_at,
            expires_at: pair.refresh_expires_at,
        })
        .await?;
    Ok(pair)
}

/// login
///
/// Email and password authentication. Verification is checked before activity
/// so unverified users get the more helpful message.
pub async fn login(state: &AppState, req: LoginRequest, now: DateTime<Utc>) -> AppResult<TokenPair> {
    let invalid = || AppError::BadRequest("Invalid email or password.".to_string());

    let mut user = state
        .repo
        .get_user_by_email(req.email.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }
    if !user.is_verified {
        return Err(AppError::BadRequest(
            "Email not verified. Please check your inbox for the verification link.".to_string(),
        ));
    }
    if !user.is_active {
        return Err(AppError::BadRequest("This account is inactive.".to_string()));
    }

    let pair = issue_session(state, user.id, now).await?;
    user.last_login = Some(now);
    state.repo.update_user(&user).await?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(pair)
}

/// refresh
///
/// Rotates a refresh token: the presented token is blacklisted and a new pair is
/// issued. Presenting a token a second time is rejected.
pub async fn refresh(
    state: &AppState,
    refresh_token: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<TokenPair> {
    let token = refresh_token
        .ok_or_else(|| AppError::Unauthorized("Refresh token not found.".to_string()))?;
    let claims = JwtKeys::from_config(&state.config).decode(&token, TokenType::Refresh)?;

    let outstanding = state
        .repo
        .get_outstanding_token(claims.jti)
        .await?
        .filter(|t| t.user_id == claims.sub)
        .ok_or_else(|| AppError::Unauthorized("Token is invalid.".to_string()))?;

    // The insert result also catches two concurrent refreshes of one token.
    let revoked = state.repo.is_token_blacklisted(outstanding.jti).await?
        || !state.repo.blacklist_token(outstanding.jti).await?;
    if revoked {
        tracing::warn!(user_id = %claims.sub, jti = %claims.jti, "refresh token reuse rejected");
        return Err(AppError::Unauthorized("Token is blacklisted.".to_string()));
    }

    let user = state
        .repo
        .get_user(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive.".to_string()))?;

    issue_session(state, user.id, now).await
}

/// Blacklists the presented refresh token if it is a valid one. Never fails on
/// a bad token: logging out is always possible.
pub async fn logout(state: &AppState, refresh_token: Option<String>) -> AppResult<()> {
    let Some(token) = refresh_token else {
        return Ok(());
    };
    if let Ok(claims) = JwtKeys::from_config(&state.config).decode(&token, TokenType::Refresh) {
        if state.repo.is_token_blacklisted(claims.jti).await? {
            tracing::debug!(user_id = %claims.sub, "logout with an already revoked token");
            return Ok(());
        }
        state.repo.blacklist_token(claims.jti).await?;
        tracing::info!(user_id = %claims.sub, "user logged out");
    }
    Ok(())
}

// --- Profile ---

pub fn profile_of(state: &AppState, user: User) -> UserProfile {
    UserProfile {
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        avatar: user.avatar.as_deref().map(|key| state.storage.public_url(key)),
        is_verified: user.is_verified,
        date_joined: user.date_joined,
    }
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> AppResult<UserProfile> {
    let mut errors = FieldErrors::new();
    check_name_length(&mut errors, "first_name", &req.first_name);
    check_name_length(&mut errors, "last_name", &req.last_name);
    errors.into_result()?;

    let mut user = load_user(state, user_id).await?;
    user.first_name = req.first_name.trim().to_string();
    user.last_name = req.last_name.trim().to_string();
    let user = state.repo.update_user(&user).await?;
    Ok(profile_of(state, user))
}

pub async fn update_username(state: &AppState, user_id: Uuid, username: &str) -> AppResult<UserProfile> {
    let username = username.trim();
    let mut errors = FieldErrors::new();
    errors.extend("username", validate_username(username));
    if errors.is_empty() {
        if let Some(existing) = state.repo.get_user_by_username(username).await? {
            if existing.id != user_id {
                errors.add("username", "A user with that username already exists.");
            }
        }
    }
    errors.into_result()?;

    let mut user = load_user(state, user_id).await?;
    user.username = username.to_string();
    let user = state.repo.update_user(&user).await?;
    Ok(profile_of(state, user))
}

/// The key must be one issued to this user by the upload endpoint.
pub async fn update_avatar(state: &AppState, user_id: Uuid, avatar_key: &str) -> AppResult<UserProfile> {
    let prefix = UploadPurpose::Avatar.owner_prefix(user_id);
    if !avatar_key.starts_with(&prefix) || sanitize_key(avatar_key) != avatar_key {
        return Err(FieldErrors::single("avatar_key", "Invalid avatar key."));
    }

    let mut user = load_user(state, user_id).await?;
    user.avatar = Some(avatar_key.to_string());
    let user = state.repo.update_user(&user).await?;
    Ok(profile_of(state, user))
}

// --- Credential changes ---

/// change_password
///
/// Ends every session of the user on success.
pub async fn change_password(state: &AppState, user_id: Uuid, req: ChangePasswordRequest) -> AppResult<()> {
    let mut user = load_user(state, user_id).await?;

    if !verify_password(&req.old_password, &user.password_hash) {
        return Err(FieldErrors::single("old_password", "Old password is incorrect."));
    }
    let mut errors = FieldErrors::new();
    errors.extend(
        "new_password",
        validate_password(&req.new_password, &user.username, &user.email),
    );
    errors.into_result()?;

    user.password_hash = hash_password(&req.new_password)?;
    state.repo.update_user(&user).await?;
    let revoked = state.repo.blacklist_user_tokens(user.id).await?;
    tracing::info!(user_id = %user.id, revoked, "password changed");
    Ok(())
}

/// change_email
///
/// Mails a confirmation link to the new address. The change is applied only by
/// `verify_new_email`.
pub async fn change_email(
    state: &AppState,
    user_id: Uuid,
    req: ChangeEmailRequest,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let user = load_user(state, user_id).await?;
    let new_email = req.new_email.trim().to_lowercase();

    if !is_valid_email(&new_email) {
        return Err(FieldErrors::single("new_email", "Enter a valid email address."));
    }
    if new_email == user.email.to_lowercase() {
        return Err(FieldErrors::single(
            "new_email",
            "New email must be different from the current one.",
        ));
    }
    if state.repo.get_user_by_email(&new_email).await?.is_some() {
        return Err(FieldErrors::single("new_email", "This email is already in use."));
    }

    let purpose = EmailTokenPurpose::ChangeEmail(new_email.clone());
    let token = email_tokens(state).make_token(&user, &purpose, now);
    let link = frontend_link(
        state,
        &format!(
            "/verify-new-email/{}/{}/{}",
            encode_uid(user.id),
            token,
            encode_text(&new_email)
        ),
    );

    state
        .mailer
        .send(EmailMessage {
            to: new_email,
            subject: "Confirm your new email address".to_string(),
            text: format!(
                "Hi {},\n\nOpen the link below to use this address for your account:\n\n{}\n\nIf you did not request this change, ignore this message.",
                user.username, link
            ),
        })
        .await?;
    Ok(())
}

pub async fn verify_new_email(
    state: &AppState,
    uidb64: &str,
    token: &str,
    email_b64: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let invalid = || AppError::BadRequest("Invalid or expired link.".to_string());
    let mut user = user_from_uid(state, uidb64).await?.ok_or_else(invalid)?;
    let new_email = decode_text(email_b64).ok_or_else(invalid)?;

    let purpose = EmailTokenPurpose::ChangeEmail(new_email.clone());
    if !email_tokens(state).check_token(&user, &purpose, token, now) {
        tracing::warn!(user_id = %user.id, "email change token rejected");
        return Err(invalid());
    }
    if let Some(other) = state.repo.get_user_by_email(&new_email).await? {
        if other.id != user.id {
            return Err(AppError::BadRequest("This email is already in use.".to_string()));
        }
    }

    user.email = new_email;
    state.repo.update_user(&user).await?;
    state.repo.blacklist_user_tokens(user.id).await?;
    tracing::info!(user_id = %user.id, "email changed");
    Ok(())
}

/// Mails a reset link to active, verified accounts. Silent otherwise.
pub async fn request_password_reset(state: &AppState, email: &str, now: DateTime<Utc>) -> AppResult<()> {
    let Some(user) = state.repo.get_user_by_email(email.trim()).await? else {
        return Ok(());
    };
    if !user.is_active || !user.is_verified {
        return Ok(());
    }

    let token = email_tokens(state).make_token(&user, &EmailTokenPurpose::ResetPassword, now);
    let link = frontend_link(
        state,
        &format!("/reset-password/{}/{}", encode_uid(user.id), token),
    );
    let sent = state
        .mailer
        .send(EmailMessage {
            to: user.email.clone(),
            subject: "Reset your password".to_string(),
            text: format!(
                "Hi {},\n\nUse the link below to choose a new password:\n\n{}\n\nIf you did not ask for a reset, ignore this message.",
                user.username, link
            ),
        })
        .await;
    if let Err(e) = sent {
        tracing::error!(user_id = %user.id, error = %e, "password reset email failed");
    }
    Ok(())
}

pub async fn confirm_password_reset(
    state: &AppState,
    uidb64: &str,
    token: &str,
    req: PasswordResetConfirmRequest,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let invalid = || AppError::BadRequest("Invalid or expired reset link.".to_string());
    let mut user = user_from_uid(state, uidb64).await?.ok_or_else(invalid)?;
    if !email_tokens(state).check_token(&user, &EmailTokenPurpose::ResetPassword, token, now) {
        tracing::warn!(user_id = %user.id, "password reset token rejected");
        return Err(invalid());
    }

    let mut errors = FieldErrors::new();
    errors.extend(
        "new_password",
        validate_password(&req.new_password, &user.username, &user.email),
    );
    if req.new_password != req.confirm_password {
        errors.add(NON_FIELD_ERRORS, "Passwords do not match.");
    }
    errors.into_result()?;

    user.password_hash = hash_password(&req.new_password)?;
    state.repo.update_user(&user).await?;
    state.repo.blacklist_user_tokens(user.id).await?;
    tracing::info!(user_id = %user.id, "password reset");
    Ok(())
}

// --- Export & deletion ---

/// Returns `(filename, zip bytes)`.
pub async fn export_account(state: &AppState, user_id: Uuid, now: DateTime<Utc>) -> AppResult<(String, Vec<u8>)> {
    let user = load_user(state, user_id).await?;
    let archive = export::build_account_archive(&state.repo, &user, now).await?;
    Ok((export::archive_filename(now), archive))
}

/// delete_account
///
/// Builds the export first, so a failing export leaves the account untouched.
pub async fn delete_account(state: &AppState, user_id: Uuid, now: DateTime<Utc>) -> AppResult<(String, Vec<u8>)> {
    let exported = export_account(state, user_id, now).await?;
    state.repo.blacklist_user_tokens(user_id).await?;
    if !state.repo.delete_user(user_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id = %user_id, "account deleted");
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_allow_word_characters_only() {
        assert!(validate_username("alice_01").is_empty());
        assert!(!validate_username("alice smith").is_empty());
        assert!(!validate_username("bob!").is_empty());
        assert!(!validate_username("").is_empty());
        assert!(!validate_username(&"a".repeat(151)).is_empty());
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
    }
}
