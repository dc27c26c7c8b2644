use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    repository::RepositoryState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of both access and refresh tokens. `token_type` keeps one from being
/// used in place of the other; `jti` identifies refresh tokens in the blacklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    /// Issued At (iat): seconds since the epoch.
    pub iat: i64,
    /// Expiration Time (exp): seconds since the epoch.
    pub exp: i64,
    pub jti: Uuid,
    pub token_type: TokenType,
}

/// A freshly issued access/refresh pair. The refresh half must be recorded as
/// outstanding before it is handed to the client.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub refresh_jti: Uuid,
    pub refresh_issued_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// JwtKeys
///
/// HS256 signing and verification keys plus the token lifetimes, derived from `AppConfig`.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// issue_pair
    ///
    /// Signs a new access token and a new refresh token for `user_id`.
    pub fn issue_pair(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let access = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4(),
            token_type: TokenType::Access,
        };
        let refresh_expires_at = now + self.refresh_ttl;
        let refresh = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
            jti: Uuid::new_v4(),
            token_type: TokenType::Refresh,
        };

        Ok(TokenPair {
            access: self.sign(&access)?,
            refresh: self.sign(&refresh)?,
            refresh_jti: refresh.jti,
            refresh_issued_at: now,
            refresh_expires_at,
        })
    }

    /// decode
    ///
    /// Validates signature, expiry and token type. Every failure is a 401.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return Err(match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::Unauthorized("Token has expired.".to_string())
                    }
                    _ => AppError::Unauthorized("Token is invalid.".to_string()),
                });
            }
        };

        if claims.token_type != expected {
            return Err(AppError::Unauthorized("Token has wrong type.".to_string()));
        }
        Ok(claims)
    }
}

// --- Refresh cookie ---

/// Set-Cookie value carrying the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; Path={REFRESH_COOKIE_PATH}; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    // JWTs are base64url segments joined by dots: always a valid header value.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Set-Cookie value that removes the refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> HeaderValue {
    refresh_cookie("", 0, secure)
}

/// refresh_token_from_headers
///
/// Reads the refresh token out of the request's `Cookie` header(s).
pub fn refresh_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == REFRESH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_superuser: bool,
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing
///    active user authenticates the request.
/// 2. Otherwise a `Bearer` access token is required and decoded.
/// 3. The user must still exist and be active.
///
/// Rejection: 401 with a `detail` body.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            if let Some(user_id) = local_bypass_id(&parts.headers) {
                if let Some(user) = repo.get_user(user_id).await?.filter(|u| u.is_active) {
                    return Ok(AuthUser {
                        id: user.id,
                        username: user.username,
                        is_superuser: user.is_superuser,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let claims = JwtKeys::from_config(&config).decode(token, TokenType::Access)?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("User not found or inactive.".to_string()))?;

        Ok(AuthUser {
            id: user.id,
            username: user.username,
            is_superuser: user.is_superuser,
        })
    }
}

fn local_bypass_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// MaybeAuthUser
///
/// Optional identity for public endpoints whose results depend on the viewer.
/// No credentials means anonymous; credentials that fail to resolve are still a 401.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let has_bearer = parts.headers.contains_key(header::AUTHORIZATION);
        let has_bypass = config.env == Env::Local && parts.headers.contains_key("x-user-id");

        if !has_bearer && !has_bypass {
            return Ok(MaybeAuthUser(None));
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(|user| MaybeAuthUser(Some(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&AppConfig::default())
    }

    #[test]
    fn issued_tokens_decode_with_their_type() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let pair = keys.issue_pair(user_id, Utc::now()).unwrap();

        let access = keys.decode(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.sub, user_id);
        let refresh = keys.decode(&pair.refresh, TokenType::Refresh).unwrap();
        assert_eq!(refresh.jti, pair.refresh_jti);
    }

    #[test]
    fn token_type_confusion_is_rejected() {
        let keys = keys();
        let pair = keys.issue_pair(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(keys.decode(&pair.refresh, TokenType::Access).is_err());
        assert!(keys.decode(&pair.access, TokenType::Refresh).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = keys();
        let long_ago = Utc::now() - Duration::days(30);
        let pair = keys.issue_pair(Uuid::new_v4(), long_ago).unwrap();
        assert!(keys.decode(&pair.refresh, TokenType::Refresh).is_err());
    }

    #[test]
    fn refresh_cookie_round_trips_through_headers() {
        let cookie = refresh_cookie("abc.def.ghi", 60, true);
        let text = cookie.to_str().unwrap();
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("Path=/auth"));
        assert!(text.contains("SameSite=Lax"));
        assert!(text.ends_with("; Secure"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc.def.ghi"),
        );
        assert_eq!(refresh_token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cleared = clear_refresh_cookie(false);
        let text = cleared.to_str().unwrap();
        assert!(text.starts_with("refresh_token=;"));
        assert!(text.contains("Max-Age=0"));
        assert!(!text.contains("Secure"));
    }
}
