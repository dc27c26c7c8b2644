//! One-time email tokens for account verification, password reset and email change.
//!
//! A token is `{timestamp_base36}-{signature}` where the signature is an
//! HMAC-SHA256 over the purpose and the user's mutable state. Changing the
//! password, email, verification flag or last login invalidates every token
//! issued before the change.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// What a token authorizes. Email changes bind the target address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTokenPurpose {
    VerifyEmail,
    ResetPassword,
    ChangeEmail(String),
}

impl EmailTokenPurpose {
    fn tag(&self) -> String {
        match self {
            EmailTokenPurpose::VerifyEmail => "verify-email".to_string(),
            EmailTokenPurpose::ResetPassword => "reset-password".to_string(),
            EmailTokenPurpose::ChangeEmail(new_email) => {
                format!("change-email:{}", new_email.to_lowercase())
            }
        }
    }
}

pub fn encode_uid(id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

pub fn decode_uid(encoded: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    Uuid::parse_str(&text).ok()
}

/// URL-safe encoding for arbitrary short strings (the new address in email-change links).
pub fn encode_text(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

pub fn decode_text(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// EmailTokenGenerator
///
/// Stateless: nothing is stored server-side, validity is recomputed from the
/// user's current row.
#[derive(Clone)]
pub struct EmailTokenGenerator {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl EmailTokenGenerator {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    pub fn make_token(&self, user: &User, purpose: &EmailTokenPurpose, now: DateTime<Utc>) -> String {
        let timestamp = now.timestamp().max(0) as u64;
        let signature = URL_SAFE_NO_PAD.encode(self.sign(user, purpose, timestamp));
        format!("{}-{}", to_base36(timestamp), signature)
    }

    pub fn check_token(
        &self,
        user: &User,
        purpose: &EmailTokenPurpose,
        token: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some((ts_part, sig_part)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_part) else {
            return false;
        };
        let Ok(signature) = URL_SAFE_NO_PAD.decode(sig_part) else {
            return false;
        };

        let Some(age) = i64::try_from(timestamp)
            .ok()
            .and_then(|issued| now.timestamp().checked_sub(issued))
        else {
            return false;
        };
        if age < 0 || age > self.ttl_secs {
            return false;
        }

        self.mac(user, purpose, timestamp)
            .verify_slice(&signature)
            .is_ok()
    }

    fn sign(&self, user: &User, purpose: &EmailTokenPurpose, timestamp: u64) -> Vec<u8> {
        self.mac(user, purpose, timestamp)
            .finalize()
            .into_bytes()
            .to_vec()
    }

    fn mac(&self, user: &User, purpose: &EmailTokenPurpose, timestamp: u64) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac key of any length is valid"));
        let last_login = user
            .last_login
            .map(|at| at.timestamp_micros().to_string())
            .unwrap_or_default();

        for part in [
            purpose.tag(),
            user.id.to_string(),
            user.password_hash.clone(),
            last_login,
            user.email.to_lowercase(),
            user.is_verified.to_string(),
            timestamp.to_string(),
        ] {
            mac.update(part.as_bytes());
            mac.update(b"|");
        }
        mac
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() || text.len() > 13 {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$v=19$dummy".into(),
            ..Default::default()
        }
    }

    #[test]
    fn uid_encoding_is_reversible() {
        let id = Uuid::new_v4();
        assert_eq!(decode_uid(&encode_uid(id)), Some(id));
        assert_eq!(decode_uid("!!not-base64"), None);
    }

    #[test]
    fn base36_matches_radix_parse() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(from_base36(&to_base36(1_700_000_000)), Some(1_700_000_000));
    }

    #[test]
    fn valid_token_checks_out() {
        let generator = EmailTokenGenerator::new("secret", 3600);
        let user = user();
        let now = Utc::now();
        let token = generator.make_token(&user, &EmailTokenPurpose::VerifyEmail, now);
        assert!(generator.check_token(&user, &EmailTokenPurpose::VerifyEmail, &token, now));
    }

    #[test]
    fn token_is_bound_to_purpose() {
        let generator = EmailTokenGenerator::new("secret", 3600);
        let user = user();
        let now = Utc::now();
        let token = generator.make_token(&user, &EmailTokenPurpose::VerifyEmail, now);
        assert!(!generator.check_token(&user, &EmailTokenPurpose::ResetPassword, &token, now));

        let change = EmailTokenPurpose::ChangeEmail("new@example.com".into());
        let token = generator.make_token(&user, &change, now);
        let other = EmailTokenPurpose::ChangeEmail("evil@example.com".into());
        assert!(!generator.check_token(&user, &other, &token, now));
    }

    #[test]
    fn state_change_invalidates_token() {
        let generator = EmailTokenGenerator::new("secret", 3600);
        let mut user = user();
        let now = Utc::now();
        let token = generator.make_token(&user, &EmailTokenPurpose::ResetPassword, now);

        user.password_hash = "$argon2id$v=19$changed".into();
        assert!(!generator.check_token(&user, &EmailTokenPurpose::ResetPassword, &token, now));
    }

    #[test]
    fn expired_and_future_tokens_are_rejected() {
        let generator = EmailTokenGenerator::new("secret", 60);
        let user = user();
        let now = Utc::now();
        let token = generator.make_token(&user, &EmailTokenPurpose::VerifyEmail, now);

        assert!(!generator.check_token(
            &user,
            &EmailTokenPurpose::VerifyEmail,
            &token,
            now + Duration::seconds(61)
        ));
        assert!(!generator.check_token(
            &user,
            &EmailTokenPurpose::VerifyEmail,
            &token,
            now - Duration::seconds(5)
        ));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let generator = EmailTokenGenerator::new("secret", 60);
        let user = user();
        let now = Utc::now();
        let cases = [
            "",
            "nodash",
            "zzzz-@@@",
            "-abc",
            // Timestamps beyond i64 and beyond u64.
            "1y2p0ij32e8e8-AAAA",
            "zzzzzzzzzzzzz-AAAA",
        ];
        for token in cases {
            assert!(!generator.check_token(&user, &EmailTokenPurpose::VerifyEmail, token, now));
        }
    }
}
