//! Password hashing (Argon2id, PHC strings) and the password policy applied on
//! registration, password change and password reset.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const SPECIAL_CHARACTERS: &str = "@$!%*?#&_";

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "admin123",
    "welcome1",
    "letmein1",
    "abc12345",
    "football",
    "baseball",
    "sunshine",
    "princess",
    "trustno1",
    "superman",
];

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// A malformed stored hash never verifies.
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Returns every policy violation; an empty vector means the password is acceptable.
pub fn validate_password(password: &str, username: &str, email: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.push("This password is too common.".to_string());
    }

    let local_part = email.split('@').next().unwrap_or_default();
    let similar = [username, local_part]
        .iter()
        .map(|attr| attr.to_lowercase())
        .any(|attr| attr.len() >= 3 && lowered.contains(&attr));
    if similar {
        errors.push("The password is too similar to your username or email.".to_string());
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));
    if !(has_lower && has_upper && has_digit && has_special) {
        errors.push(format!(
            "Password must include an uppercase letter, a lowercase letter, a number and one of {SPECIAL_CHARACTERS}."
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Str0ng#Pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Str0ng#Pass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn strong_password_passes_policy() {
        assert!(validate_password("Blue#Kettle42", "alice", "alice@example.com").is_empty());
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(!validate_password("sh0rt!A", "bob", "bob@example.com").is_empty());
        assert!(!validate_password("12345678", "bob", "bob@example.com").is_empty());
        assert!(!validate_password("Password", "bob", "bob@example.com").is_empty());
    }

    #[test]
    fn password_containing_username_is_rejected() {
        let errors = validate_password("Xmarco_99#", "marco", "m@example.com");
        assert!(errors.iter().any(|e| e.contains("too similar")));
    }
}
