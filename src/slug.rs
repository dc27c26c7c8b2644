//! URL slugs for catalog rows.

use std::future::Future;

use unicode_normalization::UnicodeNormalization;

use crate::error::RepoResult;

pub const MAX_SLUG_LENGTH: usize = 200;
const FALLBACK_SLUG: &str = "item";

/// Where a slug must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugScope {
    Category,
    CourseType,
    Course,
    TopicType,
    Lesson { course_id: i64 },
    Topic { lesson_id: i64 },
}

/// slugify
///
/// Decomposes to NFKD so accented Latin letters keep their base letter, then
/// lowercases ASCII alphanumerics, collapses whitespace, `-` and `_` runs into a
/// single `-` and drops everything else.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.nfkd() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LENGTH);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// unique_slug
///
/// Tries `base`, `base-1`, `base-2`, ... until `exists` reports the candidate free.
/// Long bases are shortened so the suffix still fits.
pub async fn unique_slug<F, Fut>(base: &str, mut exists: F) -> RepoResult<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = RepoResult<bool>>,
{
    let mut candidate = base.to_string();
    let mut counter: u32 = 0;

    while exists(candidate.clone()).await? {
        counter += 1;
        let suffix = format!("-{counter}");
        let room = MAX_SLUG_LENGTH.saturating_sub(suffix.len());
        let stem: String = base.chars().take(room).collect();
        candidate = format!("{}{}", stem.trim_end_matches('-'), suffix);
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_text() {
        assert_eq!(slugify("Intro to Rust"), "intro-to-rust");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("snake_case--and spaces"), "snake-case-and-spaces");
        assert_eq!(slugify("Café Basics"), "cafe-basics");
        assert_eq!(slugify("Über Straße ½"), "uber-strae-12");
    }

    #[test]
    fn slugify_falls_back_when_empty() {
        assert_eq!(slugify("!!!"), "item");
        assert_eq!(slugify(""), "item");
    }

    #[test]
    fn slugify_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LENGTH);
    }

    #[tokio::test]
    async fn unique_slug_appends_increasing_suffix() {
        let taken = ["rust", "rust-1", "rust-2"];
        let slug = unique_slug("rust", |candidate| async move {
            Ok(taken.contains(&candidate.as_str()))
        })
        .await
        .unwrap();
        assert_eq!(slug, "rust-3");
    }

    #[tokio::test]
    async fn unique_slug_keeps_free_base() {
        let slug = unique_slug("fresh", |_| async { Ok(false) }).await.unwrap();
        assert_eq!(slug, "fresh");
    }
}
