//! Personal data export: a zip archive of everything the account owns.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{
    catalog::COURSE_ORDERING,
    error::AppResult,
    models::User,
    pagination::ListQuery,
    permissions::Visibility,
    repository::{CourseFilter, RepositoryState},
};

pub fn archive_filename(now: DateTime<Utc>) -> String {
    format!("user_data_backup_{}.zip", now.format("%Y%m%d_%H%M%S"))
}

fn add_json<T: Serialize>(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    value: &T,
) -> AppResult<()> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(name, options)?;
    writer.write_all(&serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// build_account_archive
///
/// Collects the profile (without the password hash), authored courses, comments,
/// ratings and co-authorships of `user` into an in-memory zip.
pub async fn build_account_archive(
    repo: &RepositoryState,
    user: &User,
    now: DateTime<Utc>,
) -> AppResult<Vec<u8>> {
    let (courses, _) = repo
        .list_courses(
            &CourseFilter::visible_to(Visibility::OwnedBy(user.id)),
            &ListQuery::unbounded(COURSE_ORDERING.default.to_vec()),
        )
        .await?;
    let comments = repo.comments_by_user(user.id).await?;
    let ratings = repo.ratings_by_user(user.id).await?;
    let co_authorships = repo.authors_by_user(user.id).await?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    add_json(
        &mut writer,
        "profile.json",
        &serde_json::json!({ "exported_at": now, "user": user }),
    )?;
    add_json(&mut writer, "courses.json", &courses)?;
    add_json(&mut writer, "comments.json", &comments)?;
    add_json(&mut writer, "ratings.json", &ratings)?;
    add_json(&mut writer, "co_authorships.json", &co_authorships)?;

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NewComment, NewUser},
        repository::InMemoryRepository,
    };
    use std::{io::Read, sync::Arc};

    #[tokio::test]
    async fn archive_contains_user_data_without_password_hash() {
        let repo: RepositoryState = Arc::new(InMemoryRepository::new());
        let user = repo
            .create_user(NewUser {
                username: "dana".into(),
                email: "dana@example.com".into(),
                password_hash: "$argon2id$secret".into(),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        repo.create_comment(NewComment {
            course_id: 7,
            user_id: user.id,
            parent_id: None,
            content: "Great course".into(),
        })
        .await
        .unwrap();

        let bytes = build_account_archive(&repo, &user, Utc::now()).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "co_authorships.json",
                "comments.json",
                "courses.json",
                "profile.json",
                "ratings.json"
            ]
        );

        let mut profile = String::new();
        archive
            .by_name("profile.json")
            .unwrap()
            .read_to_string(&mut profile)
            .unwrap();
        assert!(profile.contains("dana@example.com"));
        assert!(!profile.contains("argon2"));

        let mut comments = String::new();
        archive
            .by_name("comments.json")
            .unwrap()
            .read_to_string(&mut comments)
            .unwrap();
        assert!(comments.contains("Great course"));
    }

    #[test]
    fn filename_carries_timestamp() {
        let at = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(archive_filename(at), "user_data_backup_20260304_050607.zip");
    }
}
