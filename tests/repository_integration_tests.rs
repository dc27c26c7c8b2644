//! Postgres-backed repository tests. They need a reachable `DATABASE_URL` and
//! are ignored by default: `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use course_portal::{
    error::RepositoryError,
    models::{
        Course, NewAuthorDetails, NewComment, NewCourse, NewTaxonomyTerm, NewUser,
        OutstandingToken, Price, TaxonomyKind, User,
    },
    pagination::{ListQuery, OrderBy},
    permissions::Visibility,
    repository::{AccountRepository, CatalogRepository, CourseFilter, PostgresRepository},
    slug::SlugScope,
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Short random suffix so reruns against the same database never collide.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

async fn create_test_user(repo: &PostgresRepository) -> User {
    let username = unique("user");
    repo.create_user(NewUser {
        email: format!("{username}@example.com"),
        username,
        password_hash: "not-a-real-hash".to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        is_active: true,
        is_verified: true,
        is_staff: false,
        is_superuser: false,
    })
    .await
    .expect("create user")
}

async fn create_test_course(repo: &PostgresRepository, owner: Uuid, published: bool) -> Course {
    let category = repo
        .create_term(
            TaxonomyKind::Category,
            NewTaxonomyTerm {
                name: unique("Category"),
                slug: unique("category"),
                description: String::new(),
                is_active: true,
            },
        )
        .await
        .expect("create category");
    let course_type = repo
        .create_term(
            TaxonomyKind::CourseType,
            NewTaxonomyTerm {
                name: unique("Type"),
                slug: unique("type"),
                description: String::new(),
                is_active: true,
            },
        )
        .await
        .expect("create course type");

    let title = unique("Course");
    repo.create_course(NewCourse {
        course_category_id: category.id,
        course_type_id: course_type.id,
        course_slug: title.to_lowercase(),
        course_title: title,
        course_description: "Integration test course.".to_string(),
        course_banner: None,
        is_free_course: false,
        course_price: Price::from_cents(4990),
        is_published: published,
        created_by: owner,
    })
    .await
    .expect("create course")
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_user_email_lookup_is_case_insensitive() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;

    let found = repo
        .get_user_by_email(&user.email.to_uppercase())
        .await
        .unwrap()
        .expect("user found by upper-cased email");
    assert_eq!(found.id, user.id);

    let duplicate = repo
        .create_user(NewUser {
            username: unique("other"),
            email: user.email.to_uppercase(),
            password_hash: "x".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_verified: false,
            is_staff: false,
            is_superuser: false,
        })
        .await;
    assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));
}

#[tokio::test]
#[ignore]
async fn test_refresh_token_ledger() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;

    let now = Utc::now();
    let tokens: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
    for jti in &tokens {
        repo.record_outstanding_token(OutstandingToken {
            jti: *jti,
            user_id: user.id,
            created_at: now,
            expires_at: now + Duration::days(1),
        })
        .await
        .unwrap();
    }

    assert!(repo.blacklist_token(tokens[0]).await.unwrap());
    // Blacklisting twice is a no-op.
    assert!(!repo.blacklist_token(tokens[0]).await.unwrap());
    assert!(repo.is_token_blacklisted(tokens[0]).await.unwrap());
    assert!(!repo.is_token_blacklisted(tokens[1]).await.unwrap());

    let revoked = repo.blacklist_user_tokens(user.id).await.unwrap();
    assert_eq!(revoked, 1);
    assert!(repo.is_token_blacklisted(tokens[1]).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_course_visibility_and_views() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo).await;
    let published = create_test_course(&repo, owner.id, true).await;
    let draft = create_test_course(&repo, owner.id, false).await;

    let query = ListQuery {
        order: vec![OrderBy::desc("created_at")],
        limit: 100,
        offset: 0,
    };
    let mut filter = CourseFilter::visible_to(Visibility::OwnedBy(owner.id));
    let (mine, total) = repo.list_courses(&filter, &query).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(mine[0].id, draft.id);

    filter.visibility = Visibility::Public;
    filter.search = Some(draft.course_title.to_uppercase());
    let (found, _) = repo.list_courses(&filter, &query).await.unwrap();
    assert!(found.is_empty(), "drafts never show publicly");

    assert!(repo.slug_exists(SlugScope::Course, &published.course_slug).await.unwrap());
    repo.increment_course_views(published.id).await.unwrap();
    let reloaded = repo.get_course(published.id).await.unwrap().unwrap();
    assert_eq!(reloaded.course_views, published.course_views + 1);
    assert_eq!(reloaded.course_price.cents(), 4990);
}

#[tokio::test]
#[ignore]
async fn test_comment_replies_cascade() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo).await;
    let course = create_test_course(&repo, owner.id, true).await;

    let root = repo
        .create_comment(NewComment {
            course_id: course.id,
            user_id: owner.id,
            parent_id: None,
            content: "Root".to_string(),
        })
        .await
        .unwrap();
    let reply = repo
        .create_comment(NewComment {
            course_id: course.id,
            user_id: owner.id,
            parent_id: Some(root.id),
            content: "Reply".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(root.username, owner.username);

    let replies = repo.list_replies(course.id).await.unwrap();
    assert_eq!(replies.len(), 1);

    assert!(repo.delete_comment(root.id).await.unwrap());
    assert!(repo.get_comment(reply.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_rating_upsert_and_author_uniqueness() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo).await;
    let member = create_test_user(&repo).await;
    let course = create_test_course(&repo, owner.id, true).await;

    repo.upsert_rating(course.id, member.id, 2, None).await.unwrap();
    let replaced = repo
        .upsert_rating(course.id, member.id, 4, Some("Better".to_string()))
        .await
        .unwrap();
    assert_eq!(replaced.rating, 4);
    let summary = repo.rating_summary(course.id).await.unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(summary.average, Some(4.0));

    let author = NewAuthorDetails {
        user_id: member.id,
        course_id: course.id,
        designation: "Editor".to_string(),
        consent_given: false,
        consent_date: None,
    };
    repo.create_author(author.clone()).await.unwrap();
    let duplicate = repo.create_author(author).await;
    assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

    let public = repo.list_course_authors(course.id, true).await.unwrap();
    assert!(public.is_empty());

    // Deleting the course removes everything hanging off it.
    assert!(repo.delete_course(course.id).await.unwrap());
    assert!(repo.get_author_for(course.id, member.id).await.unwrap().is_none());
}
