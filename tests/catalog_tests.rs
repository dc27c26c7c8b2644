mod common;

use axum::http::StatusCode;
use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
}

// --- Admin taxonomy ---

#[tokio::test]
async fn test_admin_routes_require_superuser() {
    let app = spawn_app();
    let user = app.seed_user("student", false).await;

    let anonymous = app.get("/admin/stats", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forbidden = app.get("/admin/stats", Some(user.id)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let forbidden = app
        .post("/admin/course-categories", Some(user.id), json!({ "category_name": "Art" }))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_category_crud_and_slugs() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;

    let created = app
        .post(
            "/admin/course-categories",
            Some(admin.id),
            json!({ "category_name": "Data Science", "category_description": "Numbers." }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["category_slug"], "data-science");
    let id = created.body["id"].as_i64().unwrap();

    // Same name again: conflict.
    let duplicate = app
        .post("/admin/course-categories", Some(admin.id), json!({ "category_name": "Data Science" }))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    // Different name, same slug base: suffixed.
    let similar = app
        .post("/admin/course-categories", Some(admin.id), json!({ "category_name": "Data-Science" }))
        .await;
    assert_eq!(similar.status, StatusCode::CREATED);
    assert_eq!(similar.body["category_slug"], "data-science-1");

    let blank = app
        .post("/admin/course-categories", Some(admin.id), json!({ "category_name": "  " }))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    // Deactivated categories disappear from the public listing only.
    let updated = app
        .put(
            &format!("/admin/course-categories/{id}"),
            Some(admin.id),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["is_active"], false);

    let public = app.get("/course-categories", None).await;
    assert_eq!(public.body["total_items"], 1);
    let hidden = app.get(&format!("/course-categories/{id}"), None).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let admin_list = app.get("/admin/course-categories", Some(admin.id)).await;
    assert_eq!(admin_list.body["total_items"], 2);

    let deleted = app
        .delete(&format!("/admin/course-categories/{id}"), Some(admin.id))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let missing = app
        .delete(&format!("/admin/course-categories/{id}"), Some(admin.id))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_stats_and_users() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;
    app.seed_course(owner.id, taxonomy, "Rust Basics", true).await;
    app.seed_course(owner.id, taxonomy, "Draft", false).await;

    let stats = app.get("/admin/stats", Some(admin.id)).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["total_users"], 2);
    assert_eq!(stats.body["verified_users"], 2);
    assert_eq!(stats.body["total_courses"], 2);
    assert_eq!(stats.body["published_courses"], 1);

    let users = app
        .get("/admin/users?ordering=username", Some(admin.id))
        .await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body["results"][0]["username"], "owner");
    assert_eq!(users.body["results"][1]["username"], "root");
}

// --- Courses ---

#[tokio::test]
async fn test_course_visibility_rules() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let other = app.seed_user("other", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;

    let published = app.seed_course(owner.id, taxonomy, "Public Course", true).await;
    let draft = app.seed_course(owner.id, taxonomy, "Draft Course", false).await;
    let draft_id = draft["id"].as_i64().unwrap();

    let anonymous = app.get("/courses", None).await;
    assert_eq!(anonymous.body["total_items"], 1);
    assert_eq!(anonymous.body["results"][0]["id"], published["id"]);

    let as_owner = app.get("/courses", Some(owner.id)).await;
    assert_eq!(as_owner.body["total_items"], 2);

    let as_other = app.get("/courses", Some(other.id)).await;
    assert_eq!(as_other.body["total_items"], 1);

    let hidden = app.get(&format!("/courses/{draft_id}"), Some(other.id)).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let visible = app.get(&format!("/courses/{draft_id}"), Some(admin.id)).await;
    assert_eq!(visible.status, StatusCode::OK);

    let mine = app.get("/me/courses", Some(owner.id)).await;
    assert_eq!(mine.body["total_items"], 2);
    let theirs = app.get("/me/courses", Some(other.id)).await;
    assert_eq!(theirs.body["total_items"], 0);
}

#[tokio::test]
async fn test_course_creation_rules() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let (category, course_type) = app.seed_taxonomy(admin.id).await;

    let invalid = app
        .post(
            "/courses",
            Some(owner.id),
            json!({
                "course_category": 999,
                "course_type": course_type,
                "course_title": "",
                "course_description": "Text",
                "is_free_course": false,
            }),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        invalid.body["course_category"][0],
        "Invalid pk \"999\" - object does not exist."
    );
    assert!(invalid.body["course_title"].is_array());
    assert!(invalid.body["course_price"].is_array());

    let paid = app
        .post(
            "/courses",
            Some(owner.id),
            json!({
                "course_category": category,
                "course_type": course_type,
                "course_title": "Advanced Rust",
                "course_description": "Lifetimes.",
                "is_free_course": false,
                "course_price": "49.90",
            }),
        )
        .await;
    assert_eq!(paid.status, StatusCode::CREATED);
    assert_eq!(paid.body["course_price"], "49.90");
    assert_eq!(paid.body["course_slug"], "advanced-rust");
    assert_eq!(paid.body["course_category"]["id"], category);

    // Free courses never carry a price.
    let free = app
        .post(
            "/courses",
            Some(owner.id),
            json!({
                "course_category": category,
                "course_type": course_type,
                "course_title": "Advanced Rust",
                "course_description": "Again.",
                "is_free_course": true,
                "course_price": "10.00",
            }),
        )
        .await;
    assert_eq!(free.status, StatusCode::CREATED);
    assert_eq!(free.body["course_price"], "0.00");
    assert_eq!(free.body["course_slug"], "advanced-rust-1");
}

#[tokio::test]
async fn test_course_update_and_delete_ownership() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let other = app.seed_user("other", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;
    let course = app.seed_course(owner.id, taxonomy, "Original", true).await;
    let id = course["id"].as_i64().unwrap();

    let forbidden = app
        .put(&format!("/courses/{id}"), Some(other.id), json!({ "course_title": "Hijacked" }))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let updated = app
        .put(&format!("/courses/{id}"), Some(owner.id), json!({ "course_title": "Renamed" }))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["course_title"], "Renamed");
    // Slugs are stable.
    assert_eq!(updated.body["course_slug"], "original");

    // Turning a free course paid needs a price.
    let unpriced = app
        .put(&format!("/courses/{id}"), Some(owner.id), json!({ "is_free_course": false }))
        .await;
    assert_eq!(unpriced.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        unpriced.body["course_price"][0],
        "A price is required for paid courses."
    );
    let priced = app
        .put(
            &format!("/courses/{id}"),
            Some(owner.id),
            json!({ "is_free_course": false, "course_price": "19.99" }),
        )
        .await;
    assert_eq!(priced.status, StatusCode::OK);
    assert_eq!(priced.body["course_price"], "19.99");
    assert_eq!(priced.body["is_free_course"], false);

    let forbidden = app.delete(&format!("/courses/{id}"), Some(other.id)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let deleted = app.delete(&format!("/courses/{id}"), Some(admin.id)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app.get(&format!("/courses/{id}"), Some(admin.id)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slug_lookup_counts_views() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;
    app.seed_course(owner.id, taxonomy, "Counted Course", true).await;

    let first = app.get("/courses/slug/counted-course", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["course_views"], 1);
    let second = app.get("/courses/slug/counted-course", None).await;
    assert_eq!(second.body["course_views"], 2);

    let missing = app.get("/courses/slug/nope", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_listing_filters_and_pagination() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;
    for n in 0..12 {
        app.seed_course(owner.id, taxonomy, &format!("Course {n:02}"), true)
            .await;
    }
    app.seed_course(owner.id, taxonomy, "Machine Learning", true).await;

    let first = app.get("/courses", None).await;
    assert_eq!(first.body["total_items"], 13);
    assert_eq!(first.body["total_pages"], 2);
    assert_eq!(first.body["results"].as_array().unwrap().len(), 10);
    assert_eq!(
        first.body["next_page_link"],
        "http://localhost:3000/courses?page=2"
    );
    assert!(first.body["previous_page_link"].is_null());

    let last = app.get("/courses?page=last", None).await;
    assert_eq!(last.body["current_page"], 2);
    assert_eq!(last.body["results"].as_array().unwrap().len(), 3);

    let beyond = app.get("/courses?page=3", None).await;
    assert_eq!(beyond.status, StatusCode::NOT_FOUND);

    let search = app.get("/courses?search=machine", None).await;
    assert_eq!(search.body["total_items"], 1);

    let by_slug = app
        .get("/courses?course_category__category_slug=programming", None)
        .await;
    assert_eq!(by_slug.body["total_items"], 13);

    let descending = app.get("/courses?ordering=-course_title", None).await;
    assert_eq!(descending.body["results"][0]["course_title"], "Machine Learning");
}

// --- Lessons & topics ---

#[tokio::test]
async fn test_lessons_and_topics_follow_course_editors() {
    let app = spawn_app();
    let admin = app.seed_user("root", true).await;
    let owner = app.seed_user("owner", false).await;
    let stranger = app.seed_user("stranger", false).await;
    let taxonomy = app.seed_taxonomy(admin.id).await;
    let course = app.seed_course(owner.id, taxonomy, "Rust", true).await;
    let course_id = course["id"].as_i64().unwrap();

    let forbidden = app
        .post(
            "/course-lessons",
            Some(stranger.id),
            json!({ "course": course_id, "lesson_title": "Intro" }),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let missing_course = app
        .post(
            "/course-lessons",
            Some(owner.id),
            json!({ "course": 999, "lesson_title": "Intro" }),
        )
        .await;
    assert_eq!(missing_course.status, StatusCode::BAD_REQUEST);

    let lesson = app
        .post(
            "/course-lessons",
            Some(owner.id),
            json!({ "course": course_id, "lesson_title": "Intro", "lesson_order": 1 }),
        )
        .await;
    assert_eq!(lesson.status, StatusCode::CREATED);
    assert_eq!(lesson.body["lesson_slug"], "intro");
    assert_eq!(lesson.body["course"]["id"], course_id);
    let lesson_id = lesson.body["id"].as_i64().unwrap();

    let negative = app
        .post(
            "/course-lessons",
            Some(owner.id),
            json!({ "course": course_id, "lesson_title": "Bad", "lesson_order": -1 }),
        )
        .await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);

    let topic_type = app
        .post("/topic-types", Some(owner.id), json!({ "type_name": "Video" }))
        .await;
    assert_eq!(topic_type.status, StatusCode::CREATED);
    let type_id = topic_type.body["id"].as_i64().unwrap();

    let topic = app
        .post(
            "/lesson-topics",
            Some(owner.id),
            json!({
                "lesson": lesson_id,
                "type": type_id,
                "topic_title": "Ownership",
                "topic_content": "Moves and borrows.",
            }),
        )
        .await;
    assert_eq!(topic.status, StatusCode::CREATED, "{}", topic.body);
    assert_eq!(topic.body["topic_slug"], "ownership");

    let listed = app.get(&format!("/lesson-topics?lesson={lesson_id}"), None).await;
    assert_eq!(listed.body["total_items"], 1);

    // Deactivated lessons vanish for the public.
    let hidden = app
        .put(
            &format!("/course-lessons/{lesson_id}"),
            Some(owner.id),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(hidden.status, StatusCode::OK);
    let lessons = app.get(&format!("/course-lessons?course={course_id}"), None).await;
    assert_eq!(lessons.body["total_items"], 0);
    let direct = app.get(&format!("/course-lessons/{lesson_id}"), None).await;
    assert_eq!(direct.status, StatusCode::NOT_FOUND);

    let deleted = app
        .delete(&format!("/course-lessons/{lesson_id}"), Some(owner.id))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_topic_type_ownership() {
    let app = spawn_app();
    let owner = app.seed_user("owner", false).await;
    let other = app.seed_user("other", false).await;

    let created = app
        .post("/topic-types", Some(owner.id), json!({ "type_name": "Reading" }))
        .await;
    let id = created.body["id"].as_i64().unwrap();

    let forbidden = app
        .put(&format!("/topic-types/{id}"), Some(other.id), json!({ "type_name": "Mine" }))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let too_long = app
        .post("/topic-types", Some(owner.id), json!({ "type_name": "x".repeat(101) }))
        .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);

    let deleted = app.delete(&format!("/topic-types/{id}"), Some(owner.id)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}

// --- Uploads ---

#[tokio::test]
async fn test_presigned_upload_urls() {
    let app = spawn_app();
    let user = app.seed_user("artist", false).await;

    let rejected = app
        .post(
            "/upload/presigned",
            Some(user.id),
            json!({ "filename": "notes.pdf", "file_type": "application/pdf" }),
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected.body["file_type"][0], "Only image uploads are allowed.");

    let banner = app
        .post(
            "/upload/presigned",
            Some(user.id),
            json!({ "filename": "cover.PNG", "file_type": "image/png", "purpose": "course_banner" }),
        )
        .await;
    assert_eq!(banner.status, StatusCode::OK);
    let key = banner.body["resource_key"].as_str().unwrap();
    assert!(key.starts_with(&format!("course_banners/{}/", user.id)));
    assert!(key.ends_with(".png"));
    assert!(banner.body["upload_url"].as_str().unwrap().contains("signature=fake"));

    let anonymous = app
        .post(
            "/upload/presigned",
            None,
            json!({ "filename": "a.png", "file_type": "image/png" }),
        )
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}
