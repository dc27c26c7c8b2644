mod common;

use axum::http::{Method, StatusCode, header};
use common::{PASSWORD, bearer, link_path, refresh_cookie_header, spawn_app, spawn_app_with};
use course_portal::{MockMailer, repository::AccountRepository};
use serde_json::json;

fn registration(username: &str) -> serde_json::Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "username": username,
        "email": format!("{username}@Example.com"),
        "password": PASSWORD,
        "confirm_password": PASSWORD,
    })
}

#[tokio::test]
async fn test_register_verify_login_refresh_logout() {
    let app = spawn_app();

    // Register: 201, inactive until verified.
    let response = app.post("/auth/register", None, registration("ada")).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(response.body["user"]["email"], "ada@example.com");
    assert_eq!(response.body["user"]["is_verified"], false);

    // Login before verification is refused with the verification hint.
    let login_body = json!({ "email": "ada@example.com", "password": PASSWORD });
    let response = app.post("/auth/token", None, login_body.clone()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["detail"].as_str().unwrap().contains("Email not verified"));

    // Follow the mailed link.
    let mail = app.mailer.last_to("ada@example.com").expect("verification mail");
    let path = link_path(&mail.text);
    assert!(path.starts_with("/verify-email/"));
    let response = app.get(&format!("/auth{path}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["message"],
        "Email verified successfully. You can now log in."
    );

    // A second visit is still a success.
    let response = app.get(&format!("/auth{path}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Email already verified.");

    // Login sets the refresh cookie and returns an access token.
    let response = app.post("/auth/token", None, login_body).await;
    assert_eq!(response.status, StatusCode::OK);
    let access = response.body["access"].as_str().unwrap().to_string();
    let refresh = response.refresh_cookie().expect("refresh cookie");
    let cookie = response.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/auth"));

    // The access token authenticates.
    let response = app
        .send(Method::GET, "/auth/profile", &[bearer(&access)], None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["username"], "ada");
    assert_eq!(response.body["first_name"], "Ada");

    // Refresh rotates the cookie.
    let response = app
        .send(Method::POST, "/auth/token/refresh", &[refresh_cookie_header(&refresh)], None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let rotated = response.refresh_cookie().expect("rotated cookie");
    assert_ne!(rotated, refresh);

    // Replaying the old refresh token fails.
    let response = app
        .send(Method::POST, "/auth/token/refresh", &[refresh_cookie_header(&refresh)], None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Token is blacklisted.");

    // Logout blacklists the current token and clears the cookie.
    let response = app
        .send(Method::POST, "/auth/logout", &[refresh_cookie_header(&rotated)], None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.refresh_cookie().as_deref(), Some(""));

    let response = app
        .send(Method::POST, "/auth/token/refresh", &[refresh_cookie_header(&rotated)], None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Token is blacklisted.");

    // Logging out again with the revoked token is harmless.
    let response = app
        .send(Method::POST, "/auth/logout", &[refresh_cookie_header(&rotated)], None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie_is_unauthorized() {
    let app = spawn_app();
    let response = app.send(Method::POST, "/auth/token/refresh", &[], None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Refresh token not found.");
}

#[tokio::test]
async fn test_logout_without_cookie_still_succeeds() {
    let app = spawn_app();
    let response = app.send(Method::POST, "/auth/logout", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_reports_field_errors() {
    let app = spawn_app();
    app.seed_user("taken", false).await;

    let response = app
        .post(
            "/auth/register",
            None,
            json!({
                "username": "taken",
                "email": "not-an-email",
                "password": "12345678",
                "confirm_password": "different",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["username"][0],
        "A user with that username already exists."
    );
    assert_eq!(response.body["email"][0], "Enter a valid email address.");
    assert!(response.body["password"].as_array().unwrap().len() >= 2);
    assert_eq!(response.body["non_field_errors"][0], "Passwords do not match.");
}

#[tokio::test]
async fn test_register_rejects_case_insensitive_duplicate_email() {
    let app = spawn_app();
    app.seed_user("grace", false).await;

    let mut body = registration("grace2");
    body["email"] = json!("GRACE@example.com");
    let response = app.post("/auth/register", None, body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["email"][0], "A user with that email already exists.");
}

#[tokio::test]
async fn test_register_survives_mail_failure() {
    let app = spawn_app_with(MockMailer::new_failing());
    let response = app.post("/auth/register", None, registration("offline")).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(app.repo.get_user_by_username("offline").await.unwrap().is_some());
}

#[tokio::test]
async fn test_tampered_verification_link_is_rejected() {
    let app = spawn_app();
    app.post("/auth/register", None, registration("mallory")).await;
    let mail = app.mailer.last_to("mallory@example.com").unwrap();
    let path = link_path(&mail.text);
    let tampered = format!("{}x", path);

    let response = app.get(&format!("/auth{tampered}"), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["detail"], "Invalid or expired verification link.");
}

#[tokio::test]
async fn test_out_of_range_token_timestamp_is_rejected() {
    let app = spawn_app();
    app.post("/auth/register", None, registration("trudy")).await;
    let mail = app.mailer.last_to("trudy@example.com").unwrap();
    let path = link_path(&mail.text);
    let uid = path.split('/').nth(2).unwrap();

    let response = app
        .get(&format!("/auth/verify-email/{uid}/1y2p0ij32e8e8-AAAA"), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let reset = app
        .post(
            &format!("/auth/password-reset/{uid}/1y2p0ij32e8e8-AAAA"),
            None,
            json!({ "new_password": PASSWORD, "confirm_password": PASSWORD }),
        )
        .await;
    assert_eq!(reset.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_verification_is_silent_for_unknown_addresses() {
    let app = spawn_app();
    let response = app
        .post("/auth/resend-verification", None, json!({ "email": "ghost@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_share_one_message() {
    let app = spawn_app();
    app.seed_user("bob", false).await;

    let wrong = app
        .post("/auth/token", None, json!({ "email": "bob@example.com", "password": "nope" }))
        .await;
    let unknown = app
        .post("/auth/token", None, json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .await;

    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(wrong.body["detail"], "Invalid email or password.");
}

#[tokio::test]
async fn test_profile_requires_authentication() {
    let app = spawn_app();
    let response = app.get("/auth/profile", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .send(Method::GET, "/auth/profile", &[bearer("garbage")], None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_revokes_sessions() {
    let app = spawn_app();
    let user = app.seed_user("carol", false).await;

    let login = app
        .post("/auth/token", None, json!({ "email": "carol@example.com", "password": PASSWORD }))
        .await;
    let refresh = login.refresh_cookie().unwrap();

    let wrong = app
        .put(
            "/auth/change-password",
            Some(user.id),
            json!({ "old_password": "wrong", "new_password": "An0ther#Secret" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body["old_password"][0], "Old password is incorrect.");

    let response = app
        .put(
            "/auth/change-password",
            Some(user.id),
            json!({ "old_password": PASSWORD, "new_password": "An0ther#Secret" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .send(Method::POST, "/auth/token/refresh", &[refresh_cookie_header(&refresh)], None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .post(
            "/auth/token",
            None,
            json!({ "email": "carol@example.com", "password": "An0ther#Secret" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = spawn_app();
    app.seed_user("dave", false).await;

    let response = app
        .post("/auth/password-reset", None, json!({ "email": "dave@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let mail = app.mailer.last_to("dave@example.com").expect("reset mail");
    let path = link_path(&mail.text);
    let api_path = path.replace("/reset-password/", "/auth/password-reset/");

    let mismatch = app
        .post(
            &api_path,
            None,
            json!({ "new_password": "Fresh#Start9", "confirm_password": "Fresh#Start8" }),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
    assert_eq!(mismatch.body["non_field_errors"][0], "Passwords do not match.");

    let response = app
        .post(
            &api_path,
            None,
            json!({ "new_password": "Fresh#Start9", "confirm_password": "Fresh#Start9" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let response = app
        .post("/auth/token", None, json!({ "email": "dave@example.com", "password": "Fresh#Start9" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_for_unknown_email_sends_nothing() {
    let app = spawn_app();
    let response = app
        .post("/auth/password-reset", None, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_change_email_applies_after_confirmation() {
    let app = spawn_app();
    let user = app.seed_user("erin", false).await;

    let same = app
        .post("/auth/change-email", Some(user.id), json!({ "new_email": "erin@example.com" }))
        .await;
    assert_eq!(same.status, StatusCode::BAD_REQUEST);

    let response = app
        .post("/auth/change-email", Some(user.id), json!({ "new_email": "erin@new.example.org" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let mail = app.mailer.last_to("erin@new.example.org").expect("confirmation mail");
    let path = link_path(&mail.text);
    let response = app.get(&format!("/auth{path}"), None).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let stored = app.repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.email, "erin@new.example.org");
}

#[tokio::test]
async fn test_update_username_and_avatar() {
    let app = spawn_app();
    let user = app.seed_user("frank", false).await;
    app.seed_user("gina", false).await;

    let taken = app
        .put("/auth/update-username", Some(user.id), json!({ "username": "gina" }))
        .await;
    assert_eq!(taken.status, StatusCode::BAD_REQUEST);

    let invalid = app
        .put("/auth/update-username", Some(user.id), json!({ "username": "frank smith" }))
        .await;
    assert_eq!(
        invalid.body["username"][0],
        "Username can only contain letters, numbers, and underscores."
    );

    let renamed = app
        .put("/auth/update-username", Some(user.id), json!({ "username": "frank_2" }))
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["username"], "frank_2");

    // Keys outside the caller's avatar prefix are refused.
    let foreign = app
        .put(
            "/auth/update-avatar",
            Some(user.id),
            json!({ "avatar_key": "avatars/someone-else/me.png" }),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert_eq!(foreign.body["avatar_key"][0], "Invalid avatar key.");

    let upload = app
        .post(
            "/upload/presigned",
            Some(user.id),
            json!({ "filename": "me.png", "file_type": "image/png", "purpose": "avatar" }),
        )
        .await;
    assert_eq!(upload.status, StatusCode::OK);
    let key = upload.body["resource_key"].as_str().unwrap().to_string();

    let response = app
        .put("/auth/update-avatar", Some(user.id), json!({ "avatar_key": key }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["avatar"],
        format!("http://localhost:9000/mock-bucket/{key}")
    );
}

#[tokio::test]
async fn test_export_and_delete_account() {
    let app = spawn_app();
    let user = app.seed_user("hank", false).await;

    let export = app.get("/auth/export", Some(user.id)).await;
    assert_eq!(export.status, StatusCode::OK);
    assert_eq!(
        export.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );
    // Zip local file header magic.
    assert_eq!(&export.bytes[..2], b"PK");

    let deleted = app.delete("/auth/delete-account", Some(user.id)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert!(
        deleted
            .headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("attachment")
    );
    assert!(app.repo.get_user(user.id).await.unwrap().is_none());
}
