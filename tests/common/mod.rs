#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use course_portal::{
    AppConfig, AppState, InMemoryRepository, MockMailer, MockStorageService, create_router,
    mailer::MailerState,
    models::{NewUser, User},
    password::hash_password,
    repository::{AccountRepository, RepositoryState},
    storage::StorageState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Str0ng#Passw0rd";

/// TestApp
///
/// The full router over the in-memory repository, a recording mailer and the
/// offline storage mock. Requests go through `oneshot`, no socket involved.
pub struct TestApp {
    pub router: Router,
    pub repo: RepositoryState,
    pub mailer: MockMailer,
    pub config: AppConfig,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

impl TestResponse {
    /// Value of the `refresh_token` cookie set by this response, if any.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .filter_map(|pair| pair.trim().strip_prefix("refresh_token="))
            .map(str::to_string)
            .next()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(MockMailer::new())
}

pub fn spawn_app_with(mailer: MockMailer) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let config = AppConfig::default();
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(MockStorageService::new()) as StorageState,
        mailer: Arc::new(mailer.clone()) as MailerState,
        config: config.clone(),
    };

    TestApp {
        router: create_router(state),
        repo,
        mailer,
        config,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, String)],
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }

    pub async fn get(&self, uri: &str, user: Option<Uuid>) -> TestResponse {
        self.send(Method::GET, uri, &as_user(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Option<Uuid>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, &as_user(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: Option<Uuid>, body: Value) -> TestResponse {
        self.send(Method::PUT, uri, &as_user(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: Option<Uuid>) -> TestResponse {
        self.send(Method::DELETE, uri, &as_user(user), None).await
    }

    /// Creates a verified, active account directly in the repository.
    pub async fn seed_user(&self, username: &str, is_superuser: bool) -> User {
        self.repo
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: hash_password(PASSWORD).unwrap(),
                first_name: String::new(),
                last_name: String::new(),
                is_active: true,
                is_verified: true,
                is_staff: is_superuser,
                is_superuser,
            })
            .await
            .unwrap()
    }

    /// Creates an active category and course type through the admin API.
    pub async fn seed_taxonomy(&self, admin: Uuid) -> (i64, i64) {
        let category = self
            .post(
                "/admin/course-categories",
                Some(admin),
                serde_json::json!({ "category_name": "Programming" }),
            )
            .await;
        assert_eq!(category.status, StatusCode::CREATED, "{}", category.body);
        let course_type = self
            .post(
                "/admin/course-types",
                Some(admin),
                serde_json::json!({ "course_name": "Self paced" }),
            )
            .await;
        assert_eq!(course_type.status, StatusCode::CREATED, "{}", course_type.body);
        (
            category.body["id"].as_i64().unwrap(),
            course_type.body["id"].as_i64().unwrap(),
        )
    }

    /// Creates a course owned by `owner` and returns its JSON.
    pub async fn seed_course(
        &self,
        owner: Uuid,
        taxonomy: (i64, i64),
        title: &str,
        published: bool,
    ) -> Value {
        let response = self
            .post(
                "/courses",
                Some(owner),
                serde_json::json!({
                    "course_category": taxonomy.0,
                    "course_type": taxonomy.1,
                    "course_title": title,
                    "course_description": "An introduction.",
                    "is_published": published,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }
}

/// Local-environment identity header understood by the `AuthUser` extractor.
pub fn as_user(user: Option<Uuid>) -> Vec<(&'static str, String)> {
    user.map(|id| vec![("x-user-id", id.to_string())])
        .unwrap_or_default()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("authorization", format!("Bearer {token}"))
}

pub fn refresh_cookie_header(token: &str) -> (&'static str, String) {
    ("cookie", format!("refresh_token={token}"))
}

/// Path part of the first frontend link (`http://localhost:3001/...`) in a mail body.
pub fn link_path(text: &str) -> String {
    let start = text.find("http://localhost:3001").expect("mail contains a link");
    let link = text[start..].split_whitespace().next().unwrap();
    link.trim_start_matches("http://localhost:3001").to_string()
}
