use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use blog_service::{build_router, AppState};
use common_auth::{SharedIdentitySource, StaticMarkerSource};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "test:admin-1|ADMIN";
const MODERATOR: &str = "test:mod-1|MODERATOR";
const USER: &str = "test:user-1|USER";
const OTHER_USER: &str = "test:user-2|USER";

fn app() -> Router {
    let identity: SharedIdentitySource = Arc::new(StaticMarkerSource::new());
    build_router(AppState::new(identity))
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_post(app: &Router, token: &str, title: &str) -> u64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/posts",
        Some(token),
        Some(json!({ "title": title, "content": "body", "category": "Sports", "tags": ["rust"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_u64().unwrap()
}

async fn create_comment(app: &Router, token: &str, post_id: u64) -> u64 {
    let (status, body) = call(
        app,
        Method::POST,
        &format!("/posts/{post_id}/comments"),
        Some(token),
        Some(json!({ "content": "nice post" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_u64().unwrap()
}

#[tokio::test]
async fn only_admins_manage_categories() {
    let app = app();

    let (status, body) = call(&app, Method::POST, "/categories", Some(USER), Some(json!({ "name": "Tech" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTH_FORBIDDEN");

    let (status, _) = call(&app, Method::POST, "/categories", Some(MODERATOR), Some(json!({ "name": "Tech" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, "/categories", Some(ADMIN), Some(json!({ "name": "Tech" }))).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_u64().unwrap();

    let (status, body) = call(&app, Method::POST, "/categories", Some(ADMIN), Some(json!({ "name": "Tech" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "category_exists");

    let (status, body) = call(&app, Method::PUT, &format!("/categories/{id}"), Some(ADMIN), Some(json!({ "name": "Technology" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Technology");

    let (status, _) = call(&app, Method::DELETE, "/categories/999", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/categories", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn writes_require_a_bearer_token() {
    let app = app();

    let (status, body) = call(&app, Method::POST, "/posts", None, Some(json!({ "title": "t", "content": "c" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_HEADER");

    let (status, body) = call(&app, Method::POST, "/posts", Some("aaa.bbb.ccc"), Some(json!({ "title": "t", "content": "c" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_TEST_TOKEN");
}

#[tokio::test]
async fn malformed_bodies_are_labelled_bad_requests() {
    let app = app();

    let (status, body) = call(&app, Method::POST, "/posts", Some(USER), Some(json!({ "title": "t", "content": "c", "tags": null }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["tags"], json!([]));

    let (status, body) = call(&app, Method::POST, "/posts", Some(USER), Some(json!({ "title": "t" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_body");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/categories")
        .header("authorization", format!("Bearer {ADMIN}"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get("X-Error-Code").unwrap(), "invalid_body");
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/posts")
        .header("authorization", format!("bearer {USER}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "title": "t", "content": "c" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn moderators_hide_comments_and_users_cannot() {
    let app = app();
    let post_id = create_post(&app, USER, "hello").await;
    let comment_id = create_comment(&app, OTHER_USER, post_id).await;

    let (status, _) = call(&app, Method::PATCH, &format!("/comments/{comment_id}/hide"), Some(USER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::PATCH, "/comments/999/hide", Some(USER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::PATCH, "/comments/999/hide", Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::PATCH, &format!("/comments/{comment_id}/hide"), Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, comments) = call(&app, Method::GET, &format!("/posts/{post_id}/comments"), None, None).await;
    assert_eq!(comments[0]["hidden"], true);
}

#[tokio::test]
async fn likes_are_counted_once_per_caller() {
    let app = app();
    let post_id = create_post(&app, USER, "likeable").await;

    let (_, body) = call(&app, Method::POST, &format!("/posts/{post_id}/like"), Some(USER), None).await;
    assert_eq!(body["likes"], 1);
    let (_, body) = call(&app, Method::POST, &format!("/posts/{post_id}/like"), Some(USER), None).await;
    assert_eq!(body["detail"], "already liked");
    let (_, body) = call(&app, Method::POST, &format!("/posts/{post_id}/like"), Some(OTHER_USER), None).await;
    assert_eq!(body["likes"], 2);

    let comment_id = create_comment(&app, USER, post_id).await;
    let (_, body) = call(&app, Method::POST, &format!("/comments/{comment_id}/like"), Some(MODERATOR), None).await;
    assert_eq!(body["likes"], 1);

    let (status, _) = call(&app, Method::POST, "/posts/999/like", Some(USER), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, post) = call(&app, Method::GET, &format!("/posts/{post_id}"), None, None).await;
    assert_eq!(post["likes"], 2);
    assert_eq!(post["category"], "Sports");
    assert_eq!(post["tags"], json!(["rust"]));
}

#[tokio::test]
async fn owners_and_moderators_edit_and_delete() {
    let app = app();
    let post_id = create_post(&app, USER, "mine").await;
    let update = json!({ "title": "edited", "content": "new body", "tags": [] });

    let (status, _) = call(&app, Method::PUT, &format!("/posts/{post_id}"), Some(OTHER_USER), Some(update.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::PUT, &format!("/posts/{post_id}"), Some(USER), Some(update.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "edited");
    assert_eq!(body["category"], "Sports");
    assert_eq!(body["tags"], json!([]));

    let comment_id = create_comment(&app, OTHER_USER, post_id).await;
    let (status, _) = call(&app, Method::DELETE, &format!("/comments/{comment_id}"), Some(USER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &format!("/comments/{comment_id}"), Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::DELETE, &format!("/posts/{post_id}"), Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &format!("/posts/{post_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn moderators_cannot_touch_admin_content() {
    let app = app();
    let post_id = create_post(&app, ADMIN, "announcement").await;
    let comment_id = create_comment(&app, ADMIN, post_id).await;

    let (status, body) = call(&app, Method::DELETE, &format!("/comments/{comment_id}"), Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "permission denied: moderators cannot delete admin content");

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/posts/{post_id}"),
        Some(MODERATOR),
        Some(json!({ "title": "x", "content": "y" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::DELETE, &format!("/posts/{post_id}"), Some(MODERATOR), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::DELETE, &format!("/comments/{comment_id}"), Some("test:admin-2|ADMIN"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::DELETE, &format!("/posts/{post_id}"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn posts_list_newest_first_and_metrics_are_exposed() {
    let app = app();
    let first = create_post(&app, USER, "first").await;
    let second = create_post(&app, USER, "second").await;

    let (_, posts) = call(&app, Method::GET, "/posts", None, None).await;
    let ids: Vec<u64> = posts
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["id"].as_u64())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let (status, _) = call(&app, Method::GET, "/posts/424242", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("http_errors_total"));
    assert!(text.contains("post_not_found"));
}
