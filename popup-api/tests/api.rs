use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use popup_api::{auth::TokenIssuer, build_router, store::MemoryStore, AppState};

const SECRET: &str = "integration-test-secret-with-32-plus-bytes";

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), TokenIssuer::new(SECRET, 3600));
    build_router(state, None)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("x-auth-token", token);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn signup(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/signup",
        None,
        Some(json!({
            "username": "maker",
            "email": email,
            "password": "s3cret-pass",
            "confirmPassword": "s3cret-pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

fn two_popups() -> Value {
    json!([
        { "id": 1, "type": "video", "content": "https://example.com/a.mp4", "serialNo": 1 },
        { "id": 2, "type": "quiz", "content": "", "serialNo": 2 },
    ])
}

async fn create_chat(app: &Router, popups: Value) -> String {
    let (status, body) = send(app, Method::POST, "/chat", None, Some(json!({ "popups": popups }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["chatId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_completion_flow() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;

    let (status, body) = send(&app, Method::GET, &format!("/chat/{chat_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chatId"], chat_id.as_str());
    assert_eq!(body["popups"], two_popups());

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/chat/{chat_id}/response"),
        None,
        Some(json!({ "index": 0, "response": "watched" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Response saved");

    let (status, body) = send(&app, Method::PUT, &format!("/chat/{chat_id}/interact"), None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["incompleteInteractions"], 1);
    assert_ne!(body["chat"]["completionRate"], 100);

    send(
        &app,
        Method::POST,
        &format!("/chat/{chat_id}/response"),
        None,
        Some(json!({ "index": 1, "response": "A" })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/chat/{chat_id}/interact"),
        None,
        Some(json!({ "views": 2, "completionRate": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["completionRate"], 100);
    assert_eq!(body["chat"]["views"], 2);

    let (status, report) = send(&app, Method::GET, &format!("/formresponse/{chat_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["completionRate"], 100);
    assert_eq!(report["views"], 2);
    assert!(report["lastVisited"].is_string());

    let responses = report["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["popupType"], "video");
    assert_eq!(responses[0]["serialNo"], 1);
    assert_eq!(responses[0]["response"], "watched");
    assert_eq!(responses[1]["popupType"], "quiz");
    assert_eq!(responses[1]["serialNo"], 2);
}

#[tokio::test]
async fn test_report_renumbers_from_one() {
    let app = app();
    let popups = json!([
        { "id": 7, "type": "text", "serialNo": 40 },
        { "id": 8, "type": "rating", "serialNo": 50 },
    ]);
    let chat_id = create_chat(&app, popups).await;

    send(
        &app,
        Method::POST,
        &format!("/chat/{chat_id}/response"),
        None,
        Some(json!({ "index": 1, "response": 5 })),
    )
    .await;

    let (_, report) = send(&app, Method::GET, &format!("/formresponse/{chat_id}"), None, None).await;
    let responses = report["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["popupType"], "rating");
    assert_eq!(responses[0]["serialNo"], 1);
    assert_eq!(responses[0]["response"], 5);
}

#[tokio::test]
async fn test_fresh_chat_report() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;

    let (status, report) = send(&app, Method::GET, &format!("/formresponse/{chat_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["responses"], json!([]));
    assert_eq!(report["completionRate"], 0);
    assert_eq!(report["views"], 0);
    assert!(report["lastVisited"].is_null());
}

#[tokio::test]
async fn test_chat_errors() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;
    let missing = uuid::Uuid::new_v4();

    let (status, _) = send(&app, Method::POST, "/chat", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/formresponse/not-an-id", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid chat ID");

    let (status, _) = send(&app, Method::PUT, "/chat/not-an-id/interact", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &format!("/chat/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat not found");

    let (status, _) = send(&app, Method::GET, &format!("/formresponse/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/chat/{missing}/response"),
        None,
        Some(json!({ "index": 0, "response": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for index in [-1, 2, 10] {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/chat/{chat_id}/response"),
            None,
            Some(json!({ "index": index, "response": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid popup index");
    }
}

#[tokio::test]
async fn test_interact_without_body() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;

    send(
        &app,
        Method::POST,
        &format!("/chat/{chat_id}/response"),
        None,
        Some(json!({ "index": 0, "response": "watched" })),
    )
    .await;

    let (status, body) = send(&app, Method::PUT, &format!("/chat/{chat_id}/interact"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["incompleteInteractions"], 1);
    assert_eq!(body["chat"]["views"], 0);

    // JSON sent without a Content-Type header is still read
    let request = Request::builder()
        .method(Method::PUT)
        .uri(format!("/chat/{chat_id}/interact"))
        .body(Body::from(r#"{"views": 2}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["chat"]["views"], 2);
}

#[tokio::test]
async fn test_popup_index_must_be_integer() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;
    let uri = format!("/chat/{chat_id}/response");

    for payload in [
        json!({ "response": "x" }),
        json!({ "index": "0", "response": "x" }),
        json!({ "index": 0.5, "response": "x" }),
        json!({ "index": null, "response": "x" }),
    ] {
        let (status, body) = send(&app, Method::POST, &uri, None, Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid popup index");
    }

    let (_, report) = send(&app, Method::GET, &format!("/formresponse/{chat_id}"), None, None).await;
    assert!(report["responses"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"popups\": ["))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_visit_keeps_recorded_responses() {
    let app = app();
    let chat_id = create_chat(&app, two_popups()).await;

    for index in [0, 1] {
        send(
            &app,
            Method::POST,
            &format!("/chat/{chat_id}/response"),
            None,
            Some(json!({ "index": index, "response": index })),
        )
        .await;
        let (status, _) = send(&app, Method::GET, &format!("/chat/{chat_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, report) = send(&app, Method::GET, &format!("/formresponse/{chat_id}"), None, None).await;
    assert_eq!(report["responses"].as_array().unwrap().len(), 2);
    assert!(report["lastVisited"].is_string());
}

#[tokio::test]
async fn test_signup_login_and_profile() {
    let app = app();
    let token = signup(&app, "maker@example.com").await;

    let (status, body) = send(&app, Method::GET, "/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "maker@example.com");
    assert!(body.get("passwordHash").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": "maker@example.com", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": "maker@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = send(
        &app,
        Method::POST,
        "/signup",
        None,
        Some(json!({
            "username": "again",
            "email": "maker@example.com",
            "password": "pw",
            "confirmPassword": "pw",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn test_signup_password_mismatch() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/signup",
        None,
        Some(json!({
            "username": "u",
            "email": "u@example.com",
            "password": "one",
            "confirmPassword": "two",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Passwords do not match");
}

#[tokio::test]
async fn test_token_required() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/user", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token, authorization denied");

    let (status, body) = send(&app, Method::GET, "/folder", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn test_bearer_header_accepted() {
    let app = app();
    let token = signup(&app, "bearer@example.com").await;

    let request = Request::builder()
        .uri("/user")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_user() {
    let app = app();
    let token = signup(&app, "old@example.com").await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/update",
        Some(&token),
        Some(json!({ "name": "", "email": "bad" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/update",
        Some(&token),
        Some(json!({
            "name": "renamed",
            "email": "new@example.com",
            "oldPassword": "wrong",
            "newPassword": "next-pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid old password");

    let (status, _) = send(
        &app,
        Method::PUT,
        "/update",
        Some(&token),
        Some(json!({
            "name": "renamed",
            "email": "new@example.com",
            "oldPassword": "s3cret-pass",
            "newPassword": "next-pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": "new@example.com", "password": "next-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = send(&app, Method::GET, "/user", Some(&token), None).await;
    assert_eq!(profile["username"], "renamed");
}

#[tokio::test]
async fn test_folders() {
    let app = app();
    let owner = signup(&app, "owner@example.com").await;
    let other = signup(&app, "other@example.com").await;

    let (status, body) = send(&app, Method::POST, "/folder", Some(&owner), Some(json!({ "name": "ab" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Folder name must be between 3 and 50 characters");

    let (status, folder) = send(&app, Method::POST, "/folder", Some(&owner), Some(json!({ "name": "Leads" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let folder_id = folder["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, "/folder", Some(&owner), Some(json!({ "name": "Leads" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Folder name already exists");

    let (_, list) = send(&app, Method::GET, "/folder", Some(&owner), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = send(&app, Method::GET, "/folder", Some(&other), None).await;
    assert!(list.as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::DELETE, &format!("/folder/{folder_id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, &format!("/folder/{folder_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::DELETE, &format!("/folder/{folder_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forms_popups_and_chat_snapshot() {
    let app = app();
    let token = signup(&app, "builder@example.com").await;

    let (_, folder) = send(&app, Method::POST, "/folder", Some(&token), Some(json!({ "name": "Onboarding" }))).await;
    let folder_id = folder["id"].as_str().unwrap().to_string();

    let (status, form) = send(
        &app,
        Method::POST,
        "/Form",
        Some(&token),
        Some(json!({ "name": "Welcome", "folderId": folder_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let form_id = form["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        "/Form",
        Some(&token),
        Some(json!({ "name": "Welcome", "folderId": folder_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&app, Method::POST, "/Form", Some(&token), Some(json!({ "name": "Loose" }))).await;

    let (_, all) = send(&app, Method::GET, "/Form?folderId=null", Some(&token), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    let (_, filed) = send(&app, Method::GET, &format!("/Form?folderId={folder_id}"), Some(&token), None).await;
    assert_eq!(filed.as_array().unwrap().len(), 1);

    for popup in two_popups().as_array().unwrap() {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/Form/{form_id}/Popup"),
            Some(&token),
            Some(popup.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["popup"], *popup);
    }

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/Form/{form_id}/Popup/2"),
        Some(&token),
        Some(json!({ "content": "Pick one" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Popup content updated successfully");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/Form/{form_id}/Popup/99"),
        Some(&token),
        Some(json!({ "content": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = send(&app, Method::GET, &format!("/Form/{form_id}/Popups"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["popups"][1]["content"], "Pick one");

    // Chats keep their snapshot when the form changes later
    let chat_id = create_chat(&app, listed["popups"].clone()).await;
    let (status, _) = send(&app, Method::DELETE, &format!("/Form/{form_id}/Popup/1"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&app, Method::GET, &format!("/Form/{form_id}/Popups"), Some(&token), None).await;
    assert_eq!(listed["popups"].as_array().unwrap().len(), 1);
    let (_, chat) = send(&app, Method::GET, &format!("/chat/{chat_id}"), None, None).await;
    assert_eq!(chat["popups"].as_array().unwrap().len(), 2);

    let (status, renamed) = send(
        &app,
        Method::PUT,
        &format!("/Form/{form_id}"),
        Some(&token),
        Some(json!({ "name": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Hello");

    let (status, _) = send(&app, Method::DELETE, &format!("/Form/{form_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/Form/{form_id}/Popups"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forms_are_owner_only() {
    let app = app();
    let owner = signup(&app, "a@example.com").await;
    let intruder = signup(&app, "b@example.com").await;

    let (_, form) = send(&app, Method::POST, "/Form", Some(&owner), Some(json!({ "name": "Private" }))).await;
    let form_id = form["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::DELETE, &format!("/Form/{form_id}"), Some(&intruder), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, "/Form/xyz", Some(&owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_form_folder_can_be_cleared() {
    let app = app();
    let token = signup(&app, "mover@example.com").await;

    let (_, folder) = send(&app, Method::POST, "/folder", Some(&token), Some(json!({ "name": "Drafts" }))).await;
    let folder_id = folder["id"].as_str().unwrap().to_string();
    let (_, form) = send(
        &app,
        Method::POST,
        "/Form",
        Some(&token),
        Some(json!({ "name": "Survey", "folderId": folder_id })),
    )
    .await;
    let form_id = form["id"].as_str().unwrap().to_string();
    let uri = format!("/Form/{form_id}");

    // Leaving folderId out keeps the folder
    let (status, body) = send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "name": "Survey 2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folderId"], folder_id.as_str());

    let (status, body) = send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "folderId": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["folderId"].is_null());
    assert_eq!(body["name"], "Survey 2");

    let (_, filed) = send(&app, Method::GET, &format!("/Form?folderId={folder_id}"), Some(&token), None).await;
    assert!(filed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_form_rename_cannot_clash() {
    let app = app();
    let token = signup(&app, "namer@example.com").await;

    send(&app, Method::POST, "/Form", Some(&token), Some(json!({ "name": "Taken" }))).await;
    let (_, form) = send(&app, Method::POST, "/Form", Some(&token), Some(json!({ "name": "Free" }))).await;
    let form_id = form["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/Form/{form_id}"),
        Some(&token),
        Some(json!({ "name": "Taken" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A form with this name already exists in the selected folder");

    // Another account may reuse the name
    let other = signup(&app, "other@example.com").await;
    let (status, _) = send(&app, Method::POST, "/Form", Some(&other), Some(json!({ "name": "Taken" }))).await;
    assert_eq!(status, StatusCode::CREATED);
}
