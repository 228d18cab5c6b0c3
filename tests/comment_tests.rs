use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;

use vistagram::api::{self, AppState};
use vistagram::auth::AuthService;
use vistagram::store::Store;

fn create_app_state() -> web::Data<AppState> {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()).with_bcrypt_cost(4));
    web::Data::new(AppState::new(store, auth_service))
}

macro_rules! test_app {
    () => {
        test::init_service(
            App::new()
                .app_data(create_app_state())
                .configure(api::configure_routes),
        )
        .await
    };
}

macro_rules! register_and_get_token {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "username": $username,
                "email": format!("{}@example.com", $username),
                "password": "password123",
                "fullName": format!("{} Test", $username)
            }))
            .to_request();

        let resp: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        resp["data"]["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! create_post {
    ($app:expr, $token:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(json!({ "image": "img.jpg", "caption": "Sunset" }))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        resp["data"]["post"]["id"].as_str().unwrap().to_string()
    }};
}

macro_rules! add_comment {
    ($app:expr, $token:expr, $post_id:expr, $content:expr) => {{
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{}/comments", $post_id))
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(json!({ "content": $content }))
            .to_request();
        test::call_service(&$app, req).await
    }};
}

// ==================== Comments ====================

#[actix_web::test]
async fn test_add_and_list_comments() {
    let app = test_app!();
    let jane = register_and_get_token!(app, "jane");
    let mike = register_and_get_token!(app, "mike");
    let post_id = create_post!(app, jane);

    let resp = add_comment!(app, mike, post_id, "  Gorgeous  ");
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["comment"]["content"], "Gorgeous");
    assert_eq!(body["data"]["comment"]["author"]["username"], "mike");

    add_comment!(app, jane, post_id, "Thank you!");

    let req = test::TestRequest::get()
        .uri(&format!("/api/posts/{}/comments", post_id))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["total"], 2);
    assert_eq!(resp["data"]["comments"][0]["content"], "Thank you!");
    assert_eq!(resp["data"]["hasMore"], false);

    let req = test::TestRequest::get().uri(&format!("/api/posts/{}", post_id)).to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["post"]["commentCount"], 2);
}

#[actix_web::test]
async fn test_comment_validation_and_missing_post() {
    let app = test_app!();
    let jane = register_and_get_token!(app, "jane");
    let post_id = create_post!(app, jane);

    let resp = add_comment!(app, jane, post_id, "   ");
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Comment must be 1-1000 characters long");

    let resp = add_comment!(app, jane, post_id, "x".repeat(1001));
    assert_eq!(resp.status(), 400);

    let resp = add_comment!(app, jane, "missing", "Hello");
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get().uri("/api/posts/missing/comments").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_edit_and_delete_comment_permissions() {
    let app = test_app!();
    let jane = register_and_get_token!(app, "jane");
    let mike = register_and_get_token!(app, "mike");
    let ana = register_and_get_token!(app, "ana");
    let post_id = create_post!(app, jane);

    let resp = add_comment!(app, mike, post_id, "Nice");
    let body: serde_json::Value = test::read_body_json(resp).await;
    let comment_id = body["data"]["comment"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri(&format!("/api/comments/{}", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", jane)))
        .set_json(json!({ "content": "Edited by owner" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/comments/{}", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", mike)))
        .set_json(json!({ "content": "Very nice" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["comment"]["content"], "Very nice");
    assert_eq!(resp["data"]["comment"]["isEdited"], true);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/comments/{}", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", ana)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // Post owner may remove comments on their post
    let req = test::TestRequest::delete()
        .uri(&format!("/api/comments/{}", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", jane)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri(&format!("/api/posts/{}/comments", post_id))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["total"], 0);
}

// ==================== Likes & Replies ====================

#[actix_web::test]
async fn test_comment_like_and_reply_thread() {
    let app = test_app!();
    let jane = register_and_get_token!(app, "jane");
    let mike = register_and_get_token!(app, "mike");
    let post_id = create_post!(app, jane);

    let resp = add_comment!(app, mike, post_id, "Nice");
    let body: serde_json::Value = test::read_body_json(resp).await;
    let comment_id = body["data"]["comment"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/comments/{}/like", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", jane)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["liked"], true);
    assert_eq!(resp["data"]["likeCount"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/comments/{}/replies", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", jane)))
        .set_json(json!({ "content": "Thanks!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["comment"]["replyCount"], 1);
    assert_eq!(body["data"]["comment"]["isLiked"], true);
    let reply_id = body["data"]["comment"]["replies"][0]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/comments/{}/replies/{}/like", comment_id, reply_id))
        .insert_header(("Authorization", format!("Bearer {}", mike)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["likeCount"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/comments/{}/replies", comment_id))
        .insert_header(("Authorization", format!("Bearer {}", mike)))
        .set_json(json!({ "content": "x".repeat(501) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // The comment author may remove replies in their thread
    let req = test::TestRequest::delete()
        .uri(&format!("/api/comments/{}/replies/{}", comment_id, reply_id))
        .insert_header(("Authorization", format!("Bearer {}", mike)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/comments/{}/replies/{}", comment_id, reply_id))
        .insert_header(("Authorization", format!("Bearer {}", mike)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
