use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::auth::{AuthService, AuthUser, MaybeAuthUser};
use crate::error::AppError;
use crate::feed::{FeedService, DEFAULT_POST_LIMIT};
use crate::graph::{SocialGraph, DEFAULT_SUGGESTIONS};
use crate::interactions::{InteractionService, DEFAULT_COMMENT_LIMIT};
use crate::models::*;
use crate::store::Store;
use crate::validation::ValidationErrors;

const DEFAULT_USER_LIMIT: i64 = 20;

pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub accounts: AccountService,
    pub graph: SocialGraph,
    pub interactions: InteractionService,
    pub feed: FeedService,
}

impl AppState {
    pub fn new(store: Arc<Store>, auth_service: Arc<AuthService>) -> Self {
        Self {
            accounts: AccountService::new(store.clone(), auth_service.clone()),
            graph: SocialGraph::new(store.clone()),
            interactions: InteractionService::new(store.clone()),
            feed: FeedService::new(store),
            auth_service,
        }
    }
}

type HandlerResult = Result<HttpResponse, AppError>;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Listing payload: `{<key>: [...], total, page, limit, hasMore}`.
fn page_json<T: Serialize>(key: &str, page: Paginated<T>) -> Result<Value, AppError> {
    let has_more = page.has_more();
    let items = serde_json::to_value(&page.items).map_err(|e| AppError::Internal(e.to_string()))?;

    let mut body = Map::new();
    body.insert(key.to_string(), items);
    body.insert("total".to_string(), json!(page.total));
    body.insert("page".to_string(), json!(page.page));
    body.insert("limit".to_string(), json!(page.limit));
    body.insert("hasMore".to_string(), json!(has_more));
    Ok(Value::Object(body))
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(state: web::Data<AppState>, body: web::Json<RegisterRequest>) -> HandlerResult {
    let auth = state.accounts.register(&body)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(auth).with_message("User registered successfully")))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> HandlerResult {
    let auth = state.accounts.login(&body)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(auth).with_message("Login successful")))
}

pub async fn get_profile(state: web::Data<AppState>, auth_user: AuthUser) -> HandlerResult {
    let user = state.accounts.get_profile(&auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "user": user }))))
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
) -> HandlerResult {
    let user = state.accounts.update_profile(&auth_user.user_id, &body)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "user": user })).with_message("Profile updated successfully")))
}

pub async fn change_password(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
) -> HandlerResult {
    state.accounts.change_password(&auth_user.user_id, &body)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Password changed successfully")))
}

pub async fn refresh_token(state: web::Data<AppState>, auth_user: AuthUser) -> HandlerResult {
    let token = state.accounts.refresh_token(&auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "token": token }))))
}

pub async fn delete_account(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<DeleteAccountRequest>,
) -> HandlerResult {
    state.accounts.delete_account(&auth_user.user_id, &body.password)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Account deleted successfully")))
}

// ==================== Users ====================

pub async fn get_user_profile(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    path: web::Path<String>,
) -> HandlerResult {
    let profile = state.graph.get_user_profile(&path, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "user": profile }))))
}

pub async fn follow_user(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    state.graph.follow(&auth_user.user_id, &path)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Successfully followed user")))
}

pub async fn unfollow_user(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    state.graph.unfollow(&auth_user.user_id, &path)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Successfully unfollowed user")))
}

pub async fn list_followers(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_USER_LIMIT);
    let followers = state.graph.list_followers(&path, page)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("followers", followers)?)))
}

pub async fn list_following(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_USER_LIMIT);
    let following = state.graph.list_following(&path, page)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("following", following)?)))
}

pub async fn suggested_users(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<LimitQuery>,
) -> HandlerResult {
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_PAGE_LIMIT);
    let users = state.graph.suggest_users(&auth_user.user_id, limit)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "users": users }))))
}

pub async fn search_users(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    query: web::Query<SearchQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_USER_LIMIT);
    let users = state.graph.search_users(query.q.as_deref(), page, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("users", users)?)))
}

pub async fn list_user_posts(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.list_user_posts(&path, page, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

pub async fn saved_posts(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.list_saved_posts(&auth_user.user_id, page)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

pub async fn liked_posts(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.list_liked_posts(&auth_user.user_id, page)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

// ==================== Posts ====================

pub async fn list_posts(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    query: web::Query<PostListQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.list_posts(query.user_id.as_deref(), page, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

pub async fn get_feed(state: web::Data<AppState>, auth_user: AuthUser, query: web::Query<PageQuery>) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.get_feed(&auth_user.user_id, page)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

pub async fn search_posts(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    query: web::Query<SearchQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_POST_LIMIT);
    let posts = state.feed.search_posts(query.q.as_deref(), page, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("posts", posts)?)))
}

pub async fn create_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreatePostRequest>,
) -> HandlerResult {
    let post = state.feed.create_post(&auth_user.user_id, &body)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(json!({ "post": post })).with_message("Post created successfully")))
}

pub async fn get_post(state: web::Data<AppState>, viewer: MaybeAuthUser, path: web::Path<String>) -> HandlerResult {
    let post = state.feed.get_post_by_id(&path, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "post": post }))))
}

pub async fn update_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdatePostRequest>,
) -> HandlerResult {
    let post = state.feed.update_post(&path, &auth_user.user_id, &body)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "post": post })).with_message("Post updated successfully")))
}

pub async fn delete_post(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    state.feed.delete_post(&path, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Post deleted successfully")))
}

pub async fn like_post(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    let toggle = state.interactions.toggle_like(&path, &auth_user.user_id)?;
    let message = if toggle.active { "Post liked" } else { "Post unliked" };
    Ok(HttpResponse::Ok().json(
        ApiResponse::success(json!({ "liked": toggle.active, "likeCount": toggle.count })).with_message(message),
    ))
}

pub async fn save_post(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    let toggle = state.interactions.toggle_save(&path, &auth_user.user_id)?;
    let message = if toggle.active { "Post saved" } else { "Post unsaved" };
    Ok(HttpResponse::Ok().json(
        ApiResponse::success(json!({ "saved": toggle.active, "saveCount": toggle.count })).with_message(message),
    ))
}

pub async fn share_post(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    let shares = state.interactions.increment_share(&path, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(
        ApiResponse::success(json!({ "shareCount": shares.count, "sharedBy": shares.shared_by }))
            .with_message("Post shared successfully"),
    ))
}

pub async fn list_comments(
    state: web::Data<AppState>,
    viewer: MaybeAuthUser,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_COMMENT_LIMIT);
    let comments = state.interactions.list_comments(&path, page, viewer.user_id())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page_json("comments", comments)?)))
}

pub async fn add_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> HandlerResult {
    let comment = state.interactions.add_comment(&path, &auth_user.user_id, &body.content)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(json!({ "comment": comment })).with_message("Comment added successfully")))
}

// ==================== Comments ====================

pub async fn like_comment(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    let toggle = state.interactions.toggle_comment_like(&path, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "liked": toggle.active, "likeCount": toggle.count }))))
}

pub async fn edit_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> HandlerResult {
    let comment = state.interactions.edit_comment(&path, &auth_user.user_id, &body.content)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "comment": comment })).with_message("Comment updated successfully")))
}

pub async fn remove_comment(state: web::Data<AppState>, auth_user: AuthUser, path: web::Path<String>) -> HandlerResult {
    state.interactions.remove_comment(&path, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Comment deleted successfully")))
}

pub async fn add_reply(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ContentRequest>,
) -> HandlerResult {
    let comment = state.interactions.add_reply(&path, &auth_user.user_id, &body.content)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(json!({ "comment": comment })).with_message("Reply added successfully")))
}

pub async fn like_reply(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> HandlerResult {
    let (comment_id, reply_id) = path.into_inner();
    let toggle = state.interactions.toggle_reply_like(&comment_id, &reply_id, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "liked": toggle.active, "likeCount": toggle.count }))))
}

pub async fn remove_reply(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> HandlerResult {
    let (comment_id, reply_id) = path.into_inner();
    state.interactions.remove_reply(&comment_id, &reply_id, &auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::ok("Reply deleted successfully")))
}

// ==================== Route Configuration ====================

fn bad_request(field: &str, code: &str, message: String) -> actix_web::Error {
    AppError::Validation(ValidationErrors::single(field, code, message)).into()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        bad_request("body", "invalid_body", format!("Invalid request body: {}", err))
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        bad_request("query", "invalid_query", format!("Invalid query string: {}", err))
    }));

    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Auth
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/profile", web::get().to(get_profile))
        .route("/api/auth/profile", web::put().to(update_profile))
        .route("/api/auth/password", web::put().to(change_password))
        .route("/api/auth/refresh", web::post().to(refresh_token))
        .route("/api/auth/account", web::delete().to(delete_account))

        // Users (fixed segments before parameterized ones)
        .route("/api/users/profile/{username}", web::get().to(get_user_profile))
        .route("/api/users/suggested", web::get().to(suggested_users))
        .route("/api/users/saved", web::get().to(saved_posts))
        .route("/api/users/liked", web::get().to(liked_posts))
        .route("/api/users/search", web::get().to(search_users))
        .route("/api/users/{user_id}/follow", web::post().to(follow_user))
        .route("/api/users/{user_id}/follow", web::delete().to(unfollow_user))
        .route("/api/users/{username}/followers", web::get().to(list_followers))
        .route("/api/users/{username}/following", web::get().to(list_following))
        .route("/api/users/{username}/posts", web::get().to(list_user_posts))

        // Posts
        .route("/api/posts", web::get().to(list_posts))
        .route("/api/posts", web::post().to(create_post))
        .route("/api/posts/feed", web::get().to(get_feed))
        .route("/api/posts/search", web::get().to(search_posts))
        .route("/api/posts/{id}", web::get().to(get_post))
        .route("/api/posts/{id}", web::put().to(update_post))
        .route("/api/posts/{id}", web::delete().to(delete_post))
        .route("/api/posts/{id}/like", web::post().to(like_post))
        .route("/api/posts/{id}/save", web::post().to(save_post))
        .route("/api/posts/{id}/share", web::post().to(share_post))
        .route("/api/posts/{id}/comments", web::get().to(list_comments))
        .route("/api/posts/{id}/comments", web::post().to(add_comment))

        // Comments
        .route("/api/comments/{id}/like", web::post().to(like_comment))
        .route("/api/comments/{id}", web::put().to(edit_comment))
        .route("/api/comments/{id}", web::delete().to(remove_comment))
        .route("/api/comments/{id}/replies", web::post().to(add_reply))
        .route("/api/comments/{id}/replies/{reply_id}/like", web::post().to(like_reply))
        .route("/api/comments/{id}/replies/{reply_id}", web::delete().to(remove_reply));
}
