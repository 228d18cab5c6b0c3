use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationIssue;

/// User is a registered account.
///
/// `followers`, `following`, `posts` and `liked_posts` are read views over
/// the follow, post and like tables; they are filled in by the store on load
/// and never written back directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub bio: String,
    pub profile_picture: String,
    pub cover_photo: String,
    pub location: String,
    pub website: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub posts: Vec<String>,
    pub liked_posts: Vec<String>,
    pub is_verified: bool,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A blank user ready for `Store::create_user`.
    pub fn new(username: &str, email: &str, password_hash: String, full_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            full_name: full_name.to_string(),
            bio: String::new(),
            profile_picture: String::new(),
            cover_photo: String::new(),
            location: String::new(),
            website: String::new(),
            followers: Vec::new(),
            following: Vec::new(),
            posts: Vec::new(),
            liked_posts: Vec::new(),
            is_verified: false,
            is_private: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn follower_count(&self) -> usize {
        self.followers.len()
    }

    pub fn following_count(&self) -> usize {
        self.following.len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            profile_picture: self.profile_picture.clone(),
            bio: self.bio.clone(),
            is_verified: self.is_verified,
            follower_count: self.follower_count() as i64,
            is_following: None,
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            bio: self.bio.clone(),
            profile_picture: self.profile_picture.clone(),
            cover_photo: self.cover_photo.clone(),
            location: self.location.clone(),
            website: self.website.clone(),
            follower_count: self.follower_count(),
            following_count: self.following_count(),
            post_count: self.post_count(),
            is_verified: self.is_verified,
            is_private: self.is_private,
            created_at: self.created_at,
        }
    }
}

/// Compact user card used in lists (followers, search, suggestions, authors).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub profile_picture: String,
    pub bio: String,
    pub is_verified: bool,
    pub follower_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub profile_picture: String,
    pub cover_photo: String,
    pub location: String,
    pub website: String,
    pub follower_count: usize,
    pub following_count: usize,
    pub post_count: usize,
    pub is_verified: bool,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// GeoJSON point, coordinates are `[longitude, latitude]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "default_point_type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn default_point_type() -> String {
    "Point".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Shares {
    pub count: i64,
    pub shared_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Engagement {
    pub impressions: i64,
    pub reach: i64,
}

/// Post is an image with a caption, owned by its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub image: String,
    pub caption: String,
    pub location: Option<Location>,
    pub tags: Vec<String>,
    pub likes: Vec<String>,
    pub shares: Shares,
    pub comments: Vec<String>,
    pub saves: Vec<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub is_private: bool,
    pub view_count: i64,
    pub engagement: Engagement,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author_id: &str, image: &str, caption: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            author_id: author_id.to_string(),
            image: image.to_string(),
            caption: caption.to_string(),
            location: None,
            tags: Vec::new(),
            likes: Vec::new(),
            shares: Shares::default(),
            comments: Vec::new(),
            saves: Vec::new(),
            is_edited: false,
            edited_at: None,
            is_archived: false,
            is_private: false,
            view_count: 0,
            engagement: Engagement::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    pub fn is_saved_by(&self, user_id: &str) -> bool {
        self.saves.iter().any(|id| id == user_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn save_count(&self) -> usize {
        self.saves.len()
    }

    pub fn share_count(&self) -> i64 {
        self.shares.count
    }
}

/// Reply is a single-level answer to a Comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub comment_id: String,
    pub author_id: String,
    pub content: String,
    pub likes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Comment belongs to a Post and is removed with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub likes: Vec<String>,
    pub replies: Vec<Reply>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: &str, author_id: &str, content: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            likes: Vec::new(),
            replies: Vec::new(),
            is_edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    pub fn reply(&self, reply_id: &str) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == reply_id)
    }
}

// ==================== Views ====================

/// Post as returned to clients: derived counters, expanded author and the
/// viewer's interaction flags (omitted for anonymous requests).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author: UserSummary,
    pub image: String,
    pub caption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub tags: Vec<String>,
    pub like_count: usize,
    pub comment_count: usize,
    pub save_count: usize,
    pub share_count: i64,
    pub view_count: i64,
    pub engagement: Engagement,
    pub is_edited: bool,
    pub is_archived: bool,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_saved: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    pub fn new(post: &Post, author: UserSummary, viewer_id: Option<&str>) -> Self {
        Self {
            id: post.id.clone(),
            author,
            image: post.image.clone(),
            caption: post.caption.clone(),
            location: post.location.clone(),
            tags: post.tags.clone(),
            like_count: post.like_count(),
            comment_count: post.comment_count(),
            save_count: post.save_count(),
            share_count: post.share_count(),
            view_count: post.view_count,
            engagement: post.engagement.clone(),
            is_edited: post.is_edited,
            is_archived: post.is_archived,
            is_private: post.is_private,
            is_liked: viewer_id.map(|v| post.is_liked_by(v)),
            is_saved: viewer_id.map(|v| post.is_saved_by(v)),
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Single-post payload: the post plus its comment threads and likers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentView>,
    pub liked_by: Vec<UserSummary>,
}

/// Someone's profile page as seen by `viewer`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileView {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub posts: Vec<PostView>,
    pub followers: Vec<UserSummary>,
    pub following: Vec<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    pub is_own_profile: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: String,
    pub author: UserSummary,
    pub content: String,
    pub like_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author: UserSummary,
    pub content: String,
    pub like_count: usize,
    pub reply_count: usize,
    pub replies: Vec<ReplyView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of a membership toggle (like/save).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub active: bool,
    pub count: i64,
}

/// One page of a listing plus the numbers clients need to fetch the next.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Paginated<T> {
    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.limit) < self.total
    }
}

/// Normalized `page`/`limit` pair. `page` is 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

pub const MAX_PAGE_LIMIT: i64 = 100;

/// Highest page whose offset still fits in an i64 at the largest limit.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_LIMIT;

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: i64) -> Paginated<T> {
        Paginated {
            items,
            total,
            page: self.page,
            limit: self.limit,
        }
    }
}

// ==================== Requests ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// `location` is a JSON document and `tags` a comma-separated list, both as
/// strings, matching what the upload form sends.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub caption: String,
    pub location: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub caption: Option<String>,
    pub location: Option<String>,
    pub tags: Option<String>,
    pub is_archived: Option<bool>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub content: String,
}

// ==================== Responses ====================

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicProfile,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationIssue>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(msg.into()),
            errors: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(msg.into()),
            errors: None,
        }
    }
}
