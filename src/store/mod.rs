use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::models::Toggle;

mod comments;
mod posts;
mod users;

pub use posts::PostFilter;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store holding users, posts and comments.
///
/// Every relation (follows, likes, saves, shares) is stored exactly once and
/// both sides of it are read from the same rows, so there is no mirrored
/// state to drift. Mutations touching more than one row run in a single
/// transaction while the connection lock is held.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        register_functions(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                bio TEXT NOT NULL DEFAULT '',
                profile_picture TEXT NOT NULL DEFAULT '',
                cover_photo TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                website TEXT NOT NULL DEFAULT '',
                is_verified INTEGER NOT NULL DEFAULT 0,
                is_private INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                following_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id),
                CHECK (follower_id <> following_id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                image TEXT NOT NULL,
                caption TEXT NOT NULL,
                location TEXT,
                share_count INTEGER NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                impressions INTEGER NOT NULL DEFAULT 0,
                reach INTEGER NOT NULL DEFAULT 0,
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                is_archived INTEGER NOT NULL DEFAULT 0,
                is_private INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_tags (
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (post_id, position)
            );

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS post_saves (
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS post_shares (
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comment_likes (
                comment_id TEXT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (comment_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS comment_replies (
                id TEXT PRIMARY KEY,
                comment_id TEXT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reply_likes (
                reply_id TEXT NOT NULL REFERENCES comment_replies(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (reply_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);
            CREATE INDEX IF NOT EXISTS idx_posts_author_created ON posts(author_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag ON post_tags(tag);
            CREATE INDEX IF NOT EXISTS idx_post_likes_user ON post_likes(user_id);
            CREATE INDEX IF NOT EXISTS idx_post_saves_user ON post_saves(user_id);
            CREATE INDEX IF NOT EXISTS idx_comments_post_created ON comments(post_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id);
            CREATE INDEX IF NOT EXISTS idx_replies_comment ON comment_replies(comment_id);
            "#,
        )?;
        Ok(())
    }
}

/// Timestamps are stored with fixed precision so text order equals time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(parse_datetime)
}

fn not_found(what: String) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(what),
        _ => StoreError::Database(e),
    }
}

/// Maps a foreign-key failure on an insert keyed by user to NotFound. Callers
/// check the other parent row under the same lock first.
fn missing_user(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return StoreError::NotFound("User".to_string());
        }
    }
    StoreError::Database(e)
}

/// Collects a single text column, in row order.
fn collect_ids(conn: &Connection, sql: &str, key: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn exists(conn: &Connection, table: &str, id: &str) -> StoreResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

/// Flips membership of `user_id` in a (key, user_id) relation table and
/// returns the new state and member count.
fn toggle_membership(
    conn: &Connection,
    table: &str,
    key_column: &str,
    key: &str,
    user_id: &str,
) -> StoreResult<Toggle> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1 AND user_id = ?2", table, key_column),
        params![key, user_id],
    )?;
    if removed == 0 {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, user_id, created_at) VALUES (?1, ?2, ?3)",
                table, key_column
            ),
            params![key, user_id, ts(&Utc::now())],
        )
        .map_err(missing_user)?;
    }
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, key_column),
        params![key],
        |row| row.get(0),
    )?;
    Ok(Toggle {
        active: removed == 0,
        count,
    })
}

/// `fold(text)` lowercases with full Unicode case mapping; SQLite's own
/// `lower()` and `LIKE` only fold ASCII.
fn register_functions(conn: &Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Substring pattern for `fold(column) LIKE ... ESCAPE '\'`.
fn like_pattern(query: &str) -> String {
    let folded = query.to_lowercase();
    let mut escaped = String::with_capacity(folded.len() + 2);
    escaped.push('%');
    for ch in folded.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, Post, Reply, User};

    fn create_user(store: &Store, username: &str) -> User {
        let mut user = User::new(
            username,
            &format!("{}@example.com", username),
            "hash".to_string(),
            username,
        );
        store.create_user(&mut user).unwrap();
        user
    }

    fn create_post(store: &Store, author: &User, caption: &str) -> Post {
        let mut post = Post::new(&author.id, "https://cdn.example.com/p.jpg", caption);
        store.create_post(&mut post).unwrap();
        post
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let user = create_user(&store, "testuser");
        assert!(!user.id.is_empty());

        let retrieved = store.get_user(&user.id).unwrap();
        assert_eq!(retrieved.username, "testuser");
        assert!(retrieved.followers.is_empty());

        let by_email = store.get_user_by_email("testuser@example.com").unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn test_duplicate_username_and_email_conflict() {
        let store = Store::in_memory().unwrap();
        create_user(&store, "jane");

        let mut same_name = User::new("jane", "other@example.com", "hash".to_string(), "Jane");
        assert!(matches!(store.create_user(&mut same_name), Err(StoreError::Conflict(_))));

        let mut same_email = User::new("jane2", "jane@example.com", "hash".to_string(), "Jane");
        assert!(matches!(store.create_user(&mut same_email), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_follow_edges_are_visible_from_both_sides() {
        let store = Store::in_memory().unwrap();
        let a = create_user(&store, "alice");
        let b = create_user(&store, "bob");

        assert!(store.follow(&a.id, &b.id).unwrap());
        assert!(!store.follow(&a.id, &b.id).unwrap());

        let a = store.get_user(&a.id).unwrap();
        let b = store.get_user(&b.id).unwrap();
        assert_eq!(a.following, vec![b.id.clone()]);
        assert_eq!(b.followers, vec![a.id.clone()]);

        assert!(store.unfollow(&a.id, &b.id).unwrap());
        assert!(!store.unfollow(&a.id, &b.id).unwrap());
        assert!(store.get_user(&b.id).unwrap().followers.is_empty());
    }

    #[test]
    fn test_post_hydration_and_owner_posts() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mut post = Post::new(&jane.id, "img.jpg", "Sunset");
        post.tags = vec!["sunset".to_string(), "beach".to_string()];
        store.create_post(&mut post).unwrap();

        let loaded = store.get_post(&post.id).unwrap();
        assert_eq!(loaded.tags, vec!["sunset", "beach"]);
        assert_eq!(store.get_user(&jane.id).unwrap().posts, vec![post.id.clone()]);
    }

    #[test]
    fn test_toggle_like_round_trip() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let post = create_post(&store, &jane, "Sunset");

        let first = store.toggle_post_like(&post.id, &mike.id).unwrap();
        assert_eq!(first, Toggle { active: true, count: 1 });
        assert_eq!(store.get_user(&mike.id).unwrap().liked_posts, vec![post.id.clone()]);

        let second = store.toggle_post_like(&post.id, &mike.id).unwrap();
        assert_eq!(second, Toggle { active: false, count: 0 });
        assert!(store.get_user(&mike.id).unwrap().liked_posts.is_empty());
    }

    #[test]
    fn test_toggle_on_missing_post() {
        let store = Store::in_memory().unwrap();
        let mike = create_user(&store, "mike");
        assert!(matches!(
            store.toggle_post_like("missing", &mike.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_inserts_for_deleted_user_are_not_found() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let post = create_post(&store, &jane, "Sunset");
        store.delete_user(&mike.id).unwrap();

        assert!(matches!(store.follow(&jane.id, &mike.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.follow(&mike.id, &jane.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.toggle_post_like(&post.id, &mike.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.record_share(&post.id, &mike.id), Err(StoreError::NotFound(_))));
        assert_eq!(store.get_post(&post.id).unwrap().shares.count, 0);

        let mut comment = Comment::new(&post.id, &mike.id, "Nice");
        assert!(matches!(store.create_comment(&mut comment), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_share_counts_every_call_but_records_user_once() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let post = create_post(&store, &jane, "Sunset");

        store.record_share(&post.id, &mike.id).unwrap();
        let shares = store.record_share(&post.id, &mike.id).unwrap();
        assert_eq!(shares.count, 2);
        assert_eq!(shares.shared_by, vec![mike.id.clone()]);
    }

    #[test]
    fn test_record_view_increments_counters() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let post = create_post(&store, &jane, "Sunset");

        store.record_view(&post.id).unwrap();
        store.record_view(&post.id).unwrap();
        let loaded = store.get_post(&post.id).unwrap();
        assert_eq!(loaded.view_count, 2);
        assert_eq!(loaded.engagement.impressions, 2);
    }

    #[test]
    fn test_list_posts_newest_first_with_search() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let first = create_post(&store, &jane, "Morning coffee");
        let mut tagged = Post::new(&jane.id, "img.jpg", "Evening");
        tagged.tags = vec!["Coffee_Time".to_string()];
        store.create_post(&mut tagged).unwrap();
        create_post(&store, &jane, "Unrelated");

        let (posts, total) = store
            .list_posts(&PostFilter::timeline().matching("COFFEE"), 10, 0)
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(posts[0].id, tagged.id);
        assert_eq!(posts[1].id, first.id);

        // Underscore is literal, not a wildcard: "Morning coffee" must not match.
        let (_, total) = store
            .list_posts(&PostFilter::timeline().matching("g_c"), 10, 0)
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_delete_post_cascades() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let post = create_post(&store, &jane, "Sunset");
        store.toggle_post_like(&post.id, &mike.id).unwrap();
        let mut comment = Comment::new(&post.id, &mike.id, "Nice");
        store.create_comment(&mut comment).unwrap();

        store.delete_post(&post.id).unwrap();
        assert!(matches!(store.get_post(&post.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_comment(&comment.id), Err(StoreError::NotFound(_))));
        assert!(store.get_user(&jane.id).unwrap().posts.is_empty());
        assert!(store.get_user(&mike.id).unwrap().liked_posts.is_empty());
    }

    #[test]
    fn test_comment_replies_and_likes() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let post = create_post(&store, &jane, "Sunset");
        let mut comment = Comment::new(&post.id, &mike.id, "Nice");
        store.create_comment(&mut comment).unwrap();

        let mut reply = Reply {
            id: String::new(),
            comment_id: comment.id.clone(),
            author_id: jane.id.clone(),
            content: "Thanks".to_string(),
            likes: Vec::new(),
            created_at: Utc::now(),
        };
        store.add_reply(&mut reply).unwrap();
        store.toggle_comment_like(&comment.id, &jane.id).unwrap();
        store.toggle_reply_like(&comment.id, &reply.id, &mike.id).unwrap();

        let loaded = store.get_comment(&comment.id).unwrap();
        assert_eq!(loaded.likes, vec![jane.id.clone()]);
        assert_eq!(loaded.replies.len(), 1);
        assert_eq!(loaded.replies[0].likes, vec![mike.id.clone()]);
        assert_eq!(store.get_post(&post.id).unwrap().comments, vec![comment.id.clone()]);
    }

    #[test]
    fn test_delete_user_cascades() {
        let store = Store::in_memory().unwrap();
        let jane = create_user(&store, "jane");
        let mike = create_user(&store, "mike");
        let jane_post = create_post(&store, &jane, "Sunset");
        let mike_post = create_post(&store, &mike, "Mountains");
        store.follow(&jane.id, &mike.id).unwrap();
        store.follow(&mike.id, &jane.id).unwrap();
        store.toggle_post_like(&mike_post.id, &jane.id).unwrap();
        store.record_share(&mike_post.id, &jane.id).unwrap();
        let mut comment = Comment::new(&mike_post.id, &jane.id, "Wow");
        store.create_comment(&mut comment).unwrap();

        store.delete_user(&jane.id).unwrap();

        assert!(matches!(store.get_user(&jane.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_post(&jane_post.id), Err(StoreError::NotFound(_))));
        let mike = store.get_user(&mike.id).unwrap();
        assert!(mike.followers.is_empty());
        assert!(mike.following.is_empty());
        let mike_post = store.get_post(&mike_post.id).unwrap();
        assert!(mike_post.likes.is_empty());
        assert!(mike_post.comments.is_empty());
        assert!(mike_post.shares.shared_by.is_empty());
        assert_eq!(mike_post.shares.count, 1);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a%b_C"), r"%a\%b\_c%");
        assert_eq!(like_pattern("ÉCOLE"), "%école%");
    }
}
