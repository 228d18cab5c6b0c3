use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{collect_ids, like_pattern, missing_user, not_found, parse_datetime, ts, Store, StoreError, StoreResult};
use crate::models::{User, UserSummary};

/// Columns for a `UserSummary`, with the follower count computed from the
/// follow table. Expects the users table aliased as `u`.
const SUMMARY_COLUMNS: &str = "u.id, u.username, u.full_name, u.profile_picture, u.bio, u.is_verified, \
     (SELECT COUNT(*) FROM follows fc WHERE fc.following_id = u.id) AS follower_count";

impl Store {
    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.lock()?;
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, email, password_hash, full_name, bio,
                profile_picture, cover_photo, location, website, is_verified, is_private,
                created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.full_name,
                &user.bio,
                &user.profile_picture,
                &user.cover_photo,
                &user.location,
                &user.website,
                user.is_verified,
                user.is_private,
                ts(&user.created_at),
                ts(&user.updated_at),
            ],
        )
        .map_err(unique_violation)?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.lock()?;
        load_user(&conn, "id", id)
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.lock()?;
        load_user(&conn, "username", username)
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.lock()?;
        load_user(&conn, "email", email)
    }

    pub fn user_exists(&self, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        super::exists(&conn, "users", id)
    }

    /// Persists the editable profile columns.
    pub fn update_user_profile(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.lock()?;
        user.updated_at = Utc::now();
        let rows = conn.execute(
            r#"UPDATE users SET full_name = ?1, bio = ?2, profile_picture = ?3, cover_photo = ?4,
               location = ?5, website = ?6, is_private = ?7, updated_at = ?8 WHERE id = ?9"#,
            params![
                &user.full_name,
                &user.bio,
                &user.profile_picture,
                &user.cover_photo,
                &user.location,
                &user.website,
                user.is_private,
                ts(&user.updated_at),
                &user.id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }
        Ok(())
    }

    pub fn update_password_hash(&self, user_id: &str, password_hash: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, ts(&Utc::now()), user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }
        Ok(())
    }

    /// Removes a user and everything hanging off it: follow edges both ways,
    /// likes/saves/share memberships, comments, replies and owned posts.
    /// Share counters already accumulated on other users' posts are kept.
    pub fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_user_summary(&self, id: &str) -> StoreResult<UserSummary> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", SUMMARY_COLUMNS);
        conn.query_row(&sql, params![id], row_to_summary)
            .map_err(not_found("User".to_string()))
    }

    /// Summaries for the given ids, in the same order. Unknown ids are skipped.
    pub fn user_summaries(&self, ids: &[String]) -> StoreResult<Vec<UserSummary>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", SUMMARY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            match stmt.query_row(params![id], row_to_summary) {
                Ok(summary) => summaries.push(summary),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(summaries)
    }

    // ==================== Follow Graph ====================

    /// Records that `follower_id` follows `following_id`. Returns false when
    /// the edge already existed.
    pub fn follow(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
            params![follower_id, following_id, ts(&Utc::now())],
        )
        .map_err(missing_user)?;
        Ok(rows > 0)
    }

    /// Removes the edge. Returns false when there was nothing to remove.
    pub fn unfollow(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
        )?;
        Ok(rows > 0)
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2)",
            params![follower_id, following_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Users following `user_id`, oldest edge first.
    pub fn list_followers(&self, user_id: &str, limit: i64, offset: i64) -> StoreResult<(Vec<UserSummary>, i64)> {
        let conn = self.lock()?;
        list_edges(&conn, "follower_id", "following_id", user_id, limit, offset)
    }

    /// Users `user_id` follows, oldest edge first.
    pub fn list_following(&self, user_id: &str, limit: i64, offset: i64) -> StoreResult<(Vec<UserSummary>, i64)> {
        let conn = self.lock()?;
        list_edges(&conn, "following_id", "follower_id", user_id, limit, offset)
    }

    /// Users that `user_id` does not follow yet (excluding itself), most
    /// followed first, then newest accounts first.
    pub fn suggest_users(&self, user_id: &str, limit: i64) -> StoreResult<Vec<UserSummary>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"SELECT {} FROM users u
               WHERE u.id <> ?1
                 AND u.id NOT IN (SELECT following_id FROM follows WHERE follower_id = ?1)
               ORDER BY follower_count DESC, u.created_at DESC, u.rowid DESC
               LIMIT ?2"#,
            SUMMARY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit], row_to_summary)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Case-insensitive substring match on username or full name, most
    /// followed first, then by username.
    pub fn search_users(&self, query: &str, limit: i64, offset: i64) -> StoreResult<(Vec<UserSummary>, i64)> {
        let conn = self.lock()?;
        let pattern = like_pattern(query);
        let condition = r"(fold(u.username) LIKE ?1 ESCAPE '\' OR fold(u.full_name) LIKE ?1 ESCAPE '\')";

        let sql = format!(
            "SELECT {} FROM users u WHERE {} ORDER BY follower_count DESC, u.username ASC LIMIT ?2 OFFSET ?3",
            SUMMARY_COLUMNS, condition
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![&pattern, limit, offset], row_to_summary)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users u WHERE {}", condition),
            params![&pattern],
            |row| row.get(0),
        )?;
        Ok((users, total))
    }
}

fn load_user(conn: &Connection, column: &str, value: &str) -> StoreResult<User> {
    let sql = format!("SELECT * FROM users WHERE {} = ?1", column);
    let mut user = conn
        .query_row(&sql, params![value], row_to_user)
        .map_err(not_found("User".to_string()))?;

    user.following = collect_ids(
        conn,
        "SELECT following_id FROM follows WHERE follower_id = ?1 ORDER BY rowid",
        &user.id,
    )?;
    user.followers = collect_ids(
        conn,
        "SELECT follower_id FROM follows WHERE following_id = ?1 ORDER BY rowid",
        &user.id,
    )?;
    user.posts = collect_ids(
        conn,
        "SELECT id FROM posts WHERE author_id = ?1 ORDER BY created_at, rowid",
        &user.id,
    )?;
    user.liked_posts = collect_ids(
        conn,
        "SELECT post_id FROM post_likes WHERE user_id = ?1 ORDER BY rowid",
        &user.id,
    )?;
    Ok(user)
}

/// One side of the follow table joined to user summaries. `select_column`
/// names the side returned, `key_column` the side matched against `user_id`.
fn list_edges(
    conn: &Connection,
    select_column: &str,
    key_column: &str,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> StoreResult<(Vec<UserSummary>, i64)> {
    let sql = format!(
        r#"SELECT {} FROM follows fl JOIN users u ON u.id = fl.{}
           WHERE fl.{} = ?1 ORDER BY fl.rowid LIMIT ?2 OFFSET ?3"#,
        SUMMARY_COLUMNS, select_column, key_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, limit, offset], row_to_summary)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM follows WHERE {} = ?1", key_column),
        params![user_id],
        |row| row.get(0),
    )?;
    Ok((users, total))
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        full_name: row.get("full_name")?,
        bio: row.get("bio")?,
        profile_picture: row.get("profile_picture")?,
        cover_photo: row.get("cover_photo")?,
        location: row.get("location")?,
        website: row.get("website")?,
        followers: Vec::new(),
        following: Vec::new(),
        posts: Vec::new(),
        liked_posts: Vec::new(),
        is_verified: row.get("is_verified")?,
        is_private: row.get("is_private")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get("id")?,
        username: row.get("username")?,
        full_name: row.get("full_name")?,
        profile_picture: row.get("profile_picture")?,
        bio: row.get("bio")?,
        is_verified: row.get("is_verified")?,
        follower_count: row.get("follower_count")?,
        is_following: None,
    })
}

/// Maps UNIQUE violations on users to a readable conflict.
fn unique_violation(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("users.username") {
                return StoreError::Conflict("Username already taken".to_string());
            }
            if msg.contains("users.email") {
                return StoreError::Conflict("Email already registered".to_string());
            }
        }
    }
    StoreError::Database(e)
}
