use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use super::{
    collect_ids, exists, like_pattern, missing_user, not_found, parse_datetime, parse_optional_datetime, toggle_membership, ts,
    Store, StoreError, StoreResult,
};
use crate::models::{Engagement, Location, Post, Shares, Toggle};

/// Which posts a listing returns. Results are always newest first.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub include_archived: bool,
    pub author_id: Option<String>,
    /// Posts by this user or anyone they follow.
    pub feed_of: Option<String>,
    /// Case-insensitive substring of the caption or any tag.
    pub text: Option<String>,
    pub saved_by: Option<String>,
    pub liked_by: Option<String>,
}

impl PostFilter {
    /// Every non-archived post.
    pub fn timeline() -> Self {
        Self::default()
    }

    pub fn by_author(author_id: &str) -> Self {
        Self {
            author_id: Some(author_id.to_string()),
            ..Self::default()
        }
    }

    pub fn feed_of(user_id: &str) -> Self {
        Self {
            feed_of: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn saved_by(user_id: &str) -> Self {
        Self {
            saved_by: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn liked_by(user_id: &str) -> Self {
        Self {
            liked_by: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matching(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values = Vec::new();

        if !self.include_archived {
            conditions.push("p.is_archived = 0");
        }
        if let Some(author_id) = &self.author_id {
            conditions.push("p.author_id = ?");
            values.push(Value::Text(author_id.clone()));
        }
        if let Some(user_id) = &self.feed_of {
            conditions.push("(p.author_id = ? OR p.author_id IN (SELECT following_id FROM follows WHERE follower_id = ?))");
            values.push(Value::Text(user_id.clone()));
            values.push(Value::Text(user_id.clone()));
        }
        if let Some(text) = &self.text {
            conditions.push(
                r"(fold(p.caption) LIKE ? ESCAPE '\' OR EXISTS (SELECT 1 FROM post_tags t WHERE t.post_id = p.id AND fold(t.tag) LIKE ? ESCAPE '\'))",
            );
            let pattern = like_pattern(text);
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(user_id) = &self.saved_by {
            conditions.push("EXISTS (SELECT 1 FROM post_saves s WHERE s.post_id = p.id AND s.user_id = ?)");
            values.push(Value::Text(user_id.clone()));
        }
        if let Some(user_id) = &self.liked_by {
            conditions.push("EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?)");
            values.push(Value::Text(user_id.clone()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

impl Store {
    // ==================== Post Operations ====================

    pub fn create_post(&self, post: &mut Post) -> StoreResult<()> {
        let mut conn = self.lock()?;
        post.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        post.created_at = now;
        post.updated_at = now;

        let location = encode_location(&post.location)?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"INSERT INTO posts (id, author_id, image, caption, location, share_count, view_count,
                impressions, reach, is_edited, edited_at, is_archived, is_private, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, 0, 0, NULL, ?6, ?7, ?8, ?9)"#,
            params![
                &post.id,
                &post.author_id,
                &post.image,
                &post.caption,
                location,
                post.is_archived,
                post.is_private,
                ts(&post.created_at),
                ts(&post.updated_at),
            ],
        )
        .map_err(missing_user)?;
        write_tags(&tx, &post.id, &post.tags)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.lock()?;
        load_post(&conn, id)
    }

    pub fn post_exists(&self, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        exists(&conn, "posts", id)
    }

    /// Writes the mutable post columns and replaces the tag list.
    pub fn update_post(&self, post: &mut Post) -> StoreResult<()> {
        let mut conn = self.lock()?;
        post.updated_at = Utc::now();
        let location = encode_location(&post.location)?;

        let tx = conn.transaction()?;
        let rows = tx.execute(
            r#"UPDATE posts SET caption = ?1, location = ?2, is_edited = ?3, edited_at = ?4,
               is_archived = ?5, is_private = ?6, updated_at = ?7 WHERE id = ?8"#,
            params![
                &post.caption,
                location,
                post.is_edited,
                post.edited_at.as_ref().map(ts),
                post.is_archived,
                post.is_private,
                ts(&post.updated_at),
                &post.id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        tx.execute("DELETE FROM post_tags WHERE post_id = ?1", params![&post.id])?;
        write_tags(&tx, &post.id, &post.tags)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes the post; tags, likes, saves, shares and comments go with it.
    pub fn delete_post(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// One page of posts matching `filter` and the total match count.
    pub fn list_posts(&self, filter: &PostFilter, limit: i64, offset: i64) -> StoreResult<(Vec<Post>, i64)> {
        let conn = self.lock()?;
        let (where_clause, values) = filter.where_clause();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM posts p {}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT p.* FROM posts p {} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut page_values = values;
        page_values.push(Value::Integer(limit));
        page_values.push(Value::Integer(offset));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(page_values.iter()), row_to_post)?;
        let mut posts = Vec::new();
        for row in rows {
            let mut post = row?;
            hydrate_post(&conn, &mut post)?;
            posts.push(post);
        }
        Ok((posts, total))
    }

    // ==================== Interactions ====================

    pub fn toggle_post_like(&self, post_id: &str, user_id: &str) -> StoreResult<Toggle> {
        self.toggle_post_membership("post_likes", post_id, user_id)
    }

    pub fn toggle_post_save(&self, post_id: &str, user_id: &str) -> StoreResult<Toggle> {
        self.toggle_post_membership("post_saves", post_id, user_id)
    }

    fn toggle_post_membership(&self, table: &str, post_id: &str, user_id: &str) -> StoreResult<Toggle> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !exists(&tx, "posts", post_id)? {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        let toggle = toggle_membership(&tx, table, "post_id", post_id, user_id)?;
        tx.commit()?;
        Ok(toggle)
    }

    /// Counts a share. The counter grows on every call while the sharer is
    /// recorded only once.
    pub fn record_share(&self, post_id: &str, user_id: &str) -> StoreResult<Shares> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "UPDATE posts SET share_count = share_count + 1 WHERE id = ?1",
            params![post_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        tx.execute(
            "INSERT OR IGNORE INTO post_shares (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, ts(&Utc::now())],
        )
        .map_err(missing_user)?;
        let count: i64 = tx.query_row(
            "SELECT share_count FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        let shared_by = collect_ids(
            &tx,
            "SELECT user_id FROM post_shares WHERE post_id = ?1 ORDER BY rowid",
            post_id,
        )?;
        tx.commit()?;
        Ok(Shares { count, shared_by })
    }

    /// Bumps the view and impression counters, returning the new view count.
    pub fn record_view(&self, post_id: &str) -> StoreResult<i64> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE posts SET view_count = view_count + 1, impressions = impressions + 1 WHERE id = ?1",
            params![post_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        let views: i64 = conn.query_row(
            "SELECT view_count FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(views)
    }
}

fn load_post(conn: &Connection, id: &str) -> StoreResult<Post> {
    let mut post = conn
        .query_row("SELECT p.* FROM posts p WHERE p.id = ?1", params![id], row_to_post)
        .map_err(not_found("Post".to_string()))?;
    hydrate_post(conn, &mut post)?;
    Ok(post)
}

/// Fills the relation views from their tables.
fn hydrate_post(conn: &Connection, post: &mut Post) -> StoreResult<()> {
    post.tags = collect_ids(
        conn,
        "SELECT tag FROM post_tags WHERE post_id = ?1 ORDER BY position",
        &post.id,
    )?;
    post.likes = collect_ids(
        conn,
        "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY rowid",
        &post.id,
    )?;
    post.saves = collect_ids(
        conn,
        "SELECT user_id FROM post_saves WHERE post_id = ?1 ORDER BY rowid",
        &post.id,
    )?;
    post.shares.shared_by = collect_ids(
        conn,
        "SELECT user_id FROM post_shares WHERE post_id = ?1 ORDER BY rowid",
        &post.id,
    )?;
    post.comments = collect_ids(
        conn,
        "SELECT id FROM comments WHERE post_id = ?1 ORDER BY created_at, rowid",
        &post.id,
    )?;
    Ok(())
}

fn write_tags(conn: &Connection, post_id: &str, tags: &[String]) -> StoreResult<()> {
    let mut stmt = conn.prepare("INSERT INTO post_tags (post_id, position, tag) VALUES (?1, ?2, ?3)")?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![post_id, position as i64, tag])?;
    }
    Ok(())
}

fn encode_location(location: &Option<Location>) -> StoreResult<Option<String>> {
    match location {
        Some(l) => Ok(Some(serde_json::to_string(l)?)),
        None => Ok(None),
    }
}

fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    let location = match row.get::<_, Option<String>>("location")? {
        Some(raw) => Some(serde_json::from_str::<Location>(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(Post {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        image: row.get("image")?,
        caption: row.get("caption")?,
        location,
        tags: Vec::new(),
        likes: Vec::new(),
        shares: Shares {
            count: row.get("share_count")?,
            shared_by: Vec::new(),
        },
        comments: Vec::new(),
        saves: Vec::new(),
        is_edited: row.get("is_edited")?,
        edited_at: parse_optional_datetime(row.get("edited_at")?),
        is_archived: row.get("is_archived")?,
        is_private: row.get("is_private")?,
        view_count: row.get("view_count")?,
        engagement: Engagement {
            impressions: row.get("impressions")?,
            reach: row.get("reach")?,
        },
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}
