use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{collect_ids, exists, missing_user, not_found, parse_datetime, parse_optional_datetime, toggle_membership, ts};
use super::{Store, StoreError, StoreResult};
use crate::models::{Comment, Reply, Toggle};

impl Store {
    // ==================== Comment Operations ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.lock()?;
        if !exists(&conn, "posts", &comment.post_id)? {
            return Err(StoreError::NotFound("Post".to_string()));
        }
        comment.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        comment.created_at = now;
        comment.updated_at = now;

        conn.execute(
            r#"INSERT INTO comments (id, post_id, author_id, content, is_edited, edited_at, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?6)"#,
            params![
                &comment.id,
                &comment.post_id,
                &comment.author_id,
                &comment.content,
                ts(&comment.created_at),
                ts(&comment.updated_at),
            ],
        )
        .map_err(missing_user)?;
        Ok(())
    }

    pub fn get_comment(&self, id: &str) -> StoreResult<Comment> {
        let conn = self.lock()?;
        let mut comment = conn
            .query_row("SELECT * FROM comments WHERE id = ?1", params![id], row_to_comment)
            .map_err(not_found("Comment".to_string()))?;
        hydrate_comment(&conn, &mut comment)?;
        Ok(comment)
    }

    /// Comments on a post, newest first.
    pub fn list_comments(&self, post_id: &str, limit: i64, offset: i64) -> StoreResult<(Vec<Comment>, i64)> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM comments WHERE post_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![post_id, limit, offset], row_to_comment)?;
        let mut comments = Vec::new();
        for row in rows {
            let mut comment = row?;
            hydrate_comment(&conn, &mut comment)?;
            comments.push(comment);
        }

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok((comments, total))
    }

    pub fn update_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.lock()?;
        comment.updated_at = Utc::now();
        let rows = conn.execute(
            "UPDATE comments SET content = ?1, is_edited = ?2, edited_at = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                &comment.content,
                comment.is_edited,
                comment.edited_at.as_ref().map(ts),
                ts(&comment.updated_at),
                &comment.id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Comment".to_string()));
        }
        Ok(())
    }

    /// Deletes the comment together with its likes and replies.
    pub fn delete_comment(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("Comment".to_string()));
        }
        Ok(())
    }

    pub fn toggle_comment_like(&self, comment_id: &str, user_id: &str) -> StoreResult<Toggle> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !exists(&tx, "comments", comment_id)? {
            return Err(StoreError::NotFound("Comment".to_string()));
        }
        let toggle = toggle_membership(&tx, "comment_likes", "comment_id", comment_id, user_id)?;
        tx.commit()?;
        Ok(toggle)
    }

    // ==================== Replies ====================

    pub fn add_reply(&self, reply: &mut Reply) -> StoreResult<()> {
        let conn = self.lock()?;
        if !exists(&conn, "comments", &reply.comment_id)? {
            return Err(StoreError::NotFound("Comment".to_string()));
        }
        reply.id = Uuid::new_v4().to_string();
        reply.created_at = Utc::now();
        reply.likes.clear();

        conn.execute(
            "INSERT INTO comment_replies (id, comment_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &reply.id,
                &reply.comment_id,
                &reply.author_id,
                &reply.content,
                ts(&reply.created_at),
            ],
        )
        .map_err(missing_user)?;
        Ok(())
    }

    pub fn delete_reply(&self, comment_id: &str, reply_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM comment_replies WHERE id = ?1 AND comment_id = ?2",
            params![reply_id, comment_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Reply".to_string()));
        }
        Ok(())
    }

    pub fn toggle_reply_like(&self, comment_id: &str, reply_id: &str, user_id: &str) -> StoreResult<Toggle> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let found: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM comment_replies WHERE id = ?1 AND comment_id = ?2)",
            params![reply_id, comment_id],
            |row| row.get(0),
        )?;
        if !found {
            return Err(StoreError::NotFound("Reply".to_string()));
        }
        let toggle = toggle_membership(&tx, "reply_likes", "reply_id", reply_id, user_id)?;
        tx.commit()?;
        Ok(toggle)
    }
}

fn hydrate_comment(conn: &Connection, comment: &mut Comment) -> StoreResult<()> {
    comment.likes = collect_ids(
        conn,
        "SELECT user_id FROM comment_likes WHERE comment_id = ?1 ORDER BY rowid",
        &comment.id,
    )?;

    let mut stmt = conn.prepare("SELECT * FROM comment_replies WHERE comment_id = ?1 ORDER BY created_at, rowid")?;
    let rows = stmt.query_map(params![&comment.id], |row| {
        Ok(Reply {
            id: row.get("id")?,
            comment_id: row.get("comment_id")?,
            author_id: row.get("author_id")?,
            content: row.get("content")?,
            likes: Vec::new(),
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    })?;
    let mut replies = Vec::new();
    for row in rows {
        let mut reply = row?;
        reply.likes = collect_ids(
            conn,
            "SELECT user_id FROM reply_likes WHERE reply_id = ?1 ORDER BY rowid",
            &reply.id,
        )?;
        replies.push(reply);
    }
    comment.replies = replies;
    Ok(())
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        post_id: row.get("post_id")?,
        author_id: row.get("author_id")?,
        content: row.get("content")?,
        likes: Vec::new(),
        replies: Vec::new(),
        is_edited: row.get("is_edited")?,
        edited_at: parse_optional_datetime(row.get("edited_at")?),
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}
