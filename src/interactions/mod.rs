//! Likes, saves, shares and views on posts, plus comment threads.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::feed::Authors;
use crate::models::{Comment, CommentView, PageRequest, Paginated, Reply, ReplyView, Shares, Toggle};
use crate::store::Store;
use crate::validation;

pub const DEFAULT_COMMENT_LIMIT: i64 = 20;

pub struct InteractionService {
    store: Arc<Store>,
}

impl InteractionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    // ==================== Posts ====================

    /// Likes the post, or removes the like if it is already there. The
    /// user's liked posts follow automatically.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<Toggle> {
        let toggle = self.store.toggle_post_like(post_id, user_id)?;
        log::debug!("User {} like on post {}: {}", user_id, post_id, toggle.active);
        Ok(toggle)
    }

    pub fn toggle_save(&self, post_id: &str, user_id: &str) -> AppResult<Toggle> {
        let toggle = self.store.toggle_post_save(post_id, user_id)?;
        log::debug!("User {} save on post {}: {}", user_id, post_id, toggle.active);
        Ok(toggle)
    }

    /// Every call counts as a share; the sharer is remembered once.
    pub fn increment_share(&self, post_id: &str, user_id: &str) -> AppResult<Shares> {
        Ok(self.store.record_share(post_id, user_id)?)
    }

    pub fn increment_view(&self, post_id: &str) -> AppResult<i64> {
        Ok(self.store.record_view(post_id)?)
    }

    // ==================== Comments ====================

    pub fn add_comment(&self, post_id: &str, author_id: &str, content: &str) -> AppResult<CommentView> {
        let content = validation::validate_comment(content)?;
        let mut comment = Comment::new(post_id, author_id, &content);
        self.store.create_comment(&mut comment)?;
        log::debug!("User {} commented on post {}", author_id, post_id);
        self.view(&comment, Some(author_id))
    }

    /// Newest first.
    pub fn list_comments(
        &self,
        post_id: &str,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<CommentView>> {
        if !self.store.post_exists(post_id)? {
            return Err(AppError::not_found("Post"));
        }
        let (comments, total) = self.store.list_comments(post_id, page.limit, page.offset())?;
        let mut authors = Authors::new(&self.store);
        let mut views = Vec::with_capacity(comments.len());
        for comment in &comments {
            views.push(comment_view(comment, viewer_id, &mut authors)?);
        }
        Ok(page.wrap(views, total))
    }

    pub fn toggle_comment_like(&self, comment_id: &str, user_id: &str) -> AppResult<Toggle> {
        Ok(self.store.toggle_comment_like(comment_id, user_id)?)
    }

    /// Comment author only.
    pub fn edit_comment(&self, comment_id: &str, requester_id: &str, content: &str) -> AppResult<CommentView> {
        let content = validation::validate_comment(content)?;
        let mut comment = self.store.get_comment(comment_id)?;
        if comment.author_id != requester_id {
            return Err(AppError::forbidden("You can only edit your own comments"));
        }

        comment.content = content;
        comment.is_edited = true;
        comment.edited_at = Some(Utc::now());
        self.store.update_comment(&mut comment)?;
        self.view(&comment, Some(requester_id))
    }

    /// Comment author or the post's owner.
    pub fn remove_comment(&self, comment_id: &str, requester_id: &str) -> AppResult<()> {
        let comment = self.store.get_comment(comment_id)?;
        if comment.author_id != requester_id && !self.owns_post(&comment.post_id, requester_id)? {
            return Err(AppError::forbidden("You can only delete your own comments"));
        }
        self.store.delete_comment(comment_id)?;
        log::info!("User {} removed comment {}", requester_id, comment_id);
        Ok(())
    }

    // ==================== Replies ====================

    /// Returns the whole thread with the new reply at the end.
    pub fn add_reply(&self, comment_id: &str, author_id: &str, content: &str) -> AppResult<CommentView> {
        let content = validation::validate_reply(content)?;
        let mut reply = Reply {
            id: String::new(),
            comment_id: comment_id.to_string(),
            author_id: author_id.to_string(),
            content,
            likes: Vec::new(),
            created_at: Utc::now(),
        };
        self.store.add_reply(&mut reply)?;

        let comment = self.store.get_comment(comment_id)?;
        self.view(&comment, Some(author_id))
    }

    pub fn toggle_reply_like(&self, comment_id: &str, reply_id: &str, user_id: &str) -> AppResult<Toggle> {
        Ok(self.store.toggle_reply_like(comment_id, reply_id, user_id)?)
    }

    /// Reply author, comment author or the post's owner.
    pub fn remove_reply(&self, comment_id: &str, reply_id: &str, requester_id: &str) -> AppResult<()> {
        let comment = self.store.get_comment(comment_id)?;
        let reply = comment.reply(reply_id).ok_or_else(|| AppError::not_found("Reply"))?;

        let allowed = reply.author_id == requester_id
            || comment.author_id == requester_id
            || self.owns_post(&comment.post_id, requester_id)?;
        if !allowed {
            return Err(AppError::forbidden("You can only delete your own replies"));
        }
        self.store.delete_reply(comment_id, reply_id)?;
        Ok(())
    }

    fn owns_post(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        Ok(self.store.get_post(post_id)?.author_id == user_id)
    }

    fn view(&self, comment: &Comment, viewer_id: Option<&str>) -> AppResult<CommentView> {
        comment_view(comment, viewer_id, &mut Authors::new(&self.store))
    }
}

/// Expands authors and derives counts for one comment thread.
pub(crate) fn comment_view(
    comment: &Comment,
    viewer_id: Option<&str>,
    authors: &mut Authors<'_>,
) -> AppResult<CommentView> {
    let mut replies = Vec::with_capacity(comment.replies.len());
    for reply in &comment.replies {
        replies.push(ReplyView {
            id: reply.id.clone(),
            author: authors.get(&reply.author_id)?,
            content: reply.content.clone(),
            like_count: reply.likes.len(),
            is_liked: viewer_id.map(|v| reply.likes.iter().any(|id| id == v)),
            created_at: reply.created_at,
        });
    }

    Ok(CommentView {
        id: comment.id.clone(),
        post_id: comment.post_id.clone(),
        author: authors.get(&comment.author_id)?,
        content: comment.content.clone(),
        like_count: comment.likes.len(),
        reply_count: replies.len(),
        replies,
        is_liked: viewer_id.map(|v| comment.is_liked_by(v)),
        is_edited: comment.is_edited,
        edited_at: comment.edited_at,
        created_at: comment.created_at,
    })
}
