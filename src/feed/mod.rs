//! Post listings (timeline, feed, search, per-user), single-post reads and
//! post authoring.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::interactions::comment_view;
use crate::models::{
    CreatePostRequest, PageRequest, Paginated, Post, PostDetail, PostView, UpdatePostRequest, UserSummary,
};
use crate::store::{PostFilter, Store};
use crate::validation;

pub const DEFAULT_POST_LIMIT: i64 = 10;

/// Memoizes author summaries while building a batch of views.
pub(crate) struct Authors<'a> {
    store: &'a Store,
    cache: HashMap<String, UserSummary>,
}

impl<'a> Authors<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, user_id: &str) -> AppResult<UserSummary> {
        if let Some(summary) = self.cache.get(user_id) {
            return Ok(summary.clone());
        }
        let summary = self.store.get_user_summary(user_id)?;
        self.cache.insert(user_id.to_string(), summary.clone());
        Ok(summary)
    }
}

pub struct FeedService {
    store: Arc<Store>,
}

impl FeedService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Non-archived posts, optionally by one author.
    pub fn list_posts(
        &self,
        author_id: Option<&str>,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<PostView>> {
        let filter = match author_id {
            Some(id) => PostFilter::by_author(id),
            None => PostFilter::timeline(),
        };
        self.page_of(&filter, page, viewer_id)
    }

    /// Posts by the user and everyone they follow.
    pub fn get_feed(&self, user_id: &str, page: PageRequest) -> AppResult<Paginated<PostView>> {
        self.page_of(&PostFilter::feed_of(user_id), page, Some(user_id))
    }

    pub fn search_posts(
        &self,
        query: Option<&str>,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<PostView>> {
        let query = validation::validate_search_query(query)?;
        self.page_of(&PostFilter::timeline().matching(&query), page, viewer_id)
    }

    pub fn list_user_posts(
        &self,
        username: &str,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<PostView>> {
        let user = self.store.get_user_by_username(username)?;
        self.page_of(&PostFilter::by_author(&user.id), page, viewer_id)
    }

    pub fn list_saved_posts(&self, user_id: &str, page: PageRequest) -> AppResult<Paginated<PostView>> {
        self.page_of(&PostFilter::saved_by(user_id), page, Some(user_id))
    }

    pub fn list_liked_posts(&self, user_id: &str, page: PageRequest) -> AppResult<Paginated<PostView>> {
        self.page_of(&PostFilter::liked_by(user_id), page, Some(user_id))
    }

    /// Counts a view, then returns the post with its comment threads and
    /// likers expanded.
    pub fn get_post_by_id(&self, id: &str, viewer_id: Option<&str>) -> AppResult<PostDetail> {
        self.store.record_view(id)?;
        log::debug!("Recorded view of post {}", id);
        let post = self.store.get_post(id)?;

        let mut authors = Authors::new(&self.store);
        let author = authors.get(&post.author_id)?;

        let (comments, _) = self.store.list_comments(id, -1, 0)?;
        let comments = comments
            .iter()
            .map(|c| comment_view(c, viewer_id, &mut authors))
            .collect::<AppResult<Vec<_>>>()?;
        let liked_by = self.store.user_summaries(&post.likes)?;

        Ok(PostDetail {
            post: PostView::new(&post, author, viewer_id),
            comments,
            liked_by,
        })
    }

    pub fn create_post(&self, author_id: &str, req: &CreatePostRequest) -> AppResult<PostView> {
        let new_post = validation::validate_new_post(req)?;

        let mut post = Post::new(author_id, &new_post.image, &new_post.caption);
        post.location = new_post.location;
        post.tags = new_post.tags;
        self.store.create_post(&mut post)?;
        log::info!("User {} created post {}", author_id, post.id);

        let author = self.store.get_user_summary(author_id)?;
        Ok(PostView::new(&post, author, Some(author_id)))
    }

    /// Owner only. Caption, location and tag changes mark the post edited.
    pub fn update_post(&self, id: &str, requester_id: &str, req: &UpdatePostRequest) -> AppResult<PostView> {
        let changes = validation::validate_post_update(req)?;
        let mut post = self.store.get_post(id)?;
        if post.author_id != requester_id {
            return Err(AppError::forbidden("You can only edit your own posts"));
        }

        let mut edited = false;
        if let Some(caption) = changes.caption {
            post.caption = caption;
            edited = true;
        }
        if let Some(location) = changes.location {
            post.location = location;
            edited = true;
        }
        if let Some(tags) = changes.tags {
            post.tags = tags;
            edited = true;
        }
        if let Some(archived) = changes.is_archived {
            post.is_archived = archived;
        }
        if let Some(private) = changes.is_private {
            post.is_private = private;
        }
        if edited {
            post.is_edited = true;
            post.edited_at = Some(Utc::now());
        }

        self.store.update_post(&mut post)?;
        let author = self.store.get_user_summary(&post.author_id)?;
        Ok(PostView::new(&post, author, Some(requester_id)))
    }

    /// Owner only. Comments, likes, saves and shares of the post go with it.
    pub fn delete_post(&self, id: &str, requester_id: &str) -> AppResult<()> {
        let post = self.store.get_post(id)?;
        if post.author_id != requester_id {
            return Err(AppError::forbidden("You can only delete your own posts"));
        }
        self.store.delete_post(id)?;
        log::info!("User {} deleted post {}", requester_id, id);
        Ok(())
    }

    fn page_of(
        &self,
        filter: &PostFilter,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<PostView>> {
        let (posts, total) = self.store.list_posts(filter, page.limit, page.offset())?;
        let mut authors = Authors::new(&self.store);
        let mut views = Vec::with_capacity(posts.len());
        for post in &posts {
            views.push(PostView::new(post, authors.get(&post.author_id)?, viewer_id));
        }
        Ok(page.wrap(views, total))
    }
}
