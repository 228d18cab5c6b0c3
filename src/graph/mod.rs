//! Social graph: follow edges between users, follower listings, suggestions
//! and user search.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{PageRequest, Paginated, PostView, User, UserProfileView, UserSummary};
use crate::store::{PostFilter, Store};
use crate::validation;

pub const DEFAULT_SUGGESTIONS: i64 = 10;

pub struct SocialGraph {
    store: Arc<Store>,
}

impl SocialGraph {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn follow(&self, current_user_id: &str, target_id: &str) -> AppResult<()> {
        if current_user_id == target_id {
            return Err(AppError::SelfFollow);
        }
        if !self.store.user_exists(target_id)? {
            return Err(AppError::not_found("User"));
        }
        if !self.store.follow(current_user_id, target_id)? {
            return Err(AppError::AlreadyFollowing);
        }
        log::info!("User {} followed {}", current_user_id, target_id);
        Ok(())
    }

    pub fn unfollow(&self, current_user_id: &str, target_id: &str) -> AppResult<()> {
        if !self.store.user_exists(target_id)? {
            return Err(AppError::not_found("User"));
        }
        if !self.store.unfollow(current_user_id, target_id)? {
            return Err(AppError::NotFollowing);
        }
        log::info!("User {} unfollowed {}", current_user_id, target_id);
        Ok(())
    }

    pub fn is_following(&self, user_id: &str, candidate_id: &str) -> AppResult<bool> {
        Ok(self.store.is_following(user_id, candidate_id)?)
    }

    pub fn list_followers(&self, username: &str, page: PageRequest) -> AppResult<Paginated<UserSummary>> {
        let user = self.store.get_user_by_username(username)?;
        let (items, total) = self.store.list_followers(&user.id, page.limit, page.offset())?;
        Ok(page.wrap(items, total))
    }

    pub fn list_following(&self, username: &str, page: PageRequest) -> AppResult<Paginated<UserSummary>> {
        let user = self.store.get_user_by_username(username)?;
        let (items, total) = self.store.list_following(&user.id, page.limit, page.offset())?;
        Ok(page.wrap(items, total))
    }

    pub fn suggest_users(&self, current_user_id: &str, limit: i64) -> AppResult<Vec<UserSummary>> {
        Ok(self.store.suggest_users(current_user_id, limit)?)
    }

    /// Results carry `isFollowing` when the caller is signed in.
    pub fn search_users(
        &self,
        query: Option<&str>,
        page: PageRequest,
        viewer_id: Option<&str>,
    ) -> AppResult<Paginated<UserSummary>> {
        let query = validation::validate_search_query(query)?;
        let (mut items, total) = self.store.search_users(&query, page.limit, page.offset())?;
        if let Some(viewer) = viewer_id {
            for user in &mut items {
                user.is_following = Some(self.store.is_following(viewer, &user.id)?);
            }
        }
        Ok(page.wrap(items, total))
    }

    pub fn get_user_profile(&self, username: &str, viewer_id: Option<&str>) -> AppResult<UserProfileView> {
        let user: User = self.store.get_user_by_username(username)?;
        let summary = user.summary();

        // LIMIT -1 returns every row.
        let (posts, _) = self.store.list_posts(&PostFilter::by_author(&user.id), -1, 0)?;
        let posts = posts
            .iter()
            .map(|p| PostView::new(p, summary.clone(), viewer_id))
            .collect();

        let followers = self.store.user_summaries(&user.followers)?;
        let following = self.store.user_summaries(&user.following)?;
        let is_following = viewer_id.map(|v| user.followers.iter().any(|id| id == v));

        Ok(UserProfileView {
            profile: user.public_profile(),
            posts,
            followers,
            following,
            is_following,
            is_own_profile: viewer_id == Some(user.id.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SocialGraph, Arc<Store>, User, User) {
        let store = Arc::new(Store::in_memory().unwrap());
        let mut jane = User::new("jane", "jane@example.com", "hash".to_string(), "Jane Doe");
        let mut mike = User::new("mike", "mike@example.com", "hash".to_string(), "Mike Ross");
        store.create_user(&mut jane).unwrap();
        store.create_user(&mut mike).unwrap();
        (SocialGraph::new(store.clone()), store, jane, mike)
    }

    #[test]
    fn test_follow_is_visible_from_both_sides() {
        let (graph, store, jane, mike) = setup();
        graph.follow(&mike.id, &jane.id).unwrap();

        assert!(graph.is_following(&mike.id, &jane.id).unwrap());
        assert!(store.get_user(&jane.id).unwrap().followers.contains(&mike.id));
    }

    #[test]
    fn test_follow_unfollow_round_trip() {
        let (graph, store, jane, mike) = setup();
        graph.follow(&mike.id, &jane.id).unwrap();
        graph.unfollow(&mike.id, &jane.id).unwrap();

        assert!(store.get_user(&mike.id).unwrap().following.is_empty());
        assert!(store.get_user(&jane.id).unwrap().followers.is_empty());
    }

    #[test]
    fn test_follow_errors() {
        let (graph, _, jane, mike) = setup();
        assert!(matches!(graph.follow(&jane.id, &jane.id), Err(AppError::SelfFollow)));
        assert!(matches!(graph.follow(&jane.id, "missing"), Err(AppError::NotFound(_))));

        graph.follow(&jane.id, &mike.id).unwrap();
        assert!(matches!(graph.follow(&jane.id, &mike.id), Err(AppError::AlreadyFollowing)));

        graph.unfollow(&jane.id, &mike.id).unwrap();
        assert!(matches!(graph.unfollow(&jane.id, &mike.id), Err(AppError::NotFollowing)));
    }

    #[test]
    fn test_suggestions_exclude_self_and_followed() {
        let (graph, store, jane, mike) = setup();
        let mut ana = User::new("ana", "ana@example.com", "hash".to_string(), "Ana");
        store.create_user(&mut ana).unwrap();
        graph.follow(&jane.id, &mike.id).unwrap();
        graph.follow(&ana.id, &mike.id).unwrap();

        let suggested = graph.suggest_users(&jane.id, DEFAULT_SUGGESTIONS).unwrap();
        let names: Vec<_> = suggested.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["ana"]);

        let suggested = graph.suggest_users(&ana.id, DEFAULT_SUGGESTIONS).unwrap();
        assert_eq!(suggested[0].username, "jane");
    }

    #[test]
    fn test_search_ranks_by_followers_and_annotates() {
        let (graph, store, jane, mike) = setup();
        let mut ana = User::new("mikaela", "mikaela@example.com", "hash".to_string(), "Mikaela");
        store.create_user(&mut ana).unwrap();
        graph.follow(&jane.id, &ana.id).unwrap();

        let page = PageRequest::new(None, None, 20);
        let results = graph.search_users(Some("MIK"), page, Some(&jane.id)).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.items[0].username, "mikaela");
        assert_eq!(results.items[0].is_following, Some(true));
        assert_eq!(results.items[1].id, mike.id);
        assert_eq!(results.items[1].is_following, Some(false));

        let anonymous = graph.search_users(Some("mik"), page, None).unwrap();
        assert!(anonymous.items.iter().all(|u| u.is_following.is_none()));

        assert!(matches!(
            graph.search_users(Some("m"), page, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_search_folds_accented_full_names() {
        let (graph, store, _, _) = setup();
        let mut elodie = User::new("elodie", "elodie@example.com", "hash".to_string(), "Élodie Öberg");
        store.create_user(&mut elodie).unwrap();

        let page = PageRequest::new(None, None, 20);
        let results = graph.search_users(Some("éLODIE"), page, None).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.items[0].id, elodie.id);
        assert_eq!(graph.search_users(Some("ÖBERG"), page, None).unwrap().total, 1);
    }

    #[test]
    fn test_profile_and_follower_listing() {
        let (graph, _, jane, mike) = setup();
        graph.follow(&mike.id, &jane.id).unwrap();

        let profile = graph.get_user_profile("jane", Some(&mike.id)).unwrap();
        assert_eq!(profile.profile.follower_count, 1);
        assert_eq!(profile.is_following, Some(true));
        assert!(!profile.is_own_profile);
        assert_eq!(profile.followers[0].username, "mike");

        let followers = graph.list_followers("jane", PageRequest::new(None, None, 20)).unwrap();
        assert_eq!(followers.total, 1);
        assert!(!followers.has_more());

        assert!(matches!(
            graph.list_following("nobody", PageRequest::new(None, None, 20)),
            Err(AppError::NotFound(_))
        ));
    }
}
