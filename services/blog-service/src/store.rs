use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_auth::ResourceAuthContext;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

pub type Id = u64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, Id),
    #[error("category '{0}' already exists")]
    DuplicateCategory(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Caller stamped on authored content.
#[derive(Debug, Clone)]
pub struct Author {
    pub subject: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub author_sub: String,
    pub created_at: DateTime<Utc>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub likes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Id,
    pub post_id: Id,
    pub author_sub: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub hidden: bool,
    pub likes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked(usize),
    AlreadyLiked,
}

#[derive(Debug, Clone)]
struct PostRecord {
    id: Id,
    title: String,
    content: String,
    author: Author,
    created_at: DateTime<Utc>,
    category_id: Option<Id>,
    tag_ids: Vec<Id>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: Id,
    post_id: Id,
    author: Author,
    content: String,
    created_at: DateTime<Utc>,
    hidden: bool,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: Id,
    categories: BTreeMap<Id, Category>,
    tags: BTreeMap<Id, String>,
    posts: BTreeMap<Id, PostRecord>,
    comments: BTreeMap<Id, CommentRecord>,
    post_likes: HashSet<(Id, String)>,
    comment_likes: HashSet<(Id, String)>,
}

impl Tables {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn category_id_for(&mut self, name: &str) -> Id {
        if let Some(existing) = self.categories.values().find(|c| c.name == name) {
            return existing.id;
        }
        let id = self.allocate_id();
        self.categories.insert(id, Category { id, name: name.to_string() });
        id
    }

    fn tag_ids_for(&mut self, names: &[String]) -> Vec<Id> {
        let mut ids = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let id = match self.tags.iter().find(|(_, tag)| tag.as_str() == name) {
                Some((id, _)) => *id,
                None => {
                    let id = self.allocate_id();
                    self.tags.insert(id, name.to_string());
                    id
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// A missing or blank category keeps the current one; tags are always replaced.
    fn apply_post_input(&mut self, post_id: Id, input: PostInput) {
        let category_id = input
            .category
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| self.category_id_for(name));
        let tag_ids = self.tag_ids_for(&input.tags);
        if let Some(post) = self.posts.get_mut(&post_id) {
            post.title = input.title;
            post.content = input.content;
            if category_id.is_some() {
                post.category_id = category_id;
            }
            post.tag_ids = tag_ids;
        }
    }

    fn post_view(&self, post: &PostRecord) -> PostView {
        PostView {
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            author_sub: post.author.subject.clone(),
            created_at: post.created_at,
            category: post
                .category_id
                .and_then(|id| self.categories.get(&id))
                .map(|c| c.name.clone()),
            tags: post
                .tag_ids
                .iter()
                .filter_map(|id| self.tags.get(id).cloned())
                .collect(),
            likes: self.post_likes.iter().filter(|(id, _)| *id == post.id).count(),
        }
    }

    fn comment_view(&self, comment: &CommentRecord) -> CommentView {
        CommentView {
            id: comment.id,
            post_id: comment.post_id,
            author_sub: comment.author.subject.clone(),
            content: comment.content.clone(),
            created_at: comment.created_at,
            hidden: comment.hidden,
            likes: self
                .comment_likes
                .iter()
                .filter(|(id, _)| *id == comment.id)
                .count(),
        }
    }

    fn post(&self, id: Id) -> StoreResult<&PostRecord> {
        self.posts.get(&id).ok_or(StoreError::NotFound("post", id))
    }

    fn comment(&self, id: Id) -> StoreResult<&CommentRecord> {
        self.comments.get(&id).ok_or(StoreError::NotFound("comment", id))
    }
}

fn ownership(author: &Author) -> ResourceAuthContext {
    ResourceAuthContext::new(author.subject.clone(), author.role.clone())
}

/// In-memory blog store. Guarded mutations run their authorization check under the write lock.
#[derive(Clone, Default)]
pub struct BlogStore {
    inner: Arc<RwLock<Tables>>,
}

impl BlogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list_categories(&self) -> Vec<Category> {
        self.inner.read().await.categories.values().cloned().collect()
    }

    pub async fn create_category(&self, name: &str) -> StoreResult<Category> {
        let mut tables = self.inner.write().await;
        if tables.categories.values().any(|c| c.name == name) {
            return Err(StoreError::DuplicateCategory(name.to_string()));
        }
        let id = tables.allocate_id();
        let category = Category { id, name: name.to_string() };
        tables.categories.insert(id, category.clone());
        Ok(category)
    }

    pub async fn rename_category(&self, id: Id, name: &str) -> StoreResult<Category> {
        let mut tables = self.inner.write().await;
        let category = tables
            .categories
            .get_mut(&id)
            .ok_or(StoreError::NotFound("category", id))?;
        category.name = name.to_string();
        Ok(category.clone())
    }

    /// Remove a category; posts filed under it become uncategorised.
    pub async fn delete_category(&self, id: Id) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        tables
            .categories
            .remove(&id)
            .ok_or(StoreError::NotFound("category", id))?;
        for post in tables.posts.values_mut() {
            if post.category_id == Some(id) {
                post.category_id = None;
            }
        }
        Ok(())
    }

    pub async fn create_post(&self, input: PostInput, author: Author) -> PostView {
        let mut tables = self.inner.write().await;
        let id = tables.allocate_id();
        tables.posts.insert(
            id,
            PostRecord {
                id,
                title: String::new(),
                content: String::new(),
                author,
                created_at: Utc::now(),
                category_id: None,
                tag_ids: Vec::new(),
            },
        );
        tables.apply_post_input(id, input);
        let post = &tables.posts[&id];
        tables.post_view(post)
    }

    pub async fn get_post(&self, id: Id) -> StoreResult<PostView> {
        let tables = self.inner.read().await;
        let post = tables.post(id)?;
        Ok(tables.post_view(post))
    }

    /// Posts, newest first.
    pub async fn list_posts(&self) -> Vec<PostView> {
        let tables = self.inner.read().await;
        let mut posts: Vec<&PostRecord> = tables.posts.values().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts.into_iter().map(|post| tables.post_view(post)).collect()
    }

    pub async fn update_post<F, E>(&self, id: Id, input: PostInput, guard: F) -> Result<PostView, E>
    where
        F: FnOnce(&ResourceAuthContext) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut tables = self.inner.write().await;
        guard(&ownership(&tables.post(id)?.author))?;
        tables.apply_post_input(id, input);
        let post = tables.post(id)?;
        Ok(tables.post_view(post))
    }

    /// Delete a post together with its comments and likes.
    pub async fn delete_post<F, E>(&self, id: Id, guard: F) -> Result<(), E>
    where
        F: FnOnce(&ResourceAuthContext) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut tables = self.inner.write().await;
        guard(&ownership(&tables.post(id)?.author))?;

        tables.posts.remove(&id);
        let removed: Vec<Id> = tables
            .comments
            .values()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();
        for comment_id in &removed {
            tables.comments.remove(comment_id);
        }
        tables.post_likes.retain(|(post_id, _)| *post_id != id);
        tables
            .comment_likes
            .retain(|(comment_id, _)| !removed.contains(comment_id));
        Ok(())
    }

    /// Comments on a post, newest first.
    pub async fn list_comments(&self, post_id: Id) -> StoreResult<Vec<CommentView>> {
        let tables = self.inner.read().await;
        tables.post(post_id)?;
        let mut comments: Vec<&CommentRecord> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments.into_iter().map(|c| tables.comment_view(c)).collect())
    }

    pub async fn create_comment(&self, post_id: Id, content: String, author: Author) -> StoreResult<CommentView> {
        let mut tables = self.inner.write().await;
        tables.post(post_id)?;
        let id = tables.allocate_id();
        let comment = CommentRecord {
            id,
            post_id,
            author,
            content,
            created_at: Utc::now(),
            hidden: false,
        };
        let view = tables.comment_view(&comment);
        tables.comments.insert(id, comment);
        Ok(view)
    }

    pub async fn hide_comment(&self, id: Id) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        let comment = tables
            .comments
            .get_mut(&id)
            .ok_or(StoreError::NotFound("comment", id))?;
        comment.hidden = true;
        Ok(())
    }

    pub async fn delete_comment<F, E>(&self, id: Id, guard: F) -> Result<(), E>
    where
        F: FnOnce(&ResourceAuthContext) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut tables = self.inner.write().await;
        guard(&ownership(&tables.comment(id)?.author))?;
        tables.comments.remove(&id);
        tables.comment_likes.retain(|(comment_id, _)| *comment_id != id);
        Ok(())
    }

    pub async fn like_post(&self, post_id: Id, user: &str) -> StoreResult<LikeOutcome> {
        let mut tables = self.inner.write().await;
        tables.post(post_id)?;
        if !tables.post_likes.insert((post_id, user.to_string())) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        let count = tables.post_likes.iter().filter(|(id, _)| *id == post_id).count();
        Ok(LikeOutcome::Liked(count))
    }

    pub async fn like_comment(&self, comment_id: Id, user: &str) -> StoreResult<LikeOutcome> {
        let mut tables = self.inner.write().await;
        tables.comment(comment_id)?;
        if !tables.comment_likes.insert((comment_id, user.to_string())) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        let count = tables
            .comment_likes
            .iter()
            .filter(|(id, _)| *id == comment_id)
            .count();
        Ok(LikeOutcome::Liked(count))
    }
}
