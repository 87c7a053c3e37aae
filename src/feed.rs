use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::live::Live;
use crate::media::{MediaService, MediaUpload};
use crate::metrics::Metrics;
use crate::profile;
use crate::session::SessionContext;
use crate::store::{CollectionPath, Direction, DocumentStore, Query};

pub const POSTS: &str = "posts";
const COMMENTS: &str = "comments";

/// The home feed shows the latest posts only; older ones load on demand.
const FEED_PAGE_SIZE: usize = 20;

pub type PostStream = Live<Post>;
pub type CommentStream = Live<Comment>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    #[serde(skip)]
    pub id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub user_id: String,
    pub username: String,
    pub user_image: Option<String>,
    pub created_at: i64,
    pub likes: i64,
    pub reposts: i64,
}

impl Post {
    pub fn from_document(doc: crate::store::Document) -> Result<Self> {
        let mut post: Post = serde_json::from_value(doc.data)?;
        post.id = doc.id;
        Ok(post)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub username: String,
    pub created_at: i64,
}

impl Comment {
    pub fn from_document(doc: crate::store::Document) -> Result<Self> {
        let mut comment: Comment = serde_json::from_value(doc.data)?;
        comment.id = doc.id;
        Ok(comment)
    }
}

/// Posts and their comment subcollections: live collections plus the
/// client-side search filter, nothing more.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    media: MediaService,
}

impl FeedService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: SessionContext,
        media: MediaService,
    ) -> Self {
        Self {
            store,
            session,
            media,
        }
    }

    /// Create a post, uploading any attached media first so the record
    /// only ever references a resolved locator.
    pub async fn create_post(
        &self,
        content: &str,
        media: Option<MediaUpload>,
    ) -> Result<Post> {
        let user = self.session.current_user().await?;

        if content.trim().is_empty() && media.is_none() {
            return Err(Error::Validation("post has no content".to_string()));
        }

        let media_url = match media {
            Some(upload) => Some(self.media.upload(POSTS, upload).await?),
            None => None,
        };

        let (username, user_image) = self.author_identity(&user).await;
        let post = Post {
            id: String::new(),
            content: content.to_string(),
            media_url,
            user_id: user.uid.clone(),
            username,
            user_image,
            created_at: Utc::now().timestamp_millis(),
            likes: 0,
            reposts: 0,
        };

        let path = CollectionPath::root(POSTS);
        let id = self
            .store
            .insert(&path, serde_json::to_value(&post)?)
            .await?;

        Metrics::record_created(POSTS);
        info!(post = %id, "post created");

        Ok(Post { id, ..post })
    }

    /// Latest posts, newest first, replayed and re-delivered live.
    pub async fn watch_feed(&self) -> Result<PostStream> {
        let query = Query::collection(CollectionPath::root(POSTS))
            .order_by("created_at", Direction::Descending)
            .limit(FEED_PAGE_SIZE);
        Live::open(self.store.clone(), query, Post::from_document).await
    }

    /// Client-side search over a delivered snapshot. The caller debounces.
    pub fn filter_posts(posts: &[Post], search: &str) -> Vec<Post> {
        let needle = search.to_lowercase();
        posts
            .iter()
            .filter(|post| {
                post.username.to_lowercase().contains(&needle)
                    || post.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Client-side read-modify-write counter; concurrent likes can lose
    /// updates (see DESIGN.md, Open Questions).
    pub async fn like_post(&self, post_id: &str) -> Result<i64> {
        self.bump_counter(post_id, "likes").await
    }

    pub async fn repost_post(&self, post_id: &str) -> Result<i64> {
        self.bump_counter(post_id, "reposts").await
    }

    async fn bump_counter(&self, post_id: &str, field: &str) -> Result<i64> {
        self.session.current_user().await?;

        let path = CollectionPath::root(POSTS);
        let doc = self
            .store
            .get(&path, post_id)
            .await?
            .ok_or(Error::NotFound("post"))?;

        let next = doc.data.get(field).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
        self.store
            .update(&path, post_id, json!({ field: next }))
            .await?;

        Ok(next)
    }

    pub async fn update_post(&self, post_id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::Validation("post has no content".to_string()));
        }

        self.owned_post(post_id).await?;
        self.store
            .update(
                &CollectionPath::root(POSTS),
                post_id,
                json!({ "content": content }),
            )
            .await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        self.owned_post(post_id).await?;
        self.store
            .delete(&CollectionPath::root(POSTS), post_id)
            .await?;
        info!(post = post_id, "post deleted");
        Ok(())
    }

    pub async fn add_comment(&self, post_id: &str, text: &str) -> Result<Comment> {
        let user = self.session.current_user().await?;

        if text.trim().is_empty() {
            return Err(Error::Validation("comment is empty".to_string()));
        }

        let posts = CollectionPath::root(POSTS);
        if self.store.get(&posts, post_id).await?.is_none() {
            return Err(Error::NotFound("post"));
        }

        let (username, _) = self.author_identity(&user).await;
        let comment = Comment {
            id: String::new(),
            text: text.to_string(),
            user_id: user.uid.clone(),
            username,
            created_at: Utc::now().timestamp_millis(),
        };

        let path = CollectionPath::nested(POSTS, post_id, COMMENTS);
        let id = self
            .store
            .insert(&path, serde_json::to_value(&comment)?)
            .await?;

        Metrics::record_created(COMMENTS);
        Ok(Comment { id, ..comment })
    }

    pub async fn watch_comments(&self, post_id: &str) -> Result<CommentStream> {
        let posts = CollectionPath::root(POSTS);
        if self.store.get(&posts, post_id).await?.is_none() {
            return Err(Error::NotFound("post"));
        }

        let query = Query::collection(CollectionPath::nested(POSTS, post_id, COMMENTS))
            .order_by("created_at", Direction::Descending);
        Live::open(self.store.clone(), query, Comment::from_document).await
    }

    async fn owned_post(&self, post_id: &str) -> Result<Post> {
        let user = self.session.current_user().await?;

        let doc = self
            .store
            .get(&CollectionPath::root(POSTS), post_id)
            .await?
            .ok_or(Error::NotFound("post"))?;
        let post = Post::from_document(doc)?;

        if post.user_id != user.uid {
            return Err(Error::Validation("not the author".to_string()));
        }
        Ok(post)
    }

    /// Denormalized author identity from the users collection, falling
    /// back to the session identity when no profile document exists yet.
    async fn author_identity(
        &self,
        user: &crate::session::AuthUser,
    ) -> (String, Option<String>) {
        let users = CollectionPath::root(profile::USERS);
        match self.store.get(&users, &user.uid).await {
            Ok(Some(doc)) => {
                let username = doc
                    .data
                    .get("username")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&user.email)
                    .to_string();
                let image = doc
                    .data
                    .get("profile_image")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                (username, image.or_else(|| user.avatar_url.clone()))
            }
            Ok(None) => (user.email.clone(), user.avatar_url.clone()),
            Err(e) => {
                warn!("author profile lookup failed: {}", e);
                (user.email.clone(), user.avatar_url.clone())
            }
        }
    }
}
