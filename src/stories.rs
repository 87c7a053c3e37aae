use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::live::Live;
use crate::media::{MediaService, MediaUpload};
use crate::metrics::Metrics;
use crate::profile;
use crate::session::SessionContext;
use crate::store::{CollectionPath, Direction, DocumentStore, Query};

pub const STORIES: &str = "stories";

pub type StoryStream = Live<Story>;

/// A story: one media locator with its author, shown until it ages out
/// of the highlights rail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Story {
    #[serde(skip)]
    pub id: String,
    pub image: String,
    pub user: String,
    pub user_id: String,
    pub created_at: i64,
}

impl Story {
    pub fn from_document(doc: crate::store::Document) -> Result<Self> {
        let mut story: Story = serde_json::from_value(doc.data)?;
        story.id = doc.id;
        Ok(story)
    }
}

#[derive(Clone)]
pub struct StoryService {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    media: MediaService,
}

impl StoryService {
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

    /// Media is uploaded before the story record exists, so the rail
    /// never renders a broken image.
    pub async fn create_story(&self, upload: MediaUpload) -> Result<Story> {
        let user = self.session.current_user().await?;

        let image = self.media.upload(STORIES, upload).await?;
        let username = profile::display_username(self.store.as_ref(), &user).await;

        let story = Story {
            id: String::new(),
            image,
            user: username,
            user_id: user.uid.clone(),
            created_at: Utc::now().timestamp_millis(),
        };

        let path = CollectionPath::root(STORIES);
        let id = self
            .store
            .insert(&path, serde_json::to_value(&story)?)
            .await?;

        Metrics::record_created(STORIES);
        info!(story = %id, "story created");

        Ok(Story { id, ..story })
    }

    pub async fn watch_stories(&self) -> Result<StoryStream> {
        let query = Query::collection(CollectionPath::root(STORIES))
            .order_by("created_at", Direction::Descending);
        Live::open(self.store.clone(), query, Story::from_document).await
    }

    pub async fn get_story(&self, story_id: &str) -> Result<Story> {
        let doc = self
            .store
            .get(&CollectionPath::root(STORIES), story_id)
            .await?
            .ok_or(Error::NotFound("story"))?;
        Story::from_document(doc)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn created_stories_show_up_in_the_rail() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        let story = app
            .stories
            .create_story(MediaUpload::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(story.image.starts_with("mem://"));
        assert_eq!(story.user, "ada");

        let mut rail = app.stories.watch_stories().await.unwrap();
        let snapshot = rail.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, story.id);
    }

    #[tokio::test]
    async fn missing_story_is_not_found() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        assert!(matches!(
            app.stories.get_story("gone").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_upload_prevents_the_story_record() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        backend.blobs.fail_uploads(true);
        assert!(app
            .stories
            .create_story(MediaUpload::new(vec![1]))
            .await
            .is_err());

        let mut rail = app.stories.watch_stories().await.unwrap();
        assert!(rail.next().await.unwrap().is_empty());
    }
}
