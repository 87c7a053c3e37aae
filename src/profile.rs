use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{Error, Result};
use crate::media::{MediaService, MediaUpload};
use crate::session::{AuthUser, SessionContext};
use crate::store::{CollectionPath, Direction, DocumentStore, Query};

pub const USERS: &str = "users";

/// The users-collection document written at sign-up and edited from the
/// profile screen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip)]
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub banner_image: Option<String>,
}

impl Profile {
    pub fn from_document(doc: crate::store::Document) -> Result<Self> {
        let mut profile: Profile = serde_json::from_value(doc.data)?;
        profile.id = doc.id;
        Ok(profile)
    }
}

/// Fields the edit-profile screen may change; `None` leaves a field as is.
#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    media: MediaService,
}

impl ProfileService {
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

    /// Write the users document for a freshly signed-up account.
    pub async fn create_profile(&self, username: &str, name: &str) -> Result<Profile> {
        let user = self.session.current_user().await?;

        if username.trim().is_empty() {
            return Err(Error::Validation("username is empty".to_string()));
        }

        let profile = Profile {
            id: user.uid.clone(),
            user_id: user.uid.clone(),
            username: username.to_string(),
            name: name.to_string(),
            email: user.email.clone(),
            bio: None,
            profile_image: None,
            banner_image: None,
        };

        let path = CollectionPath::root(USERS);
        let created = self
            .store
            .create(&path, &user.uid, serde_json::to_value(&profile)?)
            .await?;
        if !created {
            return Err(Error::Validation("profile already exists".to_string()));
        }

        info!(uid = %user.uid, username, "profile created");
        Ok(profile)
    }

    pub async fn get_profile(&self, uid: &str) -> Result<Profile> {
        let doc = self
            .store
            .get(&CollectionPath::root(USERS), uid)
            .await?
            .ok_or(Error::NotFound("profile"))?;
        Profile::from_document(doc)
    }

    pub async fn my_profile(&self) -> Result<Profile> {
        let user = self.session.current_user().await?;
        self.get_profile(&user.uid).await
    }

    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<()> {
        let user = self.session.current_user().await?;

        let mut fields = serde_json::Map::new();
        if let Some(username) = patch.username {
            if username.trim().is_empty() {
                return Err(Error::Validation("username is empty".to_string()));
            }
            fields.insert("username".to_string(), json!(username));
        }
        if let Some(name) = patch.name {
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(bio) = patch.bio {
            fields.insert("bio".to_string(), json!(bio));
        }
        if fields.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }

        self.store
            .update(&CollectionPath::root(USERS), &user.uid, Value::Object(fields))
            .await
    }

    /// Upload first, then point the profile at the resolved locator.
    pub async fn set_avatar(&self, upload: MediaUpload) -> Result<String> {
        self.set_image("profile", "profile_image", upload).await
    }

    pub async fn set_banner(&self, upload: MediaUpload) -> Result<String> {
        self.set_image("banner", "banner_image", upload).await
    }

    async fn set_image(
        &self,
        object_name: &str,
        field: &str,
        upload: MediaUpload,
    ) -> Result<String> {
        let user = self.session.current_user().await?;

        let locator = self.media.upload_named(object_name, upload).await?;
        self.store
            .update(
                &CollectionPath::root(USERS),
                &user.uid,
                json!({ field: locator }),
            )
            .await?;

        Ok(locator)
    }

    /// Everyone in the users collection; the contact picker's source.
    pub async fn list_users(&self) -> Result<Vec<Profile>> {
        self.session.current_user().await?;

        let query = Query::collection(CollectionPath::root(USERS))
            .order_by("username", Direction::Ascending);
        let docs = self.store.query(&query).await?;
        docs.into_iter().map(Profile::from_document).collect()
    }
}

/// Denormalized username for records that embed their author, falling
/// back to the session email like the original client did.
pub(crate) async fn display_username(store: &dyn DocumentStore, user: &AuthUser) -> String {
    match store.get(&CollectionPath::root(USERS), &user.uid).await {
        Ok(Some(doc)) => doc
            .data
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or(&user.email)
            .to_string(),
        _ => user.email.clone(),
    }
}

/// Display name and avatar for an arbitrary uid; the raw id stands in
/// when no profile document exists.
pub(crate) async fn display_identity(
    store: &dyn DocumentStore,
    uid: &str,
) -> (String, Option<String>) {
    match store.get(&CollectionPath::root(USERS), uid).await {
        Ok(Some(doc)) => {
            let name = doc
                .data
                .get("username")
                .and_then(|v| v.as_str())
                .unwrap_or(uid)
                .to_string();
            let avatar = doc
                .data
                .get("profile_image")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            (name, avatar)
        }
        _ => (uid.to_string(), None),
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn profile_round_trips_through_the_store() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        let me = app.profile.my_profile().await.unwrap();
        assert_eq!(me.username, "ada");
        assert_eq!(me.email, "ada@example.com");
    }

    #[tokio::test]
    async fn duplicate_profile_is_rejected() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        assert!(matches!(
            app.profile.create_profile("ada2", "Ada Again").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_merges_only_the_given_fields() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        app.profile
            .update_profile(ProfilePatch {
                bio: Some("writes code".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let me = app.profile.my_profile().await.unwrap();
        assert_eq!(me.bio.as_deref(), Some("writes code"));
        assert_eq!(me.username, "ada");
    }

    #[tokio::test]
    async fn avatar_upload_lands_before_the_profile_points_at_it() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        let locator = app
            .profile
            .set_avatar(MediaUpload::new(vec![1, 2, 3]))
            .await
            .unwrap();

        let me = app.profile.my_profile().await.unwrap();
        assert_eq!(me.profile_image.as_deref(), Some(locator.as_str()));
    }

    #[tokio::test]
    async fn failed_avatar_upload_leaves_the_profile_unchanged() {
        let backend = testutil::backend();
        let app = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;

        backend.blobs.fail_uploads(true);
        assert!(app.profile.set_avatar(MediaUpload::new(vec![1])).await.is_err());

        let me = app.profile.my_profile().await.unwrap();
        assert!(me.profile_image.is_none());
    }

    #[tokio::test]
    async fn list_users_feeds_the_contact_picker() {
        let backend = testutil::backend();
        let _ada = testutil::signed_in_app(&backend, "ada@example.com", "ada").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let users = bob.profile.list_users().await.unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["ada", "bob"]);
    }
}
