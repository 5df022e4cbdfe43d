use std::sync::Arc;

use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::error::{CoreError, CoreResult};
use crate::models::Photo;
use crate::services::store::Store;

pub const MAX_PHOTOS: usize = 6;
pub const MAX_PHOTO_URL_LEN: usize = 2048;

/// Photo metadata for profiles: URLs and the primary flag.
///
/// A user holds at most [`MAX_PHOTOS`] photos. The first one added is
/// primary, and deleting the primary promotes the oldest remaining photo.
pub struct PhotoService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> PhotoService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Load a photo, failing unless `user_id` owns it
    async fn owned_photo(&self, user_id: Uuid, photo_id: Uuid) -> CoreResult<Photo> {
        let photo = self
            .store
            .get_photo(photo_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Photo", id: photo_id })?;

        if photo.user_id != user_id {
            return Err(CoreError::Forbidden(format!(
                "photo {} belongs to another user",
                photo_id
            )));
        }
        Ok(photo)
    }

    pub async fn add(&self, user_id: Uuid, url: &str) -> CoreResult<Photo> {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(CoreError::invalid("photo url must be http(s)"));
        }
        if url.chars().count() > MAX_PHOTO_URL_LEN {
            return Err(CoreError::invalid(format!(
                "photo url exceeds {} characters",
                MAX_PHOTO_URL_LEN
            )));
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(CoreError::user_not_found(user_id));
        }

        let photo = Photo {
            id: Uuid::new_v4(),
            user_id,
            url: url.to_string(),
            is_primary: false,
            created_at: self.clock.now(),
        };

        let saved = self
            .store
            .add_photo(photo, MAX_PHOTOS)
            .await?
            .ok_or_else(|| CoreError::invalid(format!("at most {} photos per user", MAX_PHOTOS)))?;

        tracing::debug!("User {} added photo {}", user_id, saved.id);
        Ok(saved)
    }

    /// Primary first, then oldest first
    pub async fn list(&self, user_id: Uuid) -> CoreResult<Vec<Photo>> {
        Ok(self.store.photos_for(user_id).await?)
    }

    pub async fn set_primary(&self, user_id: Uuid, photo_id: Uuid) -> CoreResult<Photo> {
        self.owned_photo(user_id, photo_id).await?;
        self.store
            .set_primary_photo(user_id, photo_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Photo", id: photo_id })
    }

    pub async fn delete(&self, user_id: Uuid, photo_id: Uuid) -> CoreResult<()> {
        self.owned_photo(user_id, photo_id).await?;
        if !self.store.delete_photo(user_id, photo_id).await? {
            return Err(CoreError::NotFound { entity: "Photo", id: photo_id });
        }
        tracing::debug!("User {} deleted photo {}", user_id, photo_id);
        Ok(())
    }
}
