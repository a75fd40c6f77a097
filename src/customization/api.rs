use std::collections::HashMap;

use async_trait::async_trait;

use super::model::{CustomizationEntry, MediaId, MediaType, SaveCustomizationRequest};
use crate::global::error::ApiError;
use crate::global::http::MovieoClient;

/// Server side of the customization store
#[async_trait]
pub trait CustomizationApi: Send + Sync {
    /// `GET /customization`
    async fn fetch_all(&self) -> Result<HashMap<MediaId, CustomizationEntry>, ApiError>;

    /// `GET /customization/{mediaId}?type={mediaType}`
    async fn fetch_one(
        &self,
        media_id: &MediaId,
        media_type: MediaType,
    ) -> Result<CustomizationEntry, ApiError>;

    /// `PUT /customization/{mediaId}`, returns the canonical stored value
    async fn save(
        &self,
        media_id: &MediaId,
        media_type: MediaType,
        entry: &CustomizationEntry,
    ) -> Result<CustomizationEntry, ApiError>;
}

fn entry_path(media_id: &MediaId) -> String {
    format!("/customization/{}", urlencoding::encode(media_id.as_str()))
}

#[async_trait]
impl CustomizationApi for MovieoClient {
    async fn fetch_all(&self) -> Result<HashMap<MediaId, CustomizationEntry>, ApiError> {
        self.get_json("/customization", &[]).await
    }

    async fn fetch_one(
        &self,
        media_id: &MediaId,
        media_type: MediaType,
    ) -> Result<CustomizationEntry, ApiError> {
        self.get_json(&entry_path(media_id), &[("type", media_type.as_str())])
            .await
    }

    async fn save(
        &self,
        media_id: &MediaId,
        media_type: MediaType,
        entry: &CustomizationEntry,
    ) -> Result<CustomizationEntry, ApiError> {
        let body = SaveCustomizationRequest::new(media_type, entry);
        self.put_json(&entry_path(media_id), &body).await
    }
}
