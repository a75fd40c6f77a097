use async_trait::async_trait;

use super::model::{AchievementSnapshot, SnapshotPayload};
use crate::global::error::ApiError;
use crate::global::http::MovieoClient;

/// Server side of the achievement tracker
#[async_trait]
pub trait AchievementApi: Send + Sync {
    /// `GET /achievements`, normalised
    async fn fetch_snapshot(&self) -> Result<AchievementSnapshot, ApiError>;

    /// `POST /achievements/check` or `POST /achievements/check/{category}`
    async fn trigger_check(&self, category: Option<&str>) -> Result<(), ApiError>;
}

#[async_trait]
impl AchievementApi for MovieoClient {
    async fn fetch_snapshot(&self) -> Result<AchievementSnapshot, ApiError> {
        let payload: SnapshotPayload = self.get_json("/achievements", &[]).await?;
        AchievementSnapshot::try_from(payload)
    }

    async fn trigger_check(&self, category: Option<&str>) -> Result<(), ApiError> {
        let path = match category {
            Some(category) => format!("/achievements/check/{}", urlencoding::encode(category)),
            None => "/achievements/check".to_string(),
        };
        self.post(&path).await
    }
}
