use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::AssetId;

/// One image as served by the backend list endpoints. Records are replaced
/// wholesale on refresh, never mutated field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: AssetId,
    #[serde(
        rename = "originalFileName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_file_name: Option<String>,
    #[serde(
        rename = "fileCreatedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub file_created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "thumbnailUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thumbnail_url: Option<String>,
    #[serde(
        rename = "memoryType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_type: Option<String>,
    #[serde(rename = "albumName", default, skip_serializing_if = "Option::is_none")]
    pub album_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub assets: Vec<ImageRecord>,
}

/// `GET /api/immich/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /api/memories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoriesResponse {
    pub success: bool,
    #[serde(default)]
    pub memories: Vec<ImageRecord>,
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /api/albums`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumsResponse {
    pub success: bool,
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRecord>>,
    #[serde(default)]
    pub album_count: usize,
    #[serde(default)]
    pub total_assets: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlbumsResponse {
    /// Flattened image list for the albums slideshow: the backend sends a
    /// pre-flattened `images` array when it has one, otherwise the album
    /// assets are concatenated in album order.
    pub fn flattened_images(&self) -> Vec<ImageRecord> {
        if let Some(images) = &self.images {
            return images.clone();
        }
        self.albums
            .iter()
            .flat_map(|album| album.assets.iter().cloned())
            .collect()
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `GET /api/config` (display-only settings echoed by the backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub immich_url: String,
    #[serde(default)]
    pub show_memories: bool,
    #[serde(default)]
    pub show_albums: bool,
    #[serde(default)]
    pub albums: Vec<String>,
}
