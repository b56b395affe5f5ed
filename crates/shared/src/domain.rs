use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque backend asset identifier, used to build proxy image URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideshowSource {
    Memories,
    Albums,
}

impl SlideshowSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Memories => "Memories",
            Self::Albums => "Albums",
        }
    }
}
