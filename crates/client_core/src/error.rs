use thiserror::Error;

/// Failures surfaced by the backend client and slideshow controller.
///
/// Fatality is decided by the caller, not the variant: a `Load` during
/// initialization ends the session, the same `Load` during a background
/// refresh is logged and the previous sequence stays visible.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("backend connectivity check failed: {message}")]
    Connectivity { message: String },
    #[error("failed to load slideshow source: {message}")]
    Load { message: String },
    #[error("failed to fetch image '{target}': {message}")]
    Render { target: String, message: String },
    #[error("index {index} out of range for sequence of length {len}")]
    InvalidIndex { index: usize, len: usize },
}

impl ClientError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn render(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            target: target.into(),
            message: message.into(),
        }
    }
}
