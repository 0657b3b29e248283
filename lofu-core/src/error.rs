use thiserror::Error;

#[derive(Error, Debug)]
pub enum LofuError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Camera is not ready yet (no frame dimensions reported)")]
    CameraNotReady,

    #[error("{endpoint} request failed: {message}")]
    Backend { endpoint: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No images to classify. Please detect feet first.")]
    NoImages,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("A classification batch is already in flight")]
    Busy,

    #[error("Session was discarded before the response arrived")]
    Superseded,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl LofuError {
    pub fn backend(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// Errors that describe a normal "nothing to work on" outcome rather
    /// than a fault.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NoImages)
    }

    /// Errors coming from a remote collaborator (backend or store).
    pub fn is_remote(&self) -> bool {
        match self {
            Self::Backend { .. } | Self::MalformedResponse(_) | Self::Store(_) => true,
            #[cfg(feature = "network")]
            Self::HttpError(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LofuError>;
