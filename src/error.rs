use thiserror::Error;

/// Failure reported by a frame fetch backend.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The frame could not be read from its location.
    #[error("failed to read frame {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The bytes were read but could not be decoded as an image.
    #[error("failed to decode frame {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to resize frame {location}: {message}")]
    Resize { location: String, message: String },

    /// The request was abandoned through `cancel_all`.
    #[error("request cancelled")]
    Cancelled,

    /// The blocking decode worker panicked or was aborted.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    /// Backend specific failure that does not fit the variants above.
    #[error("backend error: {0}")]
    Backend(String),
}

pub type FetchResult = Result<Option<crate::events::DecodedFrame>, FetchError>;
