use std::io;
use thiserror::Error;

/// Failure to percent-decode a single parameter key or value.
///
/// Never fatal: the raw text is kept and the failure is recorded as a
/// [`Diagnostic`](crate::params::Diagnostic).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid percent escape at byte {position}")]
    InvalidEscape { position: usize },

    #[error("decoded bytes are not valid utf-8")]
    InvalidUtf8,
}

impl DecodeError {
    pub fn invalid_escape(position: usize) -> Self {
        Self::InvalidEscape { position }
    }
}

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("multipart error: {source}")]
    Multipart {
        #[from]
        source: multer::Error,
    },

    #[error("failed to encode parameters: {source}")]
    Encode {
        #[from]
        source: serde_urlencoded::ser::Error,
    },

    #[error("failed to deserialize parameters: {source}")]
    Deserialize {
        #[from]
        source: serde_urlencoded::de::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("routes must be set")]
    MissingRoutes,

    #[error("address must be set")]
    MissingAddress,

    #[error("invalid address: {source}")]
    InvalidAddress { source: io::Error },
}
