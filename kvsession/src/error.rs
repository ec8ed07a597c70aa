//! Error types returned by the session stores.

use thiserror::Error;

use crate::client::CacheClientError;

const ERROR_PREFIX: &str = "session store error:";

/// A boxed error produced by a [`SessionCodec`](crate::codec::SessionCodec).
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// An error that can occur while managing sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The cache client failed to execute an operation.
    #[error("{ERROR_PREFIX} {0}")]
    Client(#[from] CacheClientError),
    /// The session values could not be serialized.
    #[error("{ERROR_PREFIX} could not encode session values: {0}")]
    Encode(CodecError),
    /// The stored session payload could not be deserialized.
    #[error("{ERROR_PREFIX} could not decode session payload: {0}")]
    Decode(CodecError),
    /// The configuration could not be parsed.
    #[error("{ERROR_PREFIX} invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// A type alias for results that can contain an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_message() {
        let error = Error::from(CacheClientError::Backend("connection refused".to_string()));
        assert_eq!(
            error.to_string(),
            "session store error: cache client error: backend error: connection refused"
        );
    }

    #[test]
    fn decode_error_message() {
        let error = Error::Decode(Box::new(std::io::Error::other("trailing characters")));
        assert_eq!(
            error.to_string(),
            "session store error: could not decode session payload: trailing characters"
        );
    }

    #[test]
    fn config_error_from_toml() {
        let toml_error = toml::from_str::<toml::Table>("prefix = ").unwrap_err();
        let error = Error::from(toml_error);
        assert!(matches!(error, Error::Config(_)));
    }
}
