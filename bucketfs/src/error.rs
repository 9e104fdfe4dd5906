//! Error types shared by the handle layer and the store adapters.

use std::io;
use thiserror::Error;

/// Failures reported by an [`ObjectBackend`](crate::cadapter::client::ObjectBackend).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store confirmed that the key does not exist.
    #[error("no such key: {key}")]
    NoSuchKey { key: String },

    /// The key cannot be stored by this backend.
    #[error("invalid key: {key:?}")]
    InvalidKey { key: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Anything else the backend reported (network, permissions, throttling).
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Key '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    /// A value operation was invoked on a handle that refers to a directory.
    #[error("Handle '{path}' refers to a directory")]
    IsDirectory { path: String },

    /// A child or listing operation was invoked on a handle that refers to an object.
    #[error("{}", not_a_directory_message(.path, .child.as_deref()))]
    NotADirectory { path: String, child: Option<String> },

    #[error("Content of '{key}' is not valid UTF-8")]
    Encoding { key: String },

    #[error("Transfer of '{key}' was canceled")]
    TransferCanceled { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn not_a_directory_message(path: &str, child: Option<&str>) -> String {
    match child {
        Some(child) => {
            format!("Handle '{path}' is not a directory and cannot have child '{child}'")
        }
        None => format!("Handle '{path}' is not a directory"),
    }
}

impl Error {
    /// True for the programmer errors raised when an operation does not fit
    /// the kind of entry the handle refers to.
    pub fn is_wrong_kind(&self) -> bool {
        matches!(self, Self::IsDirectory { .. } | Self::NotADirectory { .. })
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_directory_message_names_child() {
        let err = Error::NotADirectory {
            path: "colors/red.txt".into(),
            child: Some("shade".into()),
        };
        assert_eq!(
            err.to_string(),
            "Handle 'colors/red.txt' is not a directory and cannot have child 'shade'"
        );
        assert!(err.is_wrong_kind());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_store_not_found_is_not_found() {
        let err: Error = StoreError::NoSuchKey { key: "a".into() }.into();
        assert!(err.is_not_found());

        let err = Error::NotFound {
            bucket: "repository".into(),
            key: "a/b".into(),
        };
        assert_eq!(err.to_string(), "Key 'a/b' not found in bucket 'repository'");
    }
}
