//! Error types for the ad slot manager.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible operations return [`Result<T>`] which uses [`Error`]. None of
//! them panic, and none of the failures are meant to reach the page as a
//! crash: callers log or ignore them and the container stays neutral.
//!
//! ```ignore
//! use ad_slot_manager::{Error, Result};
//!
//! fn mount(slot: &SlotController, config: SlotConfig) -> Result<()> {
//!     match slot.mount(config) {
//!         Ok(_completion) => Ok(()),
//!         Err(e) if e.is_benign() => Ok(()),
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Lifecycle | [`Error::LibraryUnavailable`], [`Error::QueueClosed`], [`Error::DuplicateMount`], [`Error::ContainerNotFound`] |
//! | Library | [`Error::DefineFailed`], [`Error::DestroyFailed`], [`Error::Library`] |
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Bridge | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ContainerId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The tag library never became available.
    ///
    /// Callers degrade to "no ad" silently.
    #[error("Tag library unavailable")]
    LibraryUnavailable,

    /// The manager was shut down; nothing more is queued.
    #[error("Manager shut down")]
    QueueClosed,

    /// Container already has a live slot.
    ///
    /// Returned by a second mount without an intervening unmount. Not fatal.
    #[error("Slot already registered for container: {container_id}")]
    DuplicateMount {
        /// Container that is already registered.
        container_id: ContainerId,
    },

    /// Container is not present on the page.
    #[error("Container not found: {container_id}")]
    ContainerNotFound {
        /// Missing container.
        container_id: ContainerId,
    },

    // ========================================================================
    // Library Errors
    // ========================================================================
    /// Library rejected a slot definition.
    ///
    /// The container stays in its neutral placeholder state.
    #[error("Slot definition failed for {container_id}: {reason}")]
    DefineFailed {
        /// Container the slot was meant for.
        container_id: ContainerId,
        /// Why the library rejected it.
        reason: String,
    },

    /// Library failed to destroy one or more slots.
    ///
    /// Swallowed by teardown paths; registry entries are removed regardless.
    #[error("Slot destroy failed: {message}")]
    DestroyFailed {
        /// Description of the failure.
        message: String,
    },

    /// Any other library call failed.
    #[error("Library call {method} failed: {message}")]
    Library {
        /// Command method name.
        method: &'static str,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Bridge Errors
    // ========================================================================
    /// Bridge connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Bridge connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Queued operation was dropped before it ran.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a duplicate mount error.
    #[inline]
    pub fn duplicate_mount(container_id: ContainerId) -> Self {
        Self::DuplicateMount { container_id }
    }

    /// Creates a container not found error.
    #[inline]
    pub fn container_not_found(container_id: ContainerId) -> Self {
        Self::ContainerNotFound { container_id }
    }

    /// Creates a define failed error.
    #[inline]
    pub fn define_failed(container_id: ContainerId, reason: impl Into<String>) -> Self {
        Self::DefineFailed {
            container_id,
            reason: reason.into(),
        }
    }

    /// Creates a destroy failed error.
    #[inline]
    pub fn destroy_failed(message: impl Into<String>) -> Self {
        Self::DestroyFailed {
            message: message.into(),
        }
    }

    /// Creates a library call error.
    #[inline]
    pub fn library(method: &'static str, message: impl Into<String>) -> Self {
        Self::Library {
            method,
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the error only means "no ad this time".
    ///
    /// Benign errors should be ignored by the host without logging noise.
    #[inline]
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::LibraryUnavailable
                | Self::QueueClosed
                | Self::DuplicateMount { .. }
                | Self::DestroyFailed { .. }
        )
    }

    /// Returns `true` if the error came from the tag library.
    #[inline]
    #[must_use]
    pub fn is_library_error(&self) -> bool {
        matches!(
            self,
            Self::LibraryUnavailable
                | Self::DefineFailed { .. }
                | Self::DestroyFailed { .. }
                | Self::Library { .. }
        )
    }

    /// Returns `true` if this is a bridge connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    fn container() -> ContainerId {
        ContainerId::new("ad-top").expect("valid id")
    }

    #[test]
    fn test_error_display() {
        let err = Error::duplicate_mount(container());
        assert_eq!(
            err.to_string(),
            "Slot already registered for container: ad-top"
        );
    }

    #[test]
    fn test_define_failed_display() {
        let err = Error::define_failed(container(), "library returned no slot");
        assert_eq!(
            err.to_string(),
            "Slot definition failed for ad-top: library returned no slot"
        );
    }

    #[test]
    fn test_is_benign() {
        assert!(Error::duplicate_mount(container()).is_benign());
        assert!(Error::LibraryUnavailable.is_benign());
        assert!(Error::QueueClosed.is_benign());
        assert!(Error::destroy_failed("boom").is_benign());
        assert!(!Error::config("bad").is_benign());
        assert!(!Error::define_failed(container(), "bad").is_benign());
    }

    #[test]
    fn test_is_library_error() {
        assert!(Error::library("googletag.display", "boom").is_library_error());
        assert!(Error::define_failed(container(), "bad").is_library_error());
        assert!(!Error::container_not_found(container()).is_library_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("refused").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
