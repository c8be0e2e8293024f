//! Error types for the data source and its session collaborator.
//!
//! Errors never cross the asynchronous boundary as panics: every operation
//! returns them through its `Result`, on the task that awaited it.

use roomkit_core::{EventId, RoomId};
use thiserror::Error;

use crate::DataSourceState;

/// Errors reported by the external session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Room unknown to the session.
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// Network failure (connection lost, request dropped).
    #[error("network error: {0}")]
    Network(String),

    /// Request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Server rejected the request.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Returns true if retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// Errors returned by [`crate::RoomDataSource`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// The data source was destroyed.
    #[error("data source is disposed")]
    Disposed,

    /// Operation requires [`DataSourceState::Ready`].
    #[error("data source not ready (state {0:?})")]
    NotReady(DataSourceState),

    /// Lifecycle operation attempted from the wrong state.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state.
        state: DataSourceState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// Another back-pagination is outstanding.
    #[error("pagination already in progress")]
    PaginationInProgress,

    /// Request aborted by `cancel_all_requests` or `destroy`.
    #[error("request cancelled")]
    Cancelled,

    /// Initial room state, subscription or backfill failed.
    #[error("initialization failed: {0}")]
    Initialization(SessionError),

    /// History request failed.
    #[error("pagination failed: {0}")]
    Pagination(SessionError),

    /// Send request failed; the local echo is marked failed.
    #[error("send failed: {0}")]
    Send(SessionError),

    /// No retryable local echo with this identifier.
    #[error("unknown local echo: {0}")]
    UnknownEcho(EventId),
}

impl DataSourceError {
    /// Returns true if the operation may succeed when retried.
    ///
    /// Lifecycle errors are never transient: a disposed or failed data source
    /// must be recreated.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PaginationInProgress | Self::Cancelled => true,
            Self::Pagination(e) | Self::Send(e) => e.is_transient(),
            Self::Disposed
            | Self::NotReady(_)
            | Self::InvalidState { .. }
            | Self::Initialization(_)
            | Self::UnknownEcho(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_transient() {
        assert!(DataSourceError::Pagination(SessionError::Timeout).is_transient());
        assert!(DataSourceError::Send(SessionError::Network("reset".into())).is_transient());
        assert!(DataSourceError::PaginationInProgress.is_transient());
    }

    #[test]
    fn lifecycle_errors_are_fatal() {
        assert!(!DataSourceError::Disposed.is_transient());
        assert!(!DataSourceError::NotReady(DataSourceState::Preparing).is_transient());
        assert!(
            !DataSourceError::Initialization(SessionError::RoomNotFound("!r".into()))
                .is_transient()
        );
        assert!(!DataSourceError::Send(SessionError::Protocol("forbidden".into())).is_transient());
    }
}
