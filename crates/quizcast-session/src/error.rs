//! Session error types.

use quizcast_protocol::PlayerId;

/// Failures in authentication and peer tracking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The token was rejected. The reason is logged server-side; clients
    /// only see that authentication failed.
    #[error("invalid auth token: {0}")]
    InvalidToken(String),

    /// The connection tried a gameplay operation before authenticating.
    #[error("connection is not authenticated")]
    Unauthenticated,

    /// No live connection for this player.
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),

    /// The identity provider itself failed.
    #[error("auth backend error: {0}")]
    Backend(String),
}
