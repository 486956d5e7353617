//! Error types for the session layer.

use gatehouse_protocol::{ChannelId, SessionId, UserId};

/// Why a control frame was refused.
///
/// Authentication outcomes are ordinary values of this enum rather than
/// panics, so the interceptor can hand them to the connection handler
/// as part of its verdict.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The bearer token was malformed, expired, or otherwise rejected by
    /// the [`TokenValidator`](crate::TokenValidator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// CONNECT carried no token and the handshake supplied no user id.
    #[error("no credentials supplied")]
    MissingCredentials,

    /// The identity does not resolve to an active (non-deleted) account.
    #[error("no active account for user {0}")]
    IdentityNotFound(UserId),

    /// The caller is not allowed to perform this operation.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Another subscription already holds this private channel.
    #[error("channel {0} is already subscribed")]
    DuplicateSubscription(ChannelId),

    /// CONNECT arrived on a session that already completed one.
    #[error("session {0} is already connected")]
    AlreadyConnected(SessionId),

    /// The identity was resolved but its session could not be prepared
    /// (user info or game state could not be loaded).
    #[error("session not ready: {0}")]
    NotReady(String),

    /// A collaborator did not answer in time.
    #[error("{0} timed out")]
    TimedOut(&'static str),

    /// A collaborator failed for a reason unrelated to the caller.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl SessionError {
    /// Returns `true` if the connection should be closed after reporting
    /// this error.
    ///
    /// Anything that leaves the session without a trustworthy identity is
    /// fatal. Subscription refusals only reject the one frame.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Unauthorized(_) | Self::DuplicateSubscription(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_errors_are_not_fatal() {
        assert!(!SessionError::DuplicateSubscription(ChannelId::new("c")).is_connection_fatal());
        assert!(!SessionError::Unauthorized("x".into()).is_connection_fatal());
    }

    #[test]
    fn test_authentication_errors_are_fatal() {
        assert!(SessionError::AuthFailed("expired".into()).is_connection_fatal());
        assert!(SessionError::MissingCredentials.is_connection_fatal());
        assert!(SessionError::IdentityNotFound(UserId::new("U1")).is_connection_fatal());
        assert!(SessionError::TimedOut("token validation").is_connection_fatal());
        assert!(SessionError::NotReady("cache".into()).is_connection_fatal());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SessionError::DuplicateSubscription(ChannelId::new("chan-42")).to_string(),
            "channel chan-42 is already subscribed"
        );
        assert_eq!(
            SessionError::TimedOut("identity lookup").to_string(),
            "identity lookup timed out"
        );
    }
}
