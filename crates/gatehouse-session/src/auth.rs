//! Token validation hook.
//!
//! Gatehouse doesn't issue or verify tokens itself. It defines the
//! [`TokenValidator`] trait, one async method that turns a bearer token
//! into a [`UserId`] or a [`SessionError::AuthFailed`], and calls it
//! when a CONNECT frame carries `Authorization: Bearer <token>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gatehouse_protocol::UserId;

use crate::SessionError;

/// Validates a bearer token and extracts the caller's user id.
///
/// `Send + Sync + 'static` because a single validator is shared by every
/// connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use gatehouse_protocol::UserId;
/// use gatehouse_session::{SessionError, TokenValidator};
///
/// /// Treats the token itself as the user id. Development only.
/// struct EchoValidator;
///
/// impl TokenValidator for EchoValidator {
///     async fn validate(&self, token: &str) -> Result<UserId, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(UserId::new(token))
///     }
/// }
/// ```
pub trait TokenValidator: Send + Sync + 'static {
    /// Checks the token and returns the user id it was issued to.
    ///
    /// # Returns
    /// - `Ok(UserId)`: the token is valid
    /// - `Err(SessionError::AuthFailed)`: malformed, expired, or revoked
    fn validate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserId, SessionError>> + Send;
}

impl<T: TokenValidator> TokenValidator for Arc<T> {
    fn validate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserId, SessionError>> + Send {
        (**self).validate(token)
    }
}

/// Extracts the token from an `Authorization` header value of the form
/// `Bearer <token>`.
///
/// Returns `None` when the scheme isn't `Bearer`, so callers can fall back
/// to other identity sources. `Some("")` is possible for `"Bearer "` and
/// is left for the validator to reject.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(|rest| rest.split(' ').next().unwrap_or(""))
}

/// A fixed table of tokens, for development servers and tests.
#[derive(Debug, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, TokenEntry>,
    validations: AtomicUsize,
}

#[derive(Debug, Clone)]
enum TokenEntry {
    Valid(UserId),
    Expired,
}

impl StaticTokenValidator {
    /// Creates a validator that rejects every token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as proof of `user`.
    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), TokenEntry::Valid(user));
        self
    }

    /// Recognises `token` but reports it as expired.
    pub fn with_expired(mut self, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), TokenEntry::Expired);
        self
    }

    /// Number of `validate` calls made so far.
    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::Relaxed)
    }
}

impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, SessionError> {
        self.validations.fetch_add(1, Ordering::Relaxed);
        match self.tokens.get(token) {
            Some(TokenEntry::Valid(user)) => Ok(user.clone()),
            Some(TokenEntry::Expired) => {
                Err(SessionError::AuthFailed("token has expired".into()))
            }
            None => Err(SessionError::AuthFailed("token is not recognised".into())),
        }
    }
}
