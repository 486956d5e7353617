//! Session types: the server's record of one connected transport link.
//!
//! A session tracks:
//! - WHO is on the other end, once CONNECT has proven it (`principal`)
//! - WHAT the transport handshake told us before that (`attributes`)
//! - WHICH private channels this link registered (`channels`)
//!
//! A session is owned by its connection task and is never shared; other
//! tasks learn about it only through the
//! [`SubscriptionRegistry`](crate::SubscriptionRegistry).

use std::collections::HashSet;
use std::sync::Arc;

use gatehouse_protocol::{ChannelId, SessionId, UserId};
use gatehouse_transport::HandshakeAttributes;
use rand::Rng;

use crate::Principal;

/// Handshake attribute carrying the provisional user id.
pub const PROVISIONAL_USER_ATTRIBUTE: &str = "userId";

/// Lifecycle of a session.
///
/// ```text
///   Handshaken ──(CONNECT ok)──→ Connected ──(DISCONNECT / close)──→ Closed
///       ↑              │
///       └──(rollback)──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, no CONNECT has succeeded yet.
    Handshaken,
    /// CONNECT succeeded and the session's user data is loaded.
    Connected,
    /// Torn down. Nothing on this session is trusted any more.
    Closed,
}

/// A single connected transport link.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    attributes: HandshakeAttributes,
    principal: Option<Arc<dyn Principal>>,
    channels: HashSet<ChannelId>,
    state: SessionState,
}

impl Session {
    /// Creates a session with a freshly generated id.
    pub fn new(attributes: HandshakeAttributes) -> Self {
        Self::with_id(generate_session_id(), attributes)
    }

    /// Creates a session with a caller-chosen id.
    pub fn with_id(id: SessionId, attributes: HandshakeAttributes) -> Self {
        Self {
            id,
            attributes,
            principal: None,
            channels: HashSet::new(),
            state: SessionState::Handshaken,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn attributes(&self) -> &HandshakeAttributes {
        &self.attributes
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The user id supplied at transport handshake, if any. Not trusted
    /// until CONNECT confirms it against the identity store.
    pub fn provisional_user_id(&self) -> Option<UserId> {
        self.attributes
            .get(PROVISIONAL_USER_ATTRIBUTE)
            .filter(|id| !id.is_empty())
            .map(UserId::new)
    }

    /// The bound principal, if any.
    pub fn principal(&self) -> Option<&Arc<dyn Principal>> {
        self.principal.as_ref()
    }

    /// Shortcut for `principal().user_id()`.
    pub fn user_id(&self) -> Option<&UserId> {
        self.principal.as_ref().map(|p| p.user_id())
    }

    /// `true` once CONNECT has fully completed.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.principal.is_some()
    }

    /// Binds a principal. The session is not `Connected` until
    /// [`mark_connected`](Self::mark_connected) is called.
    pub fn bind(&mut self, principal: Arc<dyn Principal>) {
        self.principal = Some(principal);
    }

    /// Marks CONNECT as complete. Has no effect without a bound principal.
    pub fn mark_connected(&mut self) {
        if self.principal.is_some() {
            self.state = SessionState::Connected;
        }
    }

    /// Undoes a [`bind`](Self::bind) that could not be completed.
    pub fn unbind(&mut self) -> Option<Arc<dyn Principal>> {
        self.state = SessionState::Handshaken;
        self.principal.take()
    }

    /// Remembers that this session registered `channel`.
    /// Returns `false` if it was already recorded.
    pub fn record_channel(&mut self, channel: ChannelId) -> bool {
        self.channels.insert(channel)
    }

    /// Channels registered by this session.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.iter()
    }

    /// Ends the session: drops the principal and forgets its channels.
    /// Returns the principal that was bound, if any.
    pub fn close(&mut self) -> Option<Arc<dyn Principal>> {
        self.state = SessionState::Closed;
        self.channels.clear();
        self.principal.take()
    }
}

/// Generates a random 32-character hex session id (128 bits).
fn generate_session_id() -> SessionId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    SessionId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Account;

    fn principal(id: &str) -> Arc<dyn Principal> {
        Arc::new(Account::active(UserId::new(id), id))
    }

    fn attrs(query: &str) -> HandshakeAttributes {
        HandshakeAttributes::from_query(query)
    }

    #[test]
    fn test_new_session_is_handshaken_and_unbound() {
        let session = Session::new(HandshakeAttributes::new());
        assert_eq!(session.state(), SessionState::Handshaken);
        assert!(session.principal().is_none());
        assert!(!session.is_connected());
        assert_eq!(session.id().as_str().len(), 32);
    }

    #[test]
    fn test_new_sessions_get_distinct_ids() {
        let a = Session::new(HandshakeAttributes::new());
        let b = Session::new(HandshakeAttributes::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_provisional_user_id_from_attributes() {
        let session = Session::new(attrs("userId=U1"));
        assert_eq!(session.provisional_user_id(), Some(UserId::new("U1")));
    }

    #[test]
    fn test_provisional_user_id_empty_value_is_none() {
        let session = Session::new(attrs("userId="));
        assert_eq!(session.provisional_user_id(), None);
    }

    #[test]
    fn test_bind_alone_is_not_connected() {
        let mut session = Session::new(HandshakeAttributes::new());
        session.bind(principal("U1"));
        assert_eq!(session.user_id(), Some(&UserId::new("U1")));
        assert!(!session.is_connected());

        session.mark_connected();
        assert!(session.is_connected());
    }

    #[test]
    fn test_mark_connected_without_principal_is_ignored() {
        let mut session = Session::new(HandshakeAttributes::new());
        session.mark_connected();
        assert_eq!(session.state(), SessionState::Handshaken);
    }

    #[test]
    fn test_unbind_rolls_back_to_handshaken() {
        let mut session = Session::new(HandshakeAttributes::new());
        session.bind(principal("U1"));
        session.mark_connected();

        let old = session.unbind().expect("was bound");
        assert_eq!(old.user_id(), &UserId::new("U1"));
        assert_eq!(session.state(), SessionState::Handshaken);
        assert!(session.principal().is_none());
    }

    #[test]
    fn test_close_clears_everything() {
        let mut session = Session::new(HandshakeAttributes::new());
        session.bind(principal("U1"));
        session.mark_connected();
        assert!(session.record_channel(ChannelId::new("c1")));
        assert!(!session.record_channel(ChannelId::new("c1")));

        assert!(session.close().is_some());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.channels().count(), 0);
        assert!(session.close().is_none(), "second close finds nothing bound");
    }
}
