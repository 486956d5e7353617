//! Process-wide record of which session holds which private channel.
//!
//! Every connection task shares one [`SubscriptionRegistry`] through an
//! `Arc`. The check-then-add for a channel is a single `DashMap::entry`
//! call, so the shard lock is held across both halves and two sessions
//! racing for the same channel can never both win.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gatehouse_protocol::{ChannelId, SessionId};

use crate::SessionError;

/// Maps each registered private channel to the session that owns it.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    owners: DashMap<ChannelId, SessionId>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `channel` for `session`.
    ///
    /// # Errors
    /// [`SessionError::DuplicateSubscription`] if any session, including
    /// `session` itself, already holds the channel. The registry is left
    /// unchanged in that case.
    pub fn register(
        &self,
        channel: ChannelId,
        session: &SessionId,
    ) -> Result<(), SessionError> {
        match self.owners.entry(channel) {
            Entry::Occupied(entry) => {
                tracing::debug!(
                    channel = %entry.key(),
                    owner = %entry.get(),
                    %session,
                    "channel already registered"
                );
                Err(SessionError::DuplicateSubscription(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(session.clone());
                Ok(())
            }
        }
    }

    /// Releases `channels` on behalf of `session`, which passes the
    /// channels it recorded. Returns how many were released. A channel
    /// owned by another session is left alone, so a stale list can never
    /// free someone else's subscription.
    pub fn release_session<'a>(
        &self,
        session: &SessionId,
        channels: impl IntoIterator<Item = &'a ChannelId>,
    ) -> usize {
        channels
            .into_iter()
            .filter(|channel| {
                self.owners
                    .remove_if(*channel, |_, owner| owner == session)
                    .is_some()
            })
            .count()
    }

    /// Returns the session currently holding `channel`.
    pub fn owner(&self, channel: &ChannelId) -> Option<SessionId> {
        self.owners.get(channel).map(|owner| owner.value().clone())
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.owners.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: &str) -> ChannelId {
        ChannelId::new(id)
    }

    fn sid(id: &str) -> SessionId {
        SessionId::new(id)
    }

    #[test]
    fn test_register_new_channel_succeeds() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("chan-99"), &sid("s1")).unwrap();
        assert_eq!(registry.owner(&ch("chan-99")), Some(sid("s1")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_from_other_session_fails() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("chan-42"), &sid("s1")).unwrap();

        let result = registry.register(ch("chan-42"), &sid("s2"));

        assert!(matches!(
            result,
            Err(SessionError::DuplicateSubscription(c)) if c == ch("chan-42")
        ));
        assert_eq!(registry.owner(&ch("chan-42")), Some(sid("s1")), "owner unchanged");
    }

    #[test]
    fn test_register_duplicate_from_same_session_fails() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("c"), &sid("s1")).unwrap();
        assert!(registry.register(ch("c"), &sid("s1")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_session_only_touches_its_own_channels() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("a"), &sid("s1")).unwrap();
        registry.register(ch("b"), &sid("s1")).unwrap();
        registry.register(ch("c"), &sid("s2")).unwrap();

        assert_eq!(registry.release_session(&sid("s1"), &[ch("a"), ch("b")]), 2);

        assert!(!registry.contains(&ch("a")));
        assert!(!registry.contains(&ch("b")));
        assert!(registry.contains(&ch("c")));
    }

    #[test]
    fn test_released_channel_can_be_registered_again() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("a"), &sid("s1")).unwrap();
        registry.release_session(&sid("s1"), &[ch("a")]);

        registry.register(ch("a"), &sid("s2")).unwrap();
        assert_eq!(registry.owner(&ch("a")), Some(sid("s2")));
    }

    #[test]
    fn test_release_unknown_session_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("a"), &sid("s1")).unwrap();
        assert_eq!(registry.release_session(&sid("nobody"), &[ch("z")]), 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_release_session_skips_channel_owned_by_other_session() {
        let registry = SubscriptionRegistry::new();
        registry.register(ch("a"), &sid("s1")).unwrap();
        registry.register(ch("b"), &sid("s2")).unwrap();

        let released = registry.release_session(&sid("s1"), &[ch("a"), ch("b")]);

        assert_eq!(released, 1);
        assert_eq!(registry.owner(&ch("b")), Some(sid("s2")));
        assert!(!registry.contains(&ch("a")));
    }
}
