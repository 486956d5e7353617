//! Interceptor configuration.

use std::time::Duration;

use serde::Deserialize;

/// Destination prefix that marks a private topic.
pub const DEFAULT_PRIVATE_PREFIX: &str = "topic/private/";

/// What SUBSCRIBE does when the user has no `websocket:` channel binding
/// in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPolicy {
    /// Log a warning and let the subscription through.
    #[default]
    WarnAndAllow,
    /// Refuse the subscription as unauthorized.
    Reject,
}

/// Settings for [`FrameInterceptor`](crate::FrameInterceptor) and the
/// connection handler.
///
/// Missing fields take their [`Default`] values when deserialized.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Destinations starting with this prefix (with or without one
    /// leading `/`) are private topics.
    pub private_prefix: String,
    pub binding_policy: BindingPolicy,
    /// Bound on token validation plus identity lookup.
    pub auth_timeout: Duration,
    /// Bound on each batch of cache and durable-store calls.
    pub store_timeout: Duration,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout: Duration,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            private_prefix: DEFAULT_PRIVATE_PREFIX.to_string(),
            binding_policy: BindingPolicy::default(),
            auth_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl InterceptorConfig {
    pub fn private_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.private_prefix = prefix.into();
        self
    }

    pub fn binding_policy(mut self, policy: BindingPolicy) -> Self {
        self.binding_policy = policy;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Returns the channel id if `destination` is a private topic.
    ///
    /// The returned id may be empty (`topic/private/`); callers decide
    /// what that means.
    pub fn private_channel<'a>(&self, destination: &'a str) -> Option<&'a str> {
        let prefix = self.private_prefix.trim_start_matches('/');
        if prefix.is_empty() {
            return None;
        }
        let destination = destination.strip_prefix('/').unwrap_or(destination);
        destination.strip_prefix(prefix)
    }
}
