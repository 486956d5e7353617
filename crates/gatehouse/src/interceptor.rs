//! The frame interceptor: every inbound control frame passes through
//! here before the broker sees it.
//!
//! - CONNECT / STOMP authenticates the caller, binds the principal and
//!   prepares per-user state (user info record, hydrated game state).
//! - DISCONNECT flushes game state and tears the session down. It never
//!   fails; the same teardown runs from [`FrameInterceptor::release`]
//!   when the transport closes without a DISCONNECT.
//! - SUBSCRIBE to a private topic is refused when another session already
//!   holds the channel.
//!
//! Everything else passes through untouched.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gatehouse_protocol::{header, ChannelId, Command, Frame, SessionId, UserId};
use gatehouse_retry::FlushRetryHandle;
use gatehouse_session::{
    bearer_token, IdentityStore, Principal, Session, SessionError,
    SubscriptionRegistry, TokenValidator,
};
use gatehouse_store::{EphemeralCache, GameStateService, Namespace, UserInfoRecord};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{BindingPolicy, InterceptorConfig};

/// Outcome of intercepting one frame.
#[derive(Debug)]
pub enum Verdict {
    /// Hand the frame to the broker.
    Forward(Frame),
    /// Discard the frame and report the error to the client.
    Drop(SessionError),
}

impl Verdict {
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward(_))
    }
}

/// Gatekeeper for CONNECT, DISCONNECT and SUBSCRIBE.
///
/// Generic over its collaborators so production backends and the
/// in-memory ones used by tests plug in the same way. One interceptor
/// is shared by every connection; per-connection state lives in the
/// [`Session`] passed to each call.
pub struct FrameInterceptor<V, I, C, S> {
    validator: V,
    identities: I,
    cache: C,
    state: Arc<S>,
    registry: Arc<SubscriptionRegistry>,
    retry: Option<FlushRetryHandle>,
    config: InterceptorConfig,
}

impl<V, I, C, S> FrameInterceptor<V, I, C, S>
where
    V: TokenValidator,
    I: IdentityStore,
    C: EphemeralCache,
    S: GameStateService,
{
    /// Creates an interceptor with a fresh registry, no retry worker and
    /// the default configuration.
    pub fn new(validator: V, identities: I, cache: C, state: Arc<S>) -> Self {
        Self {
            validator,
            identities,
            cache,
            state,
            registry: Arc::new(SubscriptionRegistry::new()),
            retry: None,
            config: InterceptorConfig::default(),
        }
    }

    /// Shares `registry` with other interceptors in the process.
    pub fn with_registry(mut self, registry: Arc<SubscriptionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Hands failed DISCONNECT flushes to `retry`.
    pub fn with_retry(mut self, retry: FlushRetryHandle) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_config(mut self, config: InterceptorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Inspects `frame` on behalf of `session` and decides whether it may
    /// reach the broker.
    pub async fn intercept(&self, frame: Frame, session: &mut Session) -> Verdict {
        let outcome = match frame.command {
            Command::Connect | Command::Stomp => self.connect(&frame, session).await,
            Command::Disconnect => {
                self.release(session).await;
                Ok(())
            }
            Command::Subscribe => self.subscribe(&frame, session).await,
            _ => Ok(()),
        };

        match outcome {
            Ok(()) => Verdict::Forward(frame),
            Err(e) => {
                debug!(
                    session_id = %session.id(),
                    command = %frame.command,
                    error = %e,
                    "frame dropped"
                );
                Verdict::Drop(e)
            }
        }
    }

    /// Tears the session down: flushes game state, removes the user info
    /// record and releases every channel the session registered.
    ///
    /// Never fails and is safe to call more than once. Does nothing when
    /// no principal is bound.
    pub async fn release(&self, session: &mut Session) {
        let Some(user) = session.user_id().cloned() else {
            return;
        };
        let session_id = session.id().clone();

        match within(self.config.store_timeout, self.state.persist_for_identity(&user)).await {
            Ok(()) => debug!(%session_id, %user, "game state flushed"),
            Err(e) => {
                warn!(%session_id, %user, error = %e, "game state flush failed");
                self.schedule_retry(user.clone());
            }
        }

        self.discard_user_info(&user, &session_id).await;

        let released = self.registry.release_session(&session_id, session.channels());
        session.close();
        info!(%session_id, %user, released, "session released");
    }

    // -----------------------------------------------------------------------
    // CONNECT
    // -----------------------------------------------------------------------

    async fn connect(&self, frame: &Frame, session: &mut Session) -> Result<(), SessionError> {
        if session.is_connected() {
            return Err(SessionError::AlreadyConnected(session.id().clone()));
        }

        let provisional = session.provisional_user_id();
        let principal = timeout(self.config.auth_timeout, self.authenticate(frame, provisional))
            .await
            .map_err(|_| SessionError::TimedOut("authentication"))??;

        let user = principal.user_id().clone();
        session.bind(principal);

        let prepared = timeout(
            self.config.store_timeout,
            self.prepare_session(&user, session.id()),
        )
        .await;
        let result = match prepared {
            Ok(result) => result,
            Err(_) => {
                // Unknown how far setup got.
                self.discard_user_info(&user, session.id()).await;
                Err(SessionError::TimedOut("session setup"))
            }
        };
        if let Err(e) = result {
            session.unbind();
            warn!(session_id = %session.id(), %user, error = %e, "CONNECT aborted");
            return Err(e);
        }

        session.mark_connected();
        info!(session_id = %session.id(), %user, "session connected");
        Ok(())
    }

    /// Resolves the caller to an active principal. A bearer token wins
    /// over the handshake user id.
    async fn authenticate(
        &self,
        frame: &Frame,
        provisional: Option<UserId>,
    ) -> Result<Arc<dyn Principal>, SessionError> {
        let token = frame.header(header::AUTHORIZATION).and_then(bearer_token);
        let user = match token {
            Some(token) => self.validator.validate(token).await.inspect_err(|e| {
                warn!(error = %e, "bearer token rejected");
            })?,
            None => provisional.ok_or(SessionError::MissingCredentials)?,
        };

        let found = self.identities.find_active(&user).await?;
        found.ok_or(SessionError::IdentityNotFound(user))
    }

    /// Writes the user info record, then hydrates game state. Undoes the
    /// record if hydration fails.
    async fn prepare_session(&self, user: &UserId, session_id: &SessionId) -> Result<(), SessionError> {
        let record = UserInfoRecord {
            user_id: user.clone(),
            session_id: session_id.clone(),
            connected_at: unix_millis(),
        };
        let json = record
            .to_json()
            .map_err(|e| SessionError::NotReady(format!("user info: {e}")))?;
        self.cache
            .set(&Namespace::UserInfo.key(user), json)
            .await
            .map_err(|e| SessionError::NotReady(format!("user info: {e}")))?;

        if let Err(e) = self.state.load_for_identity(user).await {
            self.discard_user_info(user, session_id).await;
            return Err(SessionError::NotReady(format!("game state: {e}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // SUBSCRIBE
    // -----------------------------------------------------------------------

    async fn subscribe(&self, frame: &Frame, session: &mut Session) -> Result<(), SessionError> {
        let user = match session.user_id() {
            Some(user) if session.is_connected() => user.clone(),
            _ => return Err(SessionError::Unauthorized("SUBSCRIBE before CONNECT".into())),
        };

        let Some(channel) = frame
            .destination()
            .and_then(|d| self.config.private_channel(d))
        else {
            return Ok(());
        };
        if channel.is_empty() {
            return Err(SessionError::Unauthorized(
                "private destination has no channel id".into(),
            ));
        }

        self.check_binding(&user, session.id()).await?;

        let channel = ChannelId::new(channel);
        self.registry.register(channel.clone(), session.id())?;
        session.record_channel(channel.clone());
        debug!(session_id = %session.id(), %user, %channel, "private channel registered");
        Ok(())
    }

    async fn check_binding(&self, user: &UserId, session_id: &SessionId) -> Result<(), SessionError> {
        let key = Namespace::WebSocket.key(user);
        let bound = match within(self.config.store_timeout, self.cache.exists(&key)).await {
            Ok(bound) => bound,
            Err(e) => {
                warn!(%session_id, %user, error = %e, "channel binding lookup failed");
                false
            }
        };
        if bound {
            return Ok(());
        }

        match self.config.binding_policy {
            BindingPolicy::WarnAndAllow => {
                warn!(%session_id, %user, "no channel binding for user, subscribing anyway");
                Ok(())
            }
            BindingPolicy::Reject => Err(SessionError::Unauthorized(format!(
                "no channel binding for user {user}"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Deletes `userinfo:<user>` if the record belongs to `session_id`.
    /// A record written by a newer session of the same user is kept.
    /// Failures are logged only.
    async fn discard_user_info(&self, user: &UserId, session_id: &SessionId) {
        let key = Namespace::UserInfo.key(user);
        let stored = match within(self.config.store_timeout, self.cache.get(&key)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(e) => {
                warn!(%session_id, %user, error = %e, "user info lookup failed");
                return;
            }
        };
        match UserInfoRecord::from_json(&stored) {
            Ok(record) if record.session_id == *session_id => {}
            Ok(record) => {
                debug!(%session_id, %user, owner = %record.session_id, "user info belongs to another session, kept");
                return;
            }
            Err(e) => {
                warn!(%session_id, %user, error = %e, "unreadable user info record, kept");
                return;
            }
        }

        match within(self.config.store_timeout, self.cache.delete(&key)).await {
            Ok(true) => debug!(%session_id, %user, "user info removed"),
            Ok(false) => {}
            Err(e) => warn!(%session_id, %user, error = %e, "user info removal failed"),
        }
    }

    fn schedule_retry(&self, user: UserId) {
        let Some(retry) = &self.retry else {
            warn!(%user, "no retry worker configured, game state flush lost");
            return;
        };
        if let Err(e) = retry.enqueue(user) {
            warn!(error = %e, "could not schedule game state flush retry");
        }
    }
}

/// Runs a best-effort store call under `limit`, folding a timeout into
/// the error message.
async fn within<T, E>(
    limit: Duration,
    call: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, String>
where
    E: std::fmt::Display,
{
    match timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {limit:?}")),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
