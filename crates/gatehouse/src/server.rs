//! `GatehouseServer` builder and accept loop.
//!
//! Ties the layers together: transport → codec → interceptor → broker.

use std::sync::Arc;

use gatehouse_protocol::StompCodec;
use gatehouse_session::{IdentityStore, TokenValidator};
use gatehouse_store::{EphemeralCache, GameStateService};
use gatehouse_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Broker, FrameInterceptor, GatehouseError, InterceptorConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<V, I, C, S, B> {
    pub(crate) interceptor: FrameInterceptor<V, I, C, S>,
    pub(crate) broker: B,
    pub(crate) codec: StompCodec,
}

/// Builder for configuring and starting a Gatehouse server.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse::prelude::*;
///
/// let interceptor = FrameInterceptor::new(validator, identities, cache, state);
/// let (broker, frames) = ChannelBroker::new();
/// let server = GatehouseServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(interceptor, broker)
///     .await?;
/// server.run().await
/// ```
pub struct GatehouseServerBuilder {
    bind_addr: String,
    config: Option<InterceptorConfig>,
}

impl GatehouseServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Overrides the interceptor's configuration.
    pub fn config(mut self, config: InterceptorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Binds the WebSocket listener. Frames are encoded with
    /// [`StompCodec`].
    pub async fn build<V, I, C, S, B>(
        self,
        interceptor: FrameInterceptor<V, I, C, S>,
        broker: B,
    ) -> Result<GatehouseServer<V, I, C, S, B>, GatehouseError>
    where
        V: TokenValidator,
        I: IdentityStore,
        C: EphemeralCache,
        S: GameStateService,
        B: Broker,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let interceptor = match self.config {
            Some(config) => interceptor.with_config(config),
            None => interceptor,
        };

        let state = Arc::new(ServerState {
            interceptor,
            broker,
            codec: StompCodec,
        });

        Ok(GatehouseServer { transport, state })
    }
}

impl Default for GatehouseServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gatehouse server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GatehouseServer<V, I, C, S, B> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V, I, C, S, B>>,
}

impl GatehouseServer<(), (), (), (), ()> {
    /// Creates a new builder.
    pub fn builder() -> GatehouseServerBuilder {
        GatehouseServerBuilder::new()
    }
}

impl<V, I, C, S, B> GatehouseServer<V, I, C, S, B>
where
    V: TokenValidator,
    I: IdentityStore,
    C: EphemeralCache,
    S: GameStateService,
    B: Broker,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The interceptor every connection goes through.
    pub fn interceptor(&self) -> &FrameInterceptor<V, I, C, S> {
        &self.state.interceptor
    }

    /// Runs the accept loop, spawning a handler task per connection.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), GatehouseError> {
        tracing::info!("Gatehouse server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
