//! # Gatehouse
//!
//! Connection-lifecycle gatekeeper for STOMP over WebSocket.
//!
//! Every inbound control frame passes through a [`FrameInterceptor`]
//! before it reaches the [`Broker`]. The interceptor authenticates
//! CONNECT, binds the caller's identity to the session, syncs per-user
//! state with the cache and durable store, tears everything down again on
//! DISCONNECT, and refuses a second subscription to a private channel
//! that is already held.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehouse::prelude::*;
//!
//! // Wire the collaborators, then:
//! // let interceptor = FrameInterceptor::new(validator, identities, cache, state);
//! // let (broker, _frames) = ChannelBroker::new();
//! // let server = GatehouseServer::builder()
//! //     .bind("0.0.0.0:8080")
//! //     .build(interceptor, broker)
//! //     .await?;
//! // server.run().await
//! ```

#![allow(async_fn_in_trait)]

mod broker;
mod config;
mod error;
mod handler;
mod interceptor;
mod server;

pub use broker::{Broker, BrokerError, ChannelBroker, STOMP_VERSION};
pub use config::{BindingPolicy, InterceptorConfig, DEFAULT_PRIVATE_PREFIX};
pub use error::GatehouseError;
pub use interceptor::{FrameInterceptor, Verdict};
pub use server::{GatehouseServer, GatehouseServerBuilder};

/// Everything needed to assemble a server.
pub mod prelude {
    pub use crate::{
        BindingPolicy, Broker, ChannelBroker, FrameInterceptor, GatehouseError,
        GatehouseServer, InterceptorConfig, Verdict,
    };
    pub use gatehouse_protocol::{ChannelId, Command, Frame, SessionId, UserId};
    pub use gatehouse_retry::{spawn_flush_worker, FlushRetryHandle, RetryConfig};
    pub use gatehouse_session::{
        Account, IdentityStore, MemoryIdentityStore, Principal, Session,
        SessionError, StaticTokenValidator, SubscriptionRegistry, TokenValidator,
    };
    pub use gatehouse_store::{
        EphemeralCache, GameStateService, MemoryCache, MemoryGameState, Namespace,
    };
}
