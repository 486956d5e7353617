//! Caller identity and session bookkeeping for Gatehouse.
//!
//! 1. **Authentication**: turning a bearer token into a user id
//!    ([`TokenValidator`]) and a user id into an account ([`IdentityStore`])
//! 2. **Session state**: who a connected link belongs to ([`Session`])
//! 3. **Subscriptions**: which session holds which private channel
//!    ([`SubscriptionRegistry`])
//!
//! ```text
//! Interceptor (above)  ← binds principals, registers channels
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol / Transport (below)  ← ids, handshake attributes
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod identity;
mod registry;
mod session;

pub use auth::{bearer_token, StaticTokenValidator, TokenValidator};
pub use error::SessionError;
pub use identity::{Account, IdentityStore, MemoryIdentityStore, Principal};
pub use registry::SubscriptionRegistry;
pub use session::{Session, SessionState, PROVISIONAL_USER_ATTRIBUTE};
