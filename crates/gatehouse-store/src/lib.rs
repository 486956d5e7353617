//! Store collaborators for Gatehouse.
//!
//! The gatekeeper keeps no durable data of its own. It talks to two
//! external stores through traits:
//!
//! - [`EphemeralCache`]: fast, rebuildable key/value data (session
//!   records, channel bindings, live game state)
//! - [`GameStateService`]: moves game state between the durable store
//!   and the cache
//!
//! In-memory implementations ([`MemoryCache`], [`MemoryGameState`]) back
//! the development server and the test suites.

#![allow(async_fn_in_trait)]

mod cache;
mod error;
mod record;
mod state;

pub use cache::{EphemeralCache, MemoryCache, Namespace};
pub use error::StoreError;
pub use record::UserInfoRecord;
pub use state::{GameStateService, MemoryGameState, EMPTY_SNAPSHOT};
