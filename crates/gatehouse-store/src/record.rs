//! Values the gatekeeper writes into the cache.

use gatehouse_protocol::{SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// The per-user session record stored under `userinfo:<user>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoRecord {
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Unix millis at which CONNECT completed.
    pub connected_at: u64,
}

impl UserInfoRecord {
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }
}
