use std::time::Duration;

use capsuleer_core::{ids::CharacterId, time::Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRequest {
    pub authorization_url: String,
    pub state: String,
    pub code_verifier: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Credential {
    pub character_name: String,
    pub character_id: CharacterId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expiry: Timestamp,
    pub scopes: Vec<String>,
    pub updated_at: Timestamp,
}

impl Credential {
    pub fn should_refresh(&self, now: Timestamp, refresh_skew: Duration) -> bool {
        match now.checked_add(refresh_skew) {
            Some(deadline) => self.access_token_expiry <= deadline,
            None => true,
        }
    }

    pub fn state_at(&self, now: Timestamp, refresh_skew: Duration) -> SessionState {
        if self.should_refresh(now, refresh_skew) {
            SessionState::Expired
        } else {
            SessionState::Valid
        }
    }
}

/// Where a character sits in the token lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Valid,
    Expired,
}
