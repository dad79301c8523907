use std::time::Duration;

use crate::{EsiError, EsiResult};

pub const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net/latest";
pub const DEFAULT_CALLBACK_URL: &str = "http://127.0.0.1:8089/callback";
pub const DEFAULT_USER_AGENT: &str = concat!("capsuleer/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsiConfig {
    pub client_id: String,
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub user_agent: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            callback_url: DEFAULT_CALLBACK_URL.to_owned(),
            scopes: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            base_url: DEFAULT_ESI_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EsiConfig {
    /// Checks the settings every ESI request depends on.
    pub fn validate(&self) -> EsiResult<()> {
        if self.user_agent.trim().is_empty() {
            return Err(EsiError::InvalidConfig("user_agent must be set"));
        }
        if self.base_url.trim().is_empty() {
            return Err(EsiError::InvalidConfig("ESI base URL must be set"));
        }
        if self.request_timeout.is_zero() {
            return Err(EsiError::InvalidConfig("request timeout must be non-zero"));
        }
        Ok(())
    }

    /// Checks the additional settings needed to talk to EVE SSO.
    pub fn validate_sso(&self) -> EsiResult<()> {
        self.validate()?;
        if self.client_id.trim().is_empty() {
            return Err(EsiError::InvalidConfig("EVE_CLIENT_ID must be set"));
        }
        if self.callback_url.trim().is_empty() {
            return Err(EsiError::InvalidConfig("EVE_CALLBACK_URL must be set"));
        }
        if self.scopes.is_empty() {
            return Err(EsiError::InvalidConfig(
                "at least one ESI scope must be configured",
            ));
        }
        Ok(())
    }

    pub fn scopes_for_esi(&self) -> String {
        self.scopes.join(" ")
    }
}
