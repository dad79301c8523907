use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use capsuleer_core::ids::CharacterId;
use serde::Deserialize;
use url::Url;

use crate::{
    EsiResult,
    auth::{LoginRequest, generate_pkce_pair, generate_state},
    config::EsiConfig,
    errors::AuthError,
};

pub const EVE_SSO_AUTHORIZE_URL: &str = "https://login.eveonline.com/v2/oauth/authorize";
pub const EVE_SSO_TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialAuthTokens {
    pub character_id: CharacterId,
    pub character_name: Option<String>,
    pub scopes: Vec<String>,
    pub access_token: String,
    pub expires_in: Duration,
    pub refresh_token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTokens {
    pub access_token: String,
    pub expires_in: Duration,
    pub refresh_token: String,
}

#[async_trait]
pub trait SsoAuthClient: Send + Sync {
    fn begin_login(&self) -> EsiResult<LoginRequest>;
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<InitialAuthTokens, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokens, AuthError>;
}

/// Public-client (PKCE) SSO flow against EVE's v2 OAuth endpoints.
pub struct EveSsoClient {
    http: reqwest::Client,
    client_id: String,
    callback_url: String,
    scopes: String,
    authorize_url: String,
    token_url: String,
}

impl EveSsoClient {
    pub fn new(config: &EsiConfig) -> EsiResult<Self> {
        config.validate_sso()?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            callback_url: config.callback_url.clone(),
            scopes: config.scopes_for_esi(),
            authorize_url: EVE_SSO_AUTHORIZE_URL.to_owned(),
            token_url: EVE_SSO_TOKEN_URL.to_owned(),
        })
    }

    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self.http.post(&self.token_url).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|err| AuthError::MalformedTokenResponse(err.to_string()))
    }
}

#[async_trait]
impl SsoAuthClient for EveSsoClient {
    fn begin_login(&self) -> EsiResult<LoginRequest> {
        let pkce = generate_pkce_pair();
        let state = generate_state();

        let authorization_url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("redirect_uri", self.callback_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("scope", self.scopes.as_str()),
                ("code_challenge", pkce.code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|_| crate::EsiError::InvalidConfig("SSO authorize URL is not a valid URL"))?;

        Ok(LoginRequest {
            authorization_url: authorization_url.into(),
            state,
            code_verifier: pkce.code_verifier,
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<InitialAuthTokens, AuthError> {
        let tokens = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("code_verifier", code_verifier),
            ])
            .await?;

        let claims = decode_claims(&tokens.access_token)?;
        let character_id = parse_character_id(&claims.sub)?;
        let scopes = parse_scopes(claims.scp)?;

        Ok(InitialAuthTokens {
            character_id,
            character_name: claims.name,
            scopes,
            access_token: tokens.access_token,
            expires_in: Duration::from_secs(tokens.expires_in),
            refresh_token: tokens.refresh_token,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokens, AuthError> {
        let tokens = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .await?;

        Ok(RefreshTokens {
            access_token: tokens.access_token,
            expires_in: Duration::from_secs(tokens.expires_in),
            refresh_token: tokens.refresh_token,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    scp: Option<serde_json::Value>,
}

// SSO already verified the token; only the payload is read here.
fn decode_claims(access_token: &str) -> Result<TokenClaims, AuthError> {
    let payload = access_token.split('.').nth(1).ok_or_else(|| {
        AuthError::MalformedTokenResponse("access token is not a JWT".to_string())
    })?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| AuthError::MalformedTokenResponse(format!("jwt payload: {err}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|err| AuthError::MalformedTokenResponse(format!("jwt claims: {err}")))
}

fn parse_character_id(sub: &str) -> Result<CharacterId, AuthError> {
    let parts: Vec<&str> = sub.split(':').collect();
    if parts.len() != 3 || parts[0] != "CHARACTER" || parts[1] != "EVE" {
        return Err(AuthError::InvalidTokenSubject(sub.to_owned()));
    }

    parts[2]
        .parse::<u64>()
        .map(CharacterId)
        .map_err(|_| AuthError::InvalidTokenSubject(sub.to_owned()))
}

fn parse_scopes(scp: Option<serde_json::Value>) -> Result<Vec<String>, AuthError> {
    match scp {
        None => Ok(Vec::new()),
        Some(value) => {
            let parsed: ScopeClaim = serde_json::from_value(value.clone())
                .map_err(|_| AuthError::InvalidScopeClaim(value.to_string()))?;
            Ok(match parsed {
                ScopeClaim::One(single) => vec![single],
                ScopeClaim::Many(many) => many,
            })
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    One(String),
    Many(Vec<String>),
}
