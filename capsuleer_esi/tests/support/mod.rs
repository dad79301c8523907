#![allow(dead_code)]

use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use capsuleer_esi::{AuthService, EsiConfig, EveSsoClient, FileTokenStore};
use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

pub const PLANETS_SCOPE: &str = "esi-planets.manage_planets.v1";

/// Mock SSO server plus a credential file in a scratch directory.
pub struct SsoHarness {
    pub server: MockServer,
    _temp_dir: TempDir,
    token_path: PathBuf,
}

impl SsoHarness {
    pub async fn start() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let token_path = temp_dir.path().join("credentials.json");
        Self {
            server: MockServer::start().await,
            _temp_dir: temp_dir,
            token_path,
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn store(&self) -> FileTokenStore {
        FileTokenStore::new(&self.token_path)
    }

    pub fn config(&self) -> EsiConfig {
        EsiConfig {
            client_id: "client-123".to_string(),
            scopes: vec![PLANETS_SCOPE.to_string()],
            ..EsiConfig::default()
        }
    }

    pub fn sso_client(&self) -> EveSsoClient {
        EveSsoClient::new(&self.config())
            .expect("sso client")
            .with_endpoints(
                format!("{}/v2/oauth/authorize", self.server.uri()),
                format!("{}/v2/oauth/token", self.server.uri()),
            )
    }

    pub fn auth_service(&self) -> AuthService<EveSsoClient, FileTokenStore> {
        AuthService::new(
            self.sso_client(),
            self.store(),
            vec![PLANETS_SCOPE.to_string()],
        )
    }

    /// Answers one `authorization_code` grant for `code`.
    pub async fn mount_code_exchange(&self, code: &str, refresh_token: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(token_response(
                &access_token(90_000_001, "initial"),
                refresh_token,
                expires_in,
            ))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Answers exactly one `refresh_token` grant presenting `old_refresh`.
    pub async fn mount_refresh(&self, old_refresh: &str, new_refresh: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={old_refresh}")))
            .respond_with(token_response(
                &access_token(90_000_001, new_refresh),
                new_refresh,
                expires_in,
            ))
            .expect(1)
            .mount(&self.server)
            .await;
    }
}

pub fn access_token(character_id: u64, marker: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": format!("CHARACTER:EVE:{character_id}"),
            "name": "Test Pilot",
            "scp": [PLANETS_SCOPE],
            "jti": marker,
        })
        .to_string(),
    );
    format!("{header}.{payload}.signature")
}

fn token_response(access_token: &str, refresh_token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "expires_in": expires_in,
        "token_type": "Bearer",
        "refresh_token": refresh_token,
    }))
}

/// A loopback URL on a port that was free a moment ago.
pub fn free_callback_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let port = listener.local_addr().expect("probe addr").port();
    format!("http://127.0.0.1:{port}/callback")
}
