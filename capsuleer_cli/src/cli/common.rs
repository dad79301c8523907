use std::{env, path::PathBuf};

use anyhow::Context;
use capsuleer_core::{CharacterId, Timestamp};
use capsuleer_esi::{
    AuthService, Credential, EsiConfig, EveSsoClient, FileTokenStore, QueryClient,
    config::{DEFAULT_CALLBACK_URL, DEFAULT_ESI_BASE_URL, DEFAULT_USER_AGENT},
};
use serde::Serialize;

const DEFAULT_SCOPES: &str = "publicData,esi-planets.manage_planets.v1";

pub(crate) type CliAuthService = AuthService<EveSsoClient, FileTokenStore>;

pub(crate) fn load_esi_config() -> EsiConfig {
    EsiConfig {
        client_id: env::var("EVE_CLIENT_ID").unwrap_or_default(),
        callback_url: env_or("EVE_CALLBACK_URL", DEFAULT_CALLBACK_URL),
        scopes: scopes_from_env(),
        user_agent: env_or("CAPSULEER_USER_AGENT", DEFAULT_USER_AGENT),
        base_url: env_or("CAPSULEER_ESI_BASE_URL", DEFAULT_ESI_BASE_URL),
        ..EsiConfig::default()
    }
}

pub(crate) fn token_file() -> anyhow::Result<PathBuf> {
    match env::var_os("CAPSULEER_TOKEN_FILE") {
        Some(path) => Ok(PathBuf::from(path)),
        None => FileTokenStore::default_path().context("no default credential location"),
    }
}

pub(crate) fn build_auth_service(config: &EsiConfig) -> anyhow::Result<CliAuthService> {
    let client = EveSsoClient::new(config).context("failed to create EVE SSO client")?;
    let store = FileTokenStore::new(token_file()?);
    log::debug!("using credential file {}", store.path().display());
    Ok(AuthService::new(client, store, config.scopes.clone())
        .with_callback_url(config.callback_url.clone()))
}

pub(crate) fn build_query_client(config: &EsiConfig) -> anyhow::Result<QueryClient> {
    QueryClient::from_config(config).context("failed to create ESI query client")
}

/// Explicit `--character`, else `CAPSULEER_CHARACTER`.
pub(crate) fn selected_character(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(ToOwned::to_owned)
        .or_else(|| env::var("CAPSULEER_CHARACTER").ok())
        .filter(|name| !name.trim().is_empty())
}

pub(crate) fn required_character(explicit: Option<&str>) -> anyhow::Result<String> {
    selected_character(explicit)
        .context("character is required; provide --character or set CAPSULEER_CHARACTER")
}

/// A fresh access token plus the id of the character it belongs to.
pub(crate) async fn character_token(
    auth: &CliAuthService,
    character_name: &str,
) -> anyhow::Result<(CharacterId, String)> {
    let token = auth
        .get_valid_token(character_name)
        .await
        .with_context(|| format!("no usable token for '{character_name}'"))?;
    let credential = auth
        .load_credential(character_name)?
        .with_context(|| format!("'{character_name}' disappeared from the credential store"))?;
    Ok((credential.character_id, token))
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn print_credential_details(credential: &Credential) {
    let valid_for = credential
        .access_token_expiry
        .signed_duration_since(Timestamp::now())
        .num_seconds();

    println!("Name: {}", credential.character_name);
    println!("Character: {}", credential.character_id);
    println!("Scopes: {}", credential.scopes.join(","));
    println!("Updated at: {}", credential.updated_at);
    println!(
        "Access token valid until: {} ({})",
        credential.access_token_expiry,
        if valid_for >= 0 {
            format!("in {valid_for}s")
        } else {
            format!("expired {}s ago", -valid_for)
        }
    );
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn scopes_from_env() -> Vec<String> {
    let raw = env::var("EVE_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.to_owned());
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
