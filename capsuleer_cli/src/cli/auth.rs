use std::time::Duration;

use capsuleer_esi::SessionState;
use clap::{Args, Subcommand};

use crate::cli::common::{
    build_auth_service, load_esi_config, print_credential_details, required_character,
};

#[derive(Debug, Args)]
pub(crate) struct AuthCommand {
    #[command(subcommand)]
    subcmd: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Log in through EVE SSO and store the credential under a name.
    Login(LoginCommand),

    /// List stored characters and their token state.
    List,

    /// Show stored credential metadata.
    Status(CharacterArgs),

    /// Print a valid access token, refreshing it if needed.
    Token(CharacterArgs),

    /// Remove a stored credential.
    Logout(CharacterArgs),
}

impl AuthCommand {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        match &self.subcmd {
            AuthSubcommand::Login(cmd) => cmd.run().await,
            AuthSubcommand::List => list(),
            AuthSubcommand::Status(cmd) => cmd.status(),
            AuthSubcommand::Token(cmd) => cmd.token().await,
            AuthSubcommand::Logout(cmd) => cmd.logout(),
        }
    }
}

#[derive(Debug, Args)]
struct CharacterArgs {
    /// Credential name, e.g. `main`.
    #[arg(long)]
    character: Option<String>,
}

#[derive(Debug, Args)]
struct LoginCommand {
    #[command(flatten)]
    character: CharacterArgs,

    /// Seconds to wait for the browser redirect.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

impl LoginCommand {
    async fn run(&self) -> anyhow::Result<()> {
        let name = required_character(self.character.character.as_deref())?;
        let config = load_esi_config();
        let auth = build_auth_service(&config)?
            .with_callback_timeout(Duration::from_secs(self.timeout_secs));

        if auth.session_state(&name)? == SessionState::Valid {
            println!("Credential '{name}' is already valid; logging in again replaces it.");
        }

        let credential = auth
            .authorize(&name, |login| {
                println!(
                    "Open this URL in your browser:\n\n{}\n",
                    login.authorization_url
                );
                println!("Waiting for callback on {}", config.callback_url);
            })
            .await?;

        println!("Authenticated '{name}' as character {}", credential.character_id);
        print_credential_details(&credential);
        Ok(())
    }
}

fn list() -> anyhow::Result<()> {
    let auth = build_auth_service(&load_esi_config())?;
    let names = auth.list_characters()?;
    if names.is_empty() {
        println!("No stored characters.");
        return Ok(());
    }

    for name in names {
        let state = match auth.session_state(&name)? {
            SessionState::Valid => "valid",
            SessionState::Expired => "expired (refreshable)",
            SessionState::Unauthenticated => "unauthenticated",
        };
        println!("{name}\t{state}");
    }
    Ok(())
}

impl CharacterArgs {
    fn status(&self) -> anyhow::Result<()> {
        let name = required_character(self.character.as_deref())?;
        let auth = build_auth_service(&load_esi_config())?;

        match auth.load_credential(&name)? {
            Some(credential) => print_credential_details(&credential),
            None => println!("No credential stored for '{name}'."),
        }
        Ok(())
    }

    async fn token(&self) -> anyhow::Result<()> {
        let name = required_character(self.character.as_deref())?;
        let auth = build_auth_service(&load_esi_config())?;

        match auth.get_valid_token(&name).await {
            Ok(token) => {
                println!("{token}");
                Ok(())
            }
            Err(err) if err.requires_reauth() => {
                log::error!("{}", err.display_chain());
                anyhow::bail!("'{name}' must log in again: capsuleer auth login --character {name}")
            }
            Err(err) => Err(err.into()),
        }
    }

    fn logout(&self) -> anyhow::Result<()> {
        let name = required_character(self.character.as_deref())?;
        let auth = build_auth_service(&load_esi_config())?;

        auth.logout(&name)?;
        println!("Removed stored credential for '{name}'.");
        Ok(())
    }
}
