use clap::{ArgAction, Parser, Subcommand};

use crate::cli::{
    auth::AuthCommand, config::ConfigCommand, market::MarketCommand, pi::PiCommand,
    query::QueryCommand, threat::ThreatCommand,
};

pub(crate) fn get_args() -> CliOpts {
    CliOpts::parse()
}

#[derive(Debug, Parser)]
#[command(version = clap::crate_version!(), about = "EVE Online ESI helper")]
pub(crate) struct CliOpts {
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    subcmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// SSO login and stored credential operations.
    Auth(AuthCommand),

    /// Raw ESI endpoint request.
    Query(QueryCommand),

    /// Planetary Interaction reports.
    Pi(PiCommand),

    /// Market prices and Jita spreads.
    Market(MarketCommand),

    /// Score recent hostile activity in a solar system.
    Threat(ThreatCommand),

    /// Dashboard config file checks.
    Config(ConfigCommand),
}

impl CliOpts {
    pub(crate) fn verbose(&self) -> u8 {
        self.verbose
    }

    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        let pretty = self.pretty;
        match &self.subcmd {
            Command::Auth(cmd) => cmd.run().await,
            Command::Query(cmd) => cmd.run(pretty).await,
            Command::Pi(cmd) => cmd.run(pretty).await,
            Command::Market(cmd) => cmd.run(pretty).await,
            Command::Threat(cmd) => cmd.run(pretty).await,
            Command::Config(cmd) => cmd.run(pretty),
        }
    }
}
