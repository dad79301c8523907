use capsuleer_core::TypeId;
use capsuleer_esi::actions::{market_prices, market_spread};
use clap::{Args, Subcommand};

use crate::cli::common::{build_query_client, load_esi_config, print_json};

#[derive(Debug, Args)]
pub(crate) struct MarketCommand {
    #[command(subcommand)]
    subcmd: MarketSubcommand,
}

#[derive(Debug, Subcommand)]
enum MarketSubcommand {
    /// Adjusted and average prices for all types.
    Prices,

    /// Lowest sell, highest buy and spread in The Forge.
    Spread {
        #[arg(long)]
        type_id: i32,
    },
}

impl MarketCommand {
    pub(crate) async fn run(&self, pretty: bool) -> anyhow::Result<()> {
        let esi = build_query_client(&load_esi_config())?;

        match &self.subcmd {
            MarketSubcommand::Prices => print_json(&market_prices(&esi).await?, pretty),
            MarketSubcommand::Spread { type_id } => {
                print_json(&market_spread(&esi, None, TypeId(*type_id)).await?, pretty)
            }
        }
    }
}
