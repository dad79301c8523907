use std::time::Duration;

use capsuleer_core::PlanetId;
use capsuleer_esi::actions::{PiThresholds, pi_planet_detail, pi_planets, pi_status};
use clap::{Args, Subcommand};

use crate::cli::common::{
    build_auth_service, build_query_client, character_token, load_esi_config, print_json,
    required_character,
};

#[derive(Debug, Args)]
pub(crate) struct PiCommand {
    /// Stored character to report on.
    #[arg(long, global = true)]
    character: Option<String>,

    #[command(subcommand)]
    subcmd: PiSubcommand,
}

#[derive(Debug, Subcommand)]
enum PiSubcommand {
    /// Raw list of colonies.
    Planets,

    /// Raw colony layout for one planet.
    Detail {
        #[arg(long)]
        planet_id: i32,
    },

    /// Per-planet extractor, storage and factory status.
    Status {
        /// Flag extractors with fewer hours than this remaining.
        #[arg(long, default_value_t = 6)]
        extractor_warning_hours: u64,

        /// Flag storage above this fill percentage.
        #[arg(long, default_value_t = 80.0)]
        storage_fill_pct: f64,
    },
}

impl PiCommand {
    pub(crate) async fn run(&self, pretty: bool) -> anyhow::Result<()> {
        let name = required_character(self.character.as_deref())?;
        let config = load_esi_config();
        let auth = build_auth_service(&config)?;
        let (character_id, token) = character_token(&auth, &name).await?;
        let esi = build_query_client(&config)?;

        match &self.subcmd {
            PiSubcommand::Planets => {
                print_json(&pi_planets(&esi, character_id, &token).await?, pretty)
            }
            PiSubcommand::Detail { planet_id } => print_json(
                &pi_planet_detail(&esi, character_id, PlanetId(*planet_id), &token).await?,
                pretty,
            ),
            PiSubcommand::Status {
                extractor_warning_hours,
                storage_fill_pct,
            } => {
                let thresholds = PiThresholds {
                    extractor_warning: Duration::from_secs(extractor_warning_hours * 60 * 60),
                    storage_fill_pct: *storage_fill_pct,
                };
                let statuses = pi_status(&esi, character_id, &token, &thresholds).await?;
                let attention = statuses.iter().filter(|status| status.needs_attention).count();
                log::info!("{attention}/{} planet(s) need attention", statuses.len());
                print_json(&statuses, pretty)
            }
        }
    }
}
