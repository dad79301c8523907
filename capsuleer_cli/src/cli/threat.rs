use capsuleer_core::SolarSystemId;
use capsuleer_esi::actions::threat_assessment;
use clap::Args;

use crate::cli::common::{build_query_client, load_esi_config, print_json};

#[derive(Debug, Args)]
pub(crate) struct ThreatCommand {
    #[arg(long)]
    system_id: i32,

    /// Recent PVP kills reported by an external killboard.
    #[arg(long, default_value_t = 0)]
    pvp_kills: u64,
}

impl ThreatCommand {
    pub(crate) async fn run(&self, pretty: bool) -> anyhow::Result<()> {
        let esi = build_query_client(&load_esi_config())?;
        let assessment =
            threat_assessment(&esi, SolarSystemId(self.system_id), self.pvp_kills).await?;
        log::info!(
            "system {} threat is {} (score {})",
            assessment.system_id,
            assessment.level,
            assessment.score
        );
        print_json(&assessment, pretty)
    }
}
