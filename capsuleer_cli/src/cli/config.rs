use std::path::PathBuf;

use anyhow::Context;
use capsuleer_config::{ConfigError, load_config, validate_dashboard};
use clap::{Args, Subcommand};

use crate::cli::common::print_json;

#[derive(Debug, Args)]
pub(crate) struct ConfigCommand {
    #[command(subcommand)]
    subcmd: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Check a dashboard config file against the schema.
    Validate {
        path: PathBuf,

        /// Skip `$ENV:NAME` resolution.
        #[arg(long)]
        no_env: bool,
    },
}

impl ConfigCommand {
    pub(crate) fn run(&self, pretty: bool) -> anyhow::Result<()> {
        match &self.subcmd {
            ConfigSubcommand::Validate { path, no_env } => {
                if *no_env {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let document = serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?;
                    return match validate_dashboard(&document) {
                        Ok(()) => {
                            println!("{} is valid", path.display());
                            Ok(())
                        }
                        Err(err) => report_violations(&ConfigError::Invalid(err)),
                    };
                }

                match load_config(path) {
                    Ok(config) => print_json(&config, pretty),
                    Err(err @ ConfigError::Invalid(_)) => report_violations(&err),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}

fn report_violations(err: &ConfigError) -> anyhow::Result<()> {
    for violation in err.violations() {
        println!("{violation}");
    }
    anyhow::bail!("{err}")
}
