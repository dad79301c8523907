use capsuleer_esi::EsiError;

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::get_args();
    init_logging(cmd.verbose());
    log::trace!("parsed arguments: {cmd:?}");

    if let Err(err) = cmd.run().await {
        for line in failure_report(&err) {
            log::error!("{line}");
        }
        anyhow::bail!("capsuleer command failed (rerun with -v for details)");
    }
    Ok(())
}

/// ESI failures are rendered with their full source chain; anything else uses
/// anyhow's alternate rendering, which already joins the causes.
fn failure_report(err: &anyhow::Error) -> Vec<String> {
    let Some(esi) = err.chain().find_map(|cause| cause.downcast_ref::<EsiError>()) else {
        return vec![format!("{err:#}")];
    };

    // anyhow's own downcast also sees through `.context`, so inspect the chain.
    let outermost_is_esi = err
        .chain()
        .next()
        .is_some_and(|outer| outer.downcast_ref::<EsiError>().is_some());
    let mut lines = vec![if outermost_is_esi {
        esi.display_chain().to_string()
    } else {
        format!("{err}: {}", esi.display_chain())
    }];
    if esi.requires_reauth() {
        lines.push("stored credential is no longer usable; run `capsuleer auth login`".to_string());
    }
    lines
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}
