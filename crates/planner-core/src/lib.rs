pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod holidays;
pub mod query;
pub mod render;
pub mod state;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting planner CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.plannerrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;
  let mut state = store.load_state()?;

  let mut renderer =
    render::Renderer::new(
      &cfg,
      state.settings.theme
    )?;

  let clock = datetime::Clock::new(
    Utc::now(),
    datetime::ProjectZone::resolve(&cfg)
  );
  debug!(zone = %clock.zone, today = %clock.today(), "resolved clock");

  commands::dispatch(
    &store,
    &mut state,
    &cfg,
    &mut renderer,
    cli.command,
    clock
  )?;

  info!("done");
  Ok(())
}
