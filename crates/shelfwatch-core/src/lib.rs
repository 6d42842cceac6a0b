pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod loan;
pub mod loans;
pub mod render;
pub mod sort;
pub mod status;
pub mod summary;

use std::ffi::OsString;
use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::clock::{
  Clock,
  FixedClock,
  SystemClock
};
pub use crate::error::LoanError;
pub use crate::status::{
  LoanRecord,
  OverdueStatus,
  classify
};

/// Exit status for a failed run: 2 when loan data was invalid, else 1.
pub fn exit_code_for(
  err: &anyhow::Error
) -> u8 {
  if err
    .chain()
    .any(|cause| cause.is::<LoanError>())
  {
    2
  } else {
    1
  }
}

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  run_with_clock(raw_args, SystemClock)
}

/// Entry point with an injectable clock; `--now` still takes precedence.
pub fn run_with_clock<C: Clock>(
  raw_args: Vec<OsString>,
  clock: C
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
    "starting shelfwatch"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.shelfwatchrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let tz = datetime::resolve_timezone(
    cfg.get("timezone").as_deref()
  );

  let system_now = clock.now();
  let now = match cli.now.as_deref() {
    | Some(raw) => {
      datetime::parse_loan_date(
        raw, system_now, tz
      )
      .map_err(|e| e.in_field("--now"))
      .context(
        "failed to resolve reference \
         instant"
      )?
    }
    | None => system_now
  };
  debug!(%now, timezone = tz.name(), "evaluation instant");

  let renderer =
    render::Renderer::new(&cfg, tz)?;
  let loans = commands::resolve_loan_source(
    &cfg,
    cli.loans.as_deref()
  );
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let ctx = commands::AppContext {
    cfg,
    renderer,
    tz,
    now,
    loans
  };

  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  commands::dispatch(&ctx, inv, &mut out)?;
  out.flush()?;

  info!("done");
  Ok(())
}

#[cfg(test)]
mod tests {
  use anyhow::{
    Context,
    anyhow
  };

  use super::exit_code_for;
  use crate::error::LoanError;

  #[test]
  fn invalid_loan_data_exits_with_two() {
    let err: anyhow::Error =
      Err::<(), _>(LoanError::invalid_date(
        "due",
        "31/12/2023",
        "unrecognized date expression"
      ))
      .context("loan 2 in loans.json")
      .context("failed loading loans")
      .expect_err("error");
    assert_eq!(exit_code_for(&err), 2);
  }

  #[test]
  fn other_failures_exit_with_one() {
    let err = anyhow!("unknown command: frobnicate");
    assert_eq!(exit_code_for(&err), 1);

    let io = std::io::Error::other("disk gone");
    let err = anyhow::Error::new(io)
      .context("failed reading loans");
    assert_eq!(exit_code_for(&err), 1);
  }
}
