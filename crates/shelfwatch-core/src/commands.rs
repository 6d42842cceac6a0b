use std::io::Write;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  instrument
};

use crate::cli::Invocation;
use crate::config::{
  Config,
  expand_tilde
};
use crate::datetime::parse_loan_date;
use crate::filter::{
  Filter,
  StatusClass
};
use crate::loan::Loan;
use crate::loans::{
  LoanSource,
  load_loans
};
use crate::render::Renderer;
use crate::sort::{
  parse_sort_specs,
  sort_loans
};
use crate::status::LoanRecord;
use crate::summary::Summary;

/// Everything a command needs besides its arguments.
#[derive(Debug, Clone)]
pub struct AppContext {
  pub cfg:      Config,
  pub renderer: Renderer,
  pub tz:       Tz,
  pub now:      DateTime<Utc>,
  pub loans:    Option<LoanSource>
}

pub fn known_command_names()
-> Vec<&'static str> {
  vec![
    "list",
    "overdue",
    "summary",
    "classify",
    "export",
    "_show",
    "help",
    "version",
  ]
}

pub const DEFAULT_ABBREVIATION_MINIMUM:
  usize = 3;

/// Shortest prefix accepted as a command, from `abbreviation.minimum`.
pub fn abbreviation_minimum(
  cfg: &Config
) -> usize {
  cfg
    .get("abbreviation.minimum")
    .and_then(|raw| {
      raw.trim().parse::<usize>().ok()
    })
    .filter(|min| *min > 0)
    .unwrap_or(
      DEFAULT_ABBREVIATION_MINIMUM
    )
}

pub fn expand_command_abbrev<'a>(
  token: &'a str,
  known: &[&'a str],
  min_len: usize
) -> Option<&'a str> {
  if known.contains(&token) {
    return Some(token);
  }
  if token.chars().count() < min_len {
    return None;
  }

  let mut matches = known
    .iter()
    .copied()
    .filter(|name| {
      name.starts_with(token)
    });
  let first = matches.next()?;
  if matches.next().is_some() {
    None
  } else {
    Some(first)
  }
}

/// Resolves the loan listing from `--loans`, then `loans.file`.
pub fn resolve_loan_source(
  cfg: &Config,
  cli_value: Option<&str>
) -> Option<LoanSource> {
  if let Some(raw) = cli_value {
    return Some(LoanSource::from_arg(
      raw
    ));
  }
  cfg.get("loans.file").map(|raw| {
    match LoanSource::from_arg(&raw) {
      | LoanSource::File(path) => {
        LoanSource::File(expand_tilde(
          &path
        ))
      }
      | stdin => stdin
    }
  })
}

#[instrument(skip(ctx, inv, out), fields(command = %inv.command))]
pub fn dispatch<W: Write>(
  ctx: &AppContext,
  inv: Invocation,
  out: &mut W
) -> anyhow::Result<()> {
  debug!(
    filter = ?inv.filter_terms,
    args = ?inv.command_args,
    now = %ctx.now,
    "dispatching command"
  );

  match inv.command.as_str() {
    | "list" => {
      cmd_list(
        ctx,
        &inv.filter_terms,
        None,
        "report.sort",
        out
      )
    }
    | "overdue" => {
      cmd_list(
        ctx,
        &inv.filter_terms,
        Some(StatusClass::Overdue),
        "report.overdue.sort",
        out
      )
    }
    | "summary" => {
      cmd_summary(
        ctx,
        &inv.filter_terms,
        out
      )
    }
    | "classify" => {
      cmd_classify(
        ctx,
        &inv.command_args,
        out
      )
    }
    | "export" => {
      cmd_export(
        ctx,
        &inv.filter_terms,
        out
      )
    }
    | "_show" => cmd_show(&ctx.cfg, out),
    | "help" => cmd_help(out),
    | "version" => {
      writeln!(
        out,
        "{}",
        env!("CARGO_PKG_VERSION")
      )?;
      Ok(())
    }
    | other => {
      Err(anyhow!(
        "unknown command: {other}"
      ))
    }
  }
}

fn selected_loans(
  ctx: &AppContext,
  filter_terms: &[String],
  status: Option<StatusClass>
) -> anyhow::Result<Vec<Loan>> {
  let source =
    ctx.loans.as_ref().ok_or_else(|| {
      anyhow!(
        "no loan listing given; pass \
         --loans <file> or set \
         loans.file"
      )
    })?;

  let mut filter = Filter::parse(
    filter_terms,
    ctx.now,
    ctx.tz
  )
  .context("invalid filter")?;
  if let Some(class) = status {
    filter = filter.with_status(class);
  }

  let loans =
    load_loans(source, ctx.tz, ctx.now)?;
  let total = loans.len();
  let selected: Vec<Loan> = loans
    .into_iter()
    .filter(|loan| {
      filter.matches(loan, ctx.now)
    })
    .collect();

  info!(
    total,
    selected = selected.len(),
    "applied filter"
  );
  Ok(selected)
}

fn cmd_list<W: Write>(
  ctx: &AppContext,
  filter_terms: &[String],
  status: Option<StatusClass>,
  sort_key: &str,
  out: &mut W
) -> anyhow::Result<()> {
  let mut loans = selected_loans(
    ctx,
    filter_terms,
    status
  )?;

  let specs = parse_sort_specs(
    &ctx
      .cfg
      .get(sort_key)
      .unwrap_or_default()
  );
  sort_loans(&mut loans, &specs, ctx.now);

  if loans.is_empty() {
    writeln!(out, "No matching loans.")?;
    return Ok(());
  }

  ctx.renderer.write_loan_table(
    out, &loans, ctx.now
  )?;
  writeln!(out)?;
  writeln!(
    out,
    "{} loan{}",
    loans.len(),
    if loans.len() == 1 { "" } else { "s" }
  )?;
  Ok(())
}

fn cmd_summary<W: Write>(
  ctx: &AppContext,
  filter_terms: &[String],
  out: &mut W
) -> anyhow::Result<()> {
  let loans = selected_loans(
    ctx,
    filter_terms,
    None
  )?;
  let summary =
    Summary::tally(&loans, ctx.now);
  ctx
    .renderer
    .write_summary(out, &summary)
}

fn cmd_classify<W: Write>(
  ctx: &AppContext,
  args: &[String],
  out: &mut W
) -> anyhow::Result<()> {
  let (due_raw, returned_raw) =
    match args {
      | [due] => (due, None),
      | [due, returned] => {
        (due, Some(returned))
      }
      | _ => {
        return Err(anyhow!(
          "usage: classify <due> \
           [returned]"
        ));
      }
    };

  let due = parse_loan_date(
    due_raw, ctx.now, ctx.tz
  )
  .map_err(|e| e.in_field("due"))?;
  let returned = returned_raw
    .map(|raw| {
      parse_loan_date(
        raw, ctx.now, ctx.tz
      )
      .map_err(|e| {
        e.in_field("returned")
      })
    })
    .transpose()?;

  let record =
    LoanRecord::new(due, returned);
  ctx.renderer.write_classification(
    out, &record, ctx.now
  )
}

fn cmd_export<W: Write>(
  ctx: &AppContext,
  filter_terms: &[String],
  out: &mut W
) -> anyhow::Result<()> {
  let loans = selected_loans(
    ctx,
    filter_terms,
    None
  )?;
  let rows: Vec<_> = loans
    .iter()
    .map(|loan| {
      loan.classified(ctx.now, ctx.tz)
    })
    .collect();
  serde_json::to_writer_pretty(
    &mut *out, &rows
  )
  .context("failed to write export")?;
  writeln!(out)?;
  Ok(())
}

fn cmd_show<W: Write>(
  cfg: &Config,
  out: &mut W
) -> anyhow::Result<()> {
  for file in &cfg.loaded_files {
    writeln!(
      out,
      "# loaded {}",
      file.display()
    )?;
  }
  for (key, value) in cfg.iter() {
    writeln!(out, "{key}={value}")?;
  }
  Ok(())
}

fn cmd_help<W: Write>(
  out: &mut W
) -> anyhow::Result<()> {
  writeln!(
    out,
    "usage: shelfwatch [--loans FILE] \
     [--now DATE] [filter...] \
     <command> [args...]"
  )?;
  writeln!(out)?;
  writeln!(out, "commands:")?;
  for (name, about) in [
    (
      "list",
      "table of matching loans (default)"
    ),
    (
      "overdue",
      "matching loans that are overdue"
    ),
    ("summary", "counts per status"),
    (
      "classify",
      "<due> [returned]: status of one \
       loan"
    ),
    (
      "export",
      "matching loans as JSON"
    ),
    ("_show", "effective configuration"),
    ("help", "this text"),
    ("version", "print version")
  ] {
    writeln!(out, "  {name:<9} {about}")?;
  }
  writeln!(out)?;
  writeln!(
    out,
    "filters: status:<all|active|\
     returned|overdue|returned-late|\
     on-time>, +overdue/-overdue, \
     borrower:, title:, author:, \
     isbn:, due.before:, due.after:, \
     <id>, free text; combine with \
     and/or/()"
  )?;
  Ok(())
}
