use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "shelfwatch",
    version,
    about = "Loan status and overdue tracking for library listings",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "shelfwatchrc")]
    pub shelfwatchrc: Option<PathBuf>,

    /// Loan listing (JSON Lines or JSON array); `-` reads stdin.
    #[arg(long = "loans")]
    pub loans: Option<String>,

    /// Reference instant for status evaluation (defaults to the current time).
    #[arg(long = "now", allow_hyphen_values = true)]
    pub now: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub filter_terms: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let default_command = cfg
            .get("default.command")
            .unwrap_or_else(|| "list".to_string());

        if tokens.is_empty() {
            debug!(command = %default_command, "no explicit command, using default");
            return Ok(Self {
                filter_terms: vec![],
                command: default_command,
                command_args: vec![],
            });
        }

        let min_abbrev = crate::commands::abbreviation_minimum(cfg);
        match split_filter_command(&tokens, min_abbrev) {
            Some((filter_terms, command, command_args)) => Ok(Self {
                filter_terms,
                command,
                command_args,
            }),
            None => {
                warn!(
                    command = %default_command,
                    "no command detected, treating all terms as filter"
                );
                Ok(Self {
                    filter_terms: tokens,
                    command: default_command,
                    command_args: vec![],
                })
            }
        }
    }
}

fn split_filter_command(tokens: &[String], min_abbrev: usize) -> Option<(Vec<String>, String, Vec<String>)> {
    let known = crate::commands::known_command_names();

    for (i, token) in tokens.iter().enumerate() {
        if let Some(full) = crate::commands::expand_command_abbrev(token, &known, min_abbrev) {
            debug!(
                token = %token,
                expanded = %full,
                split_index = i,
                "resolved command token"
            );
            return Some((tokens[..i].to_vec(), full.to_string(), tokens[i + 1..].to_vec()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{Invocation, preprocess_args};
    use crate::config::Config;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn splits_filter_command_and_args() {
        let inv = Invocation::parse(
            &Config::default(),
            os(&["alice", "status:overdue", "sum"]),
        )
        .expect("parse invocation");
        assert_eq!(inv.filter_terms, vec!["alice", "status:overdue"]);
        assert_eq!(inv.command, "summary");
        assert!(inv.command_args.is_empty());

        let inv = Invocation::parse(&Config::default(), os(&["classify", "2024-01-10", "2024-01-12"]))
            .expect("parse invocation");
        assert!(inv.filter_terms.is_empty());
        assert_eq!(inv.command, "classify");
        assert_eq!(inv.command_args, vec!["2024-01-10", "2024-01-12"]);
    }

    #[test]
    fn falls_back_to_default_command() {
        let inv = Invocation::parse(&Config::default(), os(&[])).expect("parse invocation");
        assert_eq!(inv.command, "list");

        let inv = Invocation::parse(&Config::default(), os(&["+overdue"])).expect("parse invocation");
        assert_eq!(inv.command, "list");
        assert_eq!(inv.filter_terms, vec!["+overdue"]);
    }

    #[test]
    fn short_words_stay_filter_terms() {
        let inv = Invocation::parse(&Config::default(), os(&["li"])).expect("parse invocation");
        assert_eq!(inv.command, "list");
        assert_eq!(inv.filter_terms, vec!["li"]);

        let inv = Invocation::parse(&Config::default(), os(&["alice", "e", "ov"])).expect("parse invocation");
        assert_eq!(inv.command, "list");
        assert_eq!(inv.filter_terms, vec!["alice", "e", "ov"]);

        let inv = Invocation::parse(&Config::default(), os(&["alice", "exp"])).expect("parse invocation");
        assert_eq!(inv.command, "export");
        assert_eq!(inv.filter_terms, vec!["alice"]);
    }

    #[test]
    fn extracts_positional_rc_overrides() {
        let pre = preprocess_args(&os(&["shelfwatch", "rc.color=off", "rc.report.sort:title", "list"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["shelfwatch", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.report.sort".to_string(), "title".to_string()),
            ]
        );
    }
}
