use std::fs;
use std::path::PathBuf;

use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::LoanError;

const TIMEZONE_CONFIG_FILE: &str =
  "shelfwatch-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "SHELFWATCH_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "SHELFWATCH_TIME_CONFIG";

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str =
  "%Y-%m-%d %H:%M:%S";

const SUPPORTED_FORMATS: &str =
  "supported formats: \
   now/today/tomorrow/yesterday, \
   +Nd/-Nd/+Nh/+Nm, RFC3339, \
   YYYY-MM-DD, YYYY-MM-DD HH:MM[:SS], \
   YYYY-MM-DDTHH:MM[:SS], \
   YYYYMMDDTHHMMSSZ";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Picks the timezone date-only loan values are interpreted in.
///
/// Order: `SHELFWATCH_TIMEZONE`, the `timezone` config key, the
/// `shelfwatch-time.toml` file, then UTC.
#[tracing::instrument]
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

#[must_use]
pub fn format_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format(DATE_FORMAT)
    .to_string()
}

#[must_use]
pub fn format_date_time(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format(DATE_TIME_FORMAT)
    .to_string()
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  input: &str
) -> Result<DateTime<Utc>, LoanError> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        input,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(LoanError::invalid_date(
        "date",
        input,
        format!(
          "local time does not exist \
           in {}",
          tz.name()
        )
      ))
    }
  }
}

/// First instant of `date` in `tz`.
///
/// Zones that switch to daylight time at midnight have no 00:00 on that
/// day; the day then starts where the gap ends.
fn local_midnight(
  date: NaiveDate,
  tz: Tz,
  input: &str
) -> Result<DateTime<Utc>, LoanError> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      LoanError::invalid_date(
        "date",
        input,
        "failed to construct midnight"
      )
    })?;

  let mut candidate = midnight;
  while candidate.date() == date {
    if !matches!(
      tz.from_local_datetime(&candidate),
      LocalResult::None
    ) {
      if candidate != midnight {
        tracing::debug!(
          input,
          start = %candidate,
          timezone = tz.name(),
          "local midnight skipped by dst; day starts later"
        );
      }
      return to_utc_from_local(
        candidate, tz, input
      );
    }
    candidate += Duration::minutes(15);
  }

  Err(LoanError::invalid_date(
    "date",
    input,
    format!(
      "day does not exist in {}",
      tz.name()
    )
  ))
}

fn local_day_start(
  now: DateTime<Utc>,
  tz: Tz,
  offset_days: i64,
  input: &str
) -> Result<DateTime<Utc>, LoanError> {
  let today =
    now.with_timezone(&tz).date_naive();
  let date = today
    .checked_add_signed(Duration::days(
      offset_days
    ))
    .ok_or_else(|| {
      LoanError::invalid_date(
        "date",
        input,
        "date out of range"
      )
    })?;
  local_midnight(date, tz, input)
}

/// Parses a loan date value.
///
/// Date-only and naive date-time forms are read as local time in `tz`.
/// Relative forms are resolved against `now`. Anything else is
/// [`LoanError::InvalidDate`].
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_loan_date(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> Result<DateTime<Utc>, LoanError> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "" => {
      return Err(
        LoanError::invalid_date(
          "date",
          input,
          "empty date value"
        )
      );
    }
    | "now" => return Ok(now),
    | "today" => {
      return local_day_start(
        now, tz, 0, input
      );
    }
    | "tomorrow" => {
      return local_day_start(
        now, tz, 1, input
      );
    }
    | "yesterday" => {
      return local_day_start(
        now, tz, -1, input
      );
    }
    | _ => {}
  }

  if let Some(offset) =
    parse_relative(token, input)?
  {
    return Ok(now + offset);
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, DATE_FORMAT
    )
  {
    return local_midnight(
      date, tz, input
    );
  }

  for fmt in [
    DATE_TIME_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, input
      );
    }
  }

  Err(LoanError::invalid_date(
    "date",
    input,
    format!(
      "unrecognized date expression; \
       {SUPPORTED_FORMATS}"
    )
  ))
}

fn parse_relative(
  token: &str,
  input: &str
) -> Result<Option<Duration>, LoanError>
{
  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| LoanError::invalid_date("date", input, format!("internal regex compile failure: {e}")))?;

  let Some(caps) = rel_re.captures(token)
  else {
    return Ok(None);
  };

  let num: i64 = caps
    .name("num")
    .map(|m| m.as_str())
    .unwrap_or_default()
    .parse()
    .map_err(|_| {
      LoanError::invalid_date(
        "date",
        input,
        "relative amount out of range"
      )
    })?;

  let duration = match caps
    .name("unit")
    .map(|m| m.as_str())
  {
    | Some("d") => Duration::try_days(num),
    | Some("h") => {
      Duration::try_hours(num)
    }
    | Some("m") => {
      Duration::try_minutes(num)
    }
    | _ => None
  }
  .ok_or_else(|| {
    LoanError::invalid_date(
      "date",
      input,
      "relative offset out of range"
    )
  })?;

  let negative = caps
    .name("sign")
    .is_some_and(|m| m.as_str() == "-");

  Ok(Some(if negative {
    -duration
  } else {
    duration
  }))
}
