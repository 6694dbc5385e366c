use std::fmt;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Local,
  NaiveDate,
  TimeDelta,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{
  debug,
  warn
};

use crate::config::Config;

const TIMEZONE_ENV_VAR: &str =
  "PLANNER_TIMEZONE";

/// Zone whose calendar decides which
/// day counts as today.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ProjectZone {
  /// Whatever the system clock
  /// reports as local time.
  Local,
  Named(Tz)
}

impl ProjectZone {
  /// `$PLANNER_TIMEZONE`, then the
  /// `timezone` rc key, then system
  /// local time.
  pub fn resolve(cfg: &Config) -> Self {
    let env =
      std::env::var(TIMEZONE_ENV_VAR)
        .ok();
    let configured =
      cfg.get_nonempty("timezone");
    Self::from_sources(
      env.as_deref(),
      configured.as_deref()
    )
  }

  /// First source that names a valid
  /// IANA zone wins. Invalid names are
  /// logged and skipped.
  pub fn from_sources(
    env: Option<&str>,
    configured: Option<&str>
  ) -> Self {
    [
      (TIMEZONE_ENV_VAR, env),
      ("plannerrc", configured)
    ]
    .into_iter()
    .filter_map(|(source, raw)| {
      raw.and_then(|raw| {
        parse_zone(raw, source)
      })
    })
    .next()
    .map_or(Self::Local, Self::Named)
  }

  #[must_use]
  pub fn date_of(
    &self,
    instant: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | Self::Local => instant
        .with_timezone(&Local)
        .date_naive(),
      | Self::Named(tz) => instant
        .with_timezone(tz)
        .date_naive()
    }
  }
}

impl fmt::Display for ProjectZone {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Local => {
        f.write_str("local")
      }
      | Self::Named(tz) => {
        f.write_str(tz.name())
      }
    }
  }
}

fn parse_zone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      debug!(source, timezone = %trimmed, "using configured timezone");
      Some(tz)
    }
    | Err(err) => {
      warn!(source, timezone = %trimmed, error = %err, "ignoring unknown timezone");
      None
    }
  }
}

/// One reading of the wall clock for
/// a whole command, so every view in
/// it agrees on the date.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
  pub now:  DateTime<Utc>,
  pub zone: ProjectZone
}

impl Clock {
  pub fn new(
    now: DateTime<Utc>,
    zone: ProjectZone
  ) -> Self {
    Self {
      now,
      zone
    }
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.zone.date_of(self.now)
  }

  #[must_use]
  pub fn now_millis(&self) -> i64 {
    self.now.timestamp_millis()
  }
}

/// Resolves a due-date expression
/// relative to `today`. `Ok(None)`
/// clears the due date.
#[tracing::instrument(fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>>
{
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "" | "none" | "-" => {
      return Ok(None);
    }
    | "today" => return Ok(Some(today)),
    | "tomorrow" => {
      return add_days(today, 1)
        .map(Some);
    }
    | "yesterday" => {
      return add_days(today, -1)
        .map(Some);
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return next_weekday_date(
      today, target
    )
    .map(Some);
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .with_context(|| {
        format!(
          "offset too large: {token}"
        )
      })?;
    let days = match &caps["unit"] {
      | "w" => num.checked_mul(7),
      | _ => Some(num)
    }
    .ok_or_else(|| {
      anyhow!(
        "offset too large: {token}"
      )
    })?;
    let days = if &caps["sign"] == "-"
    {
      -days
    } else {
      days
    };
    return add_days(today, days)
      .map(Some);
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .map(Some)
  .map_err(|_| {
    anyhow!(
      "unrecognized due date: {input}"
    )
  })
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nd/-Nd/+Nw, YYYY-MM-DD, none"
  })
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  TimeDelta::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date} \
         {days:+} days"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Next occurrence strictly after
/// `from`.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> anyhow::Result<NaiveDate> {
  let ahead = target.days_since(
    from.weekday()
  );
  let ahead =
    if ahead == 0 { 7 } else { ahead };
  add_days(from, i64::from(ahead))
}
