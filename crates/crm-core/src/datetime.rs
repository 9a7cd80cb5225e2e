//! Peru-time formatting and parsing.
//!
//! Every calendar date in the CRM is a
//! Peru-local date (UTC-5, no daylight
//! saving). Strings shaped `YYYY-MM-DD`
//! are read from their components and are
//! never treated as UTC midnight, which
//! would move them back one day once
//! shifted into Lima.

use std::sync::OnceLock;

use anyhow::Context;
use chrono::{
  DateTime,
  FixedOffset,
  NaiveDate,
  NaiveDateTime,
  Offset,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

pub const PERU_UTC_OFFSET_SECS: i32 =
  -5 * 3600;
pub const PERU_TIMEZONE: Tz =
  chrono_tz::America::Lima;

const DISPLAY_DATE_FORMAT: &str =
  "%d/%m/%Y";
const DISPLAY_DATE_TIME_FORMAT: &str =
  "%d/%m/%Y %H:%M";
const ISO_DATE_FORMAT: &str =
  "%Y-%m-%d";

const NAIVE_DATE_TIME_FORMATS: [&str;
  4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

/// Anything the formatting helpers
/// accept. `Missing` stands in for a
/// null or undefined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateInput<'a> {
  Missing,
  Text(&'a str),
  Instant(DateTime<Utc>),
  Date(NaiveDate)
}

impl<'a> From<&'a str> for DateInput<'a> {
  fn from(value: &'a str) -> Self {
    DateInput::Text(value)
  }
}

impl<'a> From<&'a String>
  for DateInput<'a>
{
  fn from(value: &'a String) -> Self {
    DateInput::Text(value.as_str())
  }
}

impl<'a> From<Option<&'a str>>
  for DateInput<'a>
{
  fn from(
    value: Option<&'a str>
  ) -> Self {
    value.map_or(
      DateInput::Missing,
      DateInput::Text
    )
  }
}

impl From<DateTime<Utc>>
  for DateInput<'_>
{
  fn from(value: DateTime<Utc>) -> Self {
    DateInput::Instant(value)
  }
}

impl From<DateTime<FixedOffset>>
  for DateInput<'_>
{
  fn from(
    value: DateTime<FixedOffset>
  ) -> Self {
    DateInput::Instant(
      value.with_timezone(&Utc)
    )
  }
}

impl From<Option<DateTime<Utc>>>
  for DateInput<'_>
{
  fn from(
    value: Option<DateTime<Utc>>
  ) -> Self {
    value.map_or(
      DateInput::Missing,
      DateInput::Instant
    )
  }
}

impl From<NaiveDate> for DateInput<'_> {
  fn from(value: NaiveDate) -> Self {
    DateInput::Date(value)
  }
}

impl From<Option<NaiveDate>>
  for DateInput<'_>
{
  fn from(
    value: Option<NaiveDate>
  ) -> Self {
    value.map_or(
      DateInput::Missing,
      DateInput::Date
    )
  }
}

#[derive(Debug, Clone, Copy)]
enum Resolved {
  Day(NaiveDate),
  Moment(DateTime<Utc>)
}

impl Resolved {
  fn peru_date(self) -> NaiveDate {
    match self {
      | Resolved::Day(day) => day,
      | Resolved::Moment(moment) => {
        moment
          .with_timezone(&PERU_TIMEZONE)
          .date_naive()
      }
    }
  }
}

pub fn peru_offset() -> FixedOffset {
  FixedOffset::east_opt(
    PERU_UTC_OFFSET_SECS
  )
  .unwrap_or_else(|| Utc.fix())
}

fn iso_date_prefix()
-> Option<&'static Regex> {
  static ISO_DATE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  ISO_DATE
    .get_or_init(|| {
      match Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})"
      ) {
        | Ok(re) => Some(re),
        | Err(err) => {
          tracing::error!(
            error = %err,
            "failed compiling iso date pattern"
          );
          None
        }
      }
    })
    .as_ref()
}

/// Reads the leading `YYYY-MM-DD` of a
/// string as a calendar date. Components
/// out of range yield `None` instead of
/// rolling over into the next month.
#[must_use]
pub fn parse_iso_date(
  text: &str
) -> Option<NaiveDate> {
  let caps = iso_date_prefix()?
    .captures(text.trim())?;
  let year =
    caps.get(1)?.as_str().parse().ok()?;
  let month =
    caps.get(2)?.as_str().parse().ok()?;
  let day =
    caps.get(3)?.as_str().parse().ok()?;
  NaiveDate::from_ymd_opt(
    year, month, day
  )
}

#[must_use]
pub fn format_iso_date(
  date: NaiveDate
) -> String {
  date.format(ISO_DATE_FORMAT).to_string()
}

/// Parses a timestamp the way the
/// backend emits them. Offset-less
/// values are read as Peru-local time; a
/// bare date is Peru midnight.
#[must_use]
pub fn parse_instant(
  text: &str
) -> Option<DateTime<Utc>> {
  let token = text.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc2822(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in NAIVE_DATE_TIME_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return peru_local_to_utc(ndt);
    }
  }

  NaiveDate::parse_from_str(
    token,
    ISO_DATE_FORMAT
  )
  .ok()
  .and_then(|date| {
    date.and_hms_opt(0, 0, 0)
  })
  .and_then(peru_local_to_utc)
}

fn peru_local_to_utc(
  local: NaiveDateTime
) -> Option<DateTime<Utc>> {
  peru_offset()
    .from_local_datetime(&local)
    .single()
    .map(|dt| dt.with_timezone(&Utc))
}

fn resolve_for_display(
  input: DateInput<'_>
) -> Option<Resolved> {
  match input {
    | DateInput::Missing => None,
    | DateInput::Date(day) => {
      Some(Resolved::Day(day))
    }
    | DateInput::Instant(moment) => {
      Some(Resolved::Moment(moment))
    }
    | DateInput::Text(text) => {
      let trimmed = text.trim();
      if trimmed.is_empty() {
        return None;
      }
      if iso_date_prefix().is_some_and(
        |re| re.is_match(trimmed)
      ) {
        return parse_iso_date(trimmed)
          .map(Resolved::Day);
      }
      parse_instant(trimmed)
        .map(Resolved::Moment)
    }
  }
}

fn resolve_as_instant(
  input: DateInput<'_>
) -> Option<Resolved> {
  match input {
    | DateInput::Text(text) => {
      let trimmed = text.trim();
      if trimmed.len() == 10 {
        return parse_iso_date(trimmed)
          .map(Resolved::Day);
      }
      parse_instant(trimmed)
        .map(Resolved::Moment)
    }
    | other => {
      resolve_for_display(other)
    }
  }
}

/// `DD/MM/YYYY` in Peru time, or an empty
/// string for missing or invalid input.
#[must_use]
pub fn format_date_peru<'a>(
  input: impl Into<DateInput<'a>>
) -> String {
  resolve_for_display(input.into())
    .map(|resolved| {
      resolved
        .peru_date()
        .format(DISPLAY_DATE_FORMAT)
        .to_string()
    })
    .unwrap_or_default()
}

/// `DD/MM/YYYY HH:MM` rendered in
/// `America/Lima`.
#[must_use]
pub fn format_date_time_peru<'a>(
  input: impl Into<DateInput<'a>>
) -> String {
  match resolve_as_instant(input.into())
  {
    | Some(Resolved::Moment(moment)) => {
      moment
        .with_timezone(&PERU_TIMEZONE)
        .format(DISPLAY_DATE_TIME_FORMAT)
        .to_string()
    }
    | Some(Resolved::Day(day)) => {
      format!(
        "{} 00:00",
        day.format(DISPLAY_DATE_FORMAT)
      )
    }
    | None => String::new()
  }
}

/// `YYYY-MM-DD` of the Peru-local
/// calendar date, suitable for a date
/// input field.
#[must_use]
pub fn format_date_input_peru<'a>(
  input: impl Into<DateInput<'a>>
) -> String {
  resolve_as_instant(input.into())
    .map(|resolved| {
      format_iso_date(
        resolved.peru_date()
      )
    })
    .unwrap_or_default()
}

/// Midnight of the given day in Peru,
/// independent of the host timezone.
pub fn create_date_peru(
  year: i32,
  month: u32,
  day: u32
) -> anyhow::Result<DateTime<FixedOffset>>
{
  let raw = format!(
    "{year:04}-{month:02}-{day:02}T00:00:00-05:00"
  );
  DateTime::parse_from_rfc3339(&raw)
    .with_context(|| {
      format!(
        "invalid Peru calendar date: \
         {raw}"
      )
    })
}

#[must_use]
pub fn to_peru_time(
  moment: DateTime<Utc>
) -> DateTime<FixedOffset> {
  moment.with_timezone(&peru_offset())
}

#[must_use]
pub fn current_date_peru_at(
  now: DateTime<Utc>
) -> NaiveDate {
  to_peru_time(now).date_naive()
}

#[must_use]
pub fn current_date_peru() -> NaiveDate
{
  current_date_peru_at(Utc::now())
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::*;

  #[test]
  fn formats_iso_dates_from_components()
  {
    assert_eq!(
      format_date_peru("2024-03-05"),
      "05/03/2024"
    );
    assert_eq!(
      format_date_peru(
        "2024-03-05T02:00:00Z"
      ),
      "05/03/2024"
    );
  }

  #[test]
  fn empty_and_missing_inputs_format_empty()
  {
    assert_eq!(format_date_peru(""), "");
    assert_eq!(
      format_date_peru(None::<&str>),
      ""
    );
    assert_eq!(
      format_date_peru("not a date"),
      ""
    );
    assert_eq!(
      format_date_peru("2024-13-40"),
      ""
    );
    assert_eq!(
      format_date_time_peru("garbage"),
      ""
    );
    assert_eq!(
      format_date_input_peru(
        DateInput::Missing
      ),
      ""
    );
  }

  #[test]
  fn instants_are_shown_in_lima() {
    let late_utc = Utc
      .with_ymd_and_hms(
        2024, 3, 6, 2, 30, 0
      )
      .single()
      .expect("valid instant");
    assert_eq!(
      format_date_peru(late_utc),
      "05/03/2024"
    );
    assert_eq!(
      format_date_time_peru(late_utc),
      "05/03/2024 21:30"
    );
    assert_eq!(
      format_date_input_peru(late_utc),
      "2024-03-05"
    );
  }

  #[test]
  fn date_only_input_keeps_its_day() {
    assert_eq!(
      format_date_input_peru(
        "2024-03-05"
      ),
      "2024-03-05"
    );
    assert_eq!(
      format_date_time_peru("2024-03-05"),
      "05/03/2024 00:00"
    );
  }

  #[test]
  fn offsetless_timestamps_are_peru_local()
  {
    let parsed =
      parse_instant("2024-03-05 23:15")
        .expect("parse naive");
    assert_eq!(
      format_date_time_peru(parsed),
      "05/03/2024 23:15"
    );
  }

  #[test]
  fn create_date_peru_is_midnight_minus_five()
  {
    let date = create_date_peru(2024, 2, 29)
      .expect("leap day exists");
    assert_eq!(
      date.with_timezone(&Utc).to_rfc3339(),
      "2024-02-29T05:00:00+00:00"
    );
    assert!(
      create_date_peru(2023, 2, 29)
        .is_err()
    );
  }

  #[test]
  fn current_date_shifts_by_five_hours() {
    let now = Utc
      .with_ymd_and_hms(
        2024, 1, 1, 3, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      current_date_peru_at(now),
      NaiveDate::from_ymd_opt(
        2023, 12, 31
      )
      .expect("valid date")
    );
    assert_eq!(
      to_peru_time(now)
        .format("%H:%M")
        .to_string(),
      "22:00"
    );
  }
}
