use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Days,
  NaiveDate,
  Utc
};
use crm_shared::{
  ActivityDto,
  ActivityType,
  TaskDto,
  TaskPriority,
  TaskStatus
};
use tracing::debug;

use crate::datetime::{
  parse_instant,
  to_peru_time
};
use crate::editor::Document;

/// One row of the deal activity feed,
/// built from either an activity or a
/// task.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
  pub id:               u64,
  pub kind:             ActivityType,
  pub is_task:          bool,
  pub title:            String,
  pub description_html: String,
  pub due_date:         Option<String>,
  pub created_at:       Option<DateTime<Utc>>,
  pub author:           Option<String>,
  pub priority:         Option<TaskPriority>,
  pub status:           Option<TaskStatus>
}

impl FeedItem {
  pub fn description_text(&self) -> String {
    Document::from_html(&self.description_html)
      .plain_text()
  }

  /// Calendar date the item falls on in
  /// Peru.
  pub fn peru_date(&self) -> Option<NaiveDate> {
    self
      .created_at
      .map(|at| to_peru_time(at).date_naive())
  }
}

impl From<ActivityDto> for FeedItem {
  fn from(dto: ActivityDto) -> Self {
    let title = dto
      .subject
      .or(dto.title)
      .unwrap_or_default();
    let author = dto
      .created_by
      .or(dto.user)
      .or(dto.assigned_to)
      .and_then(|user| user.display_name());
    Self {
      id: dto.id,
      kind: dto.kind,
      is_task: dto.kind == ActivityType::Task,
      title,
      description_html: dto
        .description
        .unwrap_or_default(),
      due_date: dto.due_date,
      created_at: dto
        .created_at
        .as_deref()
        .and_then(parse_instant),
      author,
      priority: None,
      status: None
    }
  }
}

impl From<TaskDto> for FeedItem {
  fn from(dto: TaskDto) -> Self {
    let author = dto
      .assigned_to
      .or(dto.created_by)
      .and_then(|user| user.display_name());
    Self {
      id: dto.id,
      kind: ActivityType::Task,
      is_task: true,
      title: dto.title,
      description_html: dto
        .description
        .unwrap_or_default(),
      due_date: dto.due_date,
      created_at: dto
        .created_at
        .as_deref()
        .and_then(parse_instant),
      author,
      priority: dto.priority,
      status: dto.status
    }
  }
}

/// Newest first; items without a creation
/// time sink to the bottom, ties go to the
/// higher id.
pub fn sort_feed(items: &mut [FeedItem]) {
  items.sort_by(|a, b| {
    b.created_at
      .cmp(&a.created_at)
      .then(b.id.cmp(&a.id))
  });
}

#[tracing::instrument(skip_all, fields(activities = activities.len(), tasks = tasks.len()))]
pub fn merge_feed(
  activities: Vec<ActivityDto>,
  tasks: Vec<TaskDto>
) -> Vec<FeedItem> {
  let mut items: Vec<FeedItem> = activities
    .into_iter()
    .map(FeedItem::from)
    .chain(tasks.into_iter().map(FeedItem::from))
    .collect();
  sort_feed(&mut items);
  debug!(items = items.len(), "merged feed");
  items
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub enum TimeRange {
  #[default]
  All,
  Today,
  Yesterday,
  ThisWeek,
  LastWeek,
  Last7Days
}

impl TimeRange {
  pub const ALL: [TimeRange; 6] = [
    TimeRange::All,
    TimeRange::Today,
    TimeRange::Yesterday,
    TimeRange::ThisWeek,
    TimeRange::LastWeek,
    TimeRange::Last7Days
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | TimeRange::All => "all",
      | TimeRange::Today => "today",
      | TimeRange::Yesterday => "yesterday",
      | TimeRange::ThisWeek => "this-week",
      | TimeRange::LastWeek => "last-week",
      | TimeRange::Last7Days => "last-7-days"
    }
  }

  /// Inclusive date bounds relative to
  /// `today`. Weeks start on Sunday.
  pub fn bounds(
    self,
    today: NaiveDate
  ) -> Option<(NaiveDate, NaiveDate)> {
    let back = |days: u64| {
      today
        .checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
    };
    let week_start = back(u64::from(
      today.weekday().num_days_from_sunday()
    ));
    let before = |date: NaiveDate, days: u64| {
      date
        .checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
    };
    match self {
      | TimeRange::All => None,
      | TimeRange::Today => Some((today, today)),
      | TimeRange::Yesterday => {
        let day = back(1);
        Some((day, day))
      }
      | TimeRange::ThisWeek => Some((
        week_start,
        week_start
          .checked_add_days(Days::new(6))
          .unwrap_or(NaiveDate::MAX)
      )),
      | TimeRange::LastWeek => Some((
        before(week_start, 7),
        before(week_start, 1)
      )),
      | TimeRange::Last7Days => {
        Some((back(6), today))
      }
    }
  }

  pub fn contains(
    self,
    date: Option<NaiveDate>,
    today: NaiveDate
  ) -> bool {
    match (self.bounds(today), date) {
      | (None, _) => true,
      | (Some(_), None) => false,
      | (Some((from, to)), Some(date)) => {
        from <= date && date <= to
      }
    }
  }
}

impl fmt::Display for TimeRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

impl FromStr for TimeRange {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let key = s
      .trim()
      .to_ascii_lowercase()
      .replace('_', "-");
    TimeRange::ALL
      .into_iter()
      .find(|range| range.as_key() == key)
      .ok_or_else(|| {
        anyhow!(
          "unknown time range: {s} (expected \
           all, today, yesterday, this-week, \
           last-week or last-7-days)"
        )
      })
  }
}

/// Client-side feed filter. An empty
/// `kinds` set means every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilter {
  pub search: String,
  pub kinds:  BTreeSet<ActivityType>,
  pub range:  TimeRange
}

impl FeedFilter {
  pub fn matches(
    &self,
    item: &FeedItem,
    today: NaiveDate
  ) -> bool {
    if !self.kinds.is_empty()
      && !self.kinds.contains(&item.kind)
    {
      return false;
    }
    if !self.range.contains(item.peru_date(), today)
    {
      return false;
    }
    let needle =
      self.search.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }
    item.title.to_lowercase().contains(&needle)
      || item
        .description_text()
        .to_lowercase()
        .contains(&needle)
  }

  pub fn apply<'a>(
    &self,
    items: &'a [FeedItem],
    today: NaiveDate
  ) -> Vec<&'a FeedItem> {
    items
      .iter()
      .filter(|item| self.matches(item, today))
      .collect()
  }
}

pub fn parse_activity_type(
  raw: &str
) -> anyhow::Result<ActivityType> {
  match raw.trim().to_ascii_lowercase().as_str()
  {
    | "note" => Ok(ActivityType::Note),
    | "email" => Ok(ActivityType::Email),
    | "call" => Ok(ActivityType::Call),
    | "meeting" => Ok(ActivityType::Meeting),
    | "task" => Ok(ActivityType::Task),
    | _ => Err(anyhow!(
      "unknown activity type: {raw}"
    ))
  }
}
