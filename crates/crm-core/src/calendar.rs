use chrono::{
  Datelike,
  Duration,
  NaiveDate
};

use crate::datetime::{
  format_iso_date,
  parse_iso_date
};

/// Number of cells in a month grid: six
/// Sunday-first weeks.
pub const GRID_CELLS: usize = 42;

pub const WEEKDAY_LABELS: [&str; 7] =
  ["Do", "Lu", "Ma", "Mi", "Ju", "Vi", "Sá"];

const MONTH_NAMES: [&str; 12] = [
  "Enero",
  "Febrero",
  "Marzo",
  "Abril",
  "Mayo",
  "Junio",
  "Julio",
  "Agosto",
  "Septiembre",
  "Octubre",
  "Noviembre",
  "Diciembre"
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
  pub day:              u32,
  pub is_current_month: bool,
  pub date:             NaiveDate
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  // Day zero of the next month.
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

/// Builds the 42-cell grid for the month
/// containing `date`. Leading cells are
/// the tail of the previous month and
/// trailing cells count up from the 1st
/// of the next one.
pub fn month_grid(
  date: NaiveDate
) -> Vec<CalendarDay> {
  let year = date.year();
  let month = date.month();
  let first =
    first_day_of_month(year, month);
  let leading = first
    .weekday()
    .num_days_from_sunday();
  let length = days_in_month(year, month);

  let mut cells =
    Vec::with_capacity(GRID_CELLS);

  let previous_last = add_days(first, -1);
  let previous_length =
    previous_last.day();
  for offset in (0..leading).rev() {
    let day = previous_length - offset;
    cells.push(CalendarDay {
      day,
      is_current_month: false,
      date: previous_last
        .with_day(day)
        .unwrap_or(previous_last)
    });
  }

  for day in 1..=length {
    cells.push(CalendarDay {
      day,
      is_current_month: true,
      date: first
        .with_day(day)
        .unwrap_or(first)
    });
  }

  let next_first =
    add_days(first, i64::from(length));
  let mut day = 1;
  while cells.len() < GRID_CELLS {
    cells.push(CalendarDay {
      day,
      is_current_month: false,
      date: next_first
        .with_day(day)
        .unwrap_or(next_first)
    });
    day += 1;
  }

  tracing::trace!(
    year,
    month,
    leading,
    length,
    "built month grid"
  );
  cells
}

#[must_use]
pub fn month_title(
  date: NaiveDate
) -> String {
  let name = MONTH_NAMES
    .get(date.month0() as usize)
    .copied()
    .unwrap_or_default();
  format!("{name} {}", date.year())
}

/// Date picker state backing the due date
/// field of the create dialogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePicker {
  visible:  NaiveDate,
  selected: Option<NaiveDate>,
  today:    NaiveDate
}

impl DatePicker {
  pub fn new(today: NaiveDate) -> Self {
    Self {
      visible: first_day_of_month(
        today.year(),
        today.month()
      ),
      selected: None,
      today
    }
  }

  /// Re-opens the picker on the month of
  /// an existing `YYYY-MM-DD` value, or on
  /// today's month when there is none.
  #[tracing::instrument(skip(self))]
  pub fn open_at(
    &mut self,
    value: Option<&str>
  ) {
    self.selected =
      value.and_then(parse_iso_date);
    let anchor =
      self.selected.unwrap_or(self.today);
    self.visible = first_day_of_month(
      anchor.year(),
      anchor.month()
    );
  }

  pub fn visible_month(
    &self
  ) -> NaiveDate {
    self.visible
  }

  pub fn selected(
    &self
  ) -> Option<NaiveDate> {
    self.selected
  }

  pub fn today(&self) -> NaiveDate {
    self.today
  }

  /// Jumps to the month containing
  /// `date` without touching the selection.
  pub fn show_month(&mut self, date: NaiveDate) {
    self.visible = first_day_of_month(
      date.year(),
      date.month()
    );
  }

  pub fn previous_month(&mut self) {
    self.visible =
      shift_months(self.visible, -1);
  }

  pub fn next_month(&mut self) {
    self.visible =
      shift_months(self.visible, 1);
  }

  pub fn grid(&self) -> Vec<CalendarDay> {
    month_grid(self.visible)
  }

  pub fn title(&self) -> String {
    month_title(self.visible)
  }

  pub fn weekday_labels(
    &self
  ) -> [&'static str; 7] {
    WEEKDAY_LABELS
  }

  /// Selects a cell and returns the value
  /// stored in the form field. Picking a
  /// day of an adjacent month also moves
  /// the visible month there.
  #[tracing::instrument(skip(self), fields(date = %cell.date))]
  pub fn select(
    &mut self,
    cell: &CalendarDay
  ) -> String {
    self.selected = Some(cell.date);
    if !cell.is_current_month {
      self.visible = first_day_of_month(
        cell.date.year(),
        cell.date.month()
      );
    }
    format_iso_date(cell.date)
  }

  pub fn clear(&mut self) {
    self.selected = None;
  }

  pub fn is_selected(
    &self,
    cell: &CalendarDay
  ) -> bool {
    self.selected == Some(cell.date)
  }

  pub fn is_today(
    &self,
    cell: &CalendarDay
  ) -> bool {
    cell.date == self.today
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datetime::format_date_peru;

  fn date(
    year: i32,
    month: u32,
    day: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(
      year, month, day
    )
    .expect("valid date")
  }

  #[test]
  fn leap_february_has_day_29() {
    let grid = month_grid(date(2024, 2, 1));
    assert_eq!(grid.len(), GRID_CELLS);

    // 2024-02-01 is a Thursday.
    assert_eq!(grid[0].day, 28);
    assert!(!grid[0].is_current_month);
    assert_eq!(
      grid[4],
      CalendarDay {
        day:              1,
        is_current_month: true,
        date:             date(2024, 2, 1)
      }
    );

    let leap = grid
      .iter()
      .find(|cell| {
        cell.is_current_month
          && cell.day == 29
      })
      .expect("feb 29 present");
    assert_eq!(leap.date, date(2024, 2, 29));
    assert_eq!(grid[41].day, 9);
    assert_eq!(grid[41].date, date(2024, 3, 9));
  }

  #[test]
  fn current_month_cells_match_month_length()
  {
    for year in [2023, 2024, 2100] {
      for month in 1..=12 {
        let grid = month_grid(date(
          year, month, 15
        ));
        assert_eq!(grid.len(), GRID_CELLS);
        let current = grid
          .iter()
          .filter(|cell| {
            cell.is_current_month
          })
          .count();
        assert_eq!(
          current as u32,
          days_in_month(year, month),
          "{year}-{month}"
        );
      }
    }
  }

  #[test]
  fn month_starting_on_sunday_has_no_leading_days()
  {
    // 2023-10-01 is a Sunday.
    let grid = month_grid(date(2023, 10, 1));
    assert!(grid[0].is_current_month);
    assert_eq!(grid[0].day, 1);
  }

  #[test]
  fn selected_day_round_trips_through_display()
  {
    let mut picker =
      DatePicker::new(date(2024, 3, 10));
    for cell in picker
      .grid()
      .into_iter()
      .filter(|cell| cell.is_current_month)
    {
      let stored = picker.select(&cell);
      assert_eq!(
        format_date_peru(stored.as_str()),
        cell.date.format("%d/%m/%Y").to_string()
      );
    }
  }

  #[test]
  fn selecting_adjacent_month_moves_view() {
    let mut picker =
      DatePicker::new(date(2024, 2, 14));
    let trailing = picker
      .grid()
      .into_iter()
      .last()
      .expect("grid has cells");
    assert_eq!(
      picker.select(&trailing),
      "2024-03-09"
    );
    assert_eq!(
      picker.visible_month(),
      date(2024, 3, 1)
    );
    assert!(picker.is_selected(&trailing));
  }

  #[test]
  fn navigation_wraps_years() {
    let mut picker =
      DatePicker::new(date(2024, 1, 31));
    picker.previous_month();
    assert_eq!(
      picker.visible_month(),
      date(2023, 12, 1)
    );
    assert_eq!(
      picker.title(),
      "Diciembre 2023"
    );
    picker.next_month();
    picker.next_month();
    assert_eq!(
      picker.visible_month(),
      date(2024, 2, 1)
    );
  }

  #[test]
  fn open_at_existing_value_shows_its_month()
  {
    let mut picker =
      DatePicker::new(date(2024, 3, 10));
    picker.open_at(Some("2025-07-04"));
    assert_eq!(
      picker.visible_month(),
      date(2025, 7, 1)
    );
    let today_cell = CalendarDay {
      day:              10,
      is_current_month: true,
      date:             date(2024, 3, 10)
    };
    assert!(picker.is_today(&today_cell));
    picker.open_at(Some("bogus"));
    assert_eq!(picker.selected(), None);
    assert_eq!(
      picker.visible_month(),
      date(2024, 3, 1)
    );
  }
}
