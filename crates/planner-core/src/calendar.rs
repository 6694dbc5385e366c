use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Weekday
};
use tracing::debug;

use crate::holidays::{
  Holiday,
  HolidayMap
};
use crate::query::format_day;
use crate::task::Task;

pub const GRID_DAYS: usize = 42;
pub const MAX_TASKS_PER_CELL: usize = 3;
/// Years a [`YearMonth`] may name; the
/// four-digit `YYYY-MM` form.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> =
  1..=9999;
pub const WEEKDAY_LABELS: [&str; 7] = [
  "Mon", "Tue", "Wed", "Thu", "Fri",
  "Sat", "Sun"
];

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub struct YearMonth {
  year:  i32,
  month: u32
}

impl YearMonth {
  pub fn new(
    year: i32,
    month: u32
  ) -> anyhow::Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "month out of range: {month}"
      ));
    }
    if !YEAR_RANGE.contains(&year) {
      return Err(anyhow!(
        "year out of range: {year} \
         (expected {}..={})",
        YEAR_RANGE.start(),
        YEAR_RANGE.end()
      ));
    }
    Ok(Self {
      year,
      month
    })
  }

  #[must_use]
  pub fn from_date(
    date: NaiveDate
  ) -> Self {
    Self {
      year:  date.year(),
      month: date.month()
    }
  }

  pub fn year(&self) -> i32 {
    self.year
  }

  pub fn month(&self) -> u32 {
    self.month
  }

  #[must_use]
  pub fn first_day(&self) -> NaiveDate {
    first_day_of_month(
      self.year, self.month
    )
  }

  pub fn contains(
    &self,
    date: NaiveDate
  ) -> bool {
    date.year() == self.year
      && date.month() == self.month
  }

  pub fn title(&self) -> String {
    self
      .first_day()
      .format("%B %Y")
      .to_string()
  }
}

impl fmt::Display for YearMonth {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{:04}-{:02}",
      self.year, self.month
    )
  }
}

impl FromStr for YearMonth {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let (year, month) = trimmed
      .split_once('-')
      .ok_or_else(|| {
        anyhow!(
          "expected YYYY-MM, got: \
           {trimmed}"
        )
      })?;
    let year: i32 =
      year.parse().with_context(|| {
        format!(
          "invalid year in {trimmed}"
        )
      })?;
    let month: u32 =
      month.parse().with_context(
        || {
          format!(
            "invalid month in \
             {trimmed}"
          )
        }
      )?;
    Self::new(year, month)
  }
}

/// Adds `delta` months with year
/// rollover. Results past either end
/// of [`YEAR_RANGE`] stop at January
/// of the first year or December of
/// the last; see
/// [`YearMonth::checked_shift`] to
/// reject them instead.
#[must_use]
pub fn shift_month(
  ym: YearMonth,
  delta: i32
) -> YearMonth {
  let lowest =
    month_index(*YEAR_RANGE.start(), 1);
  let highest =
    month_index(*YEAR_RANGE.end(), 12);
  from_month_index(
    month_index(ym.year, ym.month)
      .saturating_add(i64::from(delta))
      .clamp(lowest, highest)
  )
}

impl YearMonth {
  /// [`shift_month`] that fails
  /// instead of stopping at the edge
  /// of [`YEAR_RANGE`].
  pub fn checked_shift(
    self,
    delta: i32
  ) -> anyhow::Result<Self> {
    let index = month_index(
      self.year, self.month
    ) + i64::from(delta);
    let year = index.div_euclid(12);
    let month =
      index.rem_euclid(12) as u32 + 1;
    i32::try_from(year)
      .ok()
      .filter(|y| YEAR_RANGE.contains(y))
      .map(|year| Self {
        year,
        month
      })
      .ok_or_else(|| {
        anyhow!(
          "{self} shifted by {delta} \
           months leaves years {}..={}",
          YEAR_RANGE.start(),
          YEAR_RANGE.end()
        )
      })
  }
}

fn month_index(
  year: i32,
  month: u32
) -> i64 {
  i64::from(year) * 12
    + i64::from(month)
    - 1
}

fn from_month_index(
  index: i64
) -> YearMonth {
  YearMonth {
    year:  index.div_euclid(12) as i32,
    month: index.rem_euclid(12) as u32
      + 1
  }
}

#[derive(Debug, Clone)]
pub struct CalendarCell<'a> {
  pub date:           NaiveDate,
  pub is_other_month: bool,
  pub is_today:       bool,
  pub tasks:          Vec<&'a Task>,
  /// Tasks due this day beyond
  /// [`MAX_TASKS_PER_CELL`].
  pub more:           usize,
  pub holiday:        Option<&'a Holiday>
}

impl CalendarCell<'_> {
  pub fn date_key(&self) -> String {
    format_day(self.date)
  }

  pub fn due_count(&self) -> usize {
    self.tasks.len() + self.more
  }
}

#[derive(Debug, Clone)]
pub struct MonthGrid<'a> {
  pub year_month: YearMonth,
  pub cells:      Vec<CalendarCell<'a>>,
  pub undated:    Vec<&'a Task>
}

impl<'a> MonthGrid<'a> {
  pub fn weeks(
    &self
  ) -> impl Iterator<Item = &[CalendarCell<'a>]>
  {
    self.cells.chunks(7)
  }

  pub fn first_day(&self) -> NaiveDate {
    self
      .cells
      .first()
      .map(|cell| cell.date)
      .unwrap_or_else(|| {
        self.year_month.first_day()
      })
  }

  pub fn last_day(&self) -> NaiveDate {
    self
      .cells
      .last()
      .map(|cell| cell.date)
      .unwrap_or_else(|| {
        self.year_month.first_day()
      })
  }
}

/// Builds the fixed 6x7 Monday-first
/// grid. `ordered` should already be
/// filtered and sorted; per-day order
/// is taken from it as-is.
#[tracing::instrument(skip(
  ordered, holidays
), fields(year_month = %year_month))]
pub fn build_month_grid<'a>(
  year_month: YearMonth,
  ordered: &[&'a Task],
  today: &str,
  holidays: Option<&'a HolidayMap>
) -> MonthGrid<'a> {
  let grid_start = grid_start(year_month);

  let mut by_day: HashMap<
    &str,
    Vec<&'a Task>
  > = HashMap::new();
  let mut undated = Vec::new();
  for &task in ordered {
    if task.is_undated() {
      undated.push(task);
    } else {
      by_day
        .entry(task.due_date.as_str())
        .or_default()
        .push(task);
    }
  }

  let cells = (0..GRID_DAYS as i64)
    .map(|offset| {
      let date =
        add_days(grid_start, offset);
      let key = format_day(date);
      let due = by_day
        .get(key.as_str())
        .map(Vec::as_slice)
        .unwrap_or_default();
      let shown = due
        .len()
        .min(MAX_TASKS_PER_CELL);

      CalendarCell {
        date,
        is_other_month: !year_month
          .contains(date),
        is_today: key == today,
        tasks: due[..shown].to_vec(),
        more: due.len() - shown,
        holiday: holidays.and_then(
          |map| map.get(&key)
        )
      }
    })
    .collect::<Vec<_>>();

  debug!(
    grid_start = %grid_start,
    dated = ordered.len() - undated.len(),
    undated = undated.len(),
    "built month grid"
  );

  MonthGrid {
    year_month,
    cells,
    undated
  }
}

/// Monday on or before the 1st.
#[must_use]
pub fn grid_start(
  year_month: YearMonth
) -> NaiveDate {
  start_of_week(
    year_month.first_day(),
    Weekday::Mon
  )
}

#[must_use]
pub fn grid_end(
  year_month: YearMonth
) -> NaiveDate {
  add_days(
    grid_start(year_month),
    GRID_DAYS as i64 - 1
  )
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
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

fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    Weekday
  };

  use super::{
    GRID_DAYS,
    YearMonth,
    build_month_grid,
    shift_month
  };
  use crate::holidays::{
    Holiday,
    HolidayMap
  };
  use crate::task::{
    Priority,
    Task
  };

  fn ym(
    year: i32,
    month: u32
  ) -> YearMonth {
    YearMonth::new(year, month)
      .expect("valid month")
  }

  fn task(
    title: &str,
    due: &str
  ) -> Task {
    Task {
      id:         format!("id-{title}"),
      title:      title.to_string(),
      due_date:   due.to_string(),
      priority:   Priority::Mid,
      tag:        String::new(),
      done:       false,
      created_at: 0
    }
  }

  #[test]
  fn grid_is_42_cells_starting_monday() {
    for month in 1..=12 {
      for year in [2023, 2024, 2025] {
        let grid = build_month_grid(
          ym(year, month),
          &[],
          "",
          None
        );
        assert_eq!(
          grid.cells.len(),
          GRID_DAYS
        );
        assert_eq!(
          grid.cells[0]
            .date
            .weekday(),
          Weekday::Mon
        );
        assert!(
          grid.cells[0].date
            <= ym(year, month)
              .first_day()
        );
      }
    }
  }

  #[test]
  fn march_2024_starts_in_february() {
    let grid = build_month_grid(
      ym(2024, 3),
      &[],
      "2024-03-15",
      None
    );
    assert_eq!(
      grid.cells[0].date_key(),
      "2024-02-26"
    );
    assert!(grid.cells[0].is_other_month);
    assert_eq!(
      grid.cells[41].date_key(),
      "2024-04-07"
    );
    let today = grid
      .cells
      .iter()
      .filter(|cell| cell.is_today)
      .collect::<Vec<_>>();
    assert_eq!(today.len(), 1);
    assert_eq!(
      today[0].date_key(),
      "2024-03-15"
    );
  }

  #[test]
  fn month_starting_on_monday_has_no_leading_days()
  {
    let grid = build_month_grid(
      ym(2024, 4),
      &[],
      "",
      None
    );
    assert_eq!(
      grid.cells[0].date_key(),
      "2024-04-01"
    );
    assert!(!grid.cells[0].is_other_month);
  }

  #[test]
  fn dated_task_lands_in_exactly_one_cell()
  {
    let tasks =
      vec![task("A", "2024-03-15")];
    let ordered =
      tasks.iter().collect::<Vec<_>>();

    let march = build_month_grid(
      ym(2024, 3),
      &ordered,
      "",
      None
    );
    let hits = march
      .cells
      .iter()
      .filter(|cell| {
        cell
          .tasks
          .iter()
          .any(|t| t.title == "A")
      })
      .count();
    assert_eq!(hits, 1);
    assert!(march.undated.is_empty());

    for other in [ym(2024, 1), ym(2024, 6)]
    {
      let grid = build_month_grid(
        other,
        &ordered,
        "",
        None
      );
      assert!(
        grid.cells.iter().all(
          |cell| cell.tasks.is_empty()
        )
      );
    }
  }

  #[test]
  fn cells_cap_tasks_and_keep_input_order()
  {
    let tasks = ["e", "d", "c", "b", "a"]
      .iter()
      .map(|t| task(t, "2024-03-05"))
      .collect::<Vec<_>>();
    let ordered =
      tasks.iter().collect::<Vec<_>>();
    let grid = build_month_grid(
      ym(2024, 3),
      &ordered,
      "",
      None
    );
    let cell = grid
      .cells
      .iter()
      .find(|cell| {
        cell.date_key() == "2024-03-05"
      })
      .expect("cell present");
    let shown = cell
      .tasks
      .iter()
      .map(|t| t.title.as_str())
      .collect::<Vec<_>>();
    assert_eq!(shown, vec!["e", "d", "c"]);
    assert_eq!(cell.more, 2);
    assert_eq!(cell.due_count(), 5);
  }

  #[test]
  fn undated_tasks_go_to_their_own_bucket()
  {
    let tasks = vec![
      task("x", ""),
      task("y", "2024-03-01"),
      task("z", ""),
    ];
    let ordered =
      tasks.iter().collect::<Vec<_>>();
    let grid = build_month_grid(
      ym(2024, 3),
      &ordered,
      "",
      None
    );
    let undated = grid
      .undated
      .iter()
      .map(|t| t.title.as_str())
      .collect::<Vec<_>>();
    assert_eq!(undated, vec!["x", "z"]);
  }

  #[test]
  fn holidays_attach_by_date() {
    let mut holidays = HolidayMap::new();
    holidays.insert(
      "2024-12-25".to_string(),
      Holiday {
        date:       NaiveDate::from_ymd_opt(
          2024, 12, 25
        )
        .expect("valid date"),
        name:       "Christmas Day"
          .to_string(),
        local_name: "Christmas Day"
          .to_string()
      }
    );
    let grid = build_month_grid(
      ym(2024, 12),
      &[],
      "",
      Some(&holidays)
    );
    let with_holiday = grid
      .cells
      .iter()
      .filter(|cell| cell.holiday.is_some())
      .collect::<Vec<_>>();
    assert_eq!(with_holiday.len(), 1);
    assert_eq!(
      with_holiday[0].date_key(),
      "2024-12-25"
    );

    let empty = HolidayMap::new();
    let a = build_month_grid(
      ym(2024, 12),
      &[],
      "",
      Some(&empty)
    );
    let b = build_month_grid(
      ym(2024, 12),
      &[],
      "",
      None
    );
    assert!(
      a.cells
        .iter()
        .zip(b.cells.iter())
        .all(|(x, y)| {
          x.holiday.is_none()
            && y.holiday.is_none()
        })
    );
  }

  #[test]
  fn shift_month_rolls_over_years() {
    assert_eq!(
      shift_month(ym(2024, 12), 1),
      ym(2025, 1)
    );
    assert_eq!(
      shift_month(ym(2024, 1), -1),
      ym(2023, 12)
    );
    assert_eq!(
      shift_month(ym(2024, 5), -17),
      ym(2022, 12)
    );
    assert_eq!(
      shift_month(ym(2024, 5), 0),
      ym(2024, 5)
    );
    assert_eq!(
      shift_month(ym(2024, 5), 20),
      ym(2026, 1)
    );
  }

  #[test]
  fn year_month_parses_and_rejects_out_of_range()
  {
    let parsed: YearMonth = "2024-03"
      .parse()
      .expect("parse year month");
    assert_eq!(parsed, ym(2024, 3));
    assert_eq!(parsed.to_string(), "2024-03");
    assert!("2024-13".parse::<YearMonth>().is_err());
    assert!("2024-00".parse::<YearMonth>().is_err());
    assert!("March".parse::<YearMonth>().is_err());
    assert!("0-05".parse::<YearMonth>().is_err());
    assert!(
      "300000-01".parse::<YearMonth>().is_err()
    );
  }

  #[test]
  fn huge_shifts_stay_in_supported_years()
  {
    let start = ym(2024, 3);
    assert!(start.checked_shift(i32::MAX).is_err());
    assert!(start.checked_shift(i32::MIN).is_err());
    assert!(
      start.checked_shift(-2024 * 12).is_err()
    );
    assert_eq!(
      start.checked_shift(-14).expect("shift"),
      ym(2023, 1)
    );

    assert_eq!(
      shift_month(start, i32::MAX),
      ym(9999, 12)
    );
    assert_eq!(
      shift_month(start, i32::MIN),
      ym(1, 1)
    );
    let edge = shift_month(start, i32::MAX);
    let grid =
      build_month_grid(edge, &[], "", None);
    assert_eq!(grid.cells.len(), GRID_DAYS);
    assert_eq!(
      grid.cells[0].date,
      NaiveDate::from_ymd_opt(9999, 11, 29)
        .expect("valid date")
    );
  }
}
