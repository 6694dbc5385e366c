use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Done
}

impl StatusFilter {
  /// Unknown keys fall back to `All`.
  pub fn from_key(
    raw: &str
  ) -> Self {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "active" | "open" => {
        Self::Active
      }
      | "done" | "completed" => {
        Self::Done
      }
      | _ => Self::All
    }
  }

  pub fn as_key(
    &self
  ) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Active => "active",
      | Self::Done => "done"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
  #[default]
  Date,
  Priority,
  Created
}

impl SortMode {
  /// Unknown keys fall back to `Date`.
  pub fn from_key(
    raw: &str
  ) -> Self {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "priority" | "pri" => {
        Self::Priority
      }
      | "created" | "entry" => {
        Self::Created
      }
      | _ => Self::Date
    }
  }

  pub fn as_key(
    &self
  ) -> &'static str {
    match self {
      | Self::Date => "date",
      | Self::Priority => "priority",
      | Self::Created => "created"
    }
  }

  pub fn label(
    &self
  ) -> &'static str {
    match self {
      | Self::Date => "due date",
      | Self::Priority => "priority",
      | Self::Created => "newest"
    }
  }
}

impl<'de> Deserialize<'de> for SortMode {
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    Ok(Self::from_key(&raw))
  }
}

impl<'de> Deserialize<'de>
  for StatusFilter
{
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    Ok(Self::from_key(&raw))
  }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParams {
  /// Case-insensitive substring over
  /// title and tag.
  pub search:     String,
  /// Exact tag match after trim and
  /// lower-casing.
  pub tag:        String,
  pub status:     StatusFilter,
  pub today_only: bool,
  pub sort:       SortMode
}

impl QueryParams {
  pub fn has_filters(&self) -> bool {
    !self.search.trim().is_empty()
      || !self.tag.trim().is_empty()
      || self.status != StatusFilter::All
      || self.today_only
  }
}

#[derive(Debug, Clone)]
pub struct QueryResult<'a> {
  pub tasks: Vec<&'a Task>,
  pub today: String
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct Stats {
  pub total:        usize,
  pub done:         usize,
  pub percent_done: u32
}

#[must_use]
pub fn format_day(
  date: NaiveDate
) -> String {
  date.format("%Y-%m-%d").to_string()
}

#[tracing::instrument(skip(
  tasks, params
), fields(total = tasks.len()))]
pub fn filter_and_sort<'a>(
  tasks: &'a [Task],
  params: &QueryParams,
  reference: NaiveDate
) -> QueryResult<'a> {
  let today = format_day(reference);
  let search = params
    .search
    .trim()
    .to_lowercase();
  let tag = params
    .tag
    .trim()
    .to_lowercase();

  let mut out = tasks
    .iter()
    .filter(|task| {
      search.is_empty()
        || task
          .title
          .to_lowercase()
          .contains(&search)
        || task
          .tag
          .to_lowercase()
          .contains(&search)
    })
    .filter(|task| {
      tag.is_empty()
        || task.tag.trim().to_lowercase()
          == tag
    })
    .filter(|task| {
      match params.status {
        | StatusFilter::All => true,
        | StatusFilter::Active => {
          !task.done
        }
        | StatusFilter::Done => task.done
      }
    })
    .filter(|task| {
      !params.today_only
        || task.due_date == today
    })
    .collect::<Vec<_>>();

  out.sort_by(|a, b| {
    compare_tasks(a, b, params.sort)
  });

  trace!(
    kept = out.len(),
    sort = params.sort.as_key(),
    "filtered and sorted tasks"
  );

  QueryResult {
    tasks: out,
    today
  }
}

fn compare_tasks(
  a: &Task,
  b: &Task,
  sort: SortMode
) -> Ordering {
  let newest_first =
    b.created_at.cmp(&a.created_at);

  match sort {
    | SortMode::Created => newest_first,
    | SortMode::Priority => b
      .priority
      .rank()
      .cmp(&a.priority.rank())
      .then(newest_first),
    | SortMode::Date => {
      compare_due(a.due(), b.due())
        .then(newest_first)
    }
  }
}

/// Earliest first; undated and
/// unparseable dates sort last.
fn compare_due(
  a: Option<NaiveDate>,
  b: Option<NaiveDate>
) -> Ordering {
  match (a, b) {
    | (Some(a), Some(b)) => a.cmp(&b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

#[must_use]
pub fn stats(tasks: &[Task]) -> Stats {
  let total = tasks.len();
  let done = tasks
    .iter()
    .filter(|task| task.done)
    .count();
  let percent_done = if total == 0 {
    0
  } else {
    // round half up in integers
    ((200 * done + total)
      / (2 * total)) as u32
  };

  Stats {
    total,
    done,
    percent_done
  }
}
