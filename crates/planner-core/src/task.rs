use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Task urgency. Stored values outside `high | mid | low` load as
/// [`Priority::Unknown`] and are written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Priority {
    High,
    #[default]
    Mid,
    Low,
    Unknown(String),
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Mid => 2,
            Self::Low => 1,
            Self::Unknown(_) => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Low => "Low",
            Self::Mid | Self::Unknown(_) => "Medium",
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
            Self::Unknown(raw) => raw,
        }
    }

    fn from_stored(raw: String) -> Self {
        match raw.as_str() {
            "high" => Self::High,
            "mid" => Self::Mid,
            "low" => Self::Low,
            _ => Self::Unknown(raw),
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Self::High),
            "mid" | "medium" | "m" => Ok(Self::Mid),
            "low" | "l" => Ok(Self::Low),
            other => Err(anyhow!("invalid priority: {other} (expected high, mid or low)")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_key())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_stored)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    /// `YYYY-MM-DD`, or empty when the task is undated.
    #[serde(default)]
    pub due_date: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub done: bool,

    /// Milliseconds since the unix epoch.
    #[serde(default)]
    pub created_at: i64,
}

/// Input for creating a task. Strings are trimmed by [`Task::new`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<String>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
}

/// Partial update. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub done: Option<bool>,
}

impl Task {
    pub fn new(input: NewTask, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            due_date: input.due_date.unwrap_or_default().trim().to_string(),
            priority: input.priority.unwrap_or_default(),
            tag: input.tag.unwrap_or_default().trim().to_string(),
            done: false,
            created_at: now_ms,
        }
    }

    pub fn is_undated(&self) -> bool {
        self.due_date.is_empty()
    }

    /// Parsed due date; `None` for undated or malformed values.
    pub fn due(&self) -> Option<NaiveDate> {
        if self.due_date.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(&self.due_date, "%Y-%m-%d").ok()
    }

    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date.trim().to_string();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(tag) = patch.tag {
            self.tag = tag.trim().to_string();
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}
