use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::query::{self, QueryParams, QueryResult, SortMode, Stats, StatusFilter};
use crate::task::{NewTask, Task, TaskPatch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Grid,
    List,
}

impl Layout {
    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "grid" => Some(Self::Grid),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::List => "list",
        }
    }
}

impl<'de> Deserialize<'de> for Theme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_key(&raw).unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for Layout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_key(&raw).unwrap_or_default())
    }
}

/// Persisted preferences. Missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub layout: Layout,
    pub sort: SortMode,
}

/// Partial update of the transient query parameters.
#[derive(Debug, Clone, Default)]
pub struct UiPatch {
    pub search: Option<String>,
    pub tag: Option<String>,
    pub status: Option<StatusFilter>,
    pub today_only: Option<bool>,
    pub sort: Option<SortMode>,
}

/// Owned application state: the task collection, persisted settings and the
/// current query parameters. Built at startup by the caller and passed by
/// reference into the query and calendar functions.
#[derive(Debug, Clone, Default)]
pub struct PlannerState {
    pub tasks: Vec<Task>,
    pub settings: Settings,
    pub ui: QueryParams,
}

impl PlannerState {
    pub fn new(tasks: Vec<Task>, settings: Settings) -> Self {
        let ui = QueryParams {
            sort: settings.sort,
            ..QueryParams::default()
        };
        Self {
            tasks,
            settings,
            ui,
        }
    }

    /// Newest tasks go first.
    #[tracing::instrument(skip(self, input))]
    pub fn add_task(&mut self, input: NewTask, now_ms: i64) -> &Task {
        let task = Task::new(input, now_ms);
        info!(id = %task.id, title = %task.title, "task added");
        self.tasks.insert(0, task);
        &self.tasks[0]
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.apply(patch);
        debug!(id = %task.id, "task updated");
        Some(&*task)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: &str) -> bool {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        self.tasks.remove(idx);
        debug!(remaining = self.tasks.len(), "task deleted");
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_done(&mut self, id: &str) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.done = !task.done;
        debug!(done = task.done, "task toggled");
        Some(&*task)
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Full id for an exact id or a unique id prefix.
    pub fn resolve_id(&self, needle: &str) -> anyhow::Result<String> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Err(anyhow!("task id cannot be empty"));
        }
        if let Some(task) = self.find(needle) {
            return Ok(task.id.clone());
        }

        let mut matches = self.tasks.iter().filter(|t| t.id.starts_with(needle));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no task matches id {needle}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("task id {needle} is ambiguous"));
        }
        Ok(first.id.clone())
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.settings.theme = theme;
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.settings.layout = layout;
    }

    /// Updates both the persisted preference and the live query.
    pub fn set_sort(&mut self, sort: SortMode) {
        self.settings.sort = sort;
        self.ui.sort = sort;
    }

    pub fn set_ui(&mut self, patch: UiPatch) {
        if let Some(search) = patch.search {
            self.ui.search = search;
        }
        if let Some(tag) = patch.tag {
            self.ui.tag = tag;
        }
        if let Some(status) = patch.status {
            self.ui.status = status;
        }
        if let Some(today_only) = patch.today_only {
            self.ui.today_only = today_only;
        }
        if let Some(sort) = patch.sort {
            self.ui.sort = sort;
        }
    }

    pub fn filtered_sorted(&self, reference: NaiveDate) -> QueryResult<'_> {
        query::filter_and_sort(&self.tasks, &self.ui, reference)
    }

    pub fn stats(&self) -> Stats {
        query::stats(&self.tasks)
    }
}
