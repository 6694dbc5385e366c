use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::state::{PlannerState, Settings};
use crate::task::Task;

pub const ITEMS_FILE: &str = "planner_items.json";
pub const SETTINGS_FILE: &str = "planner_settings.json";

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub items_path: PathBuf,
    pub settings_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let items_path = data_dir.join(ITEMS_FILE);
        let settings_path = data_dir.join(SETTINGS_FILE);

        info!(
            data_dir = %data_dir.display(),
            items = %items_path.display(),
            settings = %settings_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            items_path,
            settings_path,
        })
    }

    /// Missing file loads as empty. A file that does not parse is an error so
    /// the next save cannot silently drop its contents.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        if !self.items_path.exists() {
            debug!("no items file yet");
            return Ok(vec![]);
        }

        let raw = fs::read_to_string(&self.items_path)
            .with_context(|| format!("failed reading {}", self.items_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(vec![]);
        }

        let tasks: Vec<Task> = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.items_path.display()))?;
        debug!(count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_json_atomic(&self.items_path, tasks).context("failed to save tasks")
    }

    /// Missing or malformed settings fall back to defaults.
    #[tracing::instrument(skip(self))]
    pub fn load_settings(&self) -> Settings {
        let raw = match fs::read_to_string(&self.settings_path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(error = %err, "no settings file; using defaults");
                return Settings::default();
            }
        };

        match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    file = %self.settings_path.display(),
                    error = %err,
                    "malformed settings; using defaults"
                );
                Settings::default()
            }
        }
    }

    #[tracing::instrument(skip(self, settings))]
    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        save_json_atomic(&self.settings_path, settings).context("failed to save settings")
    }

    pub fn load_state(&self) -> anyhow::Result<PlannerState> {
        let tasks = self.load_tasks()?;
        let settings = self.load_settings();
        Ok(PlannerState::new(tasks, settings))
    }
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
