use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calendar::YearMonth;
use crate::query::{QueryParams, SortMode, StatusFilter};
use crate::task::Priority;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "planner",
    version,
    about = "Planner: to-do list with list and calendar views",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "plannerrc")]
    pub plannerrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Change fields of a task
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Toggle a task between done and active
    Done { id: String },
    /// Remove a task
    Delete { id: String },
    /// List tasks
    List {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// List tasks due today
    Today {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Show completion stats
    Stats,
    /// Show a month grid
    Calendar {
        /// Month as YYYY-MM, defaults to the current month
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<YearMonth>()))]
        month: Option<YearMonth>,
        /// Months to move from `month`
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        shift: i32,
        /// ISO country code for the holiday overlay
        #[arg(long)]
        country: Option<String>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Set the default sort (date, priority, created)
    Sort { mode: String },
    /// Set the theme (light, dark)
    Theme { theme: String },
    /// Set the list layout (grid, list)
    Layout { layout: String },
    /// Print effective configuration
    Show,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskFields {
    /// today, tomorrow, weekday, +Nd, YYYY-MM-DD or none
    #[arg(long, allow_hyphen_values = true)]
    pub due: Option<String>,
    #[arg(
        long,
        short = 'p',
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Substring of title or tag
    #[arg(long, short = 's')]
    pub search: Option<String>,
    /// Exact tag, case-insensitive
    #[arg(long)]
    pub tag: Option<String>,
    /// all, active or done
    #[arg(long)]
    pub status: Option<String>,
    /// date, priority or created; overrides the saved sort
    #[arg(long)]
    pub sort: Option<String>,
    #[arg(long)]
    pub today: bool,
}

impl QueryArgs {
    /// Layers these flags over `base`.
    pub fn apply_to(&self, base: &QueryParams) -> QueryParams {
        QueryParams {
            search: self.search.clone().unwrap_or_else(|| base.search.clone()),
            tag: self.tag.clone().unwrap_or_else(|| base.tag.clone()),
            status: self
                .status
                .as_deref()
                .map(StatusFilter::from_key)
                .unwrap_or(base.status),
            today_only: self.today || base.today_only,
            sort: self
                .sort
                .as_deref()
                .map(SortMode::from_key)
                .unwrap_or(base.sort),
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
