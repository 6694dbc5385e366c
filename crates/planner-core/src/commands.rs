use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::calendar::{YearMonth, build_month_grid};
use crate::cli::{Command, QueryArgs, TaskFields};
use crate::config::{Config, resolve_holiday_dir};
use crate::datastore::DataStore;
use crate::datetime::{Clock, parse_due_expr};
use crate::holidays::{DirHolidayProvider, HolidayCache, HolidayMap};
use crate::query::SortMode;
use crate::render::Renderer;
use crate::state::{Layout, PlannerState, Theme, UiPatch};
use crate::task::{NewTask, TaskPatch};

pub const MIN_TITLE_CHARS: usize = 2;

#[instrument(skip(store, state, cfg, renderer, command), fields(zone = %clock.zone))]
pub fn dispatch(
    store: &DataStore,
    state: &mut PlannerState,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Option<Command>,
    clock: Clock,
) -> anyhow::Result<()> {
    let today = clock.today();
    let command = command.unwrap_or(Command::List {
        query: QueryArgs::default(),
    });
    debug!(?command, %today, "dispatching command");

    match command {
        Command::Add { title, fields } => cmd_add(store, state, &title.join(" "), fields, &clock),
        Command::Edit { id, title, fields } => cmd_edit(store, state, &id, title, fields, today),
        Command::Done { id } => cmd_done(store, state, &id),
        Command::Delete { id } => cmd_delete(store, state, &id),
        Command::List { query } => cmd_list(state, renderer, &query, false, today),
        Command::Today { query } => cmd_list(state, renderer, &query, true, today),
        Command::Stats => renderer.print_stats(&state.stats()),
        Command::Calendar {
            month,
            shift,
            country,
            query,
        } => cmd_calendar(
            store,
            state,
            cfg,
            renderer,
            CalendarArgs {
                month,
                shift,
                country,
                query,
            },
            today,
        ),
        Command::Sort { mode } => cmd_sort(store, state, &mode),
        Command::Theme { theme } => cmd_theme(store, state, &theme),
        Command::Layout { layout } => cmd_layout(store, state, &layout),
        Command::Show => cmd_show(store, state, cfg, &clock),
    }
}

#[instrument(skip(store, state, fields, clock))]
fn cmd_add(
    store: &DataStore,
    state: &mut PlannerState,
    title: &str,
    fields: TaskFields,
    clock: &Clock,
) -> anyhow::Result<()> {
    info!("command add");

    let today = clock.today();
    let title = validate_title(title)?;
    let due_date = fields
        .due
        .as_deref()
        .map(|raw| resolve_due(raw, today))
        .transpose()?;

    let task = state.add_task(
        NewTask {
            title,
            due_date,
            priority: fields.priority,
            tag: fields.tag,
        },
        clock.now_millis(),
    );
    let short = task.short_id().to_string();

    store.save_tasks(&state.tasks)?;
    println!("Task added ({short}).");
    Ok(())
}

#[instrument(skip(store, state, title, fields, today))]
fn cmd_edit(
    store: &DataStore,
    state: &mut PlannerState,
    id: &str,
    title: Option<String>,
    fields: TaskFields,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command edit");

    let id = state.resolve_id(id)?;
    let patch = TaskPatch {
        title: title.as_deref().map(validate_title).transpose()?,
        due_date: fields
            .due
            .as_deref()
            .map(|raw| resolve_due(raw, today))
            .transpose()?,
        priority: fields.priority,
        tag: fields.tag,
        done: None,
    };
    if patch.title.is_none()
        && patch.due_date.is_none()
        && patch.priority.is_none()
        && patch.tag.is_none()
    {
        return Err(anyhow!(
            "nothing to change; pass --title, --due, --priority or --tag"
        ));
    }

    state
        .update_task(&id, patch)
        .ok_or_else(|| anyhow!("task disappeared while editing: {id}"))?;
    store.save_tasks(&state.tasks)?;
    println!("Changes saved.");
    Ok(())
}

#[instrument(skip(store, state))]
fn cmd_done(store: &DataStore, state: &mut PlannerState, id: &str) -> anyhow::Result<()> {
    info!("command done");

    let id = state.resolve_id(id)?;
    let task = state
        .toggle_done(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    let message = if task.done {
        format!("Completed \"{}\".", task.title)
    } else {
        format!("Reopened \"{}\".", task.title)
    };

    store.save_tasks(&state.tasks)?;
    println!("{message}");
    Ok(())
}

#[instrument(skip(store, state))]
fn cmd_delete(store: &DataStore, state: &mut PlannerState, id: &str) -> anyhow::Result<()> {
    info!("command delete");

    let id = state.resolve_id(id)?;
    if !state.delete_task(&id) {
        return Err(anyhow!("task not found: {id}"));
    }
    store.save_tasks(&state.tasks)?;
    println!("Task deleted.");
    Ok(())
}

#[instrument(skip(state, renderer, query, today))]
fn cmd_list(
    state: &mut PlannerState,
    renderer: &mut Renderer,
    query: &QueryArgs,
    today_only: bool,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    apply_query(state, query, today_only);
    let result = state.filtered_sorted(today);
    renderer.print_task_list(&result, &state.ui, state.settings.layout)
}

#[derive(Debug)]
struct CalendarArgs {
    month: Option<YearMonth>,
    shift: i32,
    country: Option<String>,
    query: QueryArgs,
}

#[instrument(skip(store, state, cfg, renderer, args, today))]
fn cmd_calendar(
    store: &DataStore,
    state: &mut PlannerState,
    cfg: &Config,
    renderer: &mut Renderer,
    args: CalendarArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command calendar");

    let base = args.month.unwrap_or_else(|| YearMonth::from_date(today));
    let year_month = base.checked_shift(args.shift)?;

    apply_query(state, &args.query, false);
    let holidays = load_holidays(store, cfg, args.country.as_deref(), year_month);
    let result = state.filtered_sorted(today);
    let grid = build_month_grid(year_month, &result.tasks, &result.today, holidays.as_ref());

    renderer.print_month_grid(&grid)
}

/// `None` when no country is configured.
fn load_holidays(
    store: &DataStore,
    cfg: &Config,
    country: Option<&str>,
    year_month: YearMonth,
) -> Option<HolidayMap> {
    let country = country
        .map(str::to_string)
        .or_else(|| cfg.get_nonempty("holiday.country"))?;
    let dir = resolve_holiday_dir(cfg, &store.data_dir);
    debug!(country = %country, dir = %dir.display(), "loading holidays");

    let mut cache = HolidayCache::new(DirHolidayProvider::new(dir));
    Some(cache.for_grid(&country, year_month))
}

#[instrument(skip(store, state))]
fn cmd_sort(store: &DataStore, state: &mut PlannerState, raw: &str) -> anyhow::Result<()> {
    let sort = match raw.trim().to_ascii_lowercase().as_str() {
        "date" => SortMode::Date,
        "priority" => SortMode::Priority,
        "created" => SortMode::Created,
        other => return Err(anyhow!("invalid sort: {other} (expected date, priority or created)")),
    };
    state.set_sort(sort);
    store.save_settings(&state.settings)?;
    println!("Sorted by {}.", sort.label());
    Ok(())
}

#[instrument(skip(store, state))]
fn cmd_theme(store: &DataStore, state: &mut PlannerState, raw: &str) -> anyhow::Result<()> {
    let theme = Theme::from_key(raw)
        .ok_or_else(|| anyhow!("invalid theme: {raw} (expected light or dark)"))?;
    state.set_theme(theme);
    store.save_settings(&state.settings)?;
    match theme {
        Theme::Dark => println!("Dark theme enabled."),
        Theme::Light => println!("Light theme enabled."),
    }
    Ok(())
}

#[instrument(skip(store, state))]
fn cmd_layout(store: &DataStore, state: &mut PlannerState, raw: &str) -> anyhow::Result<()> {
    let layout = Layout::from_key(raw)
        .ok_or_else(|| anyhow!("invalid layout: {raw} (expected grid or list)"))?;
    state.set_layout(layout);
    store.save_settings(&state.settings)?;
    match layout {
        Layout::Grid => println!("Grid layout."),
        Layout::List => println!("List layout."),
    }
    Ok(())
}

fn cmd_show(
    store: &DataStore,
    state: &PlannerState,
    cfg: &Config,
    clock: &Clock,
) -> anyhow::Result<()> {
    match &cfg.source {
        Some(path) => println!("# plannerrc {}", path.display()),
        None => println!("# plannerrc (none, defaults)"),
    }
    for (key, value) in cfg.iter() {
        println!("{key} = {value}");
    }
    println!("data.resolved = {}", store.data_dir.display());
    println!("zone.resolved = {}", clock.zone);
    println!("today = {}", clock.today());
    println!("theme = {}", state.settings.theme.as_key());
    println!("layout = {}", state.settings.layout.as_key());
    println!("sort = {}", state.settings.sort.as_key());
    Ok(())
}

fn apply_query(state: &mut PlannerState, query: &QueryArgs, today_only: bool) {
    let params = query.apply_to(&state.ui);
    state.set_ui(UiPatch {
        search: Some(params.search),
        tag: Some(params.tag),
        status: Some(params.status),
        today_only: Some(params.today_only || today_only),
        sort: Some(params.sort),
    });
}

pub fn validate_title(raw: &str) -> anyhow::Result<String> {
    let title = raw.trim();
    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(anyhow!(
            "title is too short (min {MIN_TITLE_CHARS} chars)"
        ));
    }
    Ok(title.to_string())
}

/// Due expression to the stored `YYYY-MM-DD` form; empty clears.
pub fn resolve_due(raw: &str, today: NaiveDate) -> anyhow::Result<String> {
    let due = parse_due_expr(raw, today).with_context(|| format!("invalid --due value: {raw}"))?;
    Ok(due
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default())
}
