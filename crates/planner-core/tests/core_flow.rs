use std::fs;

use chrono::NaiveDate;
use planner_core::calendar::{YearMonth, build_month_grid, shift_month};
use planner_core::datastore::DataStore;
use planner_core::holidays::{DirHolidayProvider, HolidayCache};
use planner_core::query::{QueryParams, SortMode, StatusFilter, filter_and_sort};
use planner_core::state::UiPatch;
use planner_core::task::{NewTask, Priority, Task};
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn titles(tasks: &[Task], params: &QueryParams, today: NaiveDate) -> Vec<String> {
    filter_and_sort(tasks, params, today)
        .tasks
        .iter()
        .map(|t| t.title.clone())
        .collect()
}

fn new_task(title: &str, due: &str, priority: Priority) -> NewTask {
    NewTask {
        title: title.to_string(),
        due_date: Some(due.to_string()),
        priority: Some(priority),
        tag: None,
    }
}

#[test]
fn persisted_tasks_sort_by_date_then_priority() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut state = store.load_state().expect("load state");
    state.add_task(new_task("A", "2024-03-10", Priority::Low), 100);
    state.add_task(new_task("B", "", Priority::High), 200);
    store.save_tasks(&state.tasks).expect("save tasks");

    let mut state = store.load_state().expect("reload state");
    let today = ymd(2024, 3, 1);
    assert_eq!(titles(&state.tasks, &state.ui, today), vec!["A", "B"]);

    state.set_sort(SortMode::Priority);
    store.save_settings(&state.settings).expect("save settings");
    let reloaded = store.load_state().expect("reload settings");
    assert_eq!(reloaded.ui.sort, SortMode::Priority);
    assert_eq!(
        titles(&reloaded.tasks, &reloaded.ui, today),
        vec!["B", "A"]
    );
}

#[test]
fn dated_task_lands_in_exactly_one_cell_of_its_month() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let mut state = store.load_state().expect("load state");
    state.add_task(new_task("Report", "2024-03-15", Priority::Mid), 1);
    state.add_task(new_task("Someday", "", Priority::Mid), 2);

    let result = state.filtered_sorted(ymd(2024, 3, 15));
    let march = YearMonth::new(2024, 3).expect("month");

    let grid = build_month_grid(march, &result.tasks, &result.today, None);
    assert_eq!(grid.cells.len(), 42);
    let hits: Vec<_> = grid
        .cells
        .iter()
        .filter(|c| c.tasks.iter().any(|t| t.title == "Report"))
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].date_key(), "2024-03-15");
    assert!(hits[0].is_today);
    assert_eq!(grid.undated.len(), 1);
    assert_eq!(grid.undated[0].title, "Someday");

    for delta in [-2, -1, 1, 2] {
        let other = shift_month(march, delta);
        let grid = build_month_grid(other, &result.tasks, &result.today, None);
        assert!(
            grid.cells
                .iter()
                .all(|c| c.tasks.iter().all(|t| t.title != "Report")),
            "found in {other}"
        );
    }
}

#[test]
fn crowded_day_shows_three_and_counts_the_rest() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let mut state = store.load_state().expect("load state");
    for (n, priority) in [Priority::Low, Priority::High, Priority::Mid, Priority::Low, Priority::High]
        .into_iter()
        .enumerate()
    {
        state.add_task(new_task(&format!("t{n}"), "2024-05-20", priority), n as i64);
    }
    state.set_sort(SortMode::Priority);
    state.set_ui(UiPatch {
        status: Some(StatusFilter::Active),
        ..UiPatch::default()
    });

    let result = state.filtered_sorted(ymd(2024, 5, 1));
    let grid = build_month_grid(
        YearMonth::new(2024, 5).expect("month"),
        &result.tasks,
        &result.today,
        None,
    );
    let cell = grid
        .cells
        .iter()
        .find(|c| c.date_key() == "2024-05-20")
        .expect("cell in grid");
    assert_eq!(cell.tasks.len(), 3);
    assert_eq!(cell.more, 2);
    assert_eq!(cell.due_count(), 5);
    assert!(cell.tasks[..2].iter().all(|t| t.priority == Priority::High));
}

#[test]
fn holiday_files_overlay_the_grid() {
    let temp = tempdir().expect("tempdir");
    let holiday_dir = temp.path().join("holidays");
    fs::create_dir_all(&holiday_dir).expect("mkdir");
    fs::write(
        holiday_dir.join("DE-2024.json"),
        r#"[{"date":"2024-12-25","name":"Christmas Day","localName":"Weihnachtstag"}]"#,
    )
    .expect("write 2024");
    fs::write(
        holiday_dir.join("DE-2025.json"),
        r#"[{"date":"2025-01-01","name":"New Year's Day","localName":"Neujahr"}]"#,
    )
    .expect("write 2025");

    let december = YearMonth::new(2024, 12).expect("month");
    let mut cache = HolidayCache::new(DirHolidayProvider::new(&holiday_dir));
    let holidays = cache.for_grid("de", december);

    let grid = build_month_grid(december, &[], "2024-12-01", Some(&holidays));
    let named: Vec<_> = grid
        .cells
        .iter()
        .filter_map(|c| c.holiday.map(|h| (c.date_key(), h.local_name.clone())))
        .collect();
    assert_eq!(
        named,
        vec![
            ("2024-12-25".to_string(), "Weihnachtstag".to_string()),
            ("2025-01-01".to_string(), "Neujahr".to_string()),
        ]
    );
}
