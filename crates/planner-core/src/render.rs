use std::io::{self, IsTerminal, Write};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::calendar::{CalendarCell, MonthGrid, WEEKDAY_LABELS};
use crate::config::Config;
use crate::query::{QueryParams, QueryResult, StatusFilter, Stats};
use crate::state::{Layout, Theme};
use crate::task::{Priority, Task};

const CELL_WIDTH: usize = 16;
const PROGRESS_WIDTH: usize = 30;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    theme: Theme,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);

        Ok(Self {
            color: color && io::stdout().is_terminal(),
            theme,
        })
    }

    pub fn plain() -> Self {
        Self {
            color: false,
            theme: Theme::Light,
        }
    }

    #[tracing::instrument(skip(self, result, params))]
    pub fn print_task_list(
        &mut self,
        result: &QueryResult<'_>,
        params: &QueryParams,
        layout: Layout,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_meta(&mut out, result.tasks.len(), params)?;
        if result.tasks.is_empty() {
            writeln!(out, "Nothing here yet.")?;
            return Ok(());
        }
        match layout {
            Layout::List => self.write_task_table(&mut out, &result.tasks, &result.today),
            Layout::Grid => self.write_task_cards(&mut out, &result.tasks, &result.today),
        }
    }

    pub fn write_meta<W: Write>(
        &self,
        mut out: W,
        count: usize,
        params: &QueryParams,
    ) -> anyhow::Result<()> {
        let mut filters = Vec::new();
        let search = params.search.trim();
        if !search.is_empty() {
            filters.push(format!("search: \"{search}\""));
        }
        let tag = params.tag.trim();
        if !tag.is_empty() {
            filters.push(format!("tag: \"{tag}\""));
        }
        if params.status != StatusFilter::All {
            filters.push(format!("status: {}", params.status.as_key()));
        }
        if params.today_only {
            filters.push("today".to_string());
        }

        let line = if filters.is_empty() {
            format!("{count} task(s) · sorted by {}", params.sort.label())
        } else {
            format!("{count} result(s) · {}", filters.join(" · "))
        };
        writeln!(out, "{}", self.paint(&line, "2"))?;
        Ok(())
    }

    pub fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[&Task],
        today: &str,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "", "Due", "Pri", "Title", "Tag"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(task.short_id(), "33"),
                    check_mark(task).to_string(),
                    self.paint_due(task, today),
                    self.paint_priority(&task.priority),
                    self.paint_title(task),
                    tag_label(task),
                ]
            })
            .collect::<Vec<_>>();

        write_table(out, headers, rows)
    }

    pub fn write_task_cards<W: Write>(
        &self,
        mut out: W,
        tasks: &[&Task],
        today: &str,
    ) -> anyhow::Result<()> {
        for task in tasks {
            writeln!(
                out,
                "{} {}  {}",
                check_mark(task),
                self.paint_title(task),
                self.paint(task.short_id(), "33")
            )?;
            let mut meta = vec![
                self.paint_due(task, today),
                self.paint_priority(&task.priority),
            ];
            let tag = tag_label(task);
            if !tag.is_empty() {
                meta.push(tag);
            }
            writeln!(out, "    {}", meta.join(" · "))?;
        }
        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats) -> anyhow::Result<()> {
        self.write_stats(io::stdout().lock(), stats)
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: &Stats) -> anyhow::Result<()> {
        writeln!(out, "total     {}", stats.total)?;
        writeln!(out, "done      {}", stats.done)?;
        writeln!(out, "progress  {}%", stats.percent_done)?;

        let filled = PROGRESS_WIDTH * stats.percent_done as usize / 100;
        writeln!(
            out,
            "[{}{}]",
            self.paint(&"#".repeat(filled), "32"),
            "-".repeat(PROGRESS_WIDTH - filled)
        )?;

        let message = if stats.total == 0 {
            "No tasks yet. Add your first one."
        } else if stats.done == stats.total {
            "Nice, everything is done."
        } else {
            "Keep going, you're making progress."
        };
        writeln!(out, "{message}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, grid), fields(year_month = %grid.year_month))]
    pub fn print_month_grid(&mut self, grid: &MonthGrid<'_>) -> anyhow::Result<()> {
        self.write_month_grid(io::stdout().lock(), grid)
    }

    pub fn write_month_grid<W: Write>(&self, mut out: W, grid: &MonthGrid<'_>) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&grid.year_month.title(), "1"))?;

        let header = WEEKDAY_LABELS
            .iter()
            .map(|label| pad(label, CELL_WIDTH))
            .collect::<Vec<_>>()
            .join("|");
        writeln!(out, "{header}")?;
        let rule = vec!["-".repeat(CELL_WIDTH); 7].join("+");

        for week in grid.weeks() {
            writeln!(out, "{rule}")?;
            let columns = week
                .iter()
                .map(|cell| self.cell_lines(cell))
                .collect::<Vec<_>>();
            let height = columns.iter().map(Vec::len).max().unwrap_or(1);

            for row in 0..height {
                let line = columns
                    .iter()
                    .map(|lines| {
                        let text = lines.get(row).map(String::as_str).unwrap_or("");
                        pad(text, CELL_WIDTH)
                    })
                    .collect::<Vec<_>>()
                    .join("|");
                writeln!(out, "{}", line.trim_end())?;
            }
        }
        writeln!(out, "{rule}")?;

        if !grid.undated.is_empty() {
            writeln!(out)?;
            writeln!(out, "No date ({})", grid.undated.len())?;
            for task in &grid.undated {
                writeln!(
                    out,
                    "  {} {}  {}",
                    check_mark(task),
                    self.paint_title(task),
                    self.paint(task.short_id(), "33")
                )?;
            }
        }
        Ok(())
    }

    /// Painted text has to be width-measured without escapes, so cells are
    /// truncated first and painted after.
    fn cell_lines(&self, cell: &CalendarCell<'_>) -> Vec<String> {
        let width = CELL_WIDTH;
        let mut day = cell.date.format("%e").to_string().trim().to_string();
        if cell.is_today {
            day = format!("[{day}]");
        }
        let day = if cell.is_other_month {
            self.paint(&day, "2")
        } else if cell.is_today {
            self.paint(&day, "7")
        } else {
            day
        };

        let mut lines = vec![day];
        if let Some(holiday) = cell.holiday {
            let name = truncate(&holiday.display_name(), width);
            lines.push(self.paint(&name, self.accent("35", "95")));
        }
        for task in &cell.tasks {
            let title = truncate(&format!("{} {}", check_mark(task), task.title), width);
            lines.push(if task.done {
                self.paint(&title, "2")
            } else {
                title
            });
        }
        if cell.more > 0 {
            lines.push(self.paint(&format!("+{} more", cell.more), "2"));
        }
        lines
    }

    fn paint_due(&self, task: &Task, today: &str) -> String {
        let label = due_label(&task.due_date, today);
        if task.due_date == today {
            self.paint(&label, self.accent("33", "93"))
        } else if !task.done && task.due().is_some() && task.due_date.as_str() < today {
            self.paint(&label, self.accent("31", "91"))
        } else {
            label
        }
    }

    fn paint_priority(&self, priority: &Priority) -> String {
        match priority {
            Priority::High => self.paint(priority.label(), self.accent("31", "91")),
            Priority::Low => self.paint(priority.label(), "2"),
            Priority::Mid | Priority::Unknown(_) => priority.label().to_string(),
        }
    }

    fn paint_title(&self, task: &Task) -> String {
        if task.done {
            self.paint(&task.title, "9")
        } else {
            task.title.clone()
        }
    }

    fn accent<'a>(&self, light: &'a str, dark: &'a str) -> &'a str {
        match self.theme {
            Theme::Light => light,
            Theme::Dark => dark,
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn due_label(due_date: &str, today: &str) -> String {
    if due_date.is_empty() {
        "No date".to_string()
    } else if due_date == today {
        "Due today".to_string()
    } else {
        format!("Due {due_date}")
    }
}

fn check_mark(task: &Task) -> &'static str {
    if task.done { "[x]" } else { "[ ]" }
}

fn tag_label(task: &Task) -> String {
    if task.tag.is_empty() {
        String::new()
    } else {
        format!("#{}", task.tag)
    }
}

fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(text).as_str());
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
