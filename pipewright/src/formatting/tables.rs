//! Table formatting utilities using comfy-table.

use comfy_table::{modifiers, presets, Attribute, Cell, Color, ContentArrangement, Table};
use owo_colors::OwoColorize;
use pipewright_core::executor::TaskResult;
use pipewright_core::registry::TaskOutcome;

use super::output::format_duration;
use super::status::Status;

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// One row per task with its direct dependencies.
pub fn print_task_table(tasks: &[(String, Vec<String>)]) {
    let mut t = table(&["Task", "Depends on"]);
    for (name, deps) in tasks {
        let deps = if deps.is_empty() {
            "(none)".bright_black().to_string()
        } else {
            deps.join(", ")
        };
        t.add_row(vec![Cell::new(name).fg(Color::White), Cell::new(deps)]);
    }
    println!("{}", t);
}

fn details(result: &TaskResult) -> String {
    match &result.outcome {
        Some(TaskOutcome::Pipeline(report)) => match report.written.len() {
            0 => format!("{} file(s) checked", report.files),
            n => format!("{} file(s) written", n),
        },
        Some(TaskOutcome::Value(value)) if value.is_array() => {
            format!("{} item(s)", value.as_array().map(Vec::len).unwrap_or_default())
        }
        Some(TaskOutcome::Value(value)) => value.to_string(),
        Some(TaskOutcome::Done) | None => String::new(),
    }
}

/// Status, name, duration and a short description of what each task produced.
pub fn print_result_table(results: &[TaskResult]) {
    let mut t = table(&["Status", "Task", "Time", "Details"]);
    for result in results {
        let (status, color) = if result.success {
            (Status::Success, Color::Green)
        } else {
            (Status::Error, Color::Red)
        };
        t.add_row(vec![
            Cell::new(status.symbol()).fg(color),
            Cell::new(&result.task_name).fg(Color::White),
            Cell::new(format_duration(result.duration.as_secs_f64())).fg(Color::DarkGrey),
            Cell::new(details(result)),
        ]);
    }
    println!("{}", t);
}
