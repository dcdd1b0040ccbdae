//! Task execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use pipewright_core::registry::TaskOutcome;

use crate::formatting::{
    create_spinner, format_duration, log_message, print_error, print_key_value, print_result_table,
    print_section_header, print_success, print_summary_box, print_warning, Message, SectionStyle,
};

use super::{load_project, ProjectArgs};

pub async fn cmd_run(args: &ProjectArgs, task: &str, quiet: bool) -> Result<()> {
    let start = Instant::now();
    let project = load_project(args)?;

    // First Ctrl+C stops a running server gracefully, the second one exits.
    let stopping = Arc::new(AtomicBool::new(false));
    let shutdown = project.shutdown.clone();
    ctrlc::set_handler(move || {
        if stopping.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        print_warning("Stopping, press Ctrl+C again to force");
        shutdown.notify_one();
    })
    .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {}", e))?;

    if !quiet {
        print_section_header(&format!("Running '{}'", task), SectionStyle::Primary);
        print_key_value("Project", &project.root.display().to_string());
        println!();
    }

    let spinner = quiet.then(|| create_spinner(&format!("Running {}...", task)));
    let outcome = project.runner.run(&[task.to_string()]).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            print_error(&e.to_string());
            return Err(e.into());
        }
    };

    if quiet {
        return Ok(());
    }

    if let Some(TaskOutcome::Value(value)) = report.result(task).and_then(|r| r.outcome.as_ref()) {
        match value.as_array() {
            Some(items) => items.iter().for_each(|item| log_message(&Message::from(item))),
            None => log_message(&Message::from(value)),
        }
        println!();
    }

    print_section_header("Results", SectionStyle::Secondary);
    print_result_table(&report.results);
    println!();

    let metrics = &report.metrics;
    let slowest = metrics
        .slowest_task()
        .map(|(name, d)| format!("{} ({})", name, format_duration(d.as_secs_f64())))
        .unwrap_or_else(|| "-".to_string());
    print_summary_box(
        "Summary",
        &[
            ("Tasks", &format!("{}/{} succeeded", metrics.tasks_succeeded, metrics.tasks_total)),
            ("Slowest", &slowest),
            ("Run time", &format_duration(metrics.total_duration.as_secs_f64())),
            ("Total", &format_duration(start.elapsed().as_secs_f64())),
        ],
    );
    println!();
    print_success(&format!("Finished '{}'", task));

    Ok(())
}
