use anyhow::Result;
use owo_colors::OwoColorize;

use crate::formatting::{print_key_value, print_section_header, SectionStyle};

use super::{load_project, ProjectArgs};

/// Shows what `pipewright <task>` would run, level by level.
pub fn cmd_plan(args: &ProjectArgs, task: &str, json: bool) -> Result<()> {
    let project = load_project(args)?;
    let levels = project.runner.graph().execution_plan(&[task.to_string()])?;

    if json {
        println!("{}", serde_json::to_string_pretty(&levels)?);
        return Ok(());
    }

    print_section_header(&format!("Plan for '{}'", task), SectionStyle::Primary);
    for (idx, level) in levels.iter().enumerate() {
        print_key_value(&format!("Level {}", idx + 1), &level.join(", "));
    }
    println!();
    println!(
        "  {} {} task(s) in {} level(s)",
        "→".cyan(),
        levels.iter().map(Vec::len).sum::<usize>().bold(),
        levels.len().bold()
    );
    Ok(())
}
