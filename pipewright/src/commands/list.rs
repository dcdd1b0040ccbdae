use anyhow::Result;
use serde_json::json;

use crate::formatting::{print_section_header, print_task_table, SectionStyle};

use super::{load_project, ProjectArgs};

pub fn cmd_list(args: &ProjectArgs, json: bool) -> Result<()> {
    let project = load_project(args)?;
    let registry = project.runner.registry();

    // Declared order, not the graph's sorted neighbours.
    let mut tasks = Vec::new();
    for name in registry.names() {
        let deps = registry.resolve(&name)?.dependencies.clone();
        tasks.push((name, deps));
    }

    if json {
        let listing: Vec<_> = tasks
            .iter()
            .map(|(name, deps)| json!({ "name": name, "dependencies": deps }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_section_header("Tasks", SectionStyle::Primary);
    print_task_table(&tasks);
    Ok(())
}
