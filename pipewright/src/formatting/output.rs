use owo_colors::OwoColorize;

/// Prints labelled values inside a box sized to the longest label.
pub fn print_summary_box(title: &str, items: &[(&str, &str)]) {
    let width = items.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    println!("╭─ {} {}", title.cyan().bold(), "─".repeat(40).bright_black());
    for (key, value) in items {
        println!(
            "│ {:<width$}  {}",
            key.bright_black().bold().to_string(),
            value.white().bold(),
            width = width + label_padding(key)
        );
    }
    println!("╰{}", "─".repeat(44).bright_black());
}

// Escape codes count toward `{:<width$}`, so pad by their length too.
fn label_padding(key: &str) -> usize {
    key.bright_black().bold().to_string().len() - key.len()
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {}", key.bright_black().bold(), value.bold().white());
}

/// `0.25` is `250ms`, `12.5` is `12.50s`, `75.0` is `1m 15.0s`.
pub fn format_duration(seconds: f64) -> String {
    match seconds {
        s if s < 1.0 => format!("{:.0}ms", s * 1000.0),
        s if s < 60.0 => format!("{:.2}s", s),
        s => format!("{}m {:.1}s", (s / 60.0) as u64, s % 60.0),
    }
}
