//! Terminal output: headers, status lines, tables and the blue log messages.

mod headers;
mod message;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, SectionStyle};
pub use message::{log_message, Message};
pub use output::{format_duration, print_key_value, print_summary_box};
pub use progress::create_spinner;
pub use status::{print_error, print_success, print_warning};
pub use tables::{print_result_table, print_task_table};
