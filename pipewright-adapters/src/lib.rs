//! Pipeline stages, manifest adapters and the standard task catalogue.

pub mod clean;
pub mod command_stage;
pub mod inject;
pub mod manifest;
pub mod print;
pub mod rev;
pub mod tasks;
pub mod template_cache;
pub mod test_runner;
pub mod useref;
pub mod wiredep;

pub use command_stage::CommandStage;
pub use inject::Inject;
pub use manifest::{manifest_adapters, JsonManifest};
pub use print::Print;
pub use rev::{Rev, RevManifest, RevReplace};
pub use tasks::{apply_project_tasks, standard_registry, CatalogueContext, Toolchain};
pub use template_cache::TemplateCache;
pub use test_runner::KarmaRunner;
pub use useref::Useref;
pub use wiredep::Wiredep;
