use async_trait::async_trait;
use pipewright_core::error::Result;
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;

/// Logs every file passing through, for `--verbose` runs.
pub struct Print;

#[async_trait]
impl Stage for Print {
    fn name(&self) -> &str {
        "print"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        for file in &files {
            tracing::info!("{}", file.full_path().display());
        }
        Ok(files)
    }
}
