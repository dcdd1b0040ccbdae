//! Stages backed by external collaborator programs.

use std::path::PathBuf;

use async_trait::async_trait;
use pipewright_core::command::CommandSpec;
use pipewright_core::error::{Error, Result};
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Contents go through stdin and come back on stdout, one call per file.
    Transform,
    /// One call with every file path appended; files pass through untouched.
    Check,
}

/// Runs a collaborator over the stream.
///
/// Transform mode replaces each file's contents with the program's output
/// and can rename the extension (`.less` to `.css`). Check mode is for
/// linters: a non-zero exit fails the stage with the program's report.
pub struct CommandStage {
    name: String,
    spec: CommandSpec,
    mode: Mode,
    extension: Option<String>,
}

impl CommandStage {
    pub fn transform(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            mode: Mode::Transform,
            extension: None,
        }
    }

    pub fn check(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            mode: Mode::Check,
            extension: None,
        }
    }

    /// Renames transformed files to this extension.
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    async fn transform_one(&self, mut file: SourceFile) -> Result<SourceFile> {
        let (code, stdout, stderr) = self.spec.run_bytes(&file.contents).await?;
        if code != Some(0) {
            return Err(Error::stage(
                &self.name,
                format!(
                    "{} exited with {} on {}: {}",
                    self.spec.program,
                    describe_code(code),
                    file.full_path().display(),
                    stderr.trim()
                ),
            ));
        }

        file.contents = stdout;
        if let Some(ext) = &self.extension {
            file.path.set_extension(ext);
        }
        Ok(file)
    }
}

fn describe_code(code: Option<i32>) -> String {
    code.map(|c| format!("code {}", c))
        .unwrap_or_else(|| "a signal".to_string())
}

#[async_trait]
impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        match self.mode {
            Mode::Transform => {
                let mut out = Vec::with_capacity(files.len());
                for file in files {
                    out.push(self.transform_one(file).await?);
                }
                Ok(out)
            }
            Mode::Check => {
                if files.is_empty() {
                    return Ok(files);
                }
                let paths: Vec<PathBuf> = files.iter().map(SourceFile::full_path).collect();
                let spec = self
                    .spec
                    .clone()
                    .args(paths.iter().map(|p| p.to_string_lossy().to_string()));
                let output = spec.run(None).await?;
                if !output.success() {
                    let report = format!("{}{}", output.stdout, output.stderr);
                    return Err(Error::stage(
                        &self.name,
                        format!(
                            "{} reported problems ({}):\n{}",
                            self.spec.program,
                            describe_code(output.code),
                            report.trim_end()
                        ),
                    ));
                }
                tracing::debug!("{}: {} file(s) clean", self.name, files.len());
                Ok(files)
            }
        }
    }
}
