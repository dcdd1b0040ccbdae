use pipewright_core::command::CommandSpec;
use pipewright_core::error::{Error, Result};
use pipewright_core::options::TestRunnerOptions;

/// Runs the unit tests through karma.
///
/// Excluded files are passed in `KARMA_EXCLUDE` as a JSON array for the
/// karma config to pick up.
pub struct KarmaRunner {
    options: TestRunnerOptions,
}

impl KarmaRunner {
    pub fn new(options: TestRunnerOptions) -> Self {
        Self { options }
    }

    pub fn command(&self) -> Result<CommandSpec> {
        let mut spec = CommandSpec::new(&self.options.program)
            .arg("start")
            .arg(self.options.config_file.to_string_lossy())
            .arg(if self.options.single_run {
                "--single-run"
            } else {
                "--no-single-run"
            });
        if !self.options.exclude.is_empty() {
            spec = spec.env("KARMA_EXCLUDE", serde_json::to_string(&self.options.exclude)?);
        }
        Ok(spec)
    }

    /// Fails with [`Error::TestsFailed`] when tests ran and failed, and with
    /// [`Error::TestRunner`] when karma could not run at all.
    pub async fn run(&self) -> Result<()> {
        let spec = self.command()?;
        tracing::info!("Starting tests: {}", spec.display());

        let output = spec
            .run(None)
            .await
            .map_err(|e| Error::TestRunner(e.to_string()))?;

        for line in output.stdout.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev() {
            tracing::info!("{}", line);
        }

        match output.code {
            Some(0) => {
                tracing::info!("Tests passed");
                Ok(())
            }
            Some(code) => Err(Error::TestsFailed { code }),
            None => Err(Error::TestRunner("karma was killed by a signal".to_string())),
        }
    }
}
