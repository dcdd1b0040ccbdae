//! External command invocation with streamed output.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdin, Command};

use crate::error::{Error, Result};
use crate::registry::{TaskAction, TaskOutcome};

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A program plus arguments, run without a shell.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: HashMap::new(),
        }
    }

    /// Runs `line` through `sh -c`, as configured shell tasks do.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Runs the command to completion, feeding `stdin` when given.
    ///
    /// Each output line is logged at debug level as it arrives. A non-zero
    /// exit is not an error here; callers inspect [`CommandOutput::code`].
    pub async fn run(&self, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let mut child = self
            .to_command()
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::stage(&self.program, format!("Failed to spawn: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::stage(&self.program, "Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::stage(&self.program, "Failed to capture stderr"))?;

        let program = self.program.clone();
        let out_task = tokio::spawn(collect_lines(stdout, program.clone(), false));
        let err_task = tokio::spawn(collect_lines(stderr, program, true));

        // Readers are already draining, so a large input cannot deadlock on full pipes.
        if let (Some(input), Some(pipe)) = (stdin, child.stdin.take()) {
            feed_stdin(pipe, input, &self.program).await?;
        }

        let status = child.wait().await?;
        let stdout = out_task.await.map_err(|e| Error::Join(e.to_string()))??;
        let stderr = err_task.await.map_err(|e| Error::Join(e.to_string()))??;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

impl CommandSpec {
    /// Like [`run`](Self::run) but keeps stdout as raw bytes, for
    /// collaborators that emit binary output such as compressed images.
    pub async fn run_bytes(&self, stdin: &[u8]) -> Result<(Option<i32>, Vec<u8>, String)> {
        use tokio::io::AsyncReadExt;

        let mut child = self
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::stage(&self.program, format!("Failed to spawn: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::stage(&self.program, "Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::stage(&self.program, "Failed to capture stderr"))?;

        let out_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        });
        let err_task = tokio::spawn(collect_lines(stderr, self.program.clone(), true));

        if let Some(pipe) = child.stdin.take() {
            feed_stdin(pipe, stdin, &self.program).await?;
        }

        let status = child.wait().await?;
        let stdout = out_task.await.map_err(|e| Error::Join(e.to_string()))??;
        let stderr = err_task.await.map_err(|e| Error::Join(e.to_string()))??;
        Ok((status.code(), stdout, stderr))
    }
}

/// Writes `input` and closes the pipe. A collaborator that exits before
/// reading everything is not an error here; its exit code and stderr say why.
async fn feed_stdin(mut pipe: ChildStdin, input: &[u8], program: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    match pipe.write_all(input).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!("{} closed stdin early", program);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn collect_lines<R>(reader: R, program: String, is_stderr: bool) -> Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Some(line) = lines.next_line().await? {
        tracing::debug!(
            target: "pipewright::command",
            stream = if is_stderr { "stderr" } else { "stdout" },
            "[{}] {}",
            program,
            line
        );
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

/// Task action running a shell command, for tasks declared in `pipewright.toml`.
pub struct ShellAction {
    spec: CommandSpec,
}

impl ShellAction {
    pub fn new(line: impl Into<String>, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec: CommandSpec::shell(line).current_dir(current_dir),
        }
    }
}

#[async_trait]
impl TaskAction for ShellAction {
    async fn run(&self) -> Result<TaskOutcome> {
        let output = self.spec.run(None).await?;
        if !output.success() {
            return Err(Error::stage(
                self.spec.display(),
                format!(
                    "exited with {}: {}",
                    output
                        .code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    output.stderr.trim()
                ),
            ));
        }
        Ok(TaskOutcome::Value(serde_json::Value::String(
            output.stdout.trim_end().to_string(),
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_code() {
        let output = CommandSpec::shell("echo out; echo err >&2; exit 3")
            .run(None)
            .await
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let output = CommandSpec::new("cat").run(Some(b"body")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "body\n");
    }

    #[tokio::test]
    async fn keeps_binary_stdout() {
        let input = [0u8, 159, 146, 150, 255];
        let (code, stdout, _) = CommandSpec::new("cat").run_bytes(&input).await.unwrap();
        assert_eq!(code, Some(0));
        assert_eq!(stdout, input);
    }

    #[tokio::test]
    async fn early_exit_keeps_code_and_report() {
        let input = vec![b'a'; 4 * 1024 * 1024];
        let spec = CommandSpec::new("sh").args(["-c", "echo 'syntax error line 1' >&2; exit 3"]);

        let (code, stdout, stderr) = spec.run_bytes(&input).await.unwrap();
        assert_eq!(code, Some(3));
        assert!(stdout.is_empty());
        assert_eq!(stderr, "syntax error line 1\n");

        let output = spec.run(Some(&input)).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr, "syntax error line 1\n");
    }

    #[tokio::test]
    async fn shell_action_fails_on_nonzero_exit() {
        let action = ShellAction::new("exit 1", ".");
        assert!(matches!(action.run().await, Err(Error::Stage { .. })));
    }
}
