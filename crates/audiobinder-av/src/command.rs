//! Builder for executing one external tool invocation under the process registry.

use crate::registry::{kill_process_group, ProcessRegistry, Scope};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The spawned child is registered in the [`ProcessRegistry`] before it is
/// awaited and deregistered on every exit path: success, failure, timeout,
/// forced kill, or the future being dropped.
///
/// Children are started in their own process group with stdin closed, so an
/// interrupt typed at the terminal reaches only the coordinating process.
///
/// # Example
///
/// ```no_run
/// use audiobinder_av::{ProcessRegistry, Scope, ToolCommand};
///
/// # async fn example() -> audiobinder_av::Result<()> {
/// let registry = ProcessRegistry::new();
/// let output = ToolCommand::new("ffprobe")
///     .args(["-v", "quiet", "-show_format"])
///     .arg("/books/part1.mp3")
///     .run(&registry, &Scope::root())
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set a maximum execution time. Without one, the command runs until it
    /// exits or is killed.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Short program name used in errors and logs.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::SpawnFailed`] if the program exists but cannot be started.
    /// - [`Error::ToolFailed`] if the process exits with a non-zero status
    ///   (message includes stderr).
    /// - [`Error::Killed`] if the process was terminated through the registry.
    /// - [`Error::TimedOut`] if a timeout was set and expired.
    pub async fn run(&self, registry: &ProcessRegistry, scope: &Scope) -> Result<ToolOutput> {
        let program_name = self.program_name();

        if scope.is_cancelled() || registry.is_terminating() {
            return Err(Error::Killed { tool: program_name });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawning {} {:?}", program_name, self.args);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program_name.clone())
            } else {
                Error::SpawnFailed {
                    tool: program_name.clone(),
                    source: e,
                }
            }
        })?;

        let pid = child.id();
        let handle = registry.process_handle(pid, program_name.clone(), scope);
        let cancel = handle.cancel_token().clone();
        let _registration = registry.enroll(handle);

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
            _ = deadline => {
                terminate(&mut child, pid).await;
                abort(stdout);
                abort(stderr);
                return Err(Error::TimedOut {
                    tool: program_name,
                    after: self.timeout.unwrap_or_default(),
                });
            }
        };

        let Some(status) = waited else {
            terminate(&mut child, pid).await;
            abort(stdout);
            abort(stderr);
            #[cfg(feature = "tracing")]
            tracing::debug!("{} killed", program_name);
            return Err(Error::Killed { tool: program_name });
        };

        let status = status.map_err(|e| {
            Error::tool_failed(
                program_name.clone(),
                format!("I/O error waiting for process: {e}"),
            )
        })?;

        let output = ToolOutput {
            status,
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        };

        if !status.success() {
            return Err(Error::tool_failed(
                program_name,
                format!("exited with status {}: {}", status, output.stderr.trim()),
            ));
        }

        Ok(output)
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => task
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn terminate(child: &mut tokio::process::Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
