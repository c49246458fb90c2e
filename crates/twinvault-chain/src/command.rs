//! Spawns the contract tooling binary with a timeout and captures its output.
//! Secrets travel through the child's environment, never its argument list.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use twinvault_core::error::{TwinvaultError, TwinvaultResult};

#[derive(Debug, Clone)]
/// Wraps a concrete binary path and the timeout applied to every invocation.
pub struct CommandRunner {
    path: PathBuf,
    timeout: Duration,
}

#[derive(Debug)]
/// Collects stdout, stderr, and exit status from a finished command.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl Output {
    /// Stderr when present, otherwise stdout, trimmed.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

impl CommandRunner {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    pub fn binary(&self) -> &Path {
        &self.path
    }

    /// Execute the binary with arguments and extra environment variables.
    pub fn run(&self, args: &[&str], env: &[(&str, &str)]) -> TwinvaultResult<Output> {
        let mut command = Command::new(&self.path);
        command.args(args);
        command.envs(env.iter().copied());
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        self.wait_with_timeout(child, stdout_pipe, stderr_pipe)
    }

    /// Wait for the child process until it finishes or exceeds the configured timeout.
    fn wait_with_timeout(
        &self,
        mut child: Child,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
    ) -> TwinvaultResult<Output> {
        let start = Instant::now();
        let stdout_handle = Self::spawn_output_reader(stdout_pipe);
        let stderr_handle = Self::spawn_output_reader(stderr_pipe);
        let mut exit_status = None;

        while start.elapsed() <= self.timeout {
            if let Some(status) = child.try_wait()? {
                exit_status = Some(status);
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }

        let Some(exit_status) = exit_status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TwinvaultError::Provider(format!(
                "{} timed out after {:?}",
                self.path.display(),
                self.timeout
            )));
        };

        let stdout = stdout_handle
            .join()
            .map_err(|_| TwinvaultError::Provider("stdout reader thread panicked".into()))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| TwinvaultError::Provider("stderr reader thread panicked".into()))??;

        Ok(Output {
            stdout,
            stderr,
            status: exit_status.code().unwrap_or(-1),
        })
    }

    /// Spin up a helper thread to drain a pipe and return the collected text.
    fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<TwinvaultResult<String>>
    where
        R: Read + Send + 'static,
    {
        thread::spawn(move || -> TwinvaultResult<String> {
            if let Some(mut reader) = pipe {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(String::from_utf8_lossy(&buf).to_string())
            } else {
                Ok(String::new())
            }
        })
    }
}
