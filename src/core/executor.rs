//! Playbook execution module.
//!
//! Spawns the runner process for one playbook and captures its combined output.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command as ProcessCommand};

use super::RunResult;

/// Runner launched when none is configured.
pub const DEFAULT_RUNNER: &str = "ansible-playbook";

/// Result of executing the runner.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the runner
    pub status: ExitStatus,

    /// Stdout and stderr lines, in the order they arrived
    pub output: String,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the runner succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Launches the external playbook runner.
#[derive(Debug, Clone)]
pub struct Executor {
    /// Runner executable, resolved on `PATH`
    pub program: String,

    /// Arguments passed before the playbook path
    pub args: Vec<String>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_RUNNER)
    }
}

impl Executor {
    /// Create an executor for the given runner program.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Set arguments placed before the playbook path.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Run the playbook at `path` to completion.
    ///
    /// Errors only if the runner could not be spawned or its output could not
    /// be read; a non-zero exit is a successful execution with a failed status.
    pub async fn execute(&self, path: &Path) -> anyhow::Result<ExecutionResult> {
        let start = Instant::now();

        let mut child = ProcessCommand::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let output = match collect_combined(stdout, stderr).await {
            Ok(output) => output,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    tracing::warn!(error = %kill_err, "Failed to stop runner after read error");
                }
                return Err(e.into());
            }
        };

        let status = child.wait().await?;
        let duration = start.elapsed();

        Ok(ExecutionResult { status, output, duration })
    }

    /// Run a playbook and turn the outcome into a [`RunResult`].
    ///
    /// A runner that cannot be launched produces a failed result whose output
    /// is the launch error.
    pub async fn run(&self, name: &str, path: &Path) -> RunResult {
        tracing::info!(playbook = name, path = %path.display(), runner = %self.program, "Starting playbook run");
        let start = Instant::now();

        match self.execute(path).await {
            Ok(result) => {
                tracing::info!(
                    playbook = name,
                    code = ?result.code(),
                    duration = ?result.duration,
                    "Playbook run finished"
                );
                let success = result.success();
                RunResult::new(name, result.output, success, result.duration)
            }
            Err(e) => {
                tracing::error!(playbook = name, runner = %self.program, error = %e, "Failed to launch runner");
                RunResult::new(
                    name,
                    format!("Failed to launch {}: {}", self.program, e),
                    false,
                    start.elapsed(),
                )
            }
        }
    }
}

/// Read stdout and stderr concurrently, one line at a time.
///
/// Lines are appended in the order they complete, so a line from one stream
/// is never split by output from the other. A final line without a newline is
/// kept.
async fn collect_combined(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> std::io::Result<String> {
    let mut combined = String::new();
    let mut out_line = Vec::new();
    let mut err_line = Vec::new();

    let mut out_open = stdout.is_some();
    let mut err_open = stderr.is_some();
    let mut stdout = stdout.map(BufReader::new);
    let mut stderr = stderr.map(BufReader::new);

    while out_open || err_open {
        tokio::select! {
            read = read_line(&mut stdout, &mut out_line), if out_open => {
                if read? == 0 {
                    out_open = false;
                } else {
                    combined.push_str(&String::from_utf8_lossy(&out_line));
                    out_line.clear();
                }
            }
            read = read_line(&mut stderr, &mut err_line), if err_open => {
                if read? == 0 {
                    err_open = false;
                } else {
                    combined.push_str(&String::from_utf8_lossy(&err_line));
                    err_line.clear();
                }
            }
        }
    }

    Ok(combined)
}

/// Read up to and including the next newline.
///
/// Bytes read before a cancelled call stay in `buf`, so the call can be
/// repeated from `select!`.
async fn read_line<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(r) => r.read_until(b'\n', buf).await,
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_executor_defaults() {
        let executor = Executor::default();
        assert_eq!(executor.program, "ansible-playbook");
        assert!(executor.args.is_empty());
    }

    #[tokio::test]
    async fn test_execute_captures_output() {
        let dir = tempdir().unwrap();
        let path = script(dir.path(), "deploy.yml", "echo 'PLAY [all] ... ok=3'\n");

        let result = Executor::new("sh").execute(&path).await.unwrap();
        assert!(result.success());
        assert_eq!(result.code(), Some(0));
        assert_eq!(result.output, "PLAY [all] ... ok=3\n");
    }

    #[tokio::test]
    async fn test_execute_combines_stderr() {
        let dir = tempdir().unwrap();
        let path = script(dir.path(), "broken.yml", "echo out\necho err 1>&2\nexit 2\n");

        let result = Executor::new("sh").execute(&path).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.code(), Some(2));
        assert!(result.output.contains("out\n"));
        assert!(result.output.contains("err\n"));
    }

    #[tokio::test]
    async fn test_args_precede_path() {
        let dir = tempdir().unwrap();
        let path = script(dir.path(), "args.yml", "echo \"$0 $1\"\n");

        let executor = Executor::new("sh").with_args(vec!["-e".to_string()]);
        let result = executor.execute(&path).await.unwrap();
        assert!(result.success());
        assert!(result.output.contains("args.yml"));
    }

    #[tokio::test]
    async fn test_run_maps_exit_code() {
        let dir = tempdir().unwrap();
        let ok = script(dir.path(), "ok.yml", "echo fine\n");
        let bad = script(dir.path(), "bad.yml", "echo nope\nexit 1\n");

        let executor = Executor::new("sh");
        let passed = executor.run("ok.yml", &ok).await;
        let failed = executor.run("bad.yml", &bad).await;

        assert!(passed.success);
        assert_eq!(passed.output, "fine\n");
        assert!(!passed.run_time.is_empty());
        assert!(!failed.success);
        assert_eq!(failed.output, "nope\n");
    }

    #[tokio::test]
    async fn test_run_missing_runner_is_failure() {
        let dir = tempdir().unwrap();
        let path = script(dir.path(), "deploy.yml", "");

        let result = Executor::new("playdash-no-such-runner").run("deploy.yml", &path).await;
        assert!(!result.success);
        assert_eq!(result.playbook_name, "deploy.yml");
        assert!(result.output.contains("playdash-no-such-runner"));
    }

    #[tokio::test]
    async fn test_output_keeps_whole_lines() {
        let dir = tempdir().unwrap();
        let body = "i=0\nwhile [ $i -lt 200 ]; do\n  echo \"out $i \u{e9}t\u{e9} d\u{e9}j\u{e0}\"\n  echo \"err $i \u{fc}ber stra\u{df}e\" >&2\n  i=$((i+1))\ndone\nprintf 'tail'\n";
        let path = script(dir.path(), "mixed.yml", body);

        let result = Executor::new("sh").execute(&path).await.unwrap();
        assert!(result.success());
        assert!(!result.output.contains('\u{fffd}'));

        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines.len(), 401);
        assert_eq!(lines.iter().filter(|l| l.starts_with("out ")).count(), 200);
        assert_eq!(lines.iter().filter(|l| l.starts_with("err ")).count(), 200);
        for line in &lines[..] {
            assert!(
                line.ends_with("\u{e9}t\u{e9} d\u{e9}j\u{e0}")
                    || line.ends_with("\u{fc}ber stra\u{df}e")
                    || *line == "tail",
                "split line: {line:?}"
            );
        }
    }
}
