//! Process runner - spawning the engine binary and capturing its output

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::command::CommandSpec;
use crate::error::{HarnessError, HarnessResult};

/// Grace period between SIGTERM and SIGKILL when a step times out
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Captured outcome of one subprocess execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code. A process killed by a signal reports `128 + signal`.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl RunResult {
    pub fn new(exit_code: i32, stdout: Vec<u8>, stderr: Vec<u8>, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs one command at a time, blocking the caller until the child exits.
///
/// Internally drives a single-threaded tokio runtime for pipe draining and
/// the optional per-step bound; the public API stays synchronous. Do not call
/// [`ProcessRunner::run`] from inside another tokio runtime.
pub struct ProcessRunner {
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// `timeout` of `None` waits for the child indefinitely.
    pub fn new(timeout: Option<Duration>) -> HarnessResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime, timeout })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Spawn `spec` and wait for it.
    ///
    /// A non-zero exit is a valid result. Only a failure to spawn
    /// ([`HarnessError::Launch`]) or an exceeded bound
    /// ([`HarnessError::Timeout`]) is an error.
    pub fn run(&self, spec: &CommandSpec) -> HarnessResult<RunResult> {
        debug!("Running: {}", spec);
        let start = Instant::now();

        let mut cmd = spec.to_tokio_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also reaches helpers the child forked
        #[cfg(unix)]
        cmd.process_group(0);

        let result = self.runtime.block_on(async {
            let mut child = cmd.spawn().map_err(|source| HarnessError::Launch {
                program: spec.program.to_string_lossy().into_owned(),
                source,
            })?;
            let group = child.id();

            let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
            let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

            // The bound covers the exit and both pipes reaching EOF. A forked
            // helper holding stdout open counts against it too.
            let finished = {
                let collect = async {
                    let status = child.wait().await?;
                    let stdout = join_output(&mut stdout_task).await?;
                    let stderr = join_output(&mut stderr_task).await?;
                    Ok::<_, HarnessError>((status, stdout, stderr))
                };
                match self.timeout {
                    Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
                    None => Some(collect.await),
                }
            };

            match finished {
                Some(output) => output,
                None => {
                    let limit = self.timeout.unwrap_or_default();
                    warn!("Timed out after {:?}: {}", limit, spec);
                    terminate(&mut child, group).await;
                    stdout_task.abort();
                    stderr_task.abort();
                    Err(HarnessError::Timeout {
                        command: spec.to_string(),
                        seconds: limit.as_secs(),
                    })
                }
            }
        });

        let (status, stdout, stderr) = result?;
        let run = RunResult::new(exit_code(status), stdout, stderr, start.elapsed());

        debug!(
            "Exit {} after {} ms: {}",
            run.exit_code,
            run.duration.as_millis(),
            spec
        );
        if !run.stdout.is_empty() {
            debug!("stdout: {}", run.stdout_lossy().trim_end());
        }
        if !run.stderr.is_empty() {
            debug!("stderr: {}", run.stderr_lossy().trim_end());
        }

        Ok(run)
    }
}

async fn drain<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn join_output(
    handle: &mut tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> HarnessResult<Vec<u8>> {
    match handle.await {
        Ok(output) => Ok(output?),
        Err(e) => Err(HarnessError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("output reader task failed: {}", e),
        ))),
    }
}

/// Ask the child's process group to exit, then force it.
///
/// The group is signalled even when the child itself already exited, since
/// a forked helper may still be holding its pipes.
async fn terminate(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = group {
            let pgid = Pid::from_raw(pgid as i32);
            if killpg(pgid, Signal::SIGTERM).is_ok() {
                let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
            }
            let _ = killpg(pgid, Signal::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    let _ = child.kill().await;
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn test_captures_stdout_stderr_and_exit_code() {
        let runner = ProcessRunner::new(None).unwrap();
        let result = runner
            .run(&sh("echo out; echo err >&2; exit 3"))
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, b"out\n");
        assert_eq!(result.stderr, b"err\n");
        assert!(!result.success());
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let runner = ProcessRunner::new(None).unwrap();
        let result = runner.run(&sh("exit 4")).unwrap();
        assert_eq!(result.exit_code, 4);
    }

    #[test]
    fn test_missing_binary_is_launch_error() {
        let runner = ProcessRunner::new(None).unwrap();
        let err = runner
            .run(&CommandSpec::new("/nonexistent/machine-verify-engine"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Launch { .. }), "got {err:?}");
    }

    #[test]
    fn test_timeout_kills_child() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(200))).unwrap();
        let start = Instant::now();
        let err = runner.run(&sh("sleep 30")).unwrap_err();

        assert!(matches!(err, HarnessError::Timeout { .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_covers_forked_helper_holding_stdout() {
        let runner = ProcessRunner::new(Some(Duration::from_secs(1))).unwrap();
        let start = Instant::now();
        let err = runner.run(&sh("sleep 6 & echo started")).unwrap_err();

        assert!(matches!(err, HarnessError::Timeout { seconds: 1, .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());
    }

    #[test]
    fn test_helper_that_closes_its_pipes_does_not_block() {
        let runner = ProcessRunner::new(Some(Duration::from_secs(5))).unwrap();
        let result = runner
            .run(&sh("sleep 6 >/dev/null 2>&1 & echo started"))
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, b"started\n");
        assert!(result.duration < Duration::from_secs(5));
    }

    #[test]
    fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(None).unwrap();
        let spec = sh("printf '%s|' \"$VERIFY_MARKER\"; pwd")
            .cwd(dir.path())
            .env("VERIFY_MARKER", "isolated");
        let result = runner.run(&spec).unwrap();

        let stdout = result.stdout_lossy();
        assert!(stdout.starts_with("isolated|"), "got {stdout}");
        let reported = std::path::PathBuf::from(stdout.trim_end().trim_start_matches("isolated|"));
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_large_output_is_captured_in_full() {
        let runner = ProcessRunner::new(None).unwrap();
        let result = runner
            .run(&sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"))
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_lossy().lines().count(), 20000);
    }
}
