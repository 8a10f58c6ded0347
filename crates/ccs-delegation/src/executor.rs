//! Headless executor: run the CLI agent once and collect its result.
//!
//! The agent is started with `--output-format stream-json`; its stdout is fed
//! to a fresh [`StreamDecoder`] chunk by chunk and the decoded events are
//! folded into an [`ExecutionResult`] when the process exits.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::aggregator::{ExecutionResult, ResultParams, build_execution_result};
use crate::config::DelegationConfig;
use crate::decoder::StreamDecoder;
use crate::error::{ExecutorError, ExecutorResult};
use crate::event::StreamEvent;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long stderr may stay open after the agent exits. Grandchildren can
/// inherit the pipe and hold it open indefinitely.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Prompt passed with `-p`.
    pub prompt: String,
    /// Working directory; defaults to the current directory.
    pub cwd: Option<PathBuf>,
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured permission mode.
    pub permission_mode: Option<String>,
    /// Resume this session id (`--resume`).
    pub resume_session: Option<String>,
    /// Logical profile label recorded in the result.
    pub profile: String,
    /// Passthrough arguments appended after the generated ones.
    pub extra_args: Vec<String>,
}

/// Runs the CLI agent non-interactively.
#[derive(Debug, Clone)]
pub struct HeadlessExecutor {
    config: DelegationConfig,
}

impl HeadlessExecutor {
    pub fn new(config: DelegationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// Full argument list for one invocation (without the executable).
    pub fn build_args(&self, options: &ExecutionOptions) -> Vec<String> {
        let mut args = self.config.executable_args.clone();
        args.push("-p".to_string());
        args.push(options.prompt.clone());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        args.push("--verbose".to_string());

        let permission_mode = options
            .permission_mode
            .as_ref()
            .or(self.config.permission_mode.as_ref());
        if let Some(mode) = permission_mode {
            args.push("--permission-mode".to_string());
            args.push(mode.clone());
        }

        if let Some(ref session_id) = options.resume_session {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        args.extend(options.extra_args.iter().cloned());
        args
    }

    /// Run the agent to completion.
    ///
    /// `on_event` sees every decoded event in arrival order, as soon as the
    /// line carrying it is complete.
    pub async fn execute<F>(
        &self,
        options: ExecutionOptions,
        mut on_event: F,
    ) -> ExecutorResult<ExecutionResult>
    where
        F: FnMut(&StreamEvent),
    {
        let cwd = match options.cwd.clone() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Err(ExecutorError::InvalidCwd(cwd.display().to_string()));
        }

        let timeout = options
            .timeout
            .unwrap_or(Duration::from_secs(self.config.default_timeout_secs));
        let limit = self.config.max_output_bytes;
        let args = self.build_args(&options);

        info!(
            "Spawning {} in {:?} (timeout {:?})",
            self.config.executable, cwd, timeout
        );
        debug!("Agent args: {:?}", args);

        let started = Instant::now();
        let mut child = Command::new(&self.config.executable)
            .args(&args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                executable: self.config.executable.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            ExecutorError::Io(std::io::Error::other("agent process has no stdout"))
        })?;
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_capped(stderr, limit, Arc::clone(&stderr_buf))));

        let mut decoder = StreamDecoder::with_max_line_bytes(limit);
        let mut messages = Vec::new();
        let mut raw_stdout = Vec::new();

        let consume = async {
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let chunk = &buf[..n];
                if raw_stdout.len() + n > limit {
                    return Err(ExecutorError::OutputLimit { limit });
                }
                raw_stdout.extend_from_slice(chunk);

                for event in decoder.feed(chunk)? {
                    on_event(&event);
                    messages.push(event);
                }
            }
            for event in decoder.finish() {
                on_event(&event);
                messages.push(event);
            }
            Ok::<ExitStatus, ExecutorError>(child.wait().await?)
        };

        let outcome = tokio::time::timeout(timeout, consume).await;
        let (exit_code, timed_out) = match outcome {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
            Ok(Err(err)) => {
                kill(&mut child).await;
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(err);
            }
            Err(_) => {
                warn!("Agent timed out after {:?}; killing", timeout);
                kill(&mut child).await;
                (-1, true)
            }
        };

        let stderr = collect_stderr(stderr_task, &stderr_buf, STDERR_GRACE).await;

        let result = build_execution_result(ResultParams {
            exit_code,
            stdout: String::from_utf8_lossy(&raw_stdout).into_owned(),
            stderr,
            cwd: cwd.display().to_string(),
            profile: options.profile,
            duration: started.elapsed(),
            timed_out,
            messages,
        });

        info!(
            "Agent finished: exit_code={}, timed_out={}, events={}, duration={}ms",
            result.exit_code,
            result.timed_out,
            result.messages.len(),
            result.duration
        );
        Ok(result)
    }
}

async fn kill(child: &mut Child) {
    if let Err(err) = child.kill().await {
        debug!("Failed to kill agent process: {:?}", err);
    }
}

/// Read a pipe to the end into `captured`, keeping at most `limit` bytes.
async fn read_capped<R>(mut reader: R, limit: usize, captured: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = captured.lock().unwrap_or_else(PoisonError::into_inner);
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(err) => {
                debug!("Failed to read agent stderr: {:?}", err);
                break;
            }
        }
    }
}

/// Wait up to `grace` for the stderr reader, then return whatever it captured.
async fn collect_stderr(
    task: Option<JoinHandle<()>>,
    captured: &Mutex<Vec<u8>>,
    grace: Duration,
) -> String {
    if let Some(mut task) = task
        && tokio::time::timeout(grace, &mut task).await.is_err()
    {
        debug!("Agent stderr still open after {:?}; keeping partial capture", grace);
        task.abort();
    }
    let captured = captured.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&captured).into_owned()
}
