//! Async background task manager (§4.8): a process-wide, bounded-cardinality
//! map of spawned commands whose stdout+stderr streams into an in-memory
//! ring buffer, spilling past `max_async_output_len` bytes to a spool file.
//!
//! Grounded on the spawn/reap discipline in `agentsdk-exec/src/pipe.rs`
//! (piped stdio, a reader task per stream) and on the executor's output
//! persister (`agentsdk-core/src/executor/persister.rs`) for the
//! `<base>/<session>/<id>.out` spool-file convention.

use crate::context::CancelToken;
use crate::error::{AgentError, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, Notify, RwLock};

/// Default bound on the number of concurrently tracked tasks (§4.8).
pub const DEFAULT_MAX_TASKS: usize = 64;

/// Default in-memory ring capacity before output spills to disk.
pub const DEFAULT_MAX_ASYNC_OUTPUT_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    Killed,
    Timeout(Duration),
    Exited(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Killed => write!(f, "killed"),
            TaskError::Timeout(d) => write!(f, "command timeout after {d:?}"),
            TaskError::Exited(msg) => write!(f, "{msg}"),
        }
    }
}

struct TaskState {
    command: String,
    ring: Vec<u8>,
    spool_path: Option<PathBuf>,
    spool_file: Option<tokio::fs::File>,
    done: bool,
    error: Option<TaskError>,
    exit_code: Option<i32>,
    cancel: CancelToken,
}

/// A snapshot of a task's status, returned by `list`/`lookup`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: String,
    pub command: String,
    pub done: bool,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

/// Bytes accumulated since the previous `get_output` call, plus completion.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub chunk: Vec<u8>,
    pub done: bool,
}

struct Inner {
    base: PathBuf,
    max_tasks: usize,
    max_output_len: usize,
    tasks: RwLock<HashMap<String, Arc<Mutex<TaskState>>>>,
    done_notify: Notify,
}

/// Process-wide async task manager. Cheap to clone; all state lives behind
/// an `Arc`.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_limits(base, DEFAULT_MAX_TASKS, DEFAULT_MAX_ASYNC_OUTPUT_LEN)
    }

    pub fn with_limits(base: impl Into<PathBuf>, max_tasks: usize, max_output_len: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                base: base.into(),
                max_tasks,
                max_output_len,
                tasks: RwLock::new(HashMap::new()),
                done_notify: Notify::new(),
            }),
        }
    }

    /// `start(id, command)` (§4.8): launches under a fresh derived context.
    pub async fn start(&self, id: &str, command: &str, workdir: &Path) -> Result<()> {
        self.start_with_context(CancelToken::new(), id, command, workdir, None)
            .await
    }

    /// `start_with_context` (§4.8): rejects duplicate ids and overflow,
    /// launches `command` under a context derived from `ctx`, and spawns a
    /// reader that spools stdout+stderr into the ring, spilling past
    /// `max_async_output_len` to `<base>/<session>/<id>.out`.
    pub async fn start_with_context(
        &self,
        ctx: CancelToken,
        id: &str,
        command: &str,
        workdir: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        {
            let tasks = self.inner.tasks.read().await;
            if tasks.contains_key(id) {
                return Err(AgentError::Validation(format!("task id already in use: {id}")));
            }
            if tasks.len() >= self.inner.max_tasks {
                return Err(AgentError::Validation(format!(
                    "task manager at capacity ({} tasks)",
                    self.inner.max_tasks
                )));
            }
        }

        let task_cancel = ctx.child();

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::Tool(format!("failed to spawn background task: {e}")))?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let state = Arc::new(Mutex::new(TaskState {
            command: command.to_string(),
            ring: Vec::new(),
            spool_path: None,
            spool_file: None,
            done: false,
            error: None,
            exit_code: None,
            cancel: task_cancel.clone(),
        }));

        {
            let mut tasks = self.inner.tasks.write().await;
            tasks.insert(id.to_string(), state.clone());
        }

        let inner = self.inner.clone();
        let id_owned = id.to_string();

        tokio::spawn(async move {
            let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
            let out_tx2 = out_tx.clone();
            tokio::spawn(read_stream(stdout, out_tx));
            tokio::spawn(read_stream(stderr, out_tx2));

            let cancel_for_wait = task_cancel.clone();
            let spool_session = "default";

            loop {
                tokio::select! {
                    chunk = out_rx.recv() => {
                        match chunk {
                            Some(bytes) => append_output(&inner, &id_owned, spool_session, &bytes).await,
                            None => break,
                        }
                    }
                    _ = cancel_for_wait.cancelled() => {
                        let _ = child.start_kill();
                        break;
                    }
                    _ = sleep_or_forever(timeout) => {
                        let _ = child.start_kill();
                        let mut guard = state.lock().await;
                        guard.error = Some(TaskError::Timeout(timeout.unwrap_or_default()));
                        drop(guard);
                        break;
                    }
                }
            }

            // Drain any remaining buffered chunks once the readers finish.
            while let Ok(bytes) = out_rx.try_recv() {
                append_output(&inner, &id_owned, spool_session, &bytes).await;
            }

            let wait_result = child.wait().await;
            let mut guard = state.lock().await;
            guard.done = true;
            if guard.error.is_none() {
                guard.error = match &wait_result {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some(TaskError::Exited(format!(
                        "command exited with status {}",
                        status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
                    ))),
                    Err(e) => Some(TaskError::Exited(format!("wait failed: {e}"))),
                };
            }
            guard.exit_code = wait_result.ok().and_then(|s| s.code());
            drop(guard);
            inner.done_notify.notify_waiters();
        });

        Ok(())
    }

    /// `get_output(id)` (§4.8): returns bytes accumulated since the last
    /// call (the ring is drained on read) plus the `done` flag.
    pub async fn get_output(&self, id: &str) -> Result<TaskOutput> {
        let state = self.task_state(id).await?;
        let mut guard = state.lock().await;
        let chunk = std::mem::take(&mut guard.ring);
        Ok(TaskOutput {
            chunk,
            done: guard.done,
        })
    }

    /// `output_file(id)` (§4.8): the overflow spool path, or `None` if
    /// output never exceeded the ring capacity.
    pub async fn output_file(&self, id: &str) -> Result<Option<PathBuf>> {
        let state = self.task_state(id).await?;
        let guard = state.lock().await;
        Ok(guard.spool_path.clone())
    }

    /// `kill(id)` (§4.8): cancels the task's derived context; the reader
    /// loop observes it, marks `done`, and records a `killed` error.
    pub async fn kill(&self, id: &str) -> Result<()> {
        let state = self.task_state(id).await?;
        let cancel = {
            let guard = state.lock().await;
            guard.cancel.clone()
        };
        cancel.cancel();
        let mut guard = state.lock().await;
        if guard.error.is_none() {
            guard.error = Some(TaskError::Killed);
        }
        Ok(())
    }

    pub async fn lookup(&self, id: &str) -> Result<TaskHandle> {
        let state = self.task_state(id).await?;
        let guard = state.lock().await;
        Ok(TaskHandle {
            id: id.to_string(),
            command: guard.command.clone(),
            done: guard.done,
            error: guard.error.as_ref().map(ToString::to_string),
            exit_code: guard.exit_code,
        })
    }

    pub async fn list(&self) -> Vec<TaskHandle> {
        let tasks = self.inner.tasks.read().await;
        let mut handles = Vec::with_capacity(tasks.len());
        for (id, state) in tasks.iter() {
            let guard = state.lock().await;
            handles.push(TaskHandle {
                id: id.clone(),
                command: guard.command.clone(),
                done: guard.done,
                error: guard.error.as_ref().map(ToString::to_string),
                exit_code: guard.exit_code,
            });
        }
        handles
    }

    /// `shutdown(ctx)` (§4.8): kills every tracked task and waits until each
    /// is done or `ctx` is cancelled.
    pub async fn shutdown(&self, ctx: &CancelToken) {
        let ids: Vec<String> = self.inner.tasks.read().await.keys().cloned().collect();
        for id in &ids {
            let _ = self.kill(id).await;
        }

        loop {
            let all_done = {
                let tasks = self.inner.tasks.read().await;
                let mut done = true;
                for state in tasks.values() {
                    if !state.lock().await.done {
                        done = false;
                        break;
                    }
                }
                done
            };
            if all_done || ctx.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = self.inner.done_notify.notified() => {}
                _ = ctx.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    async fn task_state(&self, id: &str) -> Result<Arc<Mutex<TaskState>>> {
        self.inner
            .tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::Validation(format!("unknown task id: {id}")))
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

async fn read_stream<R>(mut reader: R, tx: tokio::sync::mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8_192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

async fn append_output(inner: &Inner, id: &str, session: &str, bytes: &[u8]) {
    let state = {
        let tasks = inner.tasks.read().await;
        match tasks.get(id) {
            Some(state) => state.clone(),
            None => return,
        }
    };
    let mut guard = state.lock().await;

    if guard.spool_file.is_none() && guard.ring.len() + bytes.len() <= inner.max_output_len {
        guard.ring.extend_from_slice(bytes);
        return;
    }

    if guard.spool_file.is_none() {
        let dir = inner.base.join(session);
        if tokio::fs::create_dir_all(&dir).await.is_err() {
            guard.ring.extend_from_slice(bytes);
            return;
        }
        let path = dir.join(format!("{id}.out"));
        let existing = std::mem::take(&mut guard.ring);
        match tokio::fs::File::create(&path).await {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                let _ = file.write_all(&existing).await;
                guard.spool_path = Some(path);
                guard.spool_file = Some(file);
            }
            Err(_) => {
                guard.ring = existing;
                guard.ring.extend_from_slice(bytes);
                return;
            }
        }
    }

    if let Some(file) = guard.spool_file.as_mut() {
        use tokio::io::AsyncWriteExt;
        let _ = file.write_all(bytes).await;
    }
}
