//! Lifecycle of a spawned agent process (exit, kill, stderr)

use futures::FutureExt;
use futures::future::BoxFuture;
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;

use crate::transport::{ExitInfo, ProcessControl};
use crate::types::identifiers::SessionId;

/// Forward the child's stderr into the log, one line at a time
pub(super) fn spawn_stderr_pump(session_id: SessionId, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    log::debug!("[{session_id}] agent stderr: {line}");
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    })
}

/// Control handle over a `tokio::process::Child`
pub(super) struct ChildControl {
    child: Child,
    stderr_task: Option<JoinHandle<()>>,
}

impl ChildControl {
    pub(super) fn new(child: Child, stderr_task: Option<JoinHandle<()>>) -> Self {
        Self { child, stderr_task }
    }
}

impl ProcessControl for ChildControl {
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        async move {
            if let Some(task) = self.stderr_task.take() {
                task.abort();
            }
            match self.child.kill().await {
                Ok(()) => Ok(()),
                // Already exited and reaped
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
                Err(e) => Err(e),
            }
        }
        .boxed()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitInfo>> {
        async move {
            let status = self.child.wait().await?;
            Ok(ExitInfo {
                code: status.code(),
            })
        }
        .boxed()
    }
}

impl Drop for ChildControl {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        let _ = self.child.start_kill();
    }
}
