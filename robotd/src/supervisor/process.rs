//! Spawns and terminates worker processes by re-executing the current
//! binary with `ROBOTD_WORKER=1` and friends — the environment-based
//! re-entry standing in for raw `fork()`. This binary keeps
//! `#![deny(unsafe_code)]`, so a raw `libc::fork` is not an option
//! here either.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use robotd_api::{DeviceNode, Result};
use tokio::process::{Child, Command};
use tracing::{warn, Level};

/// How long to wait for a worker to exit cleanly after `SIGTERM`
/// before escalating to `SIGKILL`. The liveness monitor ticks at
/// roughly twice this rate, so a worker that ignores the signal is
/// still reaped promptly.
const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// A supervisor-side handle to one running worker process.
pub struct WorkerHandle {
    child: Child,
    pub socket_path: PathBuf,
}

impl WorkerHandle {
    /// Re-execs the current binary in worker mode for `type_id`,
    /// bound to `node`, with its socket rooted under `root_dir`.
    pub fn spawn(
        type_id: &str,
        instance_name: &str,
        node: &DeviceNode,
        root_dir: &Path,
        log_level: Level,
    ) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let node_json = serde_json::to_string(node)?;
        let socket_path = root_dir.join(type_id).join(instance_name);

        let child = Command::new(exe)
            .env("ROBOTD_WORKER", "1")
            .env("ROBOTD_TYPE_ID", type_id)
            .env("ROBOTD_INSTANCE_NAME", instance_name)
            .env("ROBOTD_ROOT_DIR", root_dir)
            .env("ROBOTD_NODE", node_json)
            .env("ROBOTD_LOG_LEVEL", log_level.to_string())
            .env("ROBOTD_SUPERVISOR_PID", std::process::id().to_string())
            .kill_on_drop(true)
            .spawn()?;

        Ok(WorkerHandle { child, socket_path })
    }

    /// Returns `true` if the worker process has exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Signals the worker to shut down: `SIGTERM`, then `SIGKILL` if
    /// it hasn't exited within [`GRACE_PERIOD`]. Removes the socket
    /// path unconditionally afterward, since a killed worker may not
    /// have had the chance to clean up after itself.
    pub async fn terminate(mut self) {
        if let Some(pid) = self.child.id() {
            let pid = Pid::from_raw(pid as i32);

            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                warn!(?pid, error = %e, "failed to send SIGTERM to worker");
            }

            let exited = tokio::time::timeout(GRACE_PERIOD, self.child.wait()).await;

            if exited.is_err() {
                if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
                    warn!(?pid, error = %e, "failed to send SIGKILL to worker");
                }
                let _ = self.child.wait().await;
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket path");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_is_rooted_under_type_id() {
        let path = PathBuf::from("/var/robotd").join("motor_board").join("left");

        assert_eq!(path, PathBuf::from("/var/robotd/motor_board/left"));
    }
}
