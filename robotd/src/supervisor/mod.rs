//! The supervisor: root-directory preparation, startup workers, the
//! discovery poll loop, and the liveness monitor.
//!
//! `run` does fallible setup once, then enters a loop of cooperating
//! tasks that share one worker map; every entry in that map is a
//! child OS process rather than an in-process task.

mod discovery;
mod liveness;
mod process;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use robotd_api::{DeviceType, Error, Result};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::drivers;

pub use process::WorkerHandle;

/// `(type_id, device_path)`. `device_path` is empty for
/// `create_on_startup` singletons, which have no kernel device.
pub type WorkerKey = (String, String);

pub type WorkerMap = Arc<Mutex<HashMap<WorkerKey, WorkerHandle>>>;

/// In-flight `WorkerHandle::terminate()` tasks spawned off the unplug
/// path, tracked so shutdown can join them instead of leaving them
/// fire-and-forget.
pub type PendingTerminations = Arc<Mutex<JoinSet<()>>>;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the supervisor until interrupted: root prep, startup workers,
/// poll loop, liveness monitor, shutdown, in that order.
pub async fn run(cfg: Config) -> Result<()> {
    prepare_root_dir(&cfg.root_dir)?;

    let registry = drivers::registry();
    let workers: WorkerMap = Arc::new(Mutex::new(HashMap::new()));
    let pending_terminations: PendingTerminations = Arc::new(Mutex::new(JoinSet::new()));
    let log_level = cfg.get_log_level();

    spawn_startup_workers(registry, &cfg.root_dir, log_level, &workers).await;

    let liveness_task = tokio::spawn(liveness::run(workers.clone()));
    let poll_task = tokio::spawn(poll_loop(
        registry,
        cfg.root_dir.clone(),
        log_level,
        workers.clone(),
        pending_terminations.clone(),
    ));

    wait_for_shutdown().await;

    warn!("shutting down");
    poll_task.abort();
    liveness_task.abort();

    shut_down_all(workers, pending_terminations).await;

    Ok(())
}

/// Creates `<root>` if missing (mode 0755) and removes every entry
/// directly under it, purging sockets left by an unclean prior
/// shutdown (spec 4.3.1 / invariant 2).
fn prepare_root_dir(root: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(root)
        .map_err(|e| Error::Io(format!("creating {}: {}", root.display(), e)))?;
    std::fs::set_permissions(root, std::fs::Permissions::from_mode(0o755))?;

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();

        let result = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to purge stale entry under root dir");
        }
    }

    Ok(())
}

async fn spawn_startup_workers(
    registry: &'static [DeviceType],
    root_dir: &Path,
    log_level: tracing::Level,
    workers: &WorkerMap,
) {
    for ty in registry.iter().filter(|ty| ty.enabled && ty.create_on_startup) {
        let node = robotd_api::DeviceNode::empty();
        let instance_name = (ty.name)(&node);

        match WorkerHandle::spawn(ty.type_id, &instance_name, &node, root_dir, log_level) {
            Ok(handle) => {
                info!(type_id = ty.type_id, instance = %instance_name, "started startup-only worker");
                workers
                    .lock()
                    .await
                    .insert((ty.type_id.to_string(), String::new()), handle);
            }
            Err(e) => error!(type_id = ty.type_id, error = %e, "failed to spawn startup worker"),
        }
    }
}

/// The ~1s discovery loop (spec 4.3.3): for each discoverable type,
/// enumerate matching kernel devices, diff against the live worker
/// set, and spawn/terminate workers to match.
///
/// Enumeration happens before the mutex is taken, so no I/O runs
/// while holding it (spec 5: "no I/O is performed while holding the
/// mutex").
async fn poll_loop(
    registry: &'static [DeviceType],
    root_dir: PathBuf,
    log_level: tracing::Level,
    workers: WorkerMap,
    pending_terminations: PendingTerminations,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        ticker.tick().await;

        // Non-blocking: reap any termination tasks that finished
        // since the last tick so the set doesn't grow without bound.
        reap_finished_terminations(&pending_terminations).await;

        for ty in registry
            .iter()
            .filter(|ty| ty.enabled && ty.lookup_keys.is_some())
        {
            let lookup_keys = ty.lookup_keys.unwrap();
            let actual = discovery::scan(ty.type_id, lookup_keys)
                .await
                .into_iter()
                .filter(|(_, node)| (ty.included)(node))
                .collect::<HashMap<_, _>>();

            reconcile(ty, &actual, &root_dir, log_level, &workers, &pending_terminations).await;
        }
    }
}

async fn reap_finished_terminations(pending_terminations: &PendingTerminations) {
    let mut pending = pending_terminations.lock().await;
    while pending.try_join_next().is_some() {}
}

async fn reconcile(
    ty: &DeviceType,
    actual: &HashMap<String, robotd_api::DeviceNode>,
    root_dir: &Path,
    log_level: tracing::Level,
    workers: &WorkerMap,
    pending_terminations: &PendingTerminations,
) {
    let mut map = workers.lock().await;

    let expected: Vec<String> = map
        .keys()
        .filter(|(type_id, _)| type_id == ty.type_id)
        .map(|(_, device_path)| device_path.clone())
        .collect();

    let to_add: Vec<_> = actual
        .iter()
        .filter(|(path, _)| !expected.contains(path))
        .collect();
    let to_remove: Vec<_> = expected
        .into_iter()
        .filter(|path| !actual.contains_key(path))
        .collect();

    for (device_path, node) in to_add {
        let instance_name = (ty.name)(node);

        match WorkerHandle::spawn(ty.type_id, &instance_name, node, root_dir, log_level) {
            Ok(handle) => {
                info!(type_id = ty.type_id, device_path, "device plugged in, spawned worker");
                map.insert((ty.type_id.to_string(), device_path.clone()), handle);
            }
            Err(e) => {
                error!(type_id = ty.type_id, device_path, error = %e, "failed to spawn worker")
            }
        }
    }

    for device_path in to_remove {
        if let Some(handle) = map.remove(&(ty.type_id.to_string(), device_path.clone())) {
            info!(type_id = ty.type_id, device_path, "device unplugged, terminating worker");
            pending_terminations.lock().await.spawn(handle.terminate());
        }
    }
}

/// Terminates every still-running worker, then joins every
/// termination task spawned off the unplug path (`reconcile`'s
/// `to_remove` branch) so none are left running in the background
/// past supervisor shutdown.
async fn shut_down_all(workers: WorkerMap, pending_terminations: PendingTerminations) {
    let mut map = workers.lock().await;
    let handles: Vec<_> = map.drain().map(|(_, handle)| handle).collect();
    drop(map);

    for handle in handles {
        handle.terminate().await;
    }

    let mut pending = pending_terminations.lock().await;
    while pending.join_next().await.is_some() {}
}

async fn wait_for_shutdown() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => (),
        _ = sigterm.recv() => (),
    }
}
