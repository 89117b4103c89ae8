//! Per-worker lifecycle (spec 4.4): bind the socket, set the process
//! title, start the driver, and run the connection multiplexer until
//! signalled to shut down.

mod multiplexer;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use robotd_api::DeviceNode;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::notify;

/// Runs one worker process to completion. Only returns once the
/// multiplexer has shut down (driver safed and stopped); the caller
/// (`main`) exits the process immediately afterward.
pub async fn run(
    type_id: String,
    instance_name: String,
    node: DeviceNode,
    root_dir: PathBuf,
    supervisor_pid: Option<u32>,
) -> robotd_api::Result<()> {
    set_process_title(&type_id, &instance_name);

    let socket_path = root_dir.join(&type_id).join(&instance_name);
    let listener = bind_socket(&socket_path)?;

    let registry = crate::drivers::registry();
    let entry = registry.iter().find(|ty| ty.type_id == type_id).ok_or_else(|| {
        robotd_api::Error::BadConfig(format!("unknown device type {}", type_id))
    })?;

    let mut prepared = multiplexer::Prepared::new((entry.make_driver)(&node));

    prepared.start().map_err(|e| {
        error!(type_id, error = %e, "driver failed to start");
        e
    })?;

    if type_id == "power_board" {
        if let Some(pid) = supervisor_pid {
            if let Err(e) = notify::ready(pid) {
                error!(error = %e, "failed to send systemd readiness notification");
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_sigterm(shutdown_tx));

    info!(type_id, instance = %instance_name, "worker ready, entering connection multiplexer");

    multiplexer::run(listener, prepared, shutdown_rx).await;

    let _ = std::fs::remove_file(&socket_path);

    Ok(())
}

/// Computes the socket path, ensures its parent directory exists,
/// removes a stale file left by an unclean prior run, binds, and
/// chmods to `0777` (spec invariant 1).
fn bind_socket(socket_path: &Path) -> robotd_api::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match std::fs::remove_file(socket_path) {
        Ok(()) => (),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o777))?;

    Ok(listener)
}

/// Sets the process title to `robotd <type_id>: <instance_name>` for
/// observability. The underlying operation is a one-line write to
/// `/proc/self/comm` on Linux, so it's done directly rather than
/// pulling in a dependency for it.
fn set_process_title(type_id: &str, instance_name: &str) {
    let title = format!("robotd {}: {}", type_id, instance_name);
    let comm = match title.char_indices().nth(15) {
        Some((cut, _)) => &title[..cut],
        None => &title,
    };

    if let Err(e) = std::fs::write("/proc/self/comm", comm) {
        tracing::debug!(error = %e, "failed to set process title");
    }
}

async fn forward_sigterm(tx: mpsc::UnboundedSender<()>) {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            let _ = tx.send(());
        }
        Err(e) => error!(error = %e, "failed to install SIGTERM handler in worker"),
    }
}
