//! A minimal `sd_notify`-protocol client, used once the power-board
//! driver reaches its ready state to mark the daemon as fully up —
//! equivalent to `systemd-notify --ready --pid=<supervisor-pid>`.
//!
//! No `sd_notify`/`libsystemd` binding is available here, and the
//! protocol itself is a two-line, well-documented datagram write, so
//! this is implemented directly against
//! `std::os::unix::net::UnixDatagram` rather than reaching for a
//! dependency to do it.

use std::os::unix::net::UnixDatagram;

/// Sends `READY=1` to the socket named by `$NOTIFY_SOCKET`, tagged
/// with `MAINPID=<supervisor_pid>` so systemd attributes readiness to
/// the supervisor process even though the power-board worker (a
/// different PID) is the one observing the ready condition.
///
/// A no-op, logged at debug level via the `Ok(())` early return, when
/// `$NOTIFY_SOCKET` isn't set (not running under systemd, or under a
/// unit type that doesn't support notification).
pub fn ready(supervisor_pid: u32) -> std::io::Result<()> {
    let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
        return Ok(());
    };

    let socket = UnixDatagram::unbound()?;
    let message = format!("MAINPID={}\nREADY=1\n", supervisor_pid);

    socket.send_to(message.as_bytes(), &path)?;

    Ok(())
}
