//! The contract every peripheral driver implements, and the broadcast
//! callback the worker injects into it before `start()`.

use std::sync::Arc;

use serde_json::Value;

use crate::Result;

/// The callback a driver uses to push an unsolicited status update to
/// every client currently connected to its worker. The worker stamps
/// `"broadcast": true` onto the value before writing it; drivers pass
/// their own status-shaped payload and need not know about the wire
/// framing at all.
///
/// Implemented as a plain `Fn` rather than an `async` callback so a
/// driver's own background thread (the camera's capture loop is the
/// motivating case) can call it without depending on a Tokio runtime
/// handle; the worker's multiplexer bridges the call onto its async
/// event loop internally.
pub type BroadcastFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Implemented once per peripheral family (motor board, power board,
/// servo assembly, camera, game state, brain-temperature sensor) and
/// registered in the device registry (see [`crate::registry`]).
///
/// A driver is owned exclusively by the worker's connection
/// multiplexer task; nothing else ever calls these methods
/// concurrently, so implementations do not need interior
/// synchronization to protect their own state.
pub trait Driver: Send {
    /// Installs the broadcast callback. Called exactly once, before
    /// `start()`. A driver must not assume the callback is present
    /// before `start()` runs.
    fn set_broadcast(&mut self, broadcast: BroadcastFn);

    /// Opens the underlying hardware and initializes internal status.
    /// A failure here is fatal: the worker process exits, and the
    /// supervisor will spawn a replacement on its next poll tick if
    /// the device is still present.
    fn start(&mut self) -> Result<()>;

    /// Returns the peripheral to its documented safe state. Invoked
    /// whenever the worker's connection set transitions from
    /// non-empty to empty, and must tolerate being called more than
    /// once. Failures are logged and otherwise ignored.
    fn make_safe(&mut self) -> Result<()>;

    /// Releases hardware resources on worker shutdown. Best-effort;
    /// failures are logged and otherwise ignored.
    fn stop(&mut self) -> Result<()>;

    /// Returns the current status as a JSON-serializable value. Must
    /// be cheap and non-blocking: it is called after every command
    /// round-trip and on every new client connection.
    fn status(&self) -> Value;

    /// Applies a client command. `cmd` is never the empty object —
    /// the multiplexer treats `{}` as a status ping and never forwards
    /// it here. Returns `Some(value)` to have `{"response": value}`
    /// written back to the originating connection, or `None` to send
    /// no response frame (only the post-command status frame).
    ///
    /// A driver that wants to surface a hardware failure to its caller
    /// does so by returning `Ok(Some(value))` shaped like
    /// `{"status": "error", "type": ..., "description": ...}`; an
    /// `Err` return is for failures the driver cannot characterize for
    /// the client and simply gets logged by the worker loop.
    fn command(&mut self, cmd: Value) -> Result<Option<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Counter {
        calls: Arc<AtomicUsize>,
        last: Mutex<Option<Value>>,
    }

    impl Driver for Counter {
        fn set_broadcast(&mut self, _broadcast: BroadcastFn) {}

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn make_safe(&mut self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn status(&self) -> Value {
            Value::Null
        }

        fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
            *self.last.lock().unwrap() = Some(cmd.clone());
            Ok(Some(cmd))
        }
    }

    #[test]
    fn make_safe_is_idempotent_by_contract() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut driver = Counter {
            calls: calls.clone(),
            last: Mutex::new(None),
        };

        driver.make_safe().unwrap();
        driver.make_safe().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn command_echoes_back_as_response() {
        let mut driver = Counter {
            calls: Arc::new(AtomicUsize::new(0)),
            last: Mutex::new(None),
        };

        let reply = driver
            .command(serde_json::json!({"m0": 0.5}))
            .unwrap()
            .unwrap();

        assert_eq!(reply, serde_json::json!({"m0": 0.5}));
    }
}
