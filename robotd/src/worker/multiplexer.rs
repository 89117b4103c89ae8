//! The per-worker connection multiplexer: a single actor task that
//! owns the driver exclusively, mutated only by messages arriving on
//! an `mpsc::Receiver` — `NewConnection`/`Frame`/`ConnectionClosed`
//! and friends.
//!
//! Per-connection read tasks are pure forwarders: they decode frames
//! and hand them to the actor, never touching driver state directly,
//! so any number of them can run concurrently without violating the
//! single-writer invariant spec 5 requires.

use std::collections::HashMap;
use std::sync::Arc;

use robotd_api::wire::{self, Frame};
use robotd_api::Driver;
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type ConnId = u64;

enum Msg {
    NewConnection(ConnId, OwnedWriteHalf),
    Frame(ConnId, Value),
    Malformed(ConnId, String),
    Closed(ConnId),
    Broadcast(Value),
    Shutdown,
}

/// A driver with its broadcast callback installed, ready for
/// `start()`. Splitting preparation from `run` lets the caller call
/// `driver.start()` and observe the result (to fire the systemd
/// readiness notification on success) before entering the event loop.
pub struct Prepared {
    driver: Box<dyn Driver>,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
}

impl Prepared {
    pub fn new(mut driver: Box<dyn Driver>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcast_tx = tx.clone();

        driver.set_broadcast(Arc::new(move |value| {
            let _ = broadcast_tx.send(Msg::Broadcast(value));
        }));

        Prepared { driver, tx, rx }
    }

    pub fn start(&mut self) -> robotd_api::Result<()> {
        self.driver.start()
    }
}

/// Runs the accept loop and the actor loop side by side until a
/// shutdown signal arrives on `shutdown`. Returns once the driver has
/// been safed and stopped, ready for the caller to tear down the
/// listening socket.
pub async fn run(listener: UnixListener, prepared: Prepared, shutdown: mpsc::UnboundedReceiver<()>) {
    let Prepared {
        mut driver,
        tx,
        mut rx,
    } = prepared;

    let accept_tx = tx.clone();
    let accept_task = tokio::spawn(accept_loop(listener, accept_tx));

    let shutdown_tx = tx.clone();
    let shutdown_task = tokio::spawn(forward_shutdown(shutdown, shutdown_tx));

    let mut conns: HashMap<ConnId, OwnedWriteHalf> = HashMap::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            Msg::NewConnection(id, mut writer) => {
                // spec invariant 5: the initial status frame must be
                // the first thing an accepted client sees.
                let status = driver.status();
                if write_to(&mut writer, &status).await.is_ok() {
                    conns.insert(id, writer);
                }
            }

            Msg::Frame(id, value) => {
                if !is_empty_command(&value) {
                    match driver.command(value) {
                        Ok(Some(reply)) => {
                            if let Some(writer) = conns.get_mut(&id) {
                                let _ =
                                    write_to(writer, &wire::response_envelope(reply)).await;
                            }
                        }
                        Ok(None) => (),
                        Err(e) => warn!(error = %e, "driver command failed"),
                    }
                }

                let status = driver.status();
                if let Some(writer) = conns.get_mut(&id) {
                    if write_to(writer, &status).await.is_err() {
                        conns.remove(&id);
                        maybe_make_safe(&mut driver, &conns);
                    }
                }
            }

            Msg::Malformed(id, reason) => {
                debug!(conn = id, reason, "ignoring malformed client frame");
            }

            Msg::Closed(id) => {
                conns.remove(&id);
                maybe_make_safe(&mut driver, &conns);
            }

            Msg::Broadcast(value) => {
                let framed = wire::broadcast_envelope(value);
                let mut dead = Vec::new();

                for (id, writer) in conns.iter_mut() {
                    if write_to(writer, &framed).await.is_err() {
                        dead.push(*id);
                    }
                }

                for id in dead {
                    conns.remove(&id);
                }
                maybe_make_safe(&mut driver, &conns);
            }

            Msg::Shutdown => break,
        }
    }

    accept_task.abort();
    shutdown_task.abort();

    if let Err(e) = driver.make_safe() {
        warn!(error = %e, "make_safe failed during shutdown");
    }
    if let Err(e) = driver.stop() {
        warn!(error = %e, "stop failed during shutdown");
    }
}

async fn forward_shutdown(mut shutdown: mpsc::UnboundedReceiver<()>, tx: mpsc::UnboundedSender<Msg>) {
    if shutdown.recv().await.is_some() {
        let _ = tx.send(Msg::Shutdown);
    }
}

fn maybe_make_safe(driver: &mut Box<dyn Driver>, conns: &HashMap<ConnId, OwnedWriteHalf>) {
    if conns.is_empty() {
        if let Err(e) = driver.make_safe() {
            warn!(error = %e, "make_safe failed on last-client disconnect");
        }
    }
}

fn is_empty_command(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

async fn write_to(writer: &mut OwnedWriteHalf, value: &Value) -> std::io::Result<()> {
    let mut encoded = serde_json::to_vec(value).unwrap_or_default();
    encoded.push(b'\n');
    writer.write_all(&encoded).await
}

async fn accept_loop(listener: UnixListener, tx: mpsc::UnboundedSender<Msg>) {
    let mut next_id: ConnId = 0;

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let id = next_id;
                next_id += 1;

                let (read_half, write_half) = stream.into_split();

                if tx.send(Msg::NewConnection(id, write_half)).is_err() {
                    return;
                }

                info!(conn = id, "client connected");
                tokio::spawn(read_loop(id, read_half, tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn read_loop(id: ConnId, read_half: OwnedReadHalf, tx: mpsc::UnboundedSender<Msg>) {
    let mut reader = BufReader::new(read_half);

    loop {
        let frame = match wire::read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn = id, error = %e, "frame read error");
                let _ = tx.send(Msg::Closed(id));
                return;
            }
        };

        match frame {
            Frame::Value(value) => {
                if tx.send(Msg::Frame(id, value)).is_err() {
                    return;
                }
            }
            Frame::Malformed(reason) => {
                if tx.send(Msg::Malformed(id, reason)).is_err() {
                    return;
                }
            }
            Frame::Closed => {
                let _ = tx.send(Msg::Closed(id));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};
    use tokio::net::UnixStream;

    /// Exercises the driver contract without any hardware, recording
    /// `make_safe` calls so tests can assert that the last client
    /// disconnecting triggers one before any new client is served.
    struct StubDriver {
        m0: &'static str,
        make_safe_calls: Arc<AtomicUsize>,
        broadcast: Option<robotd_api::BroadcastFn>,
    }

    impl Driver for StubDriver {
        fn set_broadcast(&mut self, broadcast: robotd_api::BroadcastFn) {
            self.broadcast = Some(broadcast);
        }

        fn start(&mut self) -> robotd_api::Result<()> {
            Ok(())
        }

        fn make_safe(&mut self) -> robotd_api::Result<()> {
            self.m0 = "brake";
            self.make_safe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> robotd_api::Result<()> {
            Ok(())
        }

        fn status(&self) -> Value {
            serde_json::json!({ "m0": self.m0 })
        }

        fn command(&mut self, cmd: Value) -> robotd_api::Result<Option<Value>> {
            if let Some(marker) = cmd.get("push") {
                if let Some(broadcast) = &self.broadcast {
                    broadcast(marker.clone());
                }
                return Ok(None);
            }

            if let Some(m0) = cmd.get("m0").and_then(Value::as_str) {
                self.m0 = match m0 {
                    "brake" => "brake",
                    "coast" => "coast",
                    other => {
                        return Err(robotd_api::Error::BadConfig(format!(
                            "unknown m0 setting {}",
                            other
                        )))
                    }
                };
            }
            Ok(Some(self.status()))
        }
    }

    /// Spawns the real multiplexer actor over a `tempfile`-scoped
    /// Unix socket and returns a shutdown handle plus the socket path
    /// new clients can connect to.
    async fn spawn_worker(
        make_safe_calls: Arc<AtomicUsize>,
    ) -> (tempfile::TempDir, std::path::PathBuf, mpsc::UnboundedSender<()>) {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let driver: Box<dyn Driver> = Box::new(StubDriver {
            m0: "brake",
            make_safe_calls,
            broadcast: None,
        });
        let mut prepared = Prepared::new(driver);
        prepared.start().unwrap();

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(listener, prepared, shutdown_rx));

        (dir, socket_path, shutdown_tx)
    }

    async fn read_one_line(reader: &mut TokioBufReader<tokio::net::unix::OwnedReadHalf>) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[tokio::test]
    async fn new_client_receives_initial_status_before_anything_else() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        let greeting = read_one_line(&mut reader).await;
        assert_eq!(greeting, serde_json::json!({"m0": "brake"}));
    }

    #[tokio::test]
    async fn command_gets_response_then_status_in_order() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        let _greeting = read_one_line(&mut reader).await;

        write_half.write_all(b"{\"m0\": \"coast\"}\n").await.unwrap();

        let response = read_one_line(&mut reader).await;
        let status = read_one_line(&mut reader).await;

        assert_eq!(response, serde_json::json!({"response": {"m0": "coast"}}));
        assert_eq!(status, serde_json::json!({"m0": "coast"}));
    }

    #[tokio::test]
    async fn empty_command_elicits_only_a_status_frame() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        let _greeting = read_one_line(&mut reader).await;

        write_half.write_all(b"{}\n").await.unwrap();

        let status = read_one_line(&mut reader).await;
        assert_eq!(status, serde_json::json!({"m0": "brake"}));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connected_client() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls).await;

        let a = UnixStream::connect(&socket_path).await.unwrap();
        let (a_read, mut a_write) = a.into_split();
        let mut a_reader = TokioBufReader::new(a_read);
        let _ = read_one_line(&mut a_reader).await;

        let b = UnixStream::connect(&socket_path).await.unwrap();
        let (b_read, _b_write) = b.into_split();
        let mut b_reader = TokioBufReader::new(b_read);
        let _ = read_one_line(&mut b_reader).await;

        // Connection A asks the stub driver to push a broadcast; it
        // must reach every connection currently in the map, including
        // A itself, stamped with `"broadcast": true`.
        a_write
            .write_all(b"{\"push\": {\"markers\": []}}\n")
            .await
            .unwrap();

        // A's own post-command status frame is written synchronously
        // while the command is dispatched; the broadcast the command
        // triggered is only delivered once the actor loop gets back
        // around to the queued `Msg::Broadcast`, so it arrives after.
        let a_status = read_one_line(&mut a_reader).await;
        let a_broadcast = read_one_line(&mut a_reader).await;
        let b_broadcast = read_one_line(&mut b_reader).await;

        assert_eq!(a_status, serde_json::json!({"m0": "brake"}));
        assert_eq!(
            a_broadcast,
            serde_json::json!({"markers": [], "broadcast": true})
        );
        assert_eq!(
            b_broadcast,
            serde_json::json!({"markers": [], "broadcast": true})
        );
    }

    #[tokio::test]
    async fn last_client_disconnect_triggers_make_safe() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls.clone()).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);
        let _greeting = read_one_line(&mut reader).await;

        write_half.write_all(b"{\"m0\": \"coast\"}\n").await.unwrap();
        let _response = read_one_line(&mut reader).await;
        let _status = read_one_line(&mut reader).await;

        drop(write_half);
        drop(reader);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(make_safe_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn two_clients_both_see_independent_command_round_trips() {
        let make_safe_calls = Arc::new(AtomicUsize::new(0));
        let (_dir, socket_path, _shutdown) = spawn_worker(make_safe_calls).await;

        let a = UnixStream::connect(&socket_path).await.unwrap();
        let (a_read, mut a_write) = a.into_split();
        let mut a_reader = TokioBufReader::new(a_read);
        let _ = read_one_line(&mut a_reader).await;

        let b = UnixStream::connect(&socket_path).await.unwrap();
        let (b_read, _b_write) = b.into_split();
        let mut b_reader = TokioBufReader::new(b_read);
        let _ = read_one_line(&mut b_reader).await;

        a_write.write_all(b"{\"m0\": \"coast\"}\n").await.unwrap();

        let a_response = read_one_line(&mut a_reader).await;
        let a_status = read_one_line(&mut a_reader).await;

        assert_eq!(a_response, serde_json::json!({"response": {"m0": "coast"}}));
        assert_eq!(a_status, serde_json::json!({"m0": "coast"}));

        // B never sent a command, so it sees nothing unless the driver
        // broadcasts; it should have no further frames buffered.
        let _ = &mut b_reader;
    }
}
