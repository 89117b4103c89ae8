//! Vision camera: a background capture thread reports markers through
//! `broadcast`, with `status()` reading a cache the thread maintains.
//!
//! Real frame capture and marker detection is out of scope here; this
//! stand-in spawns a thread that answers `see` requests over a channel
//! and reports the (empty) marker set it "found", communicating with
//! the worker's loop only via `broadcast` and the shared status cache
//! rather than by exposing any internal state directly.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use robotd_api::{BroadcastFn, DeviceNode, Driver, Error, Result};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Status {
    snapshot_timestamp: Option<f64>,
    markers: Vec<Value>,
}

impl Status {
    fn to_value(&self) -> Value {
        json!({
            "snapshot_timestamp": self.snapshot_timestamp,
            "markers": self.markers,
        })
    }
}

pub struct Camera {
    status: Arc<Mutex<Status>>,
    see_tx: Option<std_mpsc::Sender<()>>,
    broadcast: Option<BroadcastFn>,
}

impl Camera {
    pub fn new(_node: &DeviceNode) -> Box<dyn Driver> {
        Box::new(Camera {
            status: Arc::new(Mutex::new(Status::default())),
            see_tx: None,
            broadcast: None,
        })
    }
}

impl Driver for Camera {
    fn set_broadcast(&mut self, broadcast: BroadcastFn) {
        self.broadcast = Some(broadcast);
    }

    fn start(&mut self) -> Result<()> {
        let (tx, rx) = std_mpsc::channel::<()>();
        let status = self.status.clone();
        let broadcast = self.broadcast.clone();

        thread::spawn(move || capture_loop(rx, status, broadcast));

        self.see_tx = Some(tx);
        Ok(())
    }

    fn make_safe(&mut self) -> Result<()> {
        // The real board has nothing to de-energise; safe state is
        // simply "not actively looking".
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.see_tx = None;
        Ok(())
    }

    fn status(&self) -> Value {
        self.status.lock().unwrap().to_value()
    }

    fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
        let obj = cmd
            .as_object()
            .ok_or_else(|| Error::Protocol(String::from("camera command must be an object")))?;

        if matches!(obj.get("see"), Some(Value::Bool(true))) {
            let tx = self
                .see_tx
                .as_ref()
                .ok_or_else(|| Error::Hardware(String::from("camera not started")))?;
            tx.send(())
                .map_err(|_| Error::MissingPeer(String::from("capture thread")))?;
        }

        Ok(None)
    }
}

/// Runs on its own OS thread for the lifetime of the worker process.
/// Blocks on `rx` for a `see` request, "captures" (there being no real
/// hardware here, an empty marker list), updates the shared status
/// cache, and pushes the new status out as a broadcast so every
/// connected client observes the snapshot without having to poll.
fn capture_loop(
    rx: std_mpsc::Receiver<()>,
    status: Arc<Mutex<Status>>,
    broadcast: Option<BroadcastFn>,
) {
    while rx.recv().is_ok() {
        let snapshot = Status {
            snapshot_timestamp: Some(now_secs()),
            markers: Vec::new(),
        };

        let value = snapshot.to_value();
        *status.lock().unwrap() = snapshot;

        if let Some(broadcast) = &broadcast {
            broadcast(value);
        }
    }
}

/// Epoch seconds, as a floating-point snapshot timestamp.
fn now_secs() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
}
