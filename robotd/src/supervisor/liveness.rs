//! The liveness monitor: a cooperating task that reaps workers whose
//! process exited without going through the normal unplug path.
//!
//! Deliberately has no restart-with-backoff logic of its own: the
//! dead entry is simply dropped, and the next regular poll tick
//! re-creates the worker if its device is still present.

use std::time::Duration;

use tracing::info;

use super::WorkerMap;

/// Ticks roughly twice a second.
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(workers: WorkerMap) {
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);

    loop {
        ticker.tick().await;

        let mut map = workers.lock().await;
        let dead: Vec<_> = map
            .iter_mut()
            .filter(|(_, handle)| handle.has_exited())
            .map(|(key, _)| key.clone())
            .collect();

        for key in dead {
            map.remove(&key);
            info!(type_id = %key.0, device_path = %key.1, "worker exited unexpectedly, reaped");
        }
    }
}
