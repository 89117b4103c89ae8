//! Synthetic "game state" board: a `create_on_startup` singleton with
//! no physical hardware behind it at all.
//!
//! `status()` recomputes `zone`/`mode` from a filesystem scan on every
//! call; client commands merge free-form fields in on top of that
//! always-recomputed pair.

use std::path::{Path, PathBuf};

use robotd_api::{BroadcastFn, DeviceNode, Driver, Error, Result};
use regex::Regex;
use serde_json::{Map, Value};

/// Filenames that, if present alongside a candidate `zone-N` file,
/// mark that USB stick as a contestant's program rather than a
/// competition zone marker.
const IGNORE_SIBLINGS: &[&str] = &["main.py"];

fn zone_file_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^zone-([0-9])$").unwrap())
}

pub struct GameState {
    extra: Map<String, Value>,
    media_root: PathBuf,
}

impl GameState {
    pub fn new(_node: &DeviceNode) -> Box<dyn Driver> {
        Box::new(GameState {
            extra: Map::new(),
            media_root: media_root(),
        })
    }
}

/// `/media` by default; overridable via `$ROBOTD_MEDIA_ROOT`, the
/// generalization of the Python test suite's
/// `mock.patch('robotd.devices.GameState.FILE_GLOB', ...)`.
fn media_root() -> PathBuf {
    std::env::var_os("ROBOTD_MEDIA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/media"))
}

/// Scans `<media_root>/usb?/zone-N` for a single-digit zone marker,
/// skipping any `usbN` directory that also contains one of
/// [`IGNORE_SIBLINGS`] (a directory holding a contestant's own
/// program is not a competition zone stick).
fn discover_zone(media_root: &Path) -> Option<u32> {
    let entries = std::fs::read_dir(media_root).ok()?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_str()?;

        if !(name.len() == 4 && name.starts_with("usb")) {
            continue;
        }

        let stick = entry.path();
        if !stick.is_dir() {
            continue;
        }

        let Ok(siblings) = std::fs::read_dir(&stick) else {
            continue;
        };

        let mut zone = None;
        let mut ignored = false;

        for sibling in siblings.flatten() {
            let Some(sibling_name) = sibling.file_name().to_str().map(String::from) else {
                continue;
            };

            if IGNORE_SIBLINGS.contains(&sibling_name.as_str()) {
                ignored = true;
                continue;
            }

            if let Some(caps) = zone_file_pattern().captures(&sibling_name) {
                zone = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            }
        }

        if ignored {
            continue;
        }

        if let Some(zone) = zone {
            return Some(zone);
        }
    }

    None
}

impl Driver for GameState {
    fn set_broadcast(&mut self, _broadcast: BroadcastFn) {}

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn make_safe(&mut self) -> Result<()> {
        self.extra.clear();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> Value {
        let mut map = self.extra.clone();

        match discover_zone(&self.media_root) {
            Some(zone) => {
                map.insert(String::from("zone"), Value::from(zone));
                map.insert(String::from("mode"), Value::from("competition"));
            }
            None => {
                map.insert(String::from("zone"), Value::from(0));
                map.insert(String::from("mode"), Value::from("development"));
            }
        }

        Value::Object(map)
    }

    fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
        let obj = cmd
            .as_object()
            .ok_or_else(|| Error::Protocol(String::from("game command must be an object")))?;

        for (key, value) in obj {
            self.extra.insert(key.clone(), value.clone());
        }

        // The merged state shows up on the status frame the
        // multiplexer sends right after; no separate response
        // envelope is needed.
        Ok(None)
    }
}
