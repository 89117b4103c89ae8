//! CPU/"brain" temperature sensor: a read-only status board with no
//! `command()` surface at all.
//!
//! Reads `{sys_path}/temp` (a Linux `thermal` subsystem sysfs
//! attribute, millidegrees Celsius) fresh on every call. `status()`
//! takes `&self`, so the last successfully read value is cached in a
//! `Cell` and returned again if a read fails transiently — logged, not
//! propagated as a client-visible error, the same treatment any other
//! non-fatal hardware hiccup gets.

use std::cell::Cell;

use robotd_api::{BroadcastFn, DeviceNode, Driver, Error, Result};
use serde_json::{json, Value};
use tracing::warn;

pub struct BrainTemperatureSensor {
    sys_path: String,
    last_milli_degrees: Cell<i64>,
}

impl BrainTemperatureSensor {
    pub fn new(node: &DeviceNode) -> Box<dyn Driver> {
        Box::new(BrainTemperatureSensor {
            sys_path: node.sys_path.clone(),
            last_milli_degrees: Cell::new(0),
        })
    }

    fn read_milli_degrees(&self) -> Option<i64> {
        std::fs::read_to_string(format!("{}/temp", self.sys_path))
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

impl Driver for BrainTemperatureSensor {
    fn set_broadcast(&mut self, _broadcast: BroadcastFn) {}

    fn start(&mut self) -> Result<()> {
        let milli_degrees = self.read_milli_degrees().ok_or_else(|| {
            Error::Hardware(format!("cannot read temperature from {}/temp", self.sys_path))
        })?;
        self.last_milli_degrees.set(milli_degrees);
        Ok(())
    }

    fn make_safe(&mut self) -> Result<()> {
        // Read-only sensor: there is nothing to de-energise.
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> Value {
        match self.read_milli_degrees() {
            Some(milli_degrees) => self.last_milli_degrees.set(milli_degrees),
            None => warn!(sys_path = %self.sys_path, "failed to read temperature, reusing last known value"),
        }

        json!({ "temperature": self.last_milli_degrees.get() as f64 / 1000.0 })
    }

    fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
        Err(Error::Protocol(format!(
            "brain_temperature_sensor accepts no commands, got {}",
            cmd
        )))
    }
}
