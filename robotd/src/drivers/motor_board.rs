//! Motor controller board: two independently commandable channels.
//!
//! An in-memory stand-in: the driver is itself the state, with no
//! real hardware backing it — the serial framing protocol to the
//! actual board is out of scope here.

use robotd_api::{BroadcastFn, DeviceNode, Driver, Error, Result};
use serde_json::{json, Value};

/// A motor channel's commanded setting: braked, coasting, or a signed
/// power level in `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
enum Setting {
    Brake,
    Coast,
    Power(f64),
}

impl Setting {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) if s == "brake" => Some(Setting::Brake),
            Value::String(s) if s == "coast" => Some(Setting::Coast),
            Value::Number(n) => n.as_f64().filter(|f| (-1.0..=1.0).contains(f)).map(Setting::Power),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Setting::Brake => json!("brake"),
            Setting::Coast => json!("coast"),
            Setting::Power(p) => json!(p),
        }
    }
}

pub struct MotorBoard {
    m0: Setting,
    m1: Setting,
}

impl MotorBoard {
    pub fn new(_node: &DeviceNode) -> Box<dyn Driver> {
        Box::new(MotorBoard {
            m0: Setting::Brake,
            m1: Setting::Brake,
        })
    }
}

impl Driver for MotorBoard {
    fn set_broadcast(&mut self, _broadcast: BroadcastFn) {}

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn make_safe(&mut self) -> Result<()> {
        self.m0 = Setting::Brake;
        self.m1 = Setting::Brake;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.make_safe()
    }

    fn status(&self) -> Value {
        json!({ "m0": self.m0.to_value(), "m1": self.m1.to_value() })
    }

    fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
        let obj = cmd
            .as_object()
            .ok_or_else(|| Error::Protocol(String::from("motor_board command must be an object")))?;

        if let Some(v) = obj.get("m0") {
            self.m0 = Setting::from_value(v)
                .ok_or_else(|| Error::BadConfig(String::from("invalid m0 setting")))?;
        }
        if let Some(v) = obj.get("m1") {
            self.m1 = Setting::from_value(v)
                .ok_or_else(|| Error::BadConfig(String::from("invalid m1 setting")))?;
        }

        // The new setting is visible on the status frame the
        // multiplexer sends right after; no separate response
        // envelope is needed.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_braked() {
        let mut driver = MotorBoard::new(&DeviceNode::empty());
        driver.start().unwrap();

        assert_eq!(driver.status(), json!({"m0": "brake", "m1": "brake"}));
    }

    #[test]
    fn command_updates_one_channel_at_a_time() {
        let mut driver = MotorBoard::new(&DeviceNode::empty());
        driver.start().unwrap();

        let reply = driver.command(json!({"m0": 0.5, "m1": "coast"})).unwrap();

        assert_eq!(reply, None);
        assert_eq!(driver.status(), json!({"m0": 0.5, "m1": "coast"}));
    }

    #[test]
    fn make_safe_returns_to_braked() {
        let mut driver = MotorBoard::new(&DeviceNode::empty());
        driver.start().unwrap();
        driver.command(json!({"m0": -0.3, "m1": 1.0})).unwrap();

        driver.make_safe().unwrap();

        assert_eq!(driver.status(), json!({"m0": "brake", "m1": "brake"}));
    }

    #[test]
    fn rejects_out_of_range_power() {
        let mut driver = MotorBoard::new(&DeviceNode::empty());
        driver.start().unwrap();

        assert!(driver.command(json!({"m0": 1.5})).is_err());
    }
}
