//! Servo/Arduino assembly: 16 servos, general-purpose pins, analogue
//! inputs, and an ultrasound trigger/echo pair.
//!
//! The real board speaks a line-oriented serial protocol that is out
//! of scope here; this stand-in keeps the same command/status shape
//! over an in-memory state so the connection multiplexer can be
//! exercised without hardware.

use std::collections::HashMap;

use robotd_api::{BroadcastFn, DeviceNode, Driver, Error, Result};
use serde_json::{json, Value};

const SERVO_COUNT: usize = 16;
const FW_VERSION: &str = "robotd-sim-1.0";

pub struct ServoAssembly {
    servos: HashMap<String, Value>,
    pins: HashMap<String, String>,
    pin_values: HashMap<String, Value>,
    analogue_values: HashMap<String, Value>,
    ultrasound: HashMap<String, Value>,
}

impl ServoAssembly {
    pub fn new(_node: &DeviceNode) -> Box<dyn Driver> {
        Box::new(ServoAssembly {
            servos: HashMap::new(),
            pins: HashMap::new(),
            pin_values: HashMap::new(),
            analogue_values: HashMap::new(),
            ultrasound: HashMap::new(),
        })
    }

    fn de_energise(&mut self) {
        self.servos = (0..SERVO_COUNT)
            .map(|id| (id.to_string(), Value::Null))
            .collect();
        self.pins = self
            .pins
            .keys()
            .map(|id| (id.clone(), String::from("input")))
            .collect();
    }
}

impl Driver for ServoAssembly {
    fn set_broadcast(&mut self, _broadcast: BroadcastFn) {}

    fn start(&mut self) -> Result<()> {
        self.de_energise();
        Ok(())
    }

    fn make_safe(&mut self) -> Result<()> {
        self.de_energise();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.make_safe()
    }

    fn status(&self) -> Value {
        json!({
            "servos": self.servos,
            "pins": self.pins,
            "pin-values": self.pin_values,
            "analogue-values": self.analogue_values,
            "ultrasound": self.ultrasound,
            "fw-version": FW_VERSION,
        })
    }

    fn command(&mut self, cmd: Value) -> Result<Option<Value>> {
        let obj = cmd.as_object().ok_or_else(|| {
            Error::Protocol(String::from("servo_assembly command must be an object"))
        })?;

        if let Some(Value::Object(servos)) = obj.get("servos") {
            for (id, status) in servos {
                self.servos.insert(id.clone(), status.clone());
            }
        }

        if let Some(Value::Object(pins)) = obj.get("pins") {
            for (id, mode) in pins {
                let mode = mode
                    .as_str()
                    .ok_or_else(|| Error::BadConfig(format!("pin {} mode must be a string", id)))?;
                self.pins.insert(id.clone(), String::from(mode));
            }
        }

        if let Some(Value::Array(ids)) = obj.get("read-pins") {
            for id in ids {
                let id = id.as_str().map(String::from).or_else(|| id.as_u64().map(|n| n.to_string()));

                if let Some(id) = id {
                    self.pin_values.entry(id).or_insert(Value::Bool(false));
                }
            }
        }

        if let Some(Value::Bool(true)) = obj.get("read-analogue") {
            for id in 0..4 {
                self.analogue_values
                    .entry(id.to_string())
                    .or_insert_with(|| json!(0));
            }
        }

        if let Some(Value::Array(pair)) = obj.get("read-ultrasound") {
            if pair.len() == 2 {
                let key = format!("{}:{}", pair[0], pair[1]);
                self.ultrasound.insert(key, json!(0));
            }
        }

        // `command: [raw...]` is a direct pass-through to the board's
        // serial protocol; there is no board here to react to it.
        let _ = obj.get("command");

        Ok(None)
    }
}
