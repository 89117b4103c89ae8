//! The device registry: a process-wide, statically populated table
//! listing every peripheral family this binary knows how to drive,
//! built once and shared as a `&'static` slice so both the
//! supervisor's poll loop and a freshly re-exec'd worker can read it
//! without locking.
//!
//! One module per driver family, each contributing a single literal
//! entry to the table below.

mod brain_temperature_sensor;
mod camera;
mod game;
mod motor_board;
mod power_board;
mod servo_assembly;

use std::sync::OnceLock;

use robotd_api::{DeviceNode, DeviceType};

fn always_included(_node: &DeviceNode) -> bool {
    true
}

fn name_by_serial(node: &DeviceNode) -> String {
    node.property("ID_SERIAL_SHORT")
        .map(String::from)
        .unwrap_or_else(|| node.sys_name.clone())
}

fn name_by_sys_name(node: &DeviceNode) -> String {
    node.sys_name.clone()
}

fn name_by_devname_stem(node: &DeviceNode) -> String {
    node.property("DEVNAME")
        .and_then(|devname| devname.rsplit('/').next())
        .map(String::from)
        .unwrap_or_else(|| node.sys_name.clone())
}

fn fixed_state_name(_node: &DeviceNode) -> String {
    String::from("state")
}

/// Returns the process-wide device-type table, built on first access.
///
/// Registration order carries no meaning — discovery always scans the
/// whole table — so entries are simply grouped by driver family for
/// readability.
pub fn registry() -> &'static [DeviceType] {
    static REGISTRY: OnceLock<Vec<DeviceType>> = OnceLock::new();

    REGISTRY.get_or_init(|| {
        vec![
            DeviceType {
                type_id: "motor_board",
                lookup_keys: Some(&[
                    ("subsystem", "tty"),
                    ("ID_VENDOR", "Student_Robotics"),
                    ("ID_MODEL", "MCV3B"),
                ]),
                included: always_included,
                name: name_by_serial,
                create_on_startup: false,
                enabled: true,
                make_driver: motor_board::MotorBoard::new,
            },
            DeviceType {
                type_id: "power_board",
                lookup_keys: Some(&[
                    ("subsystem", "usb"),
                    ("ID_VENDOR_ID", "1bcf"),
                    ("ID_MODEL_ID", "0005"),
                ]),
                included: always_included,
                name: name_by_serial,
                create_on_startup: false,
                enabled: true,
                make_driver: power_board::PowerBoard::new,
            },
            DeviceType {
                type_id: "servo_assembly",
                lookup_keys: Some(&[
                    ("subsystem", "tty"),
                    ("ID_VENDOR", "Student_Robotics"),
                    ("ID_MODEL", "SBArduino"),
                ]),
                included: always_included,
                name: name_by_serial,
                create_on_startup: false,
                enabled: true,
                make_driver: servo_assembly::ServoAssembly::new,
            },
            DeviceType {
                type_id: "camera",
                lookup_keys: Some(&[("subsystem", "video4linux")]),
                included: always_included,
                name: name_by_devname_stem,
                create_on_startup: false,
                enabled: true,
                make_driver: camera::Camera::new,
            },
            DeviceType {
                type_id: "game",
                lookup_keys: None,
                included: always_included,
                name: fixed_state_name,
                create_on_startup: true,
                enabled: true,
                make_driver: game::GameState::new,
            },
            DeviceType {
                type_id: "brain_temperature_sensor",
                lookup_keys: Some(&[("subsystem", "thermal")]),
                included: always_included,
                name: name_by_sys_name,
                create_on_startup: false,
                enabled: true,
                make_driver: brain_temperature_sensor::BrainTemperatureSensor::new,
            },
        ]
    })
}
