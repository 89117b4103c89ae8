//! The kernel-device-database record a driver instance is bound to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single entry from the kernel's device database (on Linux, a
/// `udev` device). `robotd-api` models this as an owned, cheaply
/// cloned struct rather than depending on a udev binding directly, so
/// that driver crates can build and test `DeviceNode` values without
/// linking against libudev.
///
/// `Serialize`/`Deserialize` let the supervisor hand a node to a
/// worker process across the re-exec boundary as a single
/// environment-variable-encoded JSON value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// The `DEVPATH` kernel attribute, e.g. `/devices/pci.../ttyUSB0`.
    pub device_path: String,

    /// The device's name under `/sys`, e.g. `ttyUSB0`.
    pub sys_name: String,

    /// The full `/sys` path for the device.
    pub sys_path: String,

    /// Remaining udev properties (`DEVNAME`, `ID_VENDOR_ID`,
    /// `ID_MODEL_ID`, `MINOR`, ...), keyed by property name.
    pub properties: HashMap<String, String>,
}

impl DeviceNode {
    /// Builds an empty node, used for `create_on_startup` device
    /// types that have no associated kernel device (the synthetic
    /// "game" board).
    pub fn empty() -> Self {
        DeviceNode::default()
    }

    /// Looks up a udev property by name.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_has_no_properties() {
        let node = DeviceNode::empty();

        assert_eq!(node.device_path, "");
        assert!(node.properties.is_empty());
        assert_eq!(node.property("DEVNAME"), None);
    }

    #[test]
    fn property_lookup() {
        let mut node = DeviceNode::empty();

        node.properties
            .insert(String::from("ID_VENDOR_ID"), String::from("2341"));

        assert_eq!(node.property("ID_VENDOR_ID"), Some("2341"));
        assert_eq!(node.property("ID_MODEL_ID"), None);
    }
}
