//! Kernel device discovery via the `udev` crate.
//!
//! Uses `udev::Enumerator` for property-match enumeration, iterating
//! `Device::properties()` the way the pack's own `udev_utils` example
//! does.

use std::collections::HashMap;

use robotd_api::DeviceNode;
use tracing::warn;

/// Queries the kernel device database for every device matching all
/// of `lookup_keys` (an AND of property equalities) that is also
/// reported initialized. Returns a map from `DEVPATH` to the
/// corresponding [`DeviceNode`].
///
/// Runs the blocking udev enumeration on a dedicated blocking thread
/// so the poll loop's async task never stalls the runtime. Failures
/// are transient and treated as "no devices this tick": logged, with
/// the next poll retrying from scratch.
pub async fn scan(
    type_id: &'static str,
    lookup_keys: &'static [(&'static str, &'static str)],
) -> HashMap<String, DeviceNode> {
    match tokio::task::spawn_blocking(move || scan_blocking(lookup_keys)).await {
        Ok(Ok(devices)) => devices,
        Ok(Err(e)) => {
            warn!(type_id, error = %e, "udev enumeration failed");
            HashMap::new()
        }
        Err(e) => {
            warn!(type_id, error = %e, "udev enumeration task panicked");
            HashMap::new()
        }
    }
}

fn scan_blocking(
    lookup_keys: &'static [(&'static str, &'static str)],
) -> std::io::Result<HashMap<String, DeviceNode>> {
    let mut enumerator = udev::Enumerator::new()?;

    for (key, value) in lookup_keys {
        enumerator.match_property(key, value)?;
    }

    let mut found = HashMap::new();

    for device in enumerator.scan_devices()? {
        if !device.is_initialized() {
            continue;
        }

        let device_path = device
            .devpath()
            .to_str()
            .map(String::from)
            .unwrap_or_default();

        if device_path.is_empty() {
            continue;
        }

        let mut properties = HashMap::new();

        for property in device.properties() {
            if let (Some(name), Some(value)) =
                (property.name().to_str(), property.value().to_str())
            {
                properties.insert(String::from(name), String::from(value));
            }
        }

        let node = DeviceNode {
            device_path: device_path.clone(),
            sys_name: device.sysname().to_str().unwrap_or_default().to_string(),
            sys_path: device.syspath().to_string_lossy().into_owned(),
            properties,
        };

        found.insert(device_path, node);
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_from_empty_properties_has_expected_shape() {
        let node = DeviceNode {
            device_path: String::from("/devices/x"),
            sys_name: String::from("ttyUSB0"),
            sys_path: String::from("/sys/devices/x"),
            properties: HashMap::new(),
        };

        assert_eq!(node.property("DEVNAME"), None);
    }
}
