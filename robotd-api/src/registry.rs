//! The device-type registry: a process-wide, statically populated
//! catalogue of known peripheral families.

use crate::{DeviceNode, Driver};

/// One entry in the device registry, describing a peripheral family
/// the supervisor knows how to discover and drive.
///
/// Entries are plain data plus function pointers rather than a boxed
/// trait object: every field is known at compile time, so the whole
/// registry can live in a `&'static` slice built once and shared by
/// every task without locking.
pub struct DeviceType {
    /// Stable snake-case identifier used in socket paths, e.g.
    /// `"motor_board"`. See [`derive_type_id`] for the default
    /// derivation from a human-readable name.
    pub type_id: &'static str,

    /// Kernel device attribute/value pairs the supervisor matches
    /// against during discovery. `None` means the type is never
    /// auto-discovered (only reachable via `create_on_startup`).
    pub lookup_keys: Option<&'static [(&'static str, &'static str)]>,

    /// Refines a `lookup_keys` match, e.g. to distinguish identical
    /// USB-serial bridges by a model string in `node.properties`.
    pub included: fn(&DeviceNode) -> bool,

    /// Computes the instance name (used in the socket path) from the
    /// kernel node.
    pub name: fn(&DeviceNode) -> String,

    /// If true, one instance is created eagerly with an empty node at
    /// supervisor startup, independent of any kernel match.
    pub create_on_startup: bool,

    /// If false, the type is excluded from the registry entirely.
    pub enabled: bool,

    /// Constructs a driver instance bound to the given node.
    pub make_driver: fn(&DeviceNode) -> Box<dyn Driver>,
}

/// Derives the default `type_id` from a human-readable driver name:
/// strips a trailing `"Board"`, lowercases, and replaces internal
/// word boundaries with underscores. `"MotorBoard"` becomes
/// `"motor_board"`; `"Camera"` becomes `"camera"`.
///
/// Built-in drivers that need a different identifier set `type_id`
/// directly rather than relying on this derivation.
pub fn derive_type_id(human_name: &str) -> String {
    let stripped = human_name.strip_suffix("Board").unwrap_or(human_name);
    let mut out = String::with_capacity(stripped.len() + 4);

    for (i, ch) in stripped.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_board_and_lowercases() {
        assert_eq!(derive_type_id("MotorBoard"), "motor_board");
        assert_eq!(derive_type_id("PowerBoard"), "power_board");
    }

    #[test]
    fn leaves_names_without_board_suffix_alone() {
        assert_eq!(derive_type_id("Camera"), "camera");
    }

    #[test]
    fn splits_on_every_word_boundary() {
        assert_eq!(derive_type_id("ServoAssembly"), "servo_assembly");
        assert_eq!(
            derive_type_id("BrainTemperatureSensor"),
            "brain_temperature_sensor"
        );
    }
}
