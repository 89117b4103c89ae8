//! Traits and types shared by the `robotd` supervisor and the drivers
//! it hosts: the device-type registry, the per-driver contract, the
//! kernel-device-node abstraction, and the newline-delimited JSON wire
//! codec used on every worker's client socket.

pub mod driver;
pub mod error;
pub mod node;
pub mod registry;
pub mod wire;

pub use driver::{BroadcastFn, Driver};
pub use error::Error;
pub use node::DeviceNode;
pub use registry::DeviceType;

/// A `Result` type where the error value is a `robotd_api::Error`.
pub type Result<T> = std::result::Result<T, Error>;
