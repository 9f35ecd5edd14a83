//! Device identity and sampling plan value types.

use serde::{Deserialize, Serialize};

/// Identifies one physical peripheral for the lifetime of its controller.
///
/// The descriptor is a plain value type: the re-add half of a recovery cycle
/// carries a field-for-field copy of it, and the registry entry built for
/// that copy is indistinguishable from the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Hub port number; the registry key and the label used in diagnostics.
    pub port: u32,

    /// Opaque bus:device path (e.g. `"1:4"`) handed to the sampling server
    /// and used to derive the control-socket path.
    pub usb_path: String,
}

impl DeviceDescriptor {
    pub fn new(port: u32, usb_path: impl Into<String>) -> Self {
        Self {
            port,
            usb_path: usb_path.into(),
        }
    }
}

/// Operator-specified sampling intent.
///
/// Owned by the plan layer; controllers read it once at construction to
/// derive their hardware rate and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Desired output sample rate in Hz.
    pub rate: f64,
}
