//! Device lifecycle event bus.
//!
//! Controllers and the owning registry communicate through a broadcast
//! channel: controllers emit [`DeviceEvent::Removed`]/[`DeviceEvent::Added`]
//! pairs to drive the remove/re-add recovery cycle, and subscribe to
//! [`DeviceEvent::PeerDied`] to learn that the data-plane consumer holding
//! the second server connection has disappeared.

use crate::device::DeviceDescriptor;
use tokio::sync::broadcast;

/// Payload of a failed parameter-set attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSetFailure {
    /// Device kind, e.g. `"rtlsdr"`.
    pub kind: &'static str,
    /// Hub port of the device the command was addressed to.
    pub port: u32,
    /// Parameter name as submitted.
    pub name: String,
    /// Natural-unit value as submitted.
    pub value: f64,
    /// Human-readable description of what went wrong.
    pub error: String,
}

/// Events carried on the device bus.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A (re)discovered device should be brought up by the owning registry.
    Added(DeviceDescriptor),

    /// The device is gone; its controller and registry entry are torn down.
    Removed(DeviceDescriptor),

    /// The data-plane consumer process died. Sampling servers only handle
    /// one connection pair, so every controller must recycle its server.
    PeerDied,

    /// A parameter command could not be encoded or transmitted.
    ParamSetFailed(ParamSetFailure),
}

/// Broadcast fan-out for [`DeviceEvent`]s.
///
/// Cloning the bus clones the sending half; each subscriber gets an
/// independent receiver. Emission never blocks and never fails: having no
/// subscribers is a benign condition during startup and teardown.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: DeviceEvent) {
        tracing::trace!(?event, "device event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
