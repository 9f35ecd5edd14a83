//! Base lifecycle trait for device controllers.
//!
//! A `Sensor` owns everything between the operator's plan and one physical
//! peripheral: the external sampling-server process, the control channel to
//! it, and the recovery reactions when either fails. The owning registry
//! drives the lifecycle (init, parameter changes, shutdown) and listens on
//! the event bus for the remove/re-add cycles a controller emits when its
//! device faults.

use crate::device::DeviceDescriptor;
use crate::error::SdrResult;
use async_trait::async_trait;

/// One (parameter name, natural-unit value) request.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSetting {
    pub name: String,
    pub value: f64,
}

impl ParamSetting {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Lifecycle interface implemented by every device controller.
#[async_trait]
pub trait Sensor: Send {
    /// Descriptor this controller was built for.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Device path the data-plane consumer uses to open its connection to
    /// the sampling server.
    fn data_path(&self) -> String;

    /// Bring the device up: spawn the sampling server and open the control
    /// channel. Resolves exactly once, when the channel first becomes
    /// usable, or with an error if the server cannot be started.
    async fn init(&mut self) -> SdrResult<()>;

    /// Submit one parameter command.
    ///
    /// Commands with an unrecognized name, or submitted while no control
    /// channel is open, are dropped silently. Transmission failures are
    /// reported on the event bus, not to the caller; this method only
    /// errors for caller-side misuse.
    async fn set_param(&mut self, setting: ParamSetting) -> SdrResult<()>;

    /// Start or stop sample streaming to the data-plane connection.
    async fn set_streaming(&mut self, on: bool) -> SdrResult<()>;

    /// Force an immediate remove/re-add recovery cycle, as when the data
    /// stream has visibly stalled.
    async fn reset(&mut self) -> SdrResult<()>;

    /// Tear down: kill the server process, close the channel and suppress
    /// every further restart reaction. Idempotent.
    async fn shutdown(&mut self) -> SdrResult<()>;
}
