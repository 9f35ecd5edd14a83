//! `sdr-core`
//!
//! Core types and traits for supervising software-defined-radio sampling
//! servers. This crate provides the shared vocabulary used by the per-device
//! driver crates:
//!
//! - [`DeviceDescriptor`] / [`Plan`]: device identity and sampling intent
//! - [`SdrError`]: consolidated error type for supervision failures
//! - [`EventBus`] / [`DeviceEvent`]: broadcast fan-out for device lifecycle
//!   events (add, remove, peer death, parameter failures)
//! - [`DeviceRegistry`] / [`SettingsEntry`]: per-port settings snapshots
//! - [`Sensor`]: the lifecycle trait every device controller implements
//! - [`SensorFactory`]: the plugin API for registering driver types
//!
//! Driver crates depend on this crate and implement [`Sensor`] for their
//! hardware family; the composition root wires factories, the registry and
//! the event bus together.

pub mod device;
pub mod driver;
pub mod error;
pub mod events;
pub mod registry;
pub mod sensor;

pub use device::{DeviceDescriptor, Plan};
pub use driver::{BuildContext, SensorFactory};
pub use error::{SdrError, SdrResult};
pub use events::{DeviceEvent, EventBus, ParamSetFailure};
pub use registry::{DeviceRegistry, Settings, SettingsEntry};
pub use sensor::{ParamSetting, Sensor};
