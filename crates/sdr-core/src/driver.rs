//! Sensor factory plugin API.
//!
//! Each driver crate implements [`SensorFactory`] and registers itself with
//! the composition root. The factory validates a TOML configuration block,
//! then builds a controller wired to the process-wide collaborators carried
//! in [`BuildContext`].
//!
//! ```rust,ignore
//! let registry = Arc::new(DeviceRegistry::new());
//! let bus = EventBus::default();
//!
//! let factory = RtlSdrFactory;
//! factory.validate(&config)?;
//! let ctx = BuildContext { bus: bus.clone(), settings: registry.entry(port) };
//! let sensor = factory.build(config, ctx).await?;
//! ```

use crate::events::EventBus;
use crate::registry::SettingsEntry;
use crate::sensor::Sensor;
use anyhow::Result;
use futures::future::BoxFuture;

/// Collaborator handles a factory wires into the controller it builds.
///
/// Handing the settings entry over here keeps controllers free of any
/// process-wide lookup: they only ever touch their own entry.
#[derive(Clone)]
pub struct BuildContext {
    /// Device lifecycle event bus.
    pub bus: EventBus,
    /// Settings snapshot entry for this device's port.
    pub settings: SettingsEntry,
}

/// Trait for factories that create device controllers.
///
/// Factories are registered once at startup and live for the program's
/// lifetime; `build()` may be called many times, including for the fresh
/// controller a remove/re-add recovery cycle asks for.
pub trait SensorFactory: Send + Sync + 'static {
    /// Device kind name matching the configuration `type` field.
    fn kind(&self) -> &'static str;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Validate configuration without instantiating.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Build the controller for one device.
    fn build(
        &self,
        config: toml::Value,
        ctx: BuildContext,
    ) -> BoxFuture<'static, Result<Box<dyn Sensor>>>;
}
