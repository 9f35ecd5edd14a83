//! RTL2832U SDR controller driven through an external `rtl_tcp` process.
//!
//! The sampling server owns the USB device and handles two half-duplex
//! connections on one unix socket path: the first carries binary parameter
//! commands from this crate and JSON parameter-snapshot replies back; the
//! second is opened by the data-plane consumer and carries raw samples.
//! This crate supervises the server process, speaks the command side of the
//! protocol, and recycles the device through a remove/re-add cycle on the
//! event bus when the server stalls or dies.
//!
//! The server takes integer parameter values only; plans and operators use
//! natural units. For example:
//!
//! | parameter    | wire unit (integer) | natural unit (real) |
//! |--------------|---------------------|---------------------|
//! | `frequency`  | 166376000 Hz        | 166.376 MHz         |
//! | `tuner_gain` | 105 (0.1 dB)        | 10.5 dB             |
//!
//! See [`units`] for the conversion tables and [`codec`] for the framing.

pub mod codec;
pub mod controller;
pub mod rate;
pub mod supervisor;
pub mod units;

pub use controller::{RtlSdr, ServerOptions};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sdr_core::device::{DeviceDescriptor, Plan};
use sdr_core::driver::{BuildContext, SensorFactory};
use sdr_core::sensor::Sensor;
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for one RTL-SDR controller.
#[derive(Debug, Clone, Deserialize)]
pub struct RtlSdrConfig {
    /// Hub port number; the registry key for this device.
    pub port: u32,
    /// USB bus:device path (e.g. "1:4").
    pub usb_path: String,
    /// Desired output sample rate in Hz.
    pub rate: f64,
    /// Path to the sampling server binary.
    #[serde(default = "default_prog")]
    pub prog: PathBuf,
    /// Directory the per-device control socket is created in.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
}

fn default_prog() -> PathBuf {
    PathBuf::from("/usr/bin/rtl_tcp")
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

/// Factory for creating RTL-SDR controllers.
pub struct RtlSdrFactory;

impl SensorFactory for RtlSdrFactory {
    fn kind(&self) -> &'static str {
        "rtlsdr"
    }

    fn name(&self) -> &'static str {
        "RTL2832U SDR (rtl_tcp)"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: RtlSdrConfig = config.clone().try_into()?;
        if cfg.usb_path.is_empty() {
            anyhow::bail!("usb_path must not be empty");
        }
        Ok(())
    }

    fn build(
        &self,
        config: toml::Value,
        ctx: BuildContext,
    ) -> BoxFuture<'static, Result<Box<dyn Sensor>>> {
        Box::pin(async move {
            let cfg: RtlSdrConfig = config.try_into().context("invalid rtlsdr config")?;

            let dev = DeviceDescriptor::new(cfg.port, cfg.usb_path);
            let plan = Plan { rate: cfg.rate };
            let opts = ServerOptions {
                prog: cfg.prog,
                socket_dir: cfg.socket_dir,
            };

            let controller = RtlSdr::new(dev, &plan, opts, ctx);
            Ok(Box::new(controller) as Box<dyn Sensor>)
        })
    }
}
