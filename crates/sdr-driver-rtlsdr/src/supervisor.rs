//! Lifecycle of the external sampling-server process.
//!
//! The server owns the USB device outright: it binds the control socket,
//! performs the transfers and streams samples to the data-plane consumer.
//! This module only starts it, watches it, and kills it. Readiness is
//! announced on the server's stdout; stderr is forwarded to the log.

use sdr_core::error::{SdrError, SdrResult};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Marker printed on stdout once the server accepts connections.
const READY_MARKER: &str = "Listening";

/// Smallest multiple of 512 bytes holding about 100 ms of I/Q pairs.
///
/// Each sample pair is two bytes (8-bit I plus 8-bit Q); the transfer layer
/// requires buffer sizes in 512-byte units.
pub fn usb_buffer_size(hw_rate: u32) -> u32 {
    let bytes = f64::from(hw_rate) * 2.0 * 0.100;
    512 * (bytes / 512.0).ceil() as u32
}

/// A running sampling-server process.
///
/// Stdout and stderr observers run in their own tasks; exit observation is
/// left to the owner via [`SamplingServer::wait`], so that the
/// deliberate-kill flag set by [`SamplingServer::kill`] can suppress the
/// restart reaction an unexpected death would otherwise trigger.
pub struct SamplingServer {
    child: Child,
    killing: bool,
}

impl SamplingServer {
    /// Spawn the server for one device.
    ///
    /// A socket path left behind by a previous run is removed first; its
    /// absence is not an error, and any other removal failure is logged and
    /// swallowed (the spawn may still succeed). The returned receiver
    /// resolves once the ready marker is seen on stdout; it is a one-shot
    /// observation and the stdout stream keeps being drained afterwards.
    pub async fn spawn(
        prog: &Path,
        sock_path: &Path,
        usb_path: &str,
        hw_rate: u32,
    ) -> SdrResult<(Self, oneshot::Receiver<()>)> {
        match tokio::fs::remove_file(sock_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %sock_path.display(), %err, "could not remove stale control socket");
            }
        }

        let buffer = usb_buffer_size(hw_rate);
        tracing::info!(
            prog = %prog.display(),
            socket = %sock_path.display(),
            device = usb_path,
            rate = hw_rate,
            buffer,
            "spawning sampling server"
        );

        let mut child = Command::new(prog)
            .arg("-p")
            .arg(sock_path)
            .arg("-d")
            .arg(usb_path)
            .arg("-s")
            .arg(hw_rate.to_string())
            .arg("-B")
            .arg(buffer.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!(prog = %prog.display(), %source, "failed to spawn sampling server");
                SdrError::Spawn {
                    prog: prog.display().to_string(),
                    source,
                }
            })?;

        let (ready_tx, ready_rx) = oneshot::channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut ready = Some(ready_tx);
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if ready.is_some() && line.contains(READY_MARKER) {
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(());
                        }
                    } else {
                        tracing::trace!(%line, "server stdout");
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(%line, "server stderr");
                }
            });
        }

        Ok((
            Self {
                child,
                killing: false,
            },
            ready_rx,
        ))
    }

    /// True once [`SamplingServer::kill`] has been called.
    pub fn deliberate(&self) -> bool {
        self.killing
    }

    /// Wait for the process to exit, returning its status code if any.
    ///
    /// Cancel-safe, so it can be polled from a select loop.
    pub async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(err) => {
                tracing::warn!(%err, "waiting on sampling server failed");
                None
            }
        }
    }

    /// Mark the termination deliberate, then SIGKILL the process.
    pub fn kill(&mut self) {
        self.killing = true;
        if let Err(err) = self.child.start_kill() {
            tracing::warn!(%err, "failed to kill sampling server");
        }
    }
}
