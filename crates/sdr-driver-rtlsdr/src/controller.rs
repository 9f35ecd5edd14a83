//! RTL-SDR controller: lifecycle states, transitions and the run loop.
//!
//! The controller supervises one sampling-server process and its control
//! socket. All of its decision logic lives in [`transition`], a pure
//! function from (state, event) to (state, actions) that can be tested
//! without a process or a socket. A single actor task per controller
//! executes the actions and feeds events back in: caller messages,
//! supervisor readiness, process exit, socket reads and timer firings are
//! all serialized through one `select!` loop, so no two handlers for the
//! same device ever run concurrently.
//!
//! Fault recovery is deliberately blunt: any stall or unexpected server
//! death ends in a remove/re-add cycle on the event bus. The controller
//! never reconnects in place; the owning registry tears this instance down
//! and builds a fresh one for the cloned descriptor.

use crate::codec::{self, ReplyDecoder};
use crate::rate;
use crate::supervisor::SamplingServer;
use async_trait::async_trait;
use sdr_core::device::{DeviceDescriptor, Plan};
use sdr_core::driver::BuildContext;
use sdr_core::error::{SdrError, SdrResult};
use sdr_core::events::{DeviceEvent, EventBus, ParamSetFailure};
use sdr_core::registry::SettingsEntry;
use sdr_core::sensor::{ParamSetting, Sensor};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Delay between a channel fault and the stall reaction.
const STALL_DELAY: Duration = Duration::from_millis(5001);

/// Delay between the remove and re-add halves of a recovery cycle.
const READD_DELAY: Duration = Duration::from_millis(5000);

/// Device kind label used on the event bus.
const KIND: &str = "rtlsdr";

// =============================================================================
// States, events, actions
// =============================================================================

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built, not yet asked to start.
    Uninitialized,
    /// Sampling server spawning; waiting for its ready marker.
    Starting,
    /// Server ready; control socket connecting.
    AwaitingChannel,
    /// Channel open; commands flow.
    Connected,
    /// Channel fault observed; delayed stall reaction pending.
    Stalled,
    /// Remove/re-add recovery cycle in progress.
    Resetting,
    /// Terminal; every reaction suppressed.
    ShuttingDown,
}

/// Everything that can happen to a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmEvent {
    /// The owner asked for the device to be brought up.
    InitRequested,
    /// The server announced readiness on stdout.
    ServerReady,
    /// The control socket connected.
    ChannelConnected,
    /// Error, end or close on the control socket (all handled alike).
    ChannelFault,
    /// The server process died without `kill()` being called first.
    ServerDied,
    /// An immediate recovery cycle was requested (stall timer fired, or the
    /// owner reported a stalled data stream).
    ResetRequested,
    /// The delayed re-add half of a recovery cycle fired.
    ReaddTimer,
    /// The data-plane peer process disappeared.
    PeerDied,
    /// The owner asked for teardown.
    ShutdownRequested,
}

/// Side effects the run loop executes after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SpawnServer,
    ConnectChannel,
    CompleteInit,
    DestroyChannel,
    KillServer,
    EmitRemoved,
    EmitAdded,
    ScheduleStall,
    ScheduleReadd,
    CancelTimers,
}

/// Pure transition function: no I/O, no time, no allocation beyond the
/// action list. The run loop owns execution; tests drive this directly.
pub fn transition(state: State, event: FsmEvent) -> (State, Vec<Action>) {
    use Action::*;
    use FsmEvent::*;
    use State::*;

    match (state, event) {
        // Terminal: nothing reaches a controller that is shutting down.
        (ShuttingDown, _) => (ShuttingDown, vec![]),
        (_, ShutdownRequested) => (
            ShuttingDown,
            vec![CancelTimers, KillServer, DestroyChannel],
        ),

        // The peer holds the server's second connection; once it is gone the
        // server is useless and re-initialization is driven externally. A
        // reset already in progress keeps its pending re-add.
        (Resetting, PeerDied) => (Resetting, vec![KillServer, DestroyChannel]),
        (_, PeerDied) => (
            Uninitialized,
            vec![CancelTimers, KillServer, DestroyChannel],
        ),

        // Startup path.
        (Uninitialized, InitRequested) => (Starting, vec![SpawnServer]),
        (Starting, ServerReady) => (AwaitingChannel, vec![ConnectChannel]),
        (AwaitingChannel, ChannelConnected) => (Connected, vec![CompleteInit]),

        // Channel faults are soft: tear the socket down and give the server
        // a beat before declaring the device stalled.
        (AwaitingChannel | Connected, ChannelFault) => {
            (Stalled, vec![DestroyChannel, ScheduleStall])
        }

        // Server death and explicit resets go straight to the remove/re-add
        // cycle. The Resetting state is the reentrancy guard: one cycle at
        // a time.
        (Starting | AwaitingChannel | Connected | Stalled, ServerDied) => (
            Resetting,
            vec![CancelTimers, DestroyChannel, EmitRemoved, ScheduleReadd],
        ),
        (Starting | AwaitingChannel | Connected | Stalled, ResetRequested) => {
            (Resetting, vec![CancelTimers, EmitRemoved, ScheduleReadd])
        }
        (Resetting, ReaddTimer) => (Resetting, vec![EmitAdded]),

        // Anything else is stale (duplicate faults during a reset, a ready
        // marker after a fault, a re-add timer that outlived its cycle) and
        // deliberately inert.
        (state, _) => (state, vec![]),
    }
}

// =============================================================================
// Run loop
// =============================================================================

/// Messages from the public handle to the run loop.
enum Msg {
    Init(oneshot::Sender<SdrResult<()>>),
    SetParam {
        setting: ParamSetting,
        done: Option<oneshot::Sender<()>>,
    },
    Reset,
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Stall,
    Readd,
}

/// Pending recovery timers, keyed by kind; superseded or cancelled timers
/// are aborted, never left to fire into a stale state.
#[derive(Default)]
struct Timers {
    stall: Option<JoinHandle<()>>,
    readd: Option<JoinHandle<()>>,
}

impl Timers {
    fn schedule(&mut self, kind: TimerKind, delay: Duration, tx: mpsc::Sender<TimerKind>) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(kind).await;
        });
        let slot = match kind {
            TimerKind::Stall => &mut self.stall,
            TimerKind::Readd => &mut self.readd,
        };
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    fn cancel_all(&mut self) {
        for handle in [self.stall.take(), self.readd.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// What woke the run loop up. Select arms produce one of these; handling
/// happens afterwards so every handler has the whole driver to itself.
enum Wake {
    Msg(Option<Msg>),
    Timer(TimerKind),
    ServerReady,
    ReadyObserverGone,
    ServerExited { deliberate: bool, status: Option<i32> },
    SockRead(std::io::Result<usize>),
    PeerDied,
    Ignored,
}

struct Driver {
    dev: DeviceDescriptor,
    hw_rate: u32,
    prog: PathBuf,
    sock_path: PathBuf,
    bus: EventBus,
    settings: SettingsEntry,
    state: State,
    server: Option<SamplingServer>,
    ready: Option<oneshot::Receiver<()>>,
    sock: Option<UnixStream>,
    decoder: ReplyDecoder,
    init_done: Option<oneshot::Sender<SdrResult<()>>>,
    timers: Timers,
    timer_tx: mpsc::Sender<TimerKind>,
    timer_rx: mpsc::Receiver<TimerKind>,
}

impl Driver {
    async fn run(
        mut self,
        mut msgs: mpsc::Receiver<Msg>,
        mut bus_rx: broadcast::Receiver<DeviceEvent>,
    ) {
        let mut read_buf = [0u8; 4096];
        loop {
            let wake = tokio::select! {
                msg = msgs.recv() => Wake::Msg(msg),
                Some(kind) = self.timer_rx.recv() => Wake::Timer(kind),
                // Branches over optional resources resolve to a pending
                // future while the resource is absent.
                res = async {
                    match self.ready.as_mut() {
                        Some(rx) => rx.await,
                        None => std::future::pending().await,
                    }
                } => match res {
                    Ok(()) => Wake::ServerReady,
                    Err(_) => Wake::ReadyObserverGone,
                },
                (deliberate, status) = async {
                    match self.server.as_mut() {
                        Some(server) => {
                            let status = server.wait().await;
                            (server.deliberate(), status)
                        }
                        None => std::future::pending().await,
                    }
                } => Wake::ServerExited { deliberate, status },
                res = async {
                    match self.sock.as_mut() {
                        Some(sock) => sock.read(&mut read_buf).await,
                        None => std::future::pending().await,
                    }
                } => Wake::SockRead(res),
                ev = bus_rx.recv() => match ev {
                    Ok(DeviceEvent::PeerDied) => Wake::PeerDied,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Wake::Ignored,
                    Err(broadcast::error::RecvError::Closed) => Wake::Ignored,
                },
            };

            match wake {
                Wake::Msg(Some(Msg::Init(done))) => {
                    if self.state == State::Uninitialized && self.init_done.is_none() {
                        self.init_done = Some(done);
                        self.apply(FsmEvent::InitRequested).await;
                    } else {
                        let _ = done.send(Err(SdrError::Config(
                            "device already initialized".to_string(),
                        )));
                    }
                }
                Wake::Msg(Some(Msg::SetParam { setting, done })) => {
                    self.handle_set_param(setting, done).await;
                }
                Wake::Msg(Some(Msg::Reset)) => self.apply(FsmEvent::ResetRequested).await,
                Wake::Msg(Some(Msg::Shutdown(done))) => {
                    self.apply(FsmEvent::ShutdownRequested).await;
                    let _ = done.send(());
                    return;
                }
                Wake::Msg(None) => {
                    // Every handle dropped: tear down as if shut down.
                    self.apply(FsmEvent::ShutdownRequested).await;
                    return;
                }
                Wake::Timer(TimerKind::Stall) => self.apply(FsmEvent::ResetRequested).await,
                Wake::Timer(TimerKind::Readd) => self.apply(FsmEvent::ReaddTimer).await,
                Wake::ServerReady => {
                    self.ready = None;
                    self.apply(FsmEvent::ServerReady).await;
                }
                Wake::ReadyObserverGone => {
                    // Stdout closed before the marker; the exit observer
                    // will surface whatever happened to the process.
                    self.ready = None;
                }
                Wake::ServerExited { deliberate, status } => {
                    self.server = None;
                    self.ready = None;
                    if deliberate {
                        tracing::debug!(port = self.dev.port, "sampling server terminated");
                    } else {
                        tracing::warn!(
                            port = self.dev.port,
                            ?status,
                            "sampling server died unexpectedly"
                        );
                        self.apply(FsmEvent::ServerDied).await;
                    }
                }
                Wake::SockRead(Ok(0)) => {
                    tracing::debug!(port = self.dev.port, "control channel closed");
                    self.apply(FsmEvent::ChannelFault).await;
                }
                Wake::SockRead(Ok(n)) => self.ingest(&read_buf[..n]),
                Wake::SockRead(Err(err)) => {
                    tracing::debug!(port = self.dev.port, %err, "control channel error");
                    self.apply(FsmEvent::ChannelFault).await;
                }
                Wake::PeerDied => self.apply(FsmEvent::PeerDied).await,
                Wake::Ignored => {}
            }
        }
    }

    /// Run one event through the transition function, executing actions and
    /// any follow-up events they produce (e.g. a connect completing).
    async fn apply(&mut self, event: FsmEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let (next, actions) = transition(self.state, event);
            if next != self.state {
                tracing::debug!(
                    port = self.dev.port,
                    from = ?self.state,
                    to = ?next,
                    ?event,
                    "state transition"
                );
            }
            self.state = next;
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
        }

        // A fault that preempts the startup path must not leave the init
        // caller waiting on a connect that will never happen.
        if matches!(
            self.state,
            State::Uninitialized | State::Stalled | State::Resetting | State::ShuttingDown
        ) {
            if let Some(done) = self.init_done.take() {
                let _ = done.send(Err(SdrError::Channel(
                    "device fault before startup completed".to_string(),
                )));
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<FsmEvent> {
        match action {
            Action::SpawnServer => {
                match SamplingServer::spawn(
                    &self.prog,
                    &self.sock_path,
                    &self.dev.usb_path,
                    self.hw_rate,
                )
                .await
                {
                    Ok((server, ready)) => {
                        self.server = Some(server);
                        self.ready = Some(ready);
                    }
                    Err(err) => {
                        // Spawn errors are logged, not retried from here;
                        // the pending init resolves with the error.
                        if let Some(done) = self.init_done.take() {
                            let _ = done.send(Err(err));
                        }
                    }
                }
                None
            }
            Action::ConnectChannel => match UnixStream::connect(&self.sock_path).await {
                Ok(stream) => {
                    self.sock = Some(stream);
                    self.decoder = ReplyDecoder::new();
                    Some(FsmEvent::ChannelConnected)
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.sock_path.display(),
                        %err,
                        "control socket connect failed"
                    );
                    Some(FsmEvent::ChannelFault)
                }
            },
            Action::CompleteInit => {
                if let Some(done) = self.init_done.take() {
                    let _ = done.send(Ok(()));
                }
                None
            }
            Action::DestroyChannel => {
                self.sock = None;
                None
            }
            Action::KillServer => {
                if let Some(server) = self.server.as_mut() {
                    server.kill();
                }
                None
            }
            Action::EmitRemoved => {
                self.bus.emit(DeviceEvent::Removed(self.dev.clone()));
                None
            }
            Action::EmitAdded => {
                self.bus.emit(DeviceEvent::Added(self.dev.clone()));
                None
            }
            Action::ScheduleStall => {
                self.timers
                    .schedule(TimerKind::Stall, STALL_DELAY, self.timer_tx.clone());
                None
            }
            Action::ScheduleReadd => {
                self.timers
                    .schedule(TimerKind::Readd, READD_DELAY, self.timer_tx.clone());
                None
            }
            Action::CancelTimers => {
                self.timers.cancel_all();
                None
            }
        }
    }

    /// Encode and transmit one parameter command.
    ///
    /// No channel or an unrecognized name drops the command silently (the
    /// completion sender is dropped, never resolved). Encode and write
    /// failures become `ParamSetFailed` bus signals, not caller errors.
    async fn handle_set_param(&mut self, setting: ParamSetting, done: Option<oneshot::Sender<()>>) {
        if self.state != State::Connected || self.sock.is_none() {
            tracing::trace!(
                port = self.dev.port,
                name = %setting.name,
                "dropping parameter command; no control channel"
            );
            return;
        }

        let frame = match codec::encode(&setting.name, setting.value) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::trace!(
                    port = self.dev.port,
                    name = %setting.name,
                    "dropping unrecognized parameter command"
                );
                return;
            }
            Err(err) => {
                self.param_set_failed(&setting, err.to_string());
                return;
            }
        };

        if let Some(sock) = self.sock.as_mut() {
            if let Err(err) = sock.write_all(&frame).await {
                self.param_set_failed(&setting, err.to_string());
                return;
            }
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn param_set_failed(&self, setting: &ParamSetting, error: String) {
        tracing::warn!(
            port = self.dev.port,
            name = %setting.name,
            value = setting.value,
            %error,
            "parameter set failed"
        );
        self.bus.emit(DeviceEvent::ParamSetFailed(ParamSetFailure {
            kind: KIND,
            port: self.dev.port,
            name: setting.name.clone(),
            value: setting.value,
            error,
        }));
    }

    fn ingest(&mut self, data: &[u8]) {
        for snapshot in self.decoder.push(data) {
            self.settings.replace(snapshot);
        }
    }
}

// =============================================================================
// Public handle
// =============================================================================

/// Where and how to start the sampling server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Path to the sampling server binary.
    pub prog: PathBuf,
    /// Directory the per-device control socket is created in.
    pub socket_dir: PathBuf,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            prog: PathBuf::from("/usr/bin/rtl_tcp"),
            socket_dir: PathBuf::from("/tmp"),
        }
    }
}

/// Controller for one RTL-SDR device.
///
/// Construction derives the hardware rate from the plan and starts the run
/// loop task; nothing touches the device until [`Sensor::init`]. Dropping
/// the handle tears the controller down as if it had been shut down.
pub struct RtlSdr {
    dev: DeviceDescriptor,
    hw_rate: u32,
    sock_path: PathBuf,
    tx: mpsc::Sender<Msg>,
}

impl RtlSdr {
    pub fn new(dev: DeviceDescriptor, plan: &Plan, opts: ServerOptions, ctx: BuildContext) -> Self {
        let hw_rate = rate::hardware_rate(plan.rate);
        let sock_path = opts
            .socket_dir
            .join(format!("rtlsdr-{}.sock", dev.usb_path));

        let (tx, rx) = mpsc::channel(32);
        let (timer_tx, timer_rx) = mpsc::channel(8);
        let bus_rx = ctx.bus.subscribe();

        let driver = Driver {
            dev: dev.clone(),
            hw_rate,
            prog: opts.prog,
            sock_path: sock_path.clone(),
            bus: ctx.bus,
            settings: ctx.settings,
            state: State::Uninitialized,
            server: None,
            ready: None,
            sock: None,
            decoder: ReplyDecoder::new(),
            init_done: None,
            timers: Timers::default(),
            timer_tx,
            timer_rx,
        };
        tokio::spawn(driver.run(rx, bus_rx));

        Self {
            dev,
            hw_rate,
            sock_path,
            tx,
        }
    }

    /// Hardware rate derived from the plan at construction.
    pub fn hw_rate(&self) -> u32 {
        self.hw_rate
    }

    /// Control socket path for this device.
    pub fn sock_path(&self) -> &std::path::Path {
        &self.sock_path
    }
}

#[async_trait]
impl Sensor for RtlSdr {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.dev
    }

    fn data_path(&self) -> String {
        format!("rtlsdr:{}", self.sock_path.display())
    }

    async fn init(&mut self) -> SdrResult<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Msg::Init(done))
            .await
            .map_err(|_| SdrError::ShuttingDown)?;
        rx.await.map_err(|_| SdrError::ShuttingDown)?
    }

    async fn set_param(&mut self, setting: ParamSetting) -> SdrResult<()> {
        let (done, rx) = oneshot::channel();
        if self
            .tx
            .send(Msg::SetParam {
                setting,
                done: Some(done),
            })
            .await
            .is_err()
        {
            // Controller already gone; commands are dropped, not errors.
            return Ok(());
        }
        // A dropped sender means the command was dropped, which is fine.
        let _ = rx.await;
        Ok(())
    }

    async fn set_streaming(&mut self, on: bool) -> SdrResult<()> {
        self.set_param(ParamSetting::new("streaming", if on { 1.0 } else { 0.0 }))
            .await
    }

    async fn reset(&mut self) -> SdrResult<()> {
        let _ = self.tx.send(Msg::Reset).await;
        Ok(())
    }

    async fn shutdown(&mut self) -> SdrResult<()> {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Msg::Shutdown(done)).await.is_ok() {
            let _ = rx.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(state: State, events: &[FsmEvent]) -> (State, Vec<Action>) {
        let mut current = state;
        let mut last_actions = Vec::new();
        for &event in events {
            let (next, actions) = transition(current, event);
            current = next;
            last_actions = actions;
        }
        (current, last_actions)
    }

    #[test]
    fn test_startup_path() {
        let (state, actions) = transition(State::Uninitialized, FsmEvent::InitRequested);
        assert_eq!(state, State::Starting);
        assert_eq!(actions, vec![Action::SpawnServer]);

        let (state, actions) = transition(state, FsmEvent::ServerReady);
        assert_eq!(state, State::AwaitingChannel);
        assert_eq!(actions, vec![Action::ConnectChannel]);

        let (state, actions) = transition(state, FsmEvent::ChannelConnected);
        assert_eq!(state, State::Connected);
        assert_eq!(actions, vec![Action::CompleteInit]);
    }

    #[test]
    fn test_channel_fault_schedules_stall_then_resets() {
        let (state, actions) = transition(State::Connected, FsmEvent::ChannelFault);
        assert_eq!(state, State::Stalled);
        assert_eq!(actions, vec![Action::DestroyChannel, Action::ScheduleStall]);

        let (state, actions) = transition(state, FsmEvent::ResetRequested);
        assert_eq!(state, State::Resetting);
        assert_eq!(
            actions,
            vec![
                Action::CancelTimers,
                Action::EmitRemoved,
                Action::ScheduleReadd
            ]
        );
    }

    #[test]
    fn test_unexpected_server_death_resets_immediately() {
        for from in [
            State::Starting,
            State::AwaitingChannel,
            State::Connected,
            State::Stalled,
        ] {
            let (state, actions) = transition(from, FsmEvent::ServerDied);
            assert_eq!(state, State::Resetting);
            assert_eq!(
                actions,
                vec![
                    Action::CancelTimers,
                    Action::DestroyChannel,
                    Action::EmitRemoved,
                    Action::ScheduleReadd
                ]
            );
        }
    }

    #[test]
    fn test_second_fault_during_reset_is_absorbed() {
        let (state, _) = transition(State::Connected, FsmEvent::ServerDied);
        assert_eq!(state, State::Resetting);

        // No second removed/added pair, whatever arrives.
        for event in [
            FsmEvent::ServerDied,
            FsmEvent::ChannelFault,
            FsmEvent::ResetRequested,
        ] {
            let (next, actions) = transition(state, event);
            assert_eq!(next, State::Resetting);
            assert!(actions.is_empty(), "{event:?} produced {actions:?}");
        }
    }

    #[test]
    fn test_readd_fires_only_while_resetting() {
        let (state, actions) = transition(State::Resetting, FsmEvent::ReaddTimer);
        assert_eq!(state, State::Resetting);
        assert_eq!(actions, vec![Action::EmitAdded]);

        for state in [State::Uninitialized, State::Connected, State::ShuttingDown] {
            let (_, actions) = transition(state, FsmEvent::ReaddTimer);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn test_shutdown_suppresses_every_reaction() {
        let (state, actions) = transition(State::Connected, FsmEvent::ShutdownRequested);
        assert_eq!(state, State::ShuttingDown);
        assert_eq!(
            actions,
            vec![
                Action::CancelTimers,
                Action::KillServer,
                Action::DestroyChannel
            ]
        );

        // The kill path runs exactly once; later events change nothing.
        for event in [
            FsmEvent::ServerDied,
            FsmEvent::ChannelFault,
            FsmEvent::ResetRequested,
            FsmEvent::ShutdownRequested,
            FsmEvent::PeerDied,
            FsmEvent::InitRequested,
        ] {
            let (next, actions) = transition(state, event);
            assert_eq!(next, State::ShuttingDown);
            assert!(actions.is_empty(), "{event:?} produced {actions:?}");
        }
    }

    #[test]
    fn test_peer_death_tears_down_without_reset() {
        let (state, actions) = transition(State::Connected, FsmEvent::PeerDied);
        assert_eq!(state, State::Uninitialized);
        assert_eq!(
            actions,
            vec![
                Action::CancelTimers,
                Action::KillServer,
                Action::DestroyChannel
            ]
        );
        assert!(!actions.contains(&Action::EmitRemoved));
    }

    #[test]
    fn test_peer_death_during_reset_keeps_the_pending_readd() {
        let (state, _) = transition(State::Connected, FsmEvent::ServerDied);
        let (state, actions) = transition(state, FsmEvent::PeerDied);
        assert_eq!(state, State::Resetting);
        assert_eq!(actions, vec![Action::KillServer, Action::DestroyChannel]);

        let (_, actions) = transition(state, FsmEvent::ReaddTimer);
        assert_eq!(actions, vec![Action::EmitAdded]);
    }

    #[test]
    fn test_stale_events_are_inert() {
        let (state, actions) = fold(
            State::Uninitialized,
            &[FsmEvent::ServerReady, FsmEvent::ChannelConnected],
        );
        assert_eq!(state, State::Uninitialized);
        assert!(actions.is_empty());

        // A duplicate init while already starting changes nothing.
        let (state, actions) = transition(State::Starting, FsmEvent::InitRequested);
        assert_eq!(state, State::Starting);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_exactly_one_removed_added_pair_per_fault() {
        let mut state = State::Connected;
        let mut removed = 0;
        let mut added = 0;
        for event in [
            FsmEvent::ServerDied,
            FsmEvent::ChannelFault,
            FsmEvent::ServerDied,
            FsmEvent::ReaddTimer,
        ] {
            let (next, actions) = transition(state, event);
            state = next;
            removed += actions.iter().filter(|a| **a == Action::EmitRemoved).count();
            added += actions.iter().filter(|a| **a == Action::EmitAdded).count();
        }
        assert_eq!(removed, 1);
        assert_eq!(added, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_delivery_and_cancellation() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = Timers::default();

        timers.schedule(TimerKind::Readd, READD_DELAY, tx.clone());
        tokio::time::sleep(READD_DELAY + Duration::from_millis(10)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Readd));

        // A cancelled timer never delivers.
        timers.schedule(TimerKind::Stall, STALL_DELAY, tx.clone());
        timers.cancel_all();
        tokio::time::sleep(STALL_DELAY * 2).await;
        assert!(rx.try_recv().is_err());
    }
}
