//! Per-device driver instance.
//!
//! One [`Wellspring`] exists per attached trackpad. All of its mutable state
//! (both channel contexts, the mode buffer, the event sink) sits behind a
//! single mutex that each entry point takes once. Interrupt-pipe calls into
//! the host are decided under the lock and carried out after it is
//! released, so a host may report completions from inside them.

use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::frame::{FrameDecoder, NormalizedFrame, RawFrame};
use crate::mode::{self, InterfaceMode, ModeState, MODE_LEN};
use crate::profile::{self, DeviceProfile, Variant};
use crate::sink::{EventSink, FrameQueue};
use crate::transfer::{
    transition, Action, Channel, Completion, Event, InterruptHost, TransferContext, TransferId,
};
use crate::transport::ControlTransport;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Everything the driver needs from the USB host.
pub trait Host: ControlTransport + InterruptHost {}

impl<T: ControlTransport + InterruptHost> Host for T {}

/// Interrupt-pipe call queued while the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOp {
    Submit(TransferId, usize),
    ClearStall(Channel),
    Stop(Channel),
    Interval(Channel, u32),
}

struct Inner<S> {
    contexts: [TransferContext; 2],
    /// A submitted transfer has not completed yet.
    pending: [bool; 2],
    mode: ModeState,
    decoder: FrameDecoder,
    sink: Option<S>,
    enabled: bool,
    started: bool,
    pending_interval: Option<u32>,
}

/// A Wellspring trackpad attached through host `H`, delivering into `S`.
pub struct Wellspring<H: Host, S: EventSink = FrameQueue> {
    host: H,
    profile: &'static DeviceProfile,
    config: DriverConfig,
    channels: Vec<Channel>,
    inner: Mutex<Inner<S>>,
}

impl<H: Host> Wellspring<H, FrameQueue> {
    /// Bind a device of `variant` and put it into raw-sensor mode.
    ///
    /// Frames go to a [`FrameQueue`] of `config.queue_len` allocated on open.
    pub fn attach(host: H, variant: Variant, config: DriverConfig) -> Result<Self> {
        Self::attach_with_sink(host, variant, config)
    }

    /// Pop the oldest decoded frame.
    pub fn read_frame(&self) -> Option<NormalizedFrame> {
        self.lock().sink.as_mut().and_then(FrameQueue::pop)
    }

    /// Take every queued frame.
    pub fn drain_frames(&self) -> Vec<NormalizedFrame> {
        self.lock()
            .sink
            .as_mut()
            .map(FrameQueue::drain)
            .unwrap_or_default()
    }
}

impl<H: Host, S: EventSink> Wellspring<H, S> {
    /// Like [`Wellspring::attach`], delivering into a sink of type `S`.
    pub fn attach_with_sink(host: H, variant: Variant, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let profile = profile::lookup(variant)?;
        info!(device = profile.name, "attaching");

        let mut mode_state = ModeState::new();
        mode::attach_reset(&host, &mut mode_state).map_err(|e| {
            error!(error = %e, "mode reset failed");
            e
        })?;

        let channels = Channel::ALL
            .into_iter()
            .filter(|ch| match ch {
                Channel::Button => config.button_channel_enabled(profile),
                Channel::Trackpad => true,
            })
            .collect::<Vec<_>>();
        debug!(?channels, "interrupt channels");

        let inner = Inner {
            contexts: Channel::ALL.map(TransferContext::new),
            pending: [false; 2],
            mode: mode_state,
            decoder: FrameDecoder::new(profile),
            sink: None,
            enabled: false,
            started: false,
            pending_interval: config.poll_interval_ms(),
        };

        info!("device version is {}", profile.name);
        Ok(Self {
            host,
            profile,
            config,
            channels,
            inner: Mutex::new(inner),
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Channels this instance drives.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable reading and allocate the sink.
    pub fn open(&self) -> Result<()> {
        debug!("open");
        let mut inner = self.lock();
        if inner.enabled {
            return Err(Error::Busy("already open"));
        }
        let sink = S::allocate(self.config.queue_len).map_err(|e| {
            error!(error = %e, "failed to allocate event sink");
            e
        })?;
        inner.sink = Some(sink);
        inner.enabled = true;
        Ok(())
    }

    /// Disable reading and release the sink, stopping first if needed.
    pub fn close(&self) {
        debug!("close");
        let mut ops = Vec::new();
        {
            let mut inner = self.lock();
            if let Err(e) = self.stop_locked(&mut inner, &mut ops) {
                warn!(error = %e, "mode switch failed while closing");
            }
            inner.enabled = false;
            inner.sink = None;
        }
        self.run(ops);
    }

    /// Switch to raw-sensor mode and arm every channel.
    ///
    /// On an already started device this only re-arms channels that went
    /// idle for lack of sink capacity. If the mode switch fails the device
    /// is left not started.
    pub fn start(&self) -> Result<()> {
        debug!("start");
        let mut ops = Vec::new();
        let result = {
            let mut inner = self.lock();
            self.start_locked(&mut inner, &mut ops)
        };
        self.run(ops);
        result
    }

    fn start_locked(&self, inner: &mut Inner<S>, ops: &mut Vec<HostOp>) -> Result<()> {
        if !inner.enabled {
            return Err(Error::NotOpen);
        }

        if !inner.started {
            if let Some(interval) = inner.pending_interval.take() {
                for &ch in &self.channels {
                    ops.push(HostOp::Stop(ch));
                    inner.pending[ch.index()] = false;
                    ops.push(HostOp::Interval(ch, interval));
                }
                debug!(interval_ms = interval, "set transfer interval");
            }

            mode::reset_to_raw_sensor(&self.host, &mut inner.mode)?;
            inner.decoder.reset();
            for &ch in &self.channels {
                inner.contexts[ch.index()].start();
            }
            inner.started = true;
        }

        for &ch in &self.channels {
            let idx = ch.index();
            if !inner.pending[idx] && inner.contexts[idx].running {
                self.step(inner, ch, Event::Setup, &[], ops);
            }
        }
        Ok(())
    }

    /// Halt every channel and switch back to HID mode.
    ///
    /// Channels halt even when the mode switch fails; the error is returned.
    pub fn stop(&self) -> Result<()> {
        debug!("stop");
        let mut ops = Vec::new();
        let result = {
            let mut inner = self.lock();
            self.stop_locked(&mut inner, &mut ops)
        };
        self.run(ops);
        result
    }

    fn stop_locked(&self, inner: &mut Inner<S>, ops: &mut Vec<HostOp>) -> Result<()> {
        if !inner.started {
            return Ok(());
        }
        inner.started = false;
        let result = mode::switch_mode(&self.host, &mut inner.mode, InterfaceMode::Hid);
        for &ch in &self.channels {
            inner.contexts[ch.index()].stop();
            inner.pending[ch.index()] = false;
            ops.push(HostOp::Stop(ch));
        }
        result
    }

    /// Host completion callback for the transfer submitted as `id`.
    ///
    /// `data` holds the received bytes; only the first `len` reported by the
    /// completion are looked at. Completions for a transfer armed before the
    /// channel was last started are ignored.
    pub fn on_transfer_complete(&self, id: TransferId, completion: Completion, data: &[u8]) {
        let channel = id.channel;
        let mut ops = Vec::new();
        {
            let mut inner = self.lock();
            if !self.channels.contains(&channel) {
                debug!(channel = %channel, "completion on inactive channel");
                return;
            }
            let idx = channel.index();
            if !inner.contexts[idx].owns(id) {
                debug!(
                    channel = %channel,
                    generation = id.generation,
                    current = inner.contexts[idx].generation,
                    "stale completion from an earlier run, ignoring"
                );
                return;
            }
            inner.pending[idx] = false;
            self.step(&mut inner, channel, Event::Completed(completion), data, &mut ops);
        }
        self.run(ops);
    }

    fn step(
        &self,
        inner: &mut Inner<S>,
        channel: Channel,
        event: Event,
        data: &[u8],
        ops: &mut Vec<HostOp>,
    ) {
        let idx = channel.index();
        let expected = channel.expected_len(self.profile);
        let t = transition(inner.contexts[idx], event, expected);
        inner.contexts[idx] = t.next;

        for action in t.actions {
            match action {
                Action::Truncated { from, to } => {
                    warn!(channel = %channel, "truncating large packet from {} to {} bytes", from, to);
                }
                Action::DroppedShort { len, expected } => {
                    warn!(
                        channel = %channel,
                        len,
                        expected,
                        errors = inner.contexts[idx].errors,
                        "received short packet, ignoring"
                    );
                }
                Action::Deliver { len } => self.deliver(inner, channel, data, len),
                Action::ClearStall => {
                    debug!(channel = %channel, errors = inner.contexts[idx].errors, "clearing stall");
                    ops.push(HostOp::ClearStall(channel));
                }
                Action::Arm { len } => {
                    let has_capacity = inner.sink.as_ref().is_some_and(|s| s.has_capacity());
                    if !has_capacity {
                        debug!(channel = %channel, "event sink full, channel idle");
                        continue;
                    }
                    inner.pending[idx] = true;
                    ops.push(HostOp::Submit(inner.contexts[idx].id(), len));
                }
                Action::Halt { errors } => {
                    error!(channel = %channel, errors, "too many errors, stopping channel");
                }
                Action::Stopped => debug!(channel = %channel, "transfer cancelled"),
            }
        }
    }

    fn deliver(&self, inner: &mut Inner<S>, channel: Channel, data: &[u8], len: usize) {
        let Some(bytes) = data.get(..len) else {
            warn!(
                channel = %channel,
                len,
                available = data.len(),
                "completion length exceeds buffer, dropping frame"
            );
            return;
        };
        match inner.decoder.validate(&RawFrame { channel, data: bytes }) {
            Ok(frame) => {
                if let Some(sink) = inner.sink.as_mut() {
                    sink.deliver(frame);
                }
            }
            Err(reason) => warn!(%reason, "dropping frame"),
        }
    }

    /// Carry out queued host calls. Must be called without the lock held.
    fn run(&self, ops: Vec<HostOp>) {
        for op in ops {
            match op {
                HostOp::Submit(id, len) => {
                    if let Err(e) = self.host.submit(id, len) {
                        warn!(channel = %id.channel, error = %e, "submit failed");
                        let mut inner = self.lock();
                        let idx = id.channel.index();
                        if inner.contexts[idx].owns(id) {
                            inner.pending[idx] = false;
                        }
                    }
                }
                HostOp::ClearStall(ch) => {
                    if let Err(e) = self.host.clear_stall(ch) {
                        warn!(channel = %ch, error = %e, "clear stall failed");
                    }
                }
                HostOp::Stop(ch) => self.host.stop_transfer(ch),
                HostOp::Interval(ch, interval) => {
                    if let Err(e) = self.host.set_interval(ch, interval) {
                        warn!(channel = %ch, error = %e, "failed to set polling interval");
                    }
                }
            }
        }
    }

    /// Run `f` on the open sink. `f` must not call back into the driver.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.lock().sink.as_mut().map(f)
    }

    pub fn is_open(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Snapshot of a channel's context.
    pub fn context(&self, channel: Channel) -> TransferContext {
        self.lock().contexts[channel.index()]
    }

    pub fn error_count(&self, channel: Channel) -> u32 {
        self.context(channel).errors
    }

    pub fn mode_state(&self) -> ModeState {
        self.lock().mode.clone()
    }

    /// Read the device's mode report.
    pub fn query_mode(&self) -> Result<[u8; MODE_LEN]> {
        let mut inner = self.lock();
        mode::query_mode(&self.host, &mut inner.mode)
    }

    /// Set the device mode byte directly.
    pub fn set_mode(&self, mode: u8) -> Result<()> {
        let mut inner = self.lock();
        mode::set_mode(&self.host, &mut inner.mode, mode)
    }
}
