//! The per-frame streaming engine. [`FrameStreamer`] is a synchronous state
//! machine driven by explicit timestamps; [`StreamerHandle`] runs one on a
//! worker thread at a fixed rate.

mod mock;
mod runner;

use std::time::Duration;

pub use mock::{MOCK_LEFT_ADDRESS, MOCK_RIGHT_ADDRESS};
pub use runner::StreamerHandle;

use crate::{
    timeline::{Ramp, RampPhase},
    Channel, ChannelConfig, Mode, MotionLibrary, OscArg, OscSender, Result, StreamSettings,
    StreamerError,
};

/// Control address carrying the tick index.
pub const FRAME_ADDRESS: &str = "/mh/frame";
/// Control address carrying the current mode name.
pub const MODE_ADDRESS: &str = "/mh/mode";
/// Engine-side pose command, sent as `[name, blend seconds]`.
pub const POSE_COMMAND_ADDRESS: &str = "/cmd/pose";

const SITTING_BLEND_SECS: f32 = 0.35;

const LOG_EVERY_FRAMES: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    Idle,
    Streaming,
    Transitioning,
    Holding,
    Stopped,
}

impl StreamerState {
    pub fn is_running(&self) -> bool {
        !matches!(self, StreamerState::Idle | StreamerState::Stopped)
    }
}

/// Timing of mode-change ramps, and whether to stream synthetic signals
/// instead of the channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamerOptions {
    pub ramp_duration: Duration,
    pub hold: Duration,
    pub mock: bool,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            ramp_duration: Duration::from_millis(1500),
            hold: Duration::ZERO,
            mock: false,
        }
    }
}

impl From<&StreamSettings> for StreamerOptions {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            ramp_duration: settings.ramp_duration(),
            hold: settings.hold(),
            mock: settings.mock,
        }
    }
}

/// Running totals over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub frame: u64,
    pub sent: usize,
    pub failed: usize,
}

/// Resolves value vectors through the channel table and emits them.
#[derive(Debug)]
pub struct FrameStreamer<S> {
    channels: ChannelConfig,
    bindings: Vec<Option<usize>>,
    library: MotionLibrary,
    sender: S,
    options: StreamerOptions,
    state: StreamerState,
    mode: Mode,
    ramp: Option<Ramp>,
    cursor: usize,
    frame_index: u64,
    current: Vec<f32>,
    stats: StreamStats,
}

impl<S: OscSender> FrameStreamer<S> {
    pub fn new(
        channels: ChannelConfig,
        library: MotionLibrary,
        sender: S,
        options: StreamerOptions,
    ) -> Self {
        let bindings: Vec<Option<usize>> = channels
            .channels()
            .iter()
            .map(|channel| library.feature_index(&channel.source))
            .collect();
        for (channel, binding) in channels.channels().iter().zip(&bindings) {
            if binding.is_none() {
                tracing::warn!(source = %channel.source, "feature not in motion library, streaming zeros");
            }
        }

        let current = vec![0.0; library.width()];
        Self {
            channels,
            bindings,
            library,
            sender,
            options,
            state: StreamerState::Idle,
            mode: Mode::Baseline,
            ramp: None,
            cursor: 0,
            frame_index: 0,
            current,
            stats: StreamStats::default(),
        }
    }

    pub fn state(&self) -> StreamerState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Feature vector emitted by the most recent tick.
    pub fn current_values(&self) -> &[f32] {
        &self.current
    }

    pub fn options(&self) -> StreamerOptions {
        self.options
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Enters streaming at the baseline. Valid from `Idle` or `Stopped`.
    pub fn start(&mut self, now: Duration) -> Result<()> {
        if self.state.is_running() {
            return Err(StreamerError::state("streamer is already running"));
        }
        self.state = StreamerState::Streaming;
        self.mode = Mode::Baseline;
        self.ramp = None;
        self.cursor = 0;
        self.frame_index = 0;
        self.current = self.library.target_for(Mode::Baseline);
        tracing::info!(
            at = ?now,
            channels = self.channels.len(),
            messages = self.channels.message_count(),
            mock = self.options.mock,
            "streaming started"
        );
        Ok(())
    }

    /// Starts an eased ramp from the instantaneous output towards `mode`.
    pub fn request_mode(&mut self, mode: Mode, now: Duration) -> Result<()> {
        if !self.state.is_running() {
            tracing::warn!(%mode, state = ?self.state, "mode change rejected");
            return Err(StreamerError::state(format!(
                "cannot switch to {mode} while {:?}",
                self.state
            )));
        }

        let start = match &self.ramp {
            Some(ramp) => ramp.sample(now),
            None => self.current.clone(),
        };
        let end = self.target_for(mode);
        tracing::info!(from = %self.mode, to = %mode, duration = ?self.options.ramp_duration, "mode change");
        if mode == Mode::Sitting {
            self.send_pose_command("sitting");
        }

        self.ramp = Some(Ramp::new(
            mode,
            start,
            end,
            now,
            self.options.ramp_duration,
            self.options.hold,
        ));
        self.mode = mode;
        self.state = StreamerState::Transitioning;
        Ok(())
    }

    /// Computes the current vector and emits every channel plus the two
    /// control messages. Send failures are counted, never propagated.
    pub fn tick(&mut self, now: Duration) -> Result<TickReport> {
        if !self.state.is_running() {
            return Err(StreamerError::state(format!(
                "cannot tick while {:?}",
                self.state
            )));
        }

        let values = self.advance(now);
        let (mut sent, mut failed) = if self.options.mock {
            self.emit_mock()
        } else {
            emit_frame(self.channels.channels(), &self.bindings, &mut self.sender, &values)
        };

        let frame = OscArg::Int((self.frame_index & i32::MAX as u64) as i32);
        let mode = OscArg::Str(if self.options.mock {
            mock::mock_mode_name(self.mode)
        } else {
            self.mode.as_str().to_string()
        });
        for (address, arg) in [(FRAME_ADDRESS, frame), (MODE_ADDRESS, mode)] {
            match self.sender.send(address, arg) {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(%address, %err, "control message dropped");
                }
            }
        }

        if self.frame_index % LOG_EVERY_FRAMES == 0 {
            tracing::debug!(
                frame = self.frame_index,
                mode = %self.mode,
                state = ?self.state,
                sample = ?&values[..values.len().min(5)],
                "tick"
            );
        }

        let report = TickReport {
            frame: self.frame_index,
            sent,
            failed,
        };
        self.current = values;
        self.frame_index += 1;
        self.stats.frames += 1;
        self.stats.sent += sent as u64;
        self.stats.failed += failed as u64;
        Ok(report)
    }

    /// Emits 0.0 on every target address and stops. Calling it again is a
    /// no-op.
    pub fn stop(&mut self) -> TickReport {
        if self.state == StreamerState::Stopped {
            return TickReport::default();
        }

        let mut outcome = (0, 0);
        for channel in self.channels.channels() {
            send_pairs(&mut self.sender, channel.zeroed(), &mut outcome);
        }
        if self.options.mock {
            let pairs = vec![(MOCK_LEFT_ADDRESS, 0.0), (MOCK_RIGHT_ADDRESS, 0.0)];
            send_pairs(&mut self.sender, pairs, &mut outcome);
        }
        let (sent, failed) = outcome;
        self.stats.sent += sent as u64;
        self.stats.failed += failed as u64;

        self.state = StreamerState::Stopped;
        self.mode = Mode::Stopped;
        self.ramp = None;
        self.current = vec![0.0; self.library.width()];
        tracing::info!(
            frames = self.stats.frames,
            sent = self.stats.sent,
            failed = self.stats.failed,
            "streaming stopped"
        );
        TickReport {
            frame: self.frame_index,
            sent,
            failed,
        }
    }

    fn advance(&mut self, now: Duration) -> Vec<f32> {
        if let Some(ramp) = &self.ramp {
            match ramp.phase(now) {
                RampPhase::Transitioning => {
                    self.state = StreamerState::Transitioning;
                    return ramp.sample(now);
                }
                RampPhase::Holding => {
                    self.state = StreamerState::Holding;
                    return ramp.end.clone();
                }
                RampPhase::Settled => {
                    tracing::debug!(mode = %ramp.mode, "ramp settled");
                    self.mode = ramp.mode;
                    self.ramp = None;
                    self.state = StreamerState::Streaming;
                    self.cursor = 0;
                }
            }
        }

        match self.library.source(self.mode) {
            Some(source) => {
                let values = source.frame(self.cursor).to_vec();
                self.cursor += 1;
                values
            }
            None => self.target_for(self.mode),
        }
    }

    /// Library target for `mode`. When the library has nothing recorded for
    /// a turn, bound channels with a turn amplitude take that amplitude as
    /// their raw value.
    fn target_for(&self, mode: Mode) -> Vec<f32> {
        let mut target = self.library.target_for(mode);
        if self.library.source(mode).is_some() {
            return target;
        }
        for (channel, binding) in self.channels.channels().iter().zip(&self.bindings) {
            if let (Some(index), Some(amplitude)) = (binding, channel.amplitude(mode)) {
                if let Some(slot) = target.get_mut(*index) {
                    *slot = amplitude;
                }
            }
        }
        target
    }

    fn emit_mock(&mut self) -> (usize, usize) {
        let mut outcome = (0, 0);
        let pair = mock::mock_signal(self.mode, self.frame_index);
        send_pairs(&mut self.sender, vec![pair], &mut outcome);
        outcome
    }

    fn send_pose_command(&mut self, pose: &str) {
        let args = vec![OscArg::Str(pose.to_string()), OscArg::Float(SITTING_BLEND_SECS)];
        match self.sender.send_message(POSE_COMMAND_ADDRESS, args) {
            Ok(()) => self.stats.sent += 1,
            Err(err) => {
                self.stats.failed += 1;
                tracing::warn!(address = POSE_COMMAND_ADDRESS, %err, "pose command dropped");
            }
        }
    }
}

/// Sends every channel's resolved pairs. A channel whose source is missing
/// from the library sends 0.0 on each of its addresses, untransformed.
fn emit_frame<S: OscSender>(
    channels: &[Channel],
    bindings: &[Option<usize>],
    sender: &mut S,
    values: &[f32],
) -> (usize, usize) {
    let mut outcome = (0, 0);
    for (channel, binding) in channels.iter().zip(bindings) {
        let pairs = match binding.and_then(|index| values.get(index)) {
            Some(raw) => channel.resolve(*raw),
            None => channel.zeroed(),
        };
        send_pairs(sender, pairs, &mut outcome);
    }
    outcome
}

/// Sends each pair, tallying `(sent, failed)`. A failure never stops the rest.
fn send_pairs<S: OscSender>(
    sender: &mut S,
    pairs: Vec<(&str, f32)>,
    outcome: &mut (usize, usize),
) {
    for (address, value) in pairs {
        match sender.send(address, OscArg::Float(value)) {
            Ok(()) => outcome.0 += 1,
            Err(err) => {
                outcome.1 += 1;
                tracing::warn!(%address, %err, "send failed");
            }
        }
    }
}
