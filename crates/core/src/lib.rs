//! Core library for the Pose Streamer application.
//!
//! A channel table maps features of cached motion data onto OSC addresses of
//! a character rig. The [`FrameStreamer`] resolves one value vector per tick
//! (an eased ramp between modes, or the next frame of a recorded clip), runs
//! it through every channel and emits the results through an injected
//! [`OscSender`].

pub mod config;
pub mod error;
pub mod mapping;
pub mod motion;
pub mod osc;
pub mod rig;
pub mod streamer;
pub mod timeline;

pub use config::StreamSettings;
pub use error::{Result, StreamerError};
pub use mapping::{Channel, ChannelConfig, ChannelSpec, FanOutTarget, Target, Transform};
pub use motion::{FrameSequence, FrameSource, Mode, MotionLibrary, Normalization, SequenceEnd};
pub use osc::{LogSender, MemorySender, OscArg, OscMessage, OscSender, UdpOscSender};
pub use streamer::{
    FrameStreamer, StreamStats, StreamerHandle, StreamerOptions, StreamerState, TickReport,
    FRAME_ADDRESS, MOCK_LEFT_ADDRESS, MOCK_RIGHT_ADDRESS, MODE_ADDRESS, POSE_COMMAND_ADDRESS,
};
pub use timeline::{ease_in_out_cubic, Ramp, RampPhase, SessionClock};
