//! Cached motion data: the discrete modes a rig can be driven into and the
//! value vectors (recorded clips or static poses) behind each of them.

use std::{collections::HashMap, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Result, StreamerError};

/// Discrete motion state requested by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Baseline,
    TurnLeft,
    TurnRight,
    Sitting,
    Stopped,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Baseline,
        Mode::TurnLeft,
        Mode::TurnRight,
        Mode::Sitting,
        Mode::Stopped,
    ];

    /// Name sent on the mode control address.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "BASELINE",
            Mode::TurnLeft => "TURN_LEFT",
            Mode::TurnRight => "TURN_RIGHT",
            Mode::Sitting => "SITTING",
            Mode::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = StreamerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalised = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalised.as_str() {
            "BASELINE" | "BASE" => Ok(Mode::Baseline),
            "TURN_LEFT" | "LEFT" => Ok(Mode::TurnLeft),
            "TURN_RIGHT" | "RIGHT" => Ok(Mode::TurnRight),
            "SITTING" | "SIT" => Ok(Mode::Sitting),
            "STOPPED" | "STOP" => Ok(Mode::Stopped),
            _ => Err(StreamerError::UnknownMode(s.trim().to_string())),
        }
    }
}

/// Per-feature statistics the cached arrays were normalised with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalization {
    /// `x * std + mean`, feature by feature.
    pub fn denormalize(&self, frame: &[f32]) -> Vec<f32> {
        frame
            .iter()
            .zip(self.std.iter().zip(&self.mean))
            .map(|(value, (std, mean))| value * std + mean)
            .collect()
    }

    fn validate(&self, width: usize) -> Result<()> {
        if self.mean.len() != width || self.std.len() != width {
            return Err(StreamerError::config(format!(
                "normalization has {} means and {} stds for {width} features",
                self.mean.len(),
                self.std.len()
            )));
        }
        Ok(())
    }
}

/// What a sequence does once its last frame has been played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceEnd {
    #[default]
    Wrap,
    Hold,
}

/// Finite, ordered clip replayed by frame index.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    frames: Vec<Vec<f32>>,
    end: SequenceEnd,
}

impl FrameSequence {
    pub fn new(frames: Vec<Vec<f32>>, end: SequenceEnd) -> Result<Self> {
        if frames.is_empty() {
            return Err(StreamerError::config("frame sequence has no frames"));
        }
        Ok(Self { frames, end })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn end(&self) -> SequenceEnd {
        self.end
    }

    /// Frame at playback position `index`, wrapping or holding past the end.
    pub fn frame(&self, index: usize) -> &[f32] {
        let last = self.frames.len() - 1;
        let index = match self.end {
            SequenceEnd::Wrap => index % self.frames.len(),
            SequenceEnd::Hold => index.min(last),
        };
        &self.frames[index]
    }

    /// Per-column mean over all frames.
    pub fn mean(&self) -> Vec<f32> {
        let width = self.frames[0].len();
        let mut sums = vec![0.0_f64; width];
        for frame in &self.frames {
            for (sum, value) in sums.iter_mut().zip(frame) {
                *sum += f64::from(*value);
            }
        }
        let count = self.frames.len() as f64;
        sums.into_iter().map(|sum| (sum / count) as f32).collect()
    }
}

/// Values behind one mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSource {
    Sequence(FrameSequence),
    Pose(Vec<f32>),
}

impl FrameSource {
    /// Vector a ramp into this source should land on.
    pub fn first(&self) -> &[f32] {
        match self {
            FrameSource::Sequence(sequence) => sequence.frame(0),
            FrameSource::Pose(pose) => pose,
        }
    }

    /// Vector at playback position `index`.
    pub fn frame(&self, index: usize) -> &[f32] {
        match self {
            FrameSource::Sequence(sequence) => sequence.frame(index),
            FrameSource::Pose(pose) => pose,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceEntry {
    Sequence {
        sequence: Vec<Vec<f32>>,
        #[serde(default)]
        end: SequenceEnd,
        #[serde(default)]
        normalized: bool,
    },
    Pose {
        pose: Vec<f32>,
        #[serde(default)]
        normalized: bool,
    },
    MeanOf {
        mean_of: Vec<Vec<f32>>,
        #[serde(default)]
        normalized: bool,
    },
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    feature_names: Vec<String>,
    #[serde(default)]
    normalization: Option<Normalization>,
    #[serde(default)]
    modes: HashMap<Mode, SourceEntry>,
}

/// Mode-indexed collection of frame sources sharing one feature layout. All
/// vectors are stored denormalised, in rig units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionLibrary {
    feature_names: Vec<String>,
    sources: HashMap<Mode, FrameSource>,
}

impl MotionLibrary {
    /// A library with a feature layout but no recorded motion.
    pub fn empty(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            sources: HashMap::new(),
        }
    }

    pub fn load(data: &str) -> Result<Self> {
        let file: LibraryFile = serde_json::from_str(data)
            .map_err(|err| StreamerError::config(format!("motion library: {err}")))?;
        let width = file.feature_names.len();
        if let Some(normalization) = &file.normalization {
            normalization.validate(width)?;
        }

        let mut library = Self::empty(file.feature_names);
        for (mode, entry) in file.modes {
            let source = build_source(mode, entry, width, file.normalization.as_ref())?;
            library.insert(mode, source)?;
        }
        Ok(library)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let library = Self::load(&data)?;
        tracing::info!(
            path = %path.display(),
            features = library.width(),
            modes = library.sources.len(),
            "loaded motion library"
        );
        Ok(library)
    }

    pub fn insert(&mut self, mode: Mode, source: FrameSource) -> Result<()> {
        let width = self.width();
        let mismatch = match &source {
            FrameSource::Sequence(sequence) => sequence.frames.iter().any(|f| f.len() != width),
            FrameSource::Pose(pose) => pose.len() != width,
        };
        if mismatch {
            return Err(StreamerError::config(format!(
                "{mode}: vectors must have {width} values"
            )));
        }
        self.sources.insert(mode, source);
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|feature| feature == name)
    }

    pub fn source(&self, mode: Mode) -> Option<&FrameSource> {
        self.sources.get(&mode)
    }

    /// End vector of a ramp into `mode`. Modes without recorded motion are
    /// synthesised: `Stopped` is all zeros, anything else falls back to the
    /// baseline and then to zeros.
    pub fn target_for(&self, mode: Mode) -> Vec<f32> {
        if let Some(source) = self.sources.get(&mode) {
            return source.first().to_vec();
        }
        let fallback = match mode {
            Mode::Stopped => None,
            _ => self.sources.get(&Mode::Baseline),
        };
        match fallback {
            Some(source) => source.first().to_vec(),
            None => vec![0.0; self.width()],
        }
    }
}

fn build_source(
    mode: Mode,
    entry: SourceEntry,
    width: usize,
    normalization: Option<&Normalization>,
) -> Result<FrameSource> {
    let restore = |frame: Vec<f32>, normalized: bool| -> Result<Vec<f32>> {
        if frame.len() != width {
            return Err(StreamerError::config(format!(
                "{mode}: frame has {} values, expected {width}",
                frame.len()
            )));
        }
        match (normalized, normalization) {
            (false, _) => Ok(frame),
            (true, Some(normalization)) => Ok(normalization.denormalize(&frame)),
            (true, None) => Err(StreamerError::config(format!(
                "{mode}: marked normalized but the library has no normalization"
            ))),
        }
    };

    match entry {
        SourceEntry::Sequence {
            sequence,
            end,
            normalized,
        } => {
            let frames = sequence
                .into_iter()
                .map(|frame| restore(frame, normalized))
                .collect::<Result<Vec<_>>>()?;
            Ok(FrameSource::Sequence(FrameSequence::new(frames, end)?))
        }
        SourceEntry::Pose { pose, normalized } => Ok(FrameSource::Pose(restore(pose, normalized)?)),
        SourceEntry::MeanOf {
            mean_of,
            normalized,
        } => {
            let frames = mean_of
                .into_iter()
                .map(|frame| restore(frame, normalized))
                .collect::<Result<Vec<_>>>()?;
            let clip = FrameSequence::new(frames, SequenceEnd::Hold)?;
            Ok(FrameSource::Pose(clip.mean()))
        }
    }
}
