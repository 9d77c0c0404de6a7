use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Mode, Result, StreamerError};

/// Linear transform applied to a raw feature value before it is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default)]
    pub offset: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp: Option<[f32; 2]>,
}

fn unit_scale() -> f32 {
    1.0
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            clamp: None,
        }
    }
}

impl Transform {
    pub fn new(scale: f32, offset: f32) -> Self {
        Self {
            scale,
            offset,
            clamp: None,
        }
    }

    pub fn with_clamp(mut self, min: f32, max: f32) -> Self {
        self.clamp = Some([min, max]);
        self
    }

    /// Applies `weight * scale * raw + offset`, then the clamp range if any.
    pub fn apply_weighted(&self, raw: f32, weight: f32) -> f32 {
        let value = weight * self.scale * raw + self.offset;
        match self.clamp {
            Some([min, max]) => value.clamp(min, max),
            None => value,
        }
    }

    pub fn apply(&self, raw: f32) -> f32 {
        self.apply_weighted(raw, 1.0)
    }

    fn validate(&self, source: &str) -> Result<()> {
        if !self.scale.is_finite() || !self.offset.is_finite() {
            return Err(StreamerError::config(format!(
                "channel `{source}`: scale and offset must be finite numbers"
            )));
        }
        if let Some([min, max]) = self.clamp {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(StreamerError::config(format!(
                    "channel `{source}`: clamp range [{min}, {max}] is invalid"
                )));
            }
        }
        Ok(())
    }
}

/// One entry of a weighted fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutTarget {
    pub address: String,
    pub weight: f32,
}

impl FanOutTarget {
    pub fn new(address: impl Into<String>, weight: f32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

/// Where a channel's value goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Single(String),
    /// Never empty once validated.
    FanOut(Vec<FanOutTarget>),
}

/// Validated mapping from one source feature to its OSC target(s).
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub source: String,
    pub target: Target,
    pub transform: Transform,
    /// Raw value a left turn drives this channel to when no recorded motion
    /// exists for it.
    pub amp_left: Option<f32>,
    pub amp_right: Option<f32>,
}

impl Channel {
    /// Turn amplitude for `mode`, if the channel defines one.
    pub fn amplitude(&self, mode: Mode) -> Option<f32> {
        match mode {
            Mode::TurnLeft => self.amp_left,
            Mode::TurnRight => self.amp_right,
            _ => None,
        }
    }

    /// Every target address paired with a literal 0.0, transform skipped.
    pub fn zeroed(&self) -> Vec<(&str, f32)> {
        match &self.target {
            Target::Single(address) => vec![(address.as_str(), 0.0)],
            Target::FanOut(entries) => entries
                .iter()
                .map(|entry| (entry.address.as_str(), 0.0))
                .collect(),
        }
    }

    /// Emitted `(address, value)` pairs for a raw feature value.
    pub fn resolve(&self, raw: f32) -> Vec<(&str, f32)> {
        match &self.target {
            Target::Single(address) => vec![(address.as_str(), self.transform.apply(raw))],
            Target::FanOut(entries) => entries
                .iter()
                .map(|entry| {
                    (
                        entry.address.as_str(),
                        self.transform.apply_weighted(raw, entry.weight),
                    )
                })
                .collect(),
        }
    }

    /// Number of messages this channel produces per frame.
    pub fn message_count(&self) -> usize {
        match &self.target {
            Target::Single(_) => 1,
            Target::FanOut(entries) => entries.len(),
        }
    }
}

/// Channel as it appears on disk, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub source_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osc_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fanout: Option<Vec<FanOutTarget>>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp_left: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp_right: Option<f32>,
}

impl ChannelSpec {
    pub fn single(source: impl Into<String>, address: impl Into<String>, transform: Transform) -> Self {
        Self {
            source_column: source.into(),
            osc_address: Some(address.into()),
            fanout: None,
            transform,
            amp_left: None,
            amp_right: None,
        }
    }

    pub fn fan_out(source: impl Into<String>, fanout: Vec<FanOutTarget>, transform: Transform) -> Self {
        Self {
            source_column: source.into(),
            osc_address: None,
            fanout: Some(fanout),
            transform,
            amp_left: None,
            amp_right: None,
        }
    }

    pub fn with_amplitudes(mut self, left: f32, right: f32) -> Self {
        self.amp_left = Some(left);
        self.amp_right = Some(right);
        self
    }

    fn into_channel(self, index: usize) -> Result<Channel> {
        let source = self.source_column;
        self.transform.validate(&source)?;
        if [self.amp_left, self.amp_right]
            .iter()
            .flatten()
            .any(|amp| !amp.is_finite())
        {
            return Err(StreamerError::config(format!(
                "channel {index} (`{source}`): turn amplitudes must be finite"
            )));
        }

        let target = match (self.osc_address, self.fanout) {
            (Some(_), Some(_)) => {
                return Err(StreamerError::config(format!(
                    "channel {index} (`{source}`) has both an osc_address and a fanout list"
                )))
            }
            (None, None) => {
                return Err(StreamerError::config(format!(
                    "channel {index} (`{source}`) has neither an osc_address nor a fanout list"
                )))
            }
            (Some(address), None) => Target::Single(address),
            (None, Some(entries)) => {
                if entries.is_empty() {
                    return Err(StreamerError::config(format!(
                        "channel {index} (`{source}`) has an empty fanout list"
                    )));
                }
                if let Some(entry) = entries.iter().find(|entry| !entry.weight.is_finite()) {
                    return Err(StreamerError::config(format!(
                        "channel {index} (`{source}`): weight for {} is not finite",
                        entry.address
                    )));
                }
                Target::FanOut(entries)
            }
        };

        Ok(Channel {
            source,
            target,
            transform: self.transform,
            amp_left: self.amp_left,
            amp_right: self.amp_right,
        })
    }
}

impl From<&Channel> for ChannelSpec {
    fn from(channel: &Channel) -> Self {
        let (osc_address, fanout) = match &channel.target {
            Target::Single(address) => (Some(address.clone()), None),
            Target::FanOut(entries) => (None, Some(entries.clone())),
        };
        Self {
            source_column: channel.source.clone(),
            osc_address,
            fanout,
            transform: channel.transform,
            amp_left: channel.amp_left,
            amp_right: channel.amp_right,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelFile {
    channels: Vec<ChannelSpec>,
}

/// Ordered, validated channel table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChannelConfig {
    channels: Vec<Channel>,
}

impl ChannelConfig {
    /// Parses a `{"channels": [...]}` document.
    pub fn load(data: &str) -> Result<Self> {
        let file: ChannelFile = serde_json::from_str(data)
            .map_err(|err| StreamerError::config(format!("channel table: {err}")))?;
        Self::from_specs(file.channels)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config = Self::load(&data)?;
        tracing::info!(
            path = %path.display(),
            channels = config.len(),
            messages = config.message_count(),
            "loaded channel table"
        );
        Ok(config)
    }

    pub fn from_specs(specs: Vec<ChannelSpec>) -> Result<Self> {
        let channels = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| spec.into_channel(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { channels })
    }

    /// Pure transform of one raw value through one channel.
    pub fn resolve(channel: &Channel, raw: f32) -> Vec<(&str, f32)> {
        channel.resolve(raw)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Messages emitted per frame across all channels, control messages excluded.
    pub fn message_count(&self) -> usize {
        self.channels.iter().map(Channel::message_count).sum()
    }

    /// Unique source columns in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for channel in &self.channels {
            if !sources.contains(&channel.source) {
                sources.push(channel.source.clone());
            }
        }
        sources
    }

    pub fn to_json(&self) -> Result<String> {
        let file = ChannelFile {
            channels: self.channels.iter().map(ChannelSpec::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-5
    }

    #[test]
    fn single_channel_applies_scale_and_offset() {
        let config = ChannelConfig::load(
            r#"{"channels": [{
                "source_column": "x",
                "osc_address": "/bone/hand_r/pitch",
                "transform": {"scale": 2.0, "offset": 1.0}
            }]}"#,
        )
        .unwrap();

        let pairs = ChannelConfig::resolve(&config.channels()[0], 3.0);
        assert_eq!(pairs, vec![("/bone/hand_r/pitch", 7.0)]);
    }

    #[test]
    fn fan_out_distributes_by_weight() {
        let weights = [0.10, 0.20, 0.30, 0.25, 0.15];
        let fanout = weights
            .iter()
            .enumerate()
            .map(|(i, w)| FanOutTarget::new(format!("/bone/spine_0{}/pitch", i + 1), *w))
            .collect();
        let config = ChannelConfig::from_specs(vec![ChannelSpec::fan_out(
            "Thorax_extension",
            fanout,
            Transform::new(1.0, 0.0),
        )])
        .unwrap();

        let pairs = config.channels()[0].resolve(10.0);
        let values: Vec<f32> = pairs.iter().map(|(_, v)| *v).collect();
        let expected = [1.0, 2.0, 3.0, 2.5, 1.5];
        assert_eq!(values.len(), expected.len());
        for (got, want) in values.iter().zip(expected) {
            assert!(close(*got, want), "{got} != {want}");
        }
        assert_eq!(pairs[2].0, "/bone/spine_03/pitch");
    }

    #[test]
    fn fan_out_does_not_renormalize_weights() {
        let config = ChannelConfig::from_specs(vec![ChannelSpec::fan_out(
            "x",
            vec![FanOutTarget::new("/a", 0.5), FanOutTarget::new("/b", 0.9)],
            Transform::new(3.0, 0.0),
        )])
        .unwrap();

        let sum: f32 = config.channels()[0].resolve(2.0).iter().map(|(_, v)| v).sum();
        assert!(close(sum, 3.0 * 2.0 * 1.4));
    }

    #[test]
    fn clamp_limits_every_emitted_value() {
        let channel = ChannelSpec::fan_out(
            "x",
            vec![FanOutTarget::new("/a", 1.0), FanOutTarget::new("/b", 0.1)],
            Transform::new(1.0, 0.0).with_clamp(-5.0, 5.0),
        )
        .into_channel(0)
        .unwrap();

        assert_eq!(channel.resolve(20.0), vec![("/a", 5.0), ("/b", 2.0)]);
    }

    #[test]
    fn missing_transform_is_identity() {
        let config = ChannelConfig::load(
            r#"{"channels": [{"source_column": "x", "osc_address": "/x"}]}"#,
        )
        .unwrap();
        assert_eq!(config.channels()[0].resolve(4.5), vec![("/x", 4.5)]);
    }

    #[test]
    fn rejects_channel_without_target() {
        let err = ChannelConfig::load(r#"{"channels": [{"source_column": "x"}]}"#).unwrap_err();
        assert!(matches!(err, StreamerError::Config(_)));
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn rejects_channel_with_both_targets() {
        let err = ChannelConfig::load(
            r#"{"channels": [{
                "source_column": "x",
                "osc_address": "/x",
                "fanout": [{"address": "/y", "weight": 1.0}]
            }]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn rejects_empty_fan_out() {
        let err = ChannelConfig::from_specs(vec![ChannelSpec::fan_out(
            "x",
            Vec::new(),
            Transform::default(),
        )])
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_non_finite_transform() {
        let err = ChannelConfig::from_specs(vec![ChannelSpec::single(
            "x",
            "/x",
            Transform::new(f32::NAN, 0.0),
        )])
        .unwrap_err();
        assert!(matches!(err, StreamerError::Config(_)));

        let err = ChannelConfig::from_specs(vec![ChannelSpec::single(
            "x",
            "/x",
            Transform::new(1.0, f32::INFINITY),
        )])
        .unwrap_err();
        assert!(matches!(err, StreamerError::Config(_)));
    }

    #[test]
    fn rejects_non_numeric_scale() {
        let err = ChannelConfig::load(
            r#"{"channels": [{"source_column": "x", "osc_address": "/x",
                "transform": {"scale": "big", "offset": 0.0}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StreamerError::Config(_)));
    }

    #[test]
    fn turn_amplitudes_are_optional_per_channel() {
        let config = ChannelConfig::load(
            r#"{"channels": [
                {"source_column": "x", "osc_address": "/x", "amp_left": 12.0, "amp_right": -8.0},
                {"source_column": "y", "osc_address": "/y"}
            ]}"#,
        )
        .unwrap();

        let with = &config.channels()[0];
        assert_eq!(with.amplitude(Mode::TurnLeft), Some(12.0));
        assert_eq!(with.amplitude(Mode::TurnRight), Some(-8.0));
        assert_eq!(with.amplitude(Mode::Sitting), None);
        assert_eq!(config.channels()[1].amplitude(Mode::TurnLeft), None);

        let err = ChannelConfig::from_specs(vec![
            ChannelSpec::single("x", "/x", Transform::default()).with_amplitudes(f32::NAN, 1.0)
        ])
        .unwrap_err();
        assert!(err.to_string().contains("amplitudes"));
    }

    #[test]
    fn zeroed_skips_the_transform() {
        let channel = ChannelSpec::fan_out(
            "x",
            vec![FanOutTarget::new("/a", 0.5), FanOutTarget::new("/b", 0.5)],
            Transform::new(2.0, 5.0),
        )
        .into_channel(0)
        .unwrap();
        assert_eq!(channel.zeroed(), vec![("/a", 0.0), ("/b", 0.0)]);
    }

    #[test]
    fn round_trips_through_json() {
        let config = ChannelConfig::from_specs(vec![
            ChannelSpec::single("a", "/a", Transform::new(2.0, 1.0).with_clamp(-1.0, 1.0)),
            ChannelSpec::fan_out("b", vec![FanOutTarget::new("/b1", 0.5)], Transform::default())
                .with_amplitudes(4.0, -4.0),
        ])
        .unwrap();

        let reloaded = ChannelConfig::load(&config.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.sources(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reloaded.message_count(), 2);
    }
}
