use crate::error::ConfigError;
use crate::hand::DEFAULT_PINCH_DISTANCE;
use crate::input::DEFAULT_CONTROLLER_PINCH_THRESHOLD;
use crate::reconstruction::{Calibration, DEFAULT_SAFETY_OFFSET};
use crate::session::DEFAULT_REMOTE_TIMEOUT_TICKS;
use crate::transport::{PeerId, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Peer configuration, read from a JSON file. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HandSyncConfig {
    pub peer_id: PeerId,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Topic local tracking sources publish `HandMessage`s on
    pub tracking_topic: String,
    /// Topic controller states (`ControllerMessage`) arrive on
    pub controller_topic: String,
    /// Frames go out on `{frame_topic_prefix}/{peer_id}/{left|right}`
    pub frame_topic_prefix: String,
    pub tick_hz: f32,
    pub retry: RetryConfig,
    /// Frames kept per remote hand between ticks
    pub max_buffered_frames: usize,
    /// Ticks without frames before a remote hand is removed
    pub remote_timeout_ticks: u32,
    pub calibration: Calibration,
    pub safety_offset: f32,
    pub pinch_distance: f32,
    pub controller_pinch_threshold: f32,
}

/// Receive retry bound. A fixed `max_retries` wins over the queue depth policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<usize>,
    pub cap: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            cap: 8,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        match self.max_retries {
            Some(retries) => RetryPolicy::Fixed(retries),
            None => RetryPolicy::QueueDepth { cap: self.cap },
        }
    }
}

impl Default for HandSyncConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId("peer".to_owned()),
            mqtt_host: "mqtt.local".to_owned(),
            mqtt_port: 1883,
            tracking_topic: "tracking/hand".to_owned(),
            controller_topic: "tracking/controller".to_owned(),
            frame_topic_prefix: "hands".to_owned(),
            tick_hz: 50.0,
            retry: RetryConfig::default(),
            max_buffered_frames: 4,
            remote_timeout_ticks: DEFAULT_REMOTE_TIMEOUT_TICKS,
            calibration: Calibration::default(),
            safety_offset: DEFAULT_SAFETY_OFFSET,
            pinch_distance: DEFAULT_PINCH_DISTANCE,
            controller_pinch_threshold: DEFAULT_CONTROLLER_PINCH_THRESHOLD,
        }
    }
}

impl HandSyncConfig {
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let config: HandSyncConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz > 0.0) || !self.tick_hz.is_finite() {
            return Err(ConfigError::InvalidTickRate(self.tick_hz));
        }
        Ok(())
    }
}
