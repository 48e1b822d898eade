use crate::processing::pulsed_trigger::PulseTriggerConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CORDIC_WIDTH: u32 = 21;
pub const DEFAULT_MULTIPLIER_LATENCY: usize = 5;
pub const DEFAULT_CHANNEL_STRIDE: usize = 2;
pub const DEFAULT_SHIFT_BITS: u32 = 4;

/// Widest sample word the 64-bit datapath can carry with guard bits attached.
pub const MAX_CORDIC_WIDTH: u32 = 32;

/// Runtime-tunable settings written by the host and sampled by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// One factor per non-reference channel (index 0 belongs to channel 1).
    pub multipliers: Vec<u8>,
    pub filter_shift: u32,
    pub pulse_trigger: PulseTriggerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            multipliers: vec![1; 3],
            filter_shift: 0,
            pulse_trigger: PulseTriggerConfig::default(),
        }
    }
}

/// Structural configuration fixed when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub channels: usize,
    /// Magnitude width W; phases carry W + 1 signed bits.
    pub cordic_width: u32,
    /// Pipeline depth M of the shared multiplier.
    pub multiplier_latency: usize,
    /// Ticks between consecutive channels in the serialized converter stream.
    pub channel_stride: usize,
    /// Width of the filter shift control; the filters carry 2^bits - 1 guard bits.
    pub shift_bits: u32,
    pub settings: Settings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            cordic_width: DEFAULT_CORDIC_WIDTH,
            multiplier_latency: DEFAULT_MULTIPLIER_LATENCY,
            channel_stride: DEFAULT_CHANNEL_STRIDE,
            shift_bits: DEFAULT_SHIFT_BITS,
            settings: Settings::default(),
        }
    }
}

impl PipelineConfig {
    /// Config for `channels` inputs with every other field at its default.
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            settings: Settings {
                multipliers: vec![1; channels.saturating_sub(1)],
                ..Settings::default()
            },
            ..Self::default()
        }
    }

    /// Latency L of the upstream rectangular-to-polar converter.
    pub fn converter_latency(&self) -> usize {
        self.cordic_width as usize + 2
    }

    pub fn phase_width(&self) -> u32 {
        self.cordic_width + 1
    }

    pub fn guard_bits(&self) -> u32 {
        (1 << self.shift_bits) - 1
    }

    /// Structural checks only; register ranges are enforced by the host bank.
    pub fn validate(&self) -> VvmResult<()> {
        if self.channels == 0 {
            return Err(VvmError::InvalidConfig(
                "at least the reference channel is required".into(),
            ));
        }
        if self.cordic_width == 0 || self.cordic_width > MAX_CORDIC_WIDTH {
            return Err(VvmError::InvalidConfig(format!(
                "cordic width {} outside 1..={}",
                self.cordic_width, MAX_CORDIC_WIDTH
            )));
        }
        if self.multiplier_latency == 0 {
            return Err(VvmError::InvalidConfig(
                "multiplier latency must be at least one tick".into(),
            ));
        }
        if self.shift_bits == 0 || self.shift_bits > 4 {
            return Err(VvmError::InvalidConfig(format!(
                "shift control width {} outside 1..=4",
                self.shift_bits
            )));
        }
        if self.settings.multipliers.len() != self.channels - 1 {
            return Err(VvmError::InvalidConfig(format!(
                "{} multiplier factors for {} channels",
                self.settings.multipliers.len(),
                self.channels
            )));
        }
        Ok(())
    }
}

/// Common error type for configuration-time misuse of the core.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VvmError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("schedule conflict at tap {offset}: {detail}")]
    ScheduleConflict { offset: usize, detail: String },
    #[error("{name} = {value} outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("channel {channel} not addressable, expected {min}..={max}")]
    ChannelIndex {
        channel: usize,
        min: usize,
        max: usize,
    },
    #[error("handoff closed: {0}")]
    HandoffClosed(String),
}

pub type VvmResult<T> = Result<T, VvmError>;

/// Synchronous block advanced once per tick of its domain.
///
/// `tick` reads the state committed by the previous tick, computes the next
/// state from it and the input, and commits everything at once before
/// returning. Nothing written during a tick is visible until the next one.
pub trait Clocked<I> {
    type Output;

    fn tick(&mut self, input: I) -> Self::Output;

    /// Returns every register to its power-on value.
    fn reset(&mut self);
}
