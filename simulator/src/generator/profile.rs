use anyhow::ensure;
use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use vvmcore::math::wrap_signed;
use vvmcore::processing::TapLayout;
use vvmcore::{ConverterSample, PipelineConfig};

/// One input of the synthetic converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelProfile {
    /// Fraction of converter full scale.
    pub amplitude: f64,
    /// Degrees against `harmonic` times the reference phase.
    pub phase_offset: f64,
    /// Frequency relation to the reference; also the multiplier register value.
    pub harmonic: u8,
}

impl ChannelProfile {
    pub fn for_channel(channel: usize) -> Self {
        Self {
            amplitude: 0.8 * 0.5f64.powi(channel as i32),
            phase_offset: 30.0 * channel as f64,
            harmonic: 1 + (channel.saturating_sub(1) % 3) as u8,
        }
    }

    /// Phase difference the voltmeter should report for this channel.
    pub fn expected_phase(&self) -> f64 {
        let wrapped = (-self.phase_offset).rem_euclid(360.0);
        if wrapped >= 180.0 {
            wrapped - 360.0
        } else {
            wrapped
        }
    }
}

impl Default for ChannelProfile {
    fn default() -> Self {
        Self::for_channel(0)
    }
}

/// Configuration for the synthetic converter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub channels: Vec<ChannelProfile>,
    /// Reference phase advance per measurement cycle, in turns.
    pub frequency: f64,
    /// Peak additive noise on each quadrature component, fraction of full scale.
    pub noise: f64,
    /// Converter ticks between triggers.
    pub period: usize,
    pub seed: u64,
}

impl GeneratorConfig {
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels: (0..channels).map(ChannelProfile::for_channel).collect(),
            ..Self::default()
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            channels: (0..4).map(ChannelProfile::for_channel).collect(),
            frequency: 0.0123,
            noise: 0.0,
            period: 64,
            seed: 0,
        }
    }
}

/// Stand-in for the mixer and rectangular-to-polar converter.
///
/// Every cycle samples all channels at the same instant and serializes them
/// onto the stream at the tap ticks the phase processor latches, holding the
/// last value in between.
pub struct ConverterGenerator {
    config: GeneratorConfig,
    layout: TapLayout,
    cordic_width: u32,
    rng: StdRng,
    cycle: u64,
    held: ConverterSample,
}

impl ConverterGenerator {
    pub fn new(config: GeneratorConfig, pipeline: &PipelineConfig) -> anyhow::Result<Self> {
        let layout = TapLayout::from_config(pipeline);
        ensure!(
            config.channels.len() == pipeline.channels,
            "generator describes {} channels, pipeline has {}",
            config.channels.len(),
            pipeline.channels
        );
        ensure!(
            config.period >= layout.completion_tap(),
            "period {} is shorter than the dead time {}",
            config.period,
            layout.completion_tap()
        );
        ensure!(config.noise >= 0.0, "noise must not be negative");

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            layout,
            cordic_width: pipeline.cordic_width,
            cycle: 0,
            held: ConverterSample::default(),
        })
    }

    fn quantize(&self, value: Complex64) -> (u64, i64) {
        let scale = (1u64 << self.cordic_width) as f64;
        let (r, theta) = value.to_polar();
        let magnitude = (r * scale).round().clamp(0.0, scale - 1.0) as u64;
        let phase = wrap_signed((theta / PI * scale).round() as i64, self.cordic_width + 1);
        (magnitude, phase)
    }

    fn sample_channels(&mut self) -> Vec<(u64, i64)> {
        let reference = TAU * self.config.frequency * self.cycle as f64;
        let noise = self.config.noise;
        let phasors: Vec<Complex64> = self
            .config
            .channels
            .iter()
            .map(|profile| {
                let theta = reference * profile.harmonic as f64 + profile.phase_offset.to_radians();
                Complex64::from_polar(profile.amplitude, theta)
            })
            .collect();
        phasors
            .into_iter()
            .map(|phasor| {
                let jitter = if noise > 0.0 {
                    Complex64::new(
                        self.rng.gen_range(-noise..=noise),
                        self.rng.gen_range(-noise..=noise),
                    )
                } else {
                    Complex64::new(0.0, 0.0)
                };
                self.quantize(phasor + jitter)
            })
            .collect()
    }

    /// Stream for one measurement cycle, trigger on the first tick.
    pub fn cycle(&mut self) -> Vec<ConverterSample> {
        let values = self.sample_channels();
        let mut stream = Vec::with_capacity(self.config.period);
        for tick in 0..self.config.period {
            let slot = (0..values.len()).find(|&channel| self.layout.latch_tap(channel) == tick);
            if let Some(channel) = slot {
                let (magnitude, phase) = values[channel];
                self.held.magnitude = magnitude;
                self.held.phase = phase;
            }
            stream.push(ConverterSample {
                trigger: tick == 0,
                ..self.held
            });
        }
        self.cycle += 1;
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(config: GeneratorConfig) -> ConverterGenerator {
        ConverterGenerator::new(config, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn cycle_places_channels_on_their_taps() {
        let pipeline = PipelineConfig::default();
        let layout = TapLayout::from_config(&pipeline);
        let mut generator = generator(GeneratorConfig {
            frequency: 0.0,
            ..GeneratorConfig::default()
        });
        let stream = generator.cycle();

        assert_eq!(stream.len(), 64);
        assert_eq!(stream.iter().filter(|s| s.trigger).count(), 1);
        assert!(stream[0].trigger);
        let full_scale = (1u64 << pipeline.cordic_width) as f64;
        for channel in 0..4 {
            let sample = stream[layout.latch_tap(channel)];
            let profile = ChannelProfile::for_channel(channel);
            let expected = (profile.amplitude * full_scale).round() as u64;
            assert_eq!(sample.magnitude, expected);
        }
        // held until the next slot
        assert_eq!(stream[layout.latch_tap(0) + 1], stream[layout.latch_tap(0)]);
    }

    #[test]
    fn phase_quantization_spans_half_turn_per_full_scale() {
        let generator = generator(GeneratorConfig::default());
        let (_, phase) = generator.quantize(Complex64::from_polar(0.5, PI / 2.0));
        assert_eq!(phase, 1 << 20);
        let (magnitude, phase) = generator.quantize(Complex64::new(-2.0, -1e-12));
        assert_eq!(magnitude, (1 << 21) - 1);
        assert_eq!(phase, -(1 << 21));
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let config = GeneratorConfig {
            noise: 0.01,
            seed: 42,
            ..GeneratorConfig::default()
        };
        let first = generator(config.clone()).cycle();
        let second = generator(config).cycle();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_period_inside_dead_time() {
        let config = GeneratorConfig {
            period: 20,
            ..GeneratorConfig::default()
        };
        assert!(ConverterGenerator::new(config, &PipelineConfig::default()).is_err());
    }

    #[test]
    fn expected_phase_wraps_into_half_open_turn() {
        let profile = |phase_offset| ChannelProfile {
            phase_offset,
            ..ChannelProfile::default()
        };
        assert_eq!(profile(30.0).expected_phase(), -30.0);
        assert_eq!(profile(-200.0).expected_phase(), -160.0);
        assert_eq!(profile(180.0).expected_phase(), -180.0);
    }
}
