use crate::math::fixed::{mask_unsigned, wrap_signed};
use crate::prelude::{Clocked, PipelineConfig, VvmError, VvmResult};
use crate::processing::delay_line::DelayLine;
use crate::processing::multiplier::PipelinedMultiplier;
use crate::scheduler::{ReservationTable, Timeline};
use crate::telemetry::log::LogManager;

/// One tick of the serialized magnitude / phase stream from the converter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConverterSample {
    pub magnitude: u64,
    pub phase: i64,
    /// Marks the tick `L` ticks before channel 0's pair is valid.
    pub trigger: bool,
}

/// Register update fired by the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    LatchMagnitude(usize),
    LatchReferencePhase,
    FeedMultiplier(usize),
    StorePhaseDifference(usize),
    Complete,
}

/// Tap offsets derived from the channel count and the two upstream latencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapLayout {
    pub channels: usize,
    pub converter_latency: usize,
    pub multiplier_latency: usize,
    pub channel_stride: usize,
}

impl TapLayout {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            channels: config.channels,
            converter_latency: config.converter_latency(),
            multiplier_latency: config.multiplier_latency,
            channel_stride: config.channel_stride,
        }
    }

    /// Tick at which channel `channel`'s pair is on the stream.
    pub fn latch_tap(&self, channel: usize) -> usize {
        self.converter_latency + self.channel_stride * channel
    }

    /// Tick at which channel `channel`'s phase difference is stored.
    pub fn result_tap(&self, channel: usize) -> usize {
        self.latch_tap(channel) + self.multiplier_latency + 1
    }

    pub fn completion_tap(&self) -> usize {
        if self.channels > 1 {
            self.result_tap(self.channels - 1)
        } else {
            self.converter_latency
        }
    }

    /// Builds the event table and proves that no two channels share a stream
    /// slot or a multiplier slot.
    pub fn build(&self) -> VvmResult<Timeline<TapAction>> {
        if self.channels == 0 {
            return Err(VvmError::InvalidConfig("no channels to schedule".into()));
        }

        let mut stream_slots = ReservationTable::new("converter stream slot");
        let mut mult_feeds = ReservationTable::new("multiplier input");
        let mut mult_results = ReservationTable::new("multiplier output");
        let mut timeline = Timeline::new();

        timeline.register(self.latch_tap(0), [TapAction::LatchReferencePhase]);
        for channel in 0..self.channels {
            let tap = self.latch_tap(channel);
            stream_slots.reserve(tap, format!("channel {}", channel))?;
            timeline.register(tap, [TapAction::LatchMagnitude(channel)]);
        }

        for channel in 1..self.channels {
            let feed = self.latch_tap(channel);
            let result = self.result_tap(channel);
            if feed < self.converter_latency {
                return Err(VvmError::ScheduleConflict {
                    offset: feed,
                    detail: format!("channel {} feeds before the reference phase", channel),
                });
            }
            mult_feeds.reserve(feed, format!("channel {}", channel))?;
            mult_results.reserve(result, format!("channel {}", channel))?;
            timeline.register(feed, [TapAction::FeedMultiplier(channel)]);
            timeline.register(result, [TapAction::StorePhaseDifference(channel)]);
        }

        timeline.register(self.completion_tap(), [TapAction::Complete]);
        Ok(timeline)
    }
}

/// Registers visible to downstream blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseRegisters {
    pub mags: Vec<u64>,
    /// `phases[0]` is the absolute reference phase, the rest are differences.
    pub phases: Vec<i64>,
    pub strobe: bool,
    operand: i64,
}

impl PhaseRegisters {
    fn new(channels: usize) -> Self {
        Self {
            mags: vec![0; channels],
            phases: vec![0; channels],
            strobe: false,
            operand: 0,
        }
    }
}

/// Latches the serialized converter stream into per-channel registers and
/// computes `phases[i] = phases[0] * multiplier_i - phase_i` for every
/// non-reference channel, sharing one pipelined multiplier.
pub struct PhaseProcessor {
    layout: TapLayout,
    timeline: Timeline<TapAction>,
    multiplier: PipelinedMultiplier,
    phase_delay: DelayLine,
    current: PhaseRegisters,
    next: PhaseRegisters,
    multipliers: Vec<u8>,
    magnitude_width: u32,
    phase_width: u32,
    logger: LogManager,
}

impl PhaseProcessor {
    pub fn new(config: &PipelineConfig) -> VvmResult<Self> {
        config.validate()?;
        let layout = TapLayout::from_config(config);
        let timeline = layout.build()?;
        let logger = LogManager::new("phase");
        logger.record(&format!(
            "{} channels, L = {}, M = {}, completion at tap {}",
            layout.channels,
            layout.converter_latency,
            layout.multiplier_latency,
            layout.completion_tap()
        ));

        Ok(Self {
            multiplier: PipelinedMultiplier::new(layout.multiplier_latency),
            phase_delay: DelayLine::new(layout.multiplier_latency + 1),
            current: PhaseRegisters::new(layout.channels),
            next: PhaseRegisters::new(layout.channels),
            multipliers: config.settings.multipliers.clone(),
            magnitude_width: config.cordic_width,
            phase_width: config.phase_width(),
            layout,
            timeline,
            logger,
        })
    }

    pub fn layout(&self) -> &TapLayout {
        &self.layout
    }

    pub fn registers(&self) -> &PhaseRegisters {
        &self.current
    }

    /// Whether the trigger of the last tick violated the dead time.
    pub fn retriggered(&self) -> bool {
        self.timeline.retriggered()
    }

    pub fn set_multipliers(&mut self, multipliers: &[u8]) -> VvmResult<()> {
        if multipliers.len() != self.multipliers.len() {
            return Err(VvmError::InvalidConfig(format!(
                "{} multiplier factors for {} channels",
                multipliers.len(),
                self.layout.channels
            )));
        }
        self.multipliers.copy_from_slice(multipliers);
        Ok(())
    }
}

impl Clocked<ConverterSample> for PhaseProcessor {
    /// Completion pulse, raised in the tick the last phase difference lands.
    type Output = bool;

    fn tick(&mut self, sample: ConverterSample) -> bool {
        let due = self.timeline.tick(sample.trigger);
        if self.timeline.retriggered() {
            self.logger
                .warn("trigger inside dead time, results of this cycle are undefined");
        } else if sample.trigger {
            self.logger.trace("trigger");
        }

        let magnitude = mask_unsigned(sample.magnitude, self.magnitude_width);
        let phase = wrap_signed(sample.phase, self.phase_width);
        let product = self.multiplier.output();
        let delayed_phase = self.phase_delay.output();

        self.next.clone_from(&self.current);
        self.next.strobe = false;
        for action in due {
            match action {
                TapAction::LatchMagnitude(channel) => self.next.mags[channel] = magnitude,
                TapAction::LatchReferencePhase => self.next.phases[0] = phase,
                TapAction::FeedMultiplier(channel) => {
                    self.next.operand = i64::from(self.multipliers[channel - 1]);
                }
                TapAction::StorePhaseDifference(channel) => {
                    self.next.phases[channel] =
                        wrap_signed(product.wrapping_sub(delayed_phase), self.phase_width);
                }
                TapAction::Complete => self.next.strobe = true,
            }
        }

        self.multiplier
            .tick((self.current.phases[0], self.current.operand));
        self.phase_delay.tick(phase);
        std::mem::swap(&mut self.current, &mut self.next);

        if self.current.strobe {
            self.logger.trace(&format!(
                "cycle complete mags={:?} phases={:?}",
                self.current.mags, self.current.phases
            ));
        }
        self.current.strobe
    }

    fn reset(&mut self) {
        self.timeline.reset();
        self.multiplier.reset();
        self.phase_delay.reset();
        self.current = PhaseRegisters::new(self.layout.channels);
        self.next = PhaseRegisters::new(self.layout.channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Drives `processor` with `stream` and returns the tick indices of every
    /// completion pulse.
    fn run(processor: &mut PhaseProcessor, stream: &[ConverterSample]) -> Vec<usize> {
        stream
            .iter()
            .enumerate()
            .filter_map(|(t, &sample)| processor.tick(sample).then_some(t))
            .collect()
    }

    fn config(channels: usize, multipliers: Vec<u8>) -> PipelineConfig {
        let mut config = PipelineConfig::with_channels(channels);
        config.settings.multipliers = multipliers;
        config
    }

    #[test]
    fn worked_example_four_channels() {
        let config = config(4, vec![1, 2, 3]);
        let mut processor = PhaseProcessor::new(&config).unwrap();
        let latency = config.converter_latency();

        let mut stream = vec![
            ConverterSample {
                phase: 1000,
                ..Default::default()
            };
            80
        ];
        stream[0].trigger = true;
        for (i, mag) in [500, 600, 700, 800].into_iter().enumerate() {
            // hold each magnitude across its two-tick slot
            stream[latency + 2 * i].magnitude = mag;
            stream[latency + 2 * i + 1].magnitude = mag;
        }

        let completions = run(&mut processor, &stream);
        assert_eq!(completions, vec![23 + 2 * 3 + 5 + 1]);
        let regs = processor.registers();
        assert_eq!(regs.mags, vec![500, 600, 700, 800]);
        assert_eq!(regs.phases, vec![1000, 0, 1000, 2000]);
    }

    #[test]
    fn single_channel_completes_at_converter_latency() {
        let config = config(1, vec![]);
        let mut processor = PhaseProcessor::new(&config).unwrap();
        let mut stream = vec![ConverterSample::default(); 40];
        stream[0].trigger = true;
        stream[23] = ConverterSample {
            magnitude: 42,
            phase: -17,
            trigger: false,
        };

        assert_eq!(run(&mut processor, &stream), vec![23]);
        assert_eq!(processor.registers().mags, vec![42]);
        assert_eq!(processor.registers().phases, vec![-17]);
    }

    #[test]
    fn zero_stride_is_rejected_at_construction() {
        let mut config = config(3, vec![1, 1]);
        config.channel_stride = 0;
        assert!(matches!(
            PhaseProcessor::new(&config),
            Err(VvmError::ScheduleConflict { .. })
        ));
    }

    #[test]
    fn layout_offsets_are_unique_and_after_converter_latency() {
        let config = config(8, vec![1; 7]);
        let layout = TapLayout::from_config(&config);
        let timeline = layout.build().unwrap();
        let latency = config.converter_latency();
        assert!(timeline.offsets().all(|offset| offset >= latency));
        assert_eq!(timeline.max_offset(), Some(layout.completion_tap()));
        assert_eq!(
            timeline.actions_at(layout.completion_tap()),
            &[TapAction::StorePhaseDifference(7), TapAction::Complete]
        );
    }

    #[test]
    fn phase_difference_wraps_in_phase_width() {
        let mut config = config(2, vec![15]);
        config.cordic_width = 7;
        let mut processor = PhaseProcessor::new(&config).unwrap();
        let latency = config.converter_latency();

        let mut stream = vec![ConverterSample::default(); 40];
        stream[0].trigger = true;
        stream[latency].phase = 100;
        stream[latency + 2].phase = -100;

        run(&mut processor, &stream);
        // 100 * 15 + 100 = 1600 folds into 8 signed bits
        assert_eq!(processor.registers().phases, vec![100, 64]);
    }

    #[test]
    fn random_streams_match_reference_model() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let channels = rng.gen_range(1..=6);
            let mut config = config(
                channels,
                (1..channels).map(|_| rng.gen_range(1..=15)).collect(),
            );
            config.cordic_width = rng.gen_range(8..=24);
            config.multiplier_latency = rng.gen_range(1..=8);
            config.channel_stride = rng.gen_range(1..=3);
            let mut processor = PhaseProcessor::new(&config).unwrap();
            let layout = processor.layout().clone();
            let width = config.cordic_width;
            let phase_width = config.phase_width();

            let period = layout.completion_tap() + rng.gen_range(1..=10);
            let cycles = 5;
            let stream: Vec<ConverterSample> = (0..period * cycles + 1)
                .map(|t| ConverterSample {
                    magnitude: rng.gen_range(0..1u64 << width),
                    phase: rng.gen_range(-(1i64 << width)..(1i64 << width)),
                    trigger: t % period == 0 && t < period * cycles,
                })
                .collect();

            let mut completions = 0;
            for (t, &sample) in stream.iter().enumerate() {
                if !processor.tick(sample) {
                    continue;
                }
                completions += 1;
                let start = t - layout.completion_tap();
                assert_eq!(start % period, 0);

                let regs = processor.registers();
                let reference = stream[start + layout.latch_tap(0)].phase;
                assert_eq!(regs.phases[0], reference);
                for channel in 0..channels {
                    let expected = stream[start + layout.latch_tap(channel)].magnitude;
                    assert_eq!(regs.mags[channel], expected);
                }
                for channel in 1..channels {
                    let raw = stream[start + layout.latch_tap(channel)].phase;
                    let factor = i64::from(config.settings.multipliers[channel - 1]);
                    assert_eq!(
                        regs.phases[channel],
                        wrap_signed(reference * factor - raw, phase_width)
                    );
                }
            }
            assert_eq!(completions, cycles);
        }
    }

    #[test]
    fn retrigger_inside_dead_time_never_panics() {
        let config = config(4, vec![3, 5, 7]);
        let mut processor = PhaseProcessor::new(&config).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let mut retriggers = 0;
        for _ in 0..2000 {
            let sample = ConverterSample {
                magnitude: rng.gen(),
                phase: rng.gen(),
                trigger: rng.gen_bool(0.2),
            };
            processor.tick(sample);
            retriggers += usize::from(processor.retriggered());
        }
        assert!(retriggers > 0);
        assert_eq!(processor.registers().mags.len(), 4);
    }

    #[test]
    fn multiplier_update_applies_to_next_cycle() {
        let config = config(2, vec![1]);
        let mut processor = PhaseProcessor::new(&config).unwrap();
        let mut stream = vec![
            ConverterSample {
                phase: 10,
                ..Default::default()
            };
            40
        ];
        stream[0].trigger = true;

        run(&mut processor, &stream);
        assert_eq!(processor.registers().phases[1], 0);

        processor.set_multipliers(&[4]).unwrap();
        assert!(processor.set_multipliers(&[4, 4]).is_err());
        run(&mut processor, &stream);
        assert_eq!(processor.registers().phases[1], 30);
    }
}
