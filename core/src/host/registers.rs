use crate::handoff::{cross_domain_cell, HostSynchronizer, ResultFrame};
use crate::prelude::{Clocked, PipelineConfig, Settings, VvmError, VvmResult};
use crate::processing::pipeline::VvmPipeline;
use crate::processing::pulsed_trigger::PulseTriggerConfig;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{CounterSnapshot, PipelineCounters};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::watch;

pub const MULTIPLIER_RANGE: RangeInclusive<u8> = 1..=15;
pub const FILTER_SHIFT_RANGE: RangeInclusive<u32> = 0..=15;

/// Builds a pipeline and the register bank that talks to it.
///
/// The two halves share nothing but the result cell, the settings channel and
/// the counters, so each can be moved to its own thread or task.
pub fn connect(config: PipelineConfig) -> VvmResult<(VvmPipeline, RegisterBank)> {
    let counters = Arc::new(PipelineCounters::new());
    let (publisher, synchronizer) = cross_domain_cell(config.channels, counters.clone());
    let (settings_tx, settings_rx) = watch::channel(config.settings.clone());

    let bank = RegisterBank {
        channels: config.channels,
        settings: settings_tx,
        synchronizer,
        counters: counters.clone(),
        logger: LogManager::new("host"),
    };
    let pipeline = VvmPipeline::new(config, counters)?
        .with_publisher(publisher)
        .with_settings(settings_rx);
    Ok((pipeline, bank))
}

/// Host-domain register view of the pipeline.
///
/// Reads come from the synchronized frame; writes are range checked here and
/// reach the pipeline on one of its next ticks.
pub struct RegisterBank {
    channels: usize,
    settings: watch::Sender<Settings>,
    synchronizer: HostSynchronizer,
    counters: Arc<PipelineCounters>,
    logger: LogManager,
}

impl RegisterBank {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame(&self) -> &ResultFrame {
        self.synchronizer.frame()
    }

    pub fn mag(&self, channel: usize) -> VvmResult<u64> {
        self.check_channel(channel, 0)?;
        Ok(self.frame().mags[channel])
    }

    pub fn phase(&self, channel: usize) -> VvmResult<i64> {
        self.check_channel(channel, 0)?;
        Ok(self.frame().phases[channel])
    }

    /// Set for exactly one host tick when a new frame became visible.
    pub fn new_data(&self) -> bool {
        self.synchronizer.new_data()
    }

    pub fn pending(&self) -> bool {
        self.synchronizer.pending()
    }

    pub fn publisher_closed(&self) -> bool {
        self.synchronizer.publisher_closed()
    }

    /// Currently written settings, which the pipeline may not have sampled yet.
    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn multiplier(&self, channel: usize) -> VvmResult<u8> {
        self.check_channel(channel, 1)?;
        Ok(self.settings.borrow().multipliers[channel - 1])
    }

    pub fn set_multiplier(&self, channel: usize, factor: u8) -> VvmResult<()> {
        self.check_channel(channel, 1)?;
        if !MULTIPLIER_RANGE.contains(&factor) {
            return Err(VvmError::OutOfRange {
                name: "multiplier",
                value: factor as i64,
                min: *MULTIPLIER_RANGE.start() as i64,
                max: *MULTIPLIER_RANGE.end() as i64,
            });
        }
        self.settings
            .send_modify(|settings| settings.multipliers[channel - 1] = factor);
        self.logger
            .record(&format!("multiplier[{}] <- {}", channel, factor));
        Ok(())
    }

    pub fn filter_shift(&self) -> u32 {
        self.settings.borrow().filter_shift
    }

    pub fn set_filter_shift(&self, shift: u32) -> VvmResult<()> {
        if !FILTER_SHIFT_RANGE.contains(&shift) {
            return Err(VvmError::OutOfRange {
                name: "filter_shift",
                value: shift as i64,
                min: *FILTER_SHIFT_RANGE.start() as i64,
                max: *FILTER_SHIFT_RANGE.end() as i64,
            });
        }
        self.settings
            .send_modify(|settings| settings.filter_shift = shift);
        self.logger.record(&format!("filter_shift <- {}", shift));
        Ok(())
    }

    pub fn set_pulse_trigger(&self, config: PulseTriggerConfig) -> VvmResult<()> {
        if let Some(channel) = config.channel {
            self.check_channel(channel, 0)?;
        }
        self.logger.record(&format!("pulse trigger <- {:?}", config));
        self.settings
            .send_modify(|settings| settings.pulse_trigger = config);
        Ok(())
    }

    fn check_channel(&self, channel: usize, min: usize) -> VvmResult<()> {
        if channel < min || channel >= self.channels {
            return Err(VvmError::ChannelIndex {
                channel,
                min,
                max: self.channels.saturating_sub(1),
            });
        }
        Ok(())
    }
}

impl Clocked<()> for RegisterBank {
    /// `new_data` for this host tick.
    type Output = bool;

    fn tick(&mut self, _: ()) -> bool {
        self.synchronizer.tick(())
    }

    fn reset(&mut self) {
        self.synchronizer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::phase_processor::ConverterSample;

    fn bank() -> (VvmPipeline, RegisterBank) {
        connect(PipelineConfig::default()).unwrap()
    }

    /// One measurement cycle with a constant phase of 1000 on every channel.
    fn run_cycle(pipeline: &mut VvmPipeline, bank: &mut RegisterBank, mags: [u64; 4]) {
        let config = pipeline.config().clone();
        let latency = config.converter_latency();
        for t in 0..64usize {
            let channel = t
                .checked_sub(latency)
                .filter(|offset| offset % config.channel_stride == 0)
                .map(|offset| offset / config.channel_stride)
                .filter(|&channel| channel < 4);
            pipeline.tick(ConverterSample {
                magnitude: channel.map(|c| mags[c]).unwrap_or(0),
                phase: 1000,
                trigger: t == 0,
            });
            bank.tick(());
        }
    }

    #[test]
    fn writes_outside_register_ranges_are_rejected() {
        let (_, bank) = bank();
        assert!(matches!(
            bank.set_multiplier(1, 0),
            Err(VvmError::OutOfRange { name: "multiplier", .. })
        ));
        assert!(bank.set_multiplier(1, 16).is_err());
        assert!(matches!(
            bank.set_multiplier(0, 3),
            Err(VvmError::ChannelIndex { channel: 0, min: 1, max: 3 })
        ));
        assert!(bank.set_multiplier(4, 3).is_err());
        assert!(bank.set_filter_shift(16).is_err());
        assert!(bank
            .set_pulse_trigger(PulseTriggerConfig {
                channel: Some(4),
                ..PulseTriggerConfig::default()
            })
            .is_err());
        assert!(bank.mag(4).is_err());
        assert_eq!(bank.settings(), Settings::default());
    }

    #[test]
    fn accepted_writes_are_visible_in_settings() {
        let (_, bank) = bank();
        bank.set_multiplier(3, 15).unwrap();
        bank.set_filter_shift(15).unwrap();
        assert_eq!(bank.multiplier(3).unwrap(), 15);
        assert_eq!(bank.filter_shift(), 15);
        assert_eq!(bank.settings().multipliers, vec![1, 1, 15]);
    }

    #[test]
    fn bank_reads_worked_example_through_the_handoff() {
        let (mut pipeline, mut bank) = bank();
        bank.set_multiplier(2, 2).unwrap();
        bank.set_multiplier(3, 3).unwrap();

        run_cycle(&mut pipeline, &mut bank, [500, 600, 700, 800]);

        let mags: Vec<u64> = (0..4).map(|c| bank.mag(c).unwrap()).collect();
        let phases: Vec<i64> = (0..4).map(|c| bank.phase(c).unwrap()).collect();
        assert_eq!(mags, vec![500, 600, 700, 800]);
        assert_eq!(phases, vec![1000, 0, 1000, 2000]);
        assert_eq!(bank.counters().published, 1);
    }

    #[test]
    fn filter_shift_write_takes_effect_on_next_cycle() {
        let (mut pipeline, mut bank) = bank();
        run_cycle(&mut pipeline, &mut bank, [800; 4]);
        assert_eq!(bank.mag(1).unwrap(), 800);

        bank.set_filter_shift(1).unwrap();
        run_cycle(&mut pipeline, &mut bank, [0; 4]);
        assert_eq!(bank.mag(1).unwrap(), 400);
        assert_eq!(bank.frame().sequence, 1);
    }
}
