use crate::handoff::{FramePublisher, ResultFrame};
use crate::prelude::{Clocked, PipelineConfig, Settings, VvmResult};
use crate::processing::averaging::{AveragingFilter, FilterInput, FilterOutput};
use crate::processing::phase_processor::{ConverterSample, PhaseProcessor};
use crate::processing::pulsed_trigger::{PulsedRfTrigger, TriggerInput};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::PipelineCounters;
use std::sync::Arc;
use tokio::sync::watch;

/// Complete pipeline-domain datapath: phase processor, pulsed trigger and one
/// averaging filter per scalar output except the reference phase.
///
/// Blocks are ticked from the sink back to the source so that every block
/// reads the registers its upstream neighbour committed in the previous tick.
pub struct VvmPipeline {
    config: PipelineConfig,
    processor: PhaseProcessor,
    trigger: PulsedRfTrigger,
    mag_filters: Vec<AveragingFilter>,
    /// Channels 1..N; the reference phase bypasses averaging.
    phase_filters: Vec<AveragingFilter>,
    filter_shift: u32,
    settings: Option<watch::Receiver<Settings>>,
    publisher: Option<FramePublisher>,
    latest: ResultFrame,
    sequence: u64,
    counters: Arc<PipelineCounters>,
    logger: LogManager,
}

impl VvmPipeline {
    pub fn new(config: PipelineConfig, counters: Arc<PipelineCounters>) -> VvmResult<Self> {
        let processor = PhaseProcessor::new(&config)?;
        let guard_bits = config.guard_bits();
        let channels = config.channels;

        Ok(Self {
            processor,
            trigger: PulsedRfTrigger::new(config.settings.pulse_trigger.clone()),
            mag_filters: (0..channels)
                .map(|_| AveragingFilter::new(guard_bits))
                .collect(),
            phase_filters: (1..channels)
                .map(|_| AveragingFilter::new(guard_bits))
                .collect(),
            filter_shift: config.settings.filter_shift,
            settings: None,
            publisher: None,
            latest: ResultFrame::zeroed(channels),
            sequence: 0,
            counters,
            logger: LogManager::new("pipeline"),
            config,
        })
    }

    /// Publishes every completed frame into the cross-domain cell.
    pub fn with_publisher(mut self, publisher: FramePublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Samples host-written settings once per tick.
    pub fn with_settings(mut self, settings: watch::Receiver<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn processor(&self) -> &PhaseProcessor {
        &self.processor
    }

    /// Most recent filtered frame.
    pub fn latest(&self) -> &ResultFrame {
        &self.latest
    }

    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    /// Ticks from a completion pulse of the phase processor to the published
    /// frame: one for the trigger gate, one for the filter strobe register and
    /// two inside the filter.
    pub fn frame_latency(&self) -> usize {
        if self.config.channels > 1 {
            4
        } else {
            3
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) -> VvmResult<()> {
        self.processor.set_multipliers(&settings.multipliers)?;
        self.filter_shift = settings.filter_shift;
        self.trigger.set_config(settings.pulse_trigger.clone());
        self.config.settings = settings.clone();
        self.logger.record(&format!(
            "settings applied: multipliers {:?}, filter shift {}",
            settings.multipliers, settings.filter_shift
        ));
        Ok(())
    }

    fn poll_settings(&mut self) {
        let changed = match &mut self.settings {
            Some(rx) if rx.has_changed().unwrap_or(false) => {
                Some(rx.borrow_and_update().clone())
            }
            _ => None,
        };
        if let Some(settings) = changed {
            if let Err(err) = self.apply_settings(&settings) {
                self.logger.warn(&format!("settings rejected: {}", err));
            }
        }
    }

    fn tick_filters(&mut self) -> Option<FilterOutput> {
        let regs = self.processor.registers();
        let shift = self.filter_shift;
        let reference_strobe = regs.strobe;
        let gated_strobe = self.trigger.strobe_out();

        let mut last = None;
        for (channel, filter) in self.mag_filters.iter_mut().enumerate() {
            // the reference magnitude is continuous-wave, never gated
            let strobe = if channel == 0 {
                reference_strobe
            } else {
                gated_strobe
            };
            let out = filter.tick(FilterInput {
                value: regs.mags[channel] as i64,
                strobe,
                shift,
            });
            self.latest.mags[channel] = out.value.max(0) as u64;
            last = Some(out);
        }
        for (index, filter) in self.phase_filters.iter_mut().enumerate() {
            let out = filter.tick(FilterInput {
                value: regs.phases[index + 1],
                strobe: gated_strobe,
                shift,
            });
            self.latest.phases[index + 1] = out.value;
            last = Some(out);
        }
        self.latest.phases[0] = regs.phases[0];
        last
    }
}

impl Clocked<ConverterSample> for VvmPipeline {
    /// Whether a frame was completed in this tick.
    type Output = bool;

    fn tick(&mut self, sample: ConverterSample) -> bool {
        self.poll_settings();

        let filtered = self.tick_filters();
        let regs = self.processor.registers();
        self.trigger.tick(TriggerInput {
            mags: &regs.mags,
            strobe: regs.strobe,
        });

        let completed = self.processor.tick(sample);
        if sample.trigger {
            self.counters.record_trigger(self.processor.retriggered());
        }
        if completed {
            self.counters.record_completion();
        }

        let frame_done = filtered.map(|out| out.strobe).unwrap_or(false);
        if frame_done {
            self.latest.sequence = self.sequence;
            self.sequence += 1;
            let published = self
                .publisher
                .as_ref()
                .map(|publisher| publisher.publish(self.latest.clone()));
            if let Some(Err(err)) = published {
                self.logger
                    .warn(&format!("{}, publishing stops", err));
                self.publisher = None;
            }
            self.logger
                .trace(&format!("frame {} ready", self.latest.sequence));
        }
        frame_done
    }

    fn reset(&mut self) {
        self.processor.reset();
        self.trigger.reset();
        for filter in self.mag_filters.iter_mut().chain(self.phase_filters.iter_mut()) {
            filter.reset();
        }
        self.latest = ResultFrame::zeroed(self.config.channels);
    }
}
