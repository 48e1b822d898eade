use crate::generator::profile::ConverterGenerator;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::info;
use serde::Serialize;
use std::time::Duration;
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use vvmcore::handoff::ResultFrame;
use vvmcore::host::{mag_dbfs, mag_full_scale, phase_degrees};
use vvmcore::math::{FrameHistory, FrameSummary};
use vvmcore::telemetry::CounterSnapshot;
use vvmcore::{Clocked, ConverterSample};

/// Last host-visible value of one channel next to what the generator drove.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub channel: usize,
    pub mag_full_scale: f64,
    pub mag_dbfs: f64,
    pub phase_degrees: f64,
    pub expected_mag: f64,
    pub expected_phase: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub frames_seen: usize,
    pub counters: CounterSnapshot,
    pub summary: FrameSummary,
    pub last_frame: ResultFrame,
    pub channels: Vec<ChannelReport>,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline domain on a blocking thread and the host domain on
    /// a timer until the pipeline has finished and its last frame is read.
    pub async fn execute(&self) -> anyhow::Result<WorkflowResult> {
        self.config.validate().context("validating workflow")?;
        let (mut pipeline, mut bank) =
            vvmcore::connect(self.config.pipeline.clone()).context("building pipeline")?;
        let mut generator =
            ConverterGenerator::new(self.config.generator.clone(), pipeline.config())
                .context("building converter generator")?;

        for (channel, profile) in self.config.generator.channels.iter().enumerate().skip(1) {
            bank.set_multiplier(channel, profile.harmonic)
                .with_context(|| format!("writing multiplier of channel {}", channel))?;
        }
        bank.set_filter_shift(self.config.filter_shift)
            .context("writing filter shift")?;

        let cycles = self.config.cycles;
        let pause = Duration::from_micros(self.config.cycle_pause_us);
        let pipeline_task = task::spawn_blocking(move || {
            for _ in 0..cycles {
                for sample in generator.cycle() {
                    pipeline.tick(sample);
                }
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
            // let the last cycle leave the filters
            for _ in 0..=pipeline.frame_latency() {
                pipeline.tick(ConverterSample::default());
            }
            info!("pipeline finished {} cycles", cycles);
        });

        let mut history = FrameHistory::new(bank.channels());
        let mut interval = time::interval(Duration::from_micros(self.config.host_period_us));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if bank.tick(()) {
                history.push(bank.frame()).context("recording frame")?;
            }
            if bank.publisher_closed() && !bank.pending() {
                break;
            }
        }
        pipeline_task.await.context("joining pipeline task")?;

        let summary = history.summary().context("summarising frames")?;
        let counters = bank.counters();
        info!(
            "host saw {} of {} frames, {} coalesced",
            history.len(),
            counters.published,
            counters.coalesced
        );
        Ok(WorkflowResult {
            frames_seen: history.len(),
            counters,
            summary,
            channels: self.channel_reports(bank.frame()),
            last_frame: bank.frame().clone(),
        })
    }

    fn channel_reports(&self, frame: &ResultFrame) -> Vec<ChannelReport> {
        let width = self.config.pipeline.cordic_width;
        self.config
            .generator
            .channels
            .iter()
            .enumerate()
            .map(|(channel, profile)| ChannelReport {
                channel,
                mag_full_scale: mag_full_scale(frame.mags[channel], width),
                mag_dbfs: mag_dbfs(frame.mags[channel], width),
                phase_degrees: phase_degrees(frame.phases[channel], width),
                expected_mag: profile.amplitude,
                // the reference phase rotates, there is nothing to compare
                expected_phase: (channel > 0).then(|| profile.expected_phase()),
            })
            .collect()
    }
}
