use crate::generator::profile::GeneratorConfig;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vvmcore::PipelineConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub pipeline: PipelineConfig,
    pub generator: GeneratorConfig,
    /// Measurement cycles to run before the pipeline task stops.
    pub cycles: usize,
    /// Written through the host register bank before the run.
    pub filter_shift: u32,
    /// Pause of the pipeline task after every cycle.
    pub cycle_pause_us: u64,
    /// Tick period of the host task.
    pub host_period_us: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            generator: GeneratorConfig::default(),
            cycles: 200,
            filter_shift: 0,
            cycle_pause_us: 5_000,
            host_period_us: 1_000,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(channels: usize, cycles: usize, filter_shift: u32) -> Self {
        Self {
            pipeline: PipelineConfig::with_channels(channels),
            generator: GeneratorConfig::with_channels(channels),
            cycles,
            filter_shift,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;
        ensure!(
            self.generator.channels.len() == self.pipeline.channels,
            "generator describes {} channels, pipeline has {}",
            self.generator.channels.len(),
            self.pipeline.channels
        );
        ensure!(self.host_period_us > 0, "host period must be non-zero");
        Ok(())
    }
}
