use crate::handoff::ResultFrame;
use crate::prelude::{VvmError, VvmResult};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

pub struct StatsHelper;

impl StatsHelper {
    /// Population standard deviation of every column.
    pub fn column_std(rows: &Array2<f64>) -> Array1<f64> {
        if rows.nrows() == 0 {
            return Array1::zeros(rows.ncols());
        }
        rows.std_axis(Axis(0), 0.0)
    }

    pub fn column_mean(rows: &Array2<f64>) -> Array1<f64> {
        rows.mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(rows.ncols()))
    }
}

/// Mean and spread of every scalar output over a run of frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub frames: usize,
    pub mag_mean: Vec<f64>,
    pub mag_std: Vec<f64>,
    pub phase_mean: Vec<f64>,
    pub phase_std: Vec<f64>,
}

/// Collects host-visible frames as rows of `mags ++ phases`.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    channels: usize,
    values: Vec<f64>,
    rows: usize,
}

impl FrameHistory {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            values: Vec::new(),
            rows: 0,
        }
    }

    pub fn push(&mut self, frame: &ResultFrame) -> VvmResult<()> {
        if frame.mags.len() != self.channels || frame.phases.len() != self.channels {
            return Err(VvmError::InvalidConfig(format!(
                "frame {} carries {} channels, history expects {}",
                frame.sequence,
                frame.mags.len(),
                self.channels
            )));
        }
        self.values.extend(frame.mags.iter().map(|&m| m as f64));
        self.values.extend(frame.phases.iter().map(|&p| p as f64));
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn to_array(&self) -> VvmResult<Array2<f64>> {
        Array2::from_shape_vec((self.rows, 2 * self.channels), self.values.clone())
            .map_err(|err| VvmError::InvalidConfig(format!("frame history shape: {}", err)))
    }

    pub fn summary(&self) -> VvmResult<FrameSummary> {
        let rows = self.to_array()?;
        let mean = StatsHelper::column_mean(&rows);
        let std = StatsHelper::column_std(&rows);
        let split = self.channels;
        Ok(FrameSummary {
            frames: self.rows,
            mag_mean: mean.iter().take(split).copied().collect(),
            mag_std: std.iter().take(split).copied().collect(),
            phase_mean: mean.iter().skip(split).copied().collect(),
            phase_std: std.iter().skip(split).copied().collect(),
        })
    }
}
