use crate::prelude::Clocked;
use std::collections::VecDeque;

/// Multiplier with a fixed pipeline depth.
///
/// Operands presented in tick `t` leave the last stage `latency` ticks later.
/// A new operand pair is accepted every tick.
#[derive(Debug, Clone)]
pub struct PipelinedMultiplier {
    stages: VecDeque<i64>,
    latency: usize,
}

impl PipelinedMultiplier {
    pub fn new(latency: usize) -> Self {
        let latency = latency.max(1);
        Self {
            stages: VecDeque::from(vec![0; latency]),
            latency,
        }
    }

    /// Product currently held by the last stage.
    pub fn output(&self) -> i64 {
        self.stages.back().copied().unwrap_or(0)
    }
}

impl Clocked<(i64, i64)> for PipelinedMultiplier {
    type Output = i64;

    fn tick(&mut self, (a, b): (i64, i64)) -> i64 {
        self.stages.push_front(a.wrapping_mul(b));
        self.stages.truncate(self.latency);
        self.output()
    }

    fn reset(&mut self) {
        self.stages.iter_mut().for_each(|stage| *stage = 0);
    }
}
