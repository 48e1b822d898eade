use crate::prelude::Clocked;
use std::collections::VecDeque;

/// Shift register of fixed depth; `output` is the input from `depth` ticks ago.
#[derive(Debug, Clone)]
pub struct DelayLine {
    taps: VecDeque<i64>,
    depth: usize,
}

impl DelayLine {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            taps: VecDeque::from(vec![0; depth]),
            depth,
        }
    }

    pub fn output(&self) -> i64 {
        self.taps.back().copied().unwrap_or(0)
    }
}

impl Clocked<i64> for DelayLine {
    type Output = i64;

    fn tick(&mut self, sample: i64) -> i64 {
        self.taps.push_front(sample);
        self.taps.truncate(self.depth);
        self.output()
    }

    fn reset(&mut self) {
        self.taps.iter_mut().for_each(|tap| *tap = 0);
    }
}
