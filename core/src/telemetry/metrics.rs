use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Event counters shared by the pipeline and host domains.
pub struct PipelineCounters {
    inner: Mutex<CounterSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub triggers: u64,
    pub retriggers: u64,
    pub completions: u64,
    pub published: u64,
    pub coalesced: u64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CounterSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut CounterSnapshot)) {
        if let Ok(mut counters) = self.inner.lock() {
            apply(&mut counters);
        }
    }

    pub fn record_trigger(&self, inside_dead_time: bool) {
        self.update(|c| {
            c.triggers += 1;
            if inside_dead_time {
                c.retriggers += 1;
            }
        });
    }

    pub fn record_completion(&self) {
        self.update(|c| c.completions += 1);
    }

    pub fn record_published(&self) {
        self.update(|c| c.published += 1);
    }

    pub fn record_coalesced(&self, frames: u64) {
        self.update(|c| c.coalesced += frames);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        if let Ok(counters) = self.inner.lock() {
            *counters
        } else {
            CounterSnapshot::default()
        }
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}
