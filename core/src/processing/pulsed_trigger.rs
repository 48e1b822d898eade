//! Gate for pulsed RF measurements.
//!
//! When a channel is selected, the completion strobe only reaches the
//! averaging filters inside an acquisition window that opens `wait_pre` ticks
//! after that channel's magnitude crosses `threshold` upwards. Without a
//! selected channel every strobe passes (continuous-wave mode).

use crate::prelude::Clocked;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseTriggerConfig {
    /// Channel whose magnitude arms the trigger; `None` is continuous-wave mode.
    pub channel: Option<usize>,
    pub threshold: u64,
    /// Ticks between the threshold crossing and the acquisition window.
    pub wait_pre: u32,
    /// Width of the acquisition window in ticks.
    pub wait_acq: u32,
    /// Hold-off after the window before the trigger re-arms.
    pub wait_post: u32,
}

impl Default for PulseTriggerConfig {
    fn default() -> Self {
        Self {
            channel: None,
            threshold: 0x10110C,
            wait_pre: 7,
            wait_acq: 1024,
            wait_post: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    WaitLevel,
    WaitPre,
    Acquire,
    WaitPost,
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerInput<'a> {
    pub mags: &'a [u64],
    pub strobe: bool,
}

pub struct PulsedRfTrigger {
    config: PulseTriggerConfig,
    state: TriggerState,
    timer: u32,
    mag: u64,
    mag_prev: u64,
    mag_edge: bool,
    strobe_out: bool,
}

impl PulsedRfTrigger {
    pub fn new(config: PulseTriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::WaitLevel,
            timer: 0,
            mag: 0,
            mag_prev: 0,
            mag_edge: false,
            strobe_out: false,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Gated strobe committed by the previous tick.
    pub fn strobe_out(&self) -> bool {
        self.strobe_out
    }

    pub fn config(&self) -> &PulseTriggerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PulseTriggerConfig) {
        self.config = config;
    }

    fn next_state(&self) -> (TriggerState, u32) {
        let timer = self.timer.wrapping_add(1);
        match self.state {
            TriggerState::WaitLevel if self.mag_edge => (TriggerState::WaitPre, 0),
            TriggerState::WaitPre if self.timer >= self.config.wait_pre => {
                (TriggerState::Acquire, 0)
            }
            TriggerState::Acquire if self.timer >= self.config.wait_acq => {
                (TriggerState::WaitPost, 0)
            }
            TriggerState::WaitPost if self.timer >= self.config.wait_post => {
                (TriggerState::WaitLevel, 0)
            }
            state => (state, timer),
        }
    }
}

impl<'a> Clocked<TriggerInput<'a>> for PulsedRfTrigger {
    /// Gated strobe as committed by this tick.
    type Output = bool;

    fn tick(&mut self, input: TriggerInput<'a>) -> bool {
        let continuous = self.config.channel.is_none();
        let strobe_out =
            input.strobe && (continuous || self.state == TriggerState::Acquire);
        let mag = self
            .config
            .channel
            .and_then(|channel| input.mags.get(channel).copied())
            .unwrap_or(0);
        let (mag_prev, mag_edge) = if input.strobe {
            let threshold = self.config.threshold;
            (self.mag, self.mag_prev < threshold && self.mag >= threshold)
        } else {
            (self.mag_prev, false)
        };
        let (state, timer) = self.next_state();

        self.strobe_out = strobe_out;
        self.mag = mag;
        self.mag_prev = mag_prev;
        self.mag_edge = mag_edge;
        self.state = state;
        self.timer = timer;
        self.strobe_out
    }

    fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
