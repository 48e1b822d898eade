//! First-order recursive averaging built from shifts and additions.
//!
//! `acc += ((x << G) - acc) >> shift`, output `acc >> G`. The arithmetic
//! right shift floors, so the accumulator can only stall below its target:
//! once `shift > G` the error bits that fall off can never be recovered and
//! the output keeps a DC deficit of up to `2^(shift - G)` LSBs.

use crate::prelude::Clocked;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterInput {
    pub value: i64,
    /// Completion pulse; the filter updates once per pulse.
    pub strobe: bool,
    pub shift: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOutput {
    pub value: i64,
    pub strobe: bool,
}

/// Upper bound of the steady-state error in output LSBs for `shift`.
pub fn dc_error_bound(shift: u32, guard_bits: u32) -> i64 {
    if shift > guard_bits {
        1 << (shift - guard_bits)
    } else {
        1
    }
}

#[derive(Debug, Clone)]
pub struct AveragingFilter {
    guard_bits: u32,
    acc: i64,
    /// Accumulator one tick late, feeds the error term and the output.
    acc_delayed: i64,
    error: i64,
    strobes: [bool; 3],
}

impl AveragingFilter {
    pub fn new(guard_bits: u32) -> Self {
        Self {
            guard_bits,
            acc: 0,
            acc_delayed: 0,
            error: 0,
            strobes: [false; 3],
        }
    }

    pub fn guard_bits(&self) -> u32 {
        self.guard_bits
    }

    pub fn accumulator(&self) -> i64 {
        self.acc
    }

    pub fn output(&self) -> FilterOutput {
        FilterOutput {
            value: self.acc_delayed >> self.guard_bits,
            strobe: self.strobes[2],
        }
    }
}

impl Clocked<FilterInput> for AveragingFilter {
    type Output = FilterOutput;

    fn tick(&mut self, input: FilterInput) -> FilterOutput {
        let error = if input.strobe {
            (input.value << self.guard_bits) - self.acc_delayed
        } else {
            self.error
        };
        let acc = if self.strobes[0] {
            self.acc_delayed + (self.error >> input.shift.min(63))
        } else {
            self.acc
        };

        self.acc_delayed = self.acc;
        self.acc = acc;
        self.error = error;
        self.strobes = [input.strobe, self.strobes[0], self.strobes[1]];
        self.output()
    }

    fn reset(&mut self) {
        *self = Self::new(self.guard_bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: u32 = 15;

    /// Applies one completion pulse and returns the output once it is valid.
    fn update(filter: &mut AveragingFilter, value: i64, shift: u32) -> FilterOutput {
        filter.tick(FilterInput {
            value,
            strobe: true,
            shift,
        });
        filter.tick(FilterInput {
            value,
            strobe: false,
            shift,
        });
        filter.tick(FilterInput {
            value,
            strobe: false,
            shift,
        })
    }

    fn settle(filter: &mut AveragingFilter, value: i64, shift: u32, updates: usize) -> i64 {
        let mut last = FilterOutput::default();
        for _ in 0..updates {
            last = update(filter, value, shift);
            assert!(last.strobe);
        }
        last.value
    }

    #[test]
    fn output_and_strobe_follow_pulse_by_two_ticks() {
        let mut filter = AveragingFilter::new(G);
        let pulse = FilterInput {
            value: 1234,
            strobe: true,
            shift: 0,
        };
        let idle = FilterInput {
            strobe: false,
            ..pulse
        };

        assert_eq!(filter.tick(pulse), FilterOutput::default());
        assert_eq!(filter.tick(idle), FilterOutput::default());
        assert_eq!(
            filter.tick(idle),
            FilterOutput {
                value: 1234,
                strobe: true
            }
        );
        assert_eq!(
            filter.tick(idle),
            FilterOutput {
                value: 1234,
                strobe: false
            }
        );
    }

    #[test]
    fn zero_shift_passes_through() {
        let mut filter = AveragingFilter::new(G);
        for value in [5, -9000, 1 << 20, 0, 77] {
            assert_eq!(update(&mut filter, value, 0).value, value);
        }
    }

    #[test]
    fn larger_shift_averages_longer() {
        let mut fast = AveragingFilter::new(G);
        let mut slow = AveragingFilter::new(G);
        let fast_out = settle(&mut fast, 1000, 2, 4);
        let slow_out = settle(&mut slow, 1000, 5, 4);
        assert!(slow_out < fast_out);
        assert!(fast_out < 1000);
    }

    #[test]
    fn converges_within_one_lsb_when_shift_fits_guard_bits() {
        for shift in 0..=6 {
            for target in [1000i64, -1000, 1, 2_000_000] {
                let mut filter = AveragingFilter::new(G);
                let out = settle(&mut filter, target, shift, 64 << shift);
                assert!((target - out).abs() <= 1, "shift {} target {} -> {}", shift, target, out);
            }
        }
    }

    /// Applies updates until the accumulator stops moving and returns the
    /// output. A floored step of zero means the filter stays put for good.
    fn settle_until_stalled(filter: &mut AveragingFilter, value: i64, shift: u32) -> i64 {
        loop {
            let acc = filter.accumulator();
            let out = update(filter, value, shift).value;
            if filter.accumulator() == acc {
                return out;
            }
        }
    }

    #[test]
    fn shift_beyond_guard_bits_leaves_deterministic_deficit() {
        let guard_bits = 3;
        let target = 1000;
        for shift in guard_bits + 1..=15 {
            let run = || {
                let mut filter = AveragingFilter::new(guard_bits);
                settle_until_stalled(&mut filter, target, shift)
            };
            let first = run();
            assert_eq!(first, run(), "shift {}", shift);
            assert!(first <= target, "shift {} -> {}", shift, first);
            assert!(
                target - first <= dc_error_bound(shift, guard_bits),
                "shift {} -> {}",
                shift,
                first
            );
        }

        // more updates change nothing once stalled
        let mut filter = AveragingFilter::new(guard_bits);
        let stalled = settle_until_stalled(&mut filter, target, 8);
        assert!(stalled < target);
        let acc = filter.accumulator();
        assert_eq!(settle(&mut filter, target, 8, 100), stalled);
        assert_eq!(filter.accumulator(), acc);
    }

    #[test]
    fn negative_target_approached_from_below_stalls_under_it() {
        let guard_bits = 3;
        for shift in guard_bits + 1..=15 {
            let mut filter = AveragingFilter::new(guard_bits);
            assert_eq!(settle_until_stalled(&mut filter, -2000, shift), -2000);

            let out = settle_until_stalled(&mut filter, -1000, shift);
            assert!(out <= -1000, "shift {} -> {}", shift, out);
            assert!(-1000 - out <= dc_error_bound(shift, guard_bits));
        }

        let mut filter = AveragingFilter::new(guard_bits);
        settle_until_stalled(&mut filter, -2000, 8);
        assert!(settle_until_stalled(&mut filter, -1000, 8) < -1000);
    }

    #[test]
    fn negative_target_from_reset_is_reached_exactly() {
        let guard_bits = 3;
        let mut filter = AveragingFilter::new(guard_bits);
        let out = settle(&mut filter, -1000, 8, 64 << 8);
        assert_eq!(out, -1000);
    }

    #[test]
    fn reset_clears_accumulator() {
        let mut filter = AveragingFilter::new(G);
        settle(&mut filter, 500, 1, 10);
        filter.reset();
        assert_eq!(filter.accumulator(), 0);
        assert_eq!(filter.output(), FilterOutput::default());
    }
}
