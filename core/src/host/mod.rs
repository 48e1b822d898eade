pub mod registers;
pub mod units;

pub use registers::{connect, RegisterBank, FILTER_SHIFT_RANGE, MULTIPLIER_RANGE};
pub use units::{mag_dbfs, mag_full_scale, phase_degrees};
