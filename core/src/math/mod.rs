pub mod fixed;
pub mod stats;

pub use fixed::{mask_unsigned, wrap_signed};
pub use stats::{FrameHistory, FrameSummary, StatsHelper};
