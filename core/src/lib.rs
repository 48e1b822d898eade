//! Real-time measurement core of a multi-channel vector voltmeter.
//!
//! A trigger-relative tap scheduler latches a serialized magnitude/phase
//! stream, one shared pipelined multiplier forms the phase differences to the
//! reference channel, shift-and-add filters average every result, and a
//! latest-wins cell carries complete frames into an independently paced host
//! domain.

pub mod handoff;
pub mod host;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod scheduler;
pub mod telemetry;

pub use host::{connect, RegisterBank};
pub use prelude::{Clocked, PipelineConfig, Settings, VvmError, VvmResult};
pub use processing::{ConverterSample, VvmPipeline};
