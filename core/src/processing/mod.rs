pub mod averaging;
pub mod delay_line;
pub mod multiplier;
pub mod phase_processor;
pub mod pipeline;
pub mod pulsed_trigger;

pub use averaging::{AveragingFilter, FilterInput, FilterOutput};
pub use delay_line::DelayLine;
pub use multiplier::PipelinedMultiplier;
pub use phase_processor::{ConverterSample, PhaseProcessor, PhaseRegisters, TapAction, TapLayout};
pub use pipeline::VvmPipeline;
pub use pulsed_trigger::{PulseTriggerConfig, PulsedRfTrigger, TriggerState};
