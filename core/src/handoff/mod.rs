//! Transfer of result frames from the pipeline tick domain into the
//! independently paced host domain.

pub mod cell;
pub mod frame;

pub use cell::{cross_domain_cell, FramePublisher, HostSynchronizer, SYNC_STAGES};
pub use frame::ResultFrame;
