use serde::{Deserialize, Serialize};

/// Complete result vector of one measurement cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFrame {
    /// Counts published frames; gaps seen by the host mean coalesced updates.
    pub sequence: u64,
    pub mags: Vec<u64>,
    /// Reference phase at index 0, filtered phase differences after it.
    pub phases: Vec<i64>,
}

impl ResultFrame {
    pub fn zeroed(channels: usize) -> Self {
        Self {
            sequence: 0,
            mags: vec![0; channels],
            phases: vec![0; channels],
        }
    }
}
