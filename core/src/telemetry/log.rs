use log::{debug, info, warn};

/// Tags every message with the pipeline block that emitted it.
#[derive(Debug, Clone, Copy)]
pub struct LogManager {
    block: &'static str,
}

impl LogManager {
    pub fn new(block: &'static str) -> Self {
        Self { block }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.block, message);
    }

    pub fn trace(&self, message: &str) {
        debug!("[{}] {}", self.block, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.block, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("vvm")
    }
}
