use crate::handoff::frame::ResultFrame;
use crate::prelude::{Clocked, VvmError, VvmResult};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::PipelineCounters;
use std::sync::Arc;
use tokio::sync::watch;

/// Host ticks a frame spends in the synchronizer before it becomes visible.
pub const SYNC_STAGES: usize = 2;

/// Creates the two ends of the cross-domain cell.
///
/// The cell holds the latest published frame and is always replaced whole, so
/// a reader sees one complete frame or the previous one, never a mix.
pub fn cross_domain_cell(
    channels: usize,
    counters: Arc<PipelineCounters>,
) -> (FramePublisher, HostSynchronizer) {
    let (tx, rx) = watch::channel(None);
    let publisher = FramePublisher {
        tx,
        counters: counters.clone(),
    };
    let synchronizer = HostSynchronizer {
        rx,
        stages: Default::default(),
        captured: None,
        visible: ResultFrame::zeroed(channels),
        new_data: false,
        last_sequence: None,
        channels,
        counters,
        logger: LogManager::new("handoff"),
    };
    (publisher, synchronizer)
}

/// Pipeline-domain end of the cell.
pub struct FramePublisher {
    tx: watch::Sender<Option<ResultFrame>>,
    counters: Arc<PipelineCounters>,
}

impl FramePublisher {
    /// Replaces the cell content; an unread earlier frame is superseded.
    ///
    /// Fails once the host end is gone, the frame is still stored.
    pub fn publish(&self, frame: ResultFrame) -> VvmResult<()> {
        self.counters.record_published();
        let sequence = frame.sequence;
        self.tx.send_replace(Some(frame));
        if self.tx.is_closed() {
            return Err(VvmError::HandoffClosed(format!(
                "host end dropped before frame {}",
                sequence
            )));
        }
        Ok(())
    }

    /// Whether the host end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Host-domain end of the cell.
///
/// Every host tick samples the cell; a newly seen frame walks through
/// [`SYNC_STAGES`] registers and is then copied into the host-visible frame
/// in one step, raising `new_data` for exactly that host tick.
pub struct HostSynchronizer {
    rx: watch::Receiver<Option<ResultFrame>>,
    stages: [Option<ResultFrame>; SYNC_STAGES],
    captured: Option<u64>,
    visible: ResultFrame,
    new_data: bool,
    last_sequence: Option<u64>,
    channels: usize,
    counters: Arc<PipelineCounters>,
    logger: LogManager,
}

impl HostSynchronizer {
    pub fn frame(&self) -> &ResultFrame {
        &self.visible
    }

    pub fn new_data(&self) -> bool {
        self.new_data
    }

    /// Whether the pipeline end has gone away.
    pub fn publisher_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Whether a published frame has not reached the host-visible copy yet.
    pub fn pending(&self) -> bool {
        self.stages.iter().any(Option::is_some) || self.unseen().is_some()
    }

    fn unseen(&self) -> Option<ResultFrame> {
        self.rx
            .borrow()
            .as_ref()
            .filter(|frame| Some(frame.sequence) != self.captured)
            .cloned()
    }

    fn sample(&mut self) -> Option<ResultFrame> {
        let frame = {
            let latest = self.rx.borrow_and_update();
            latest
                .as_ref()
                .filter(|frame| Some(frame.sequence) != self.captured)
                .cloned()
        };
        if let Some(frame) = &frame {
            self.captured = Some(frame.sequence);
        }
        frame
    }

    fn commit(&mut self, frame: ResultFrame) {
        let expected = self.last_sequence.map_or(0, |previous| previous + 1);
        let skipped = frame.sequence.saturating_sub(expected);
        if skipped > 0 {
            self.counters.record_coalesced(skipped);
            self.logger.warn(&format!(
                "frame {} supersedes {} unread frame(s)",
                frame.sequence, skipped
            ));
        }
        self.last_sequence = Some(frame.sequence);
        self.visible = frame;
        self.new_data = true;
    }
}

impl Clocked<()> for HostSynchronizer {
    /// `new_data` for this host tick.
    type Output = bool;

    fn tick(&mut self, _: ()) -> bool {
        let sampled = self.sample();
        let arriving = self.stages[SYNC_STAGES - 1].take();
        self.stages.rotate_right(1);
        self.stages[0] = sampled;

        self.new_data = false;
        if let Some(frame) = arriving {
            self.commit(frame);
        }
        self.new_data
    }

    /// Clears the host-visible copy and the synchronizer stages.
    ///
    /// Sequence tracking survives. A frame dropped from the stages is sampled
    /// again while the cell still holds it, otherwise it counts as coalesced.
    fn reset(&mut self) {
        self.stages = Default::default();
        self.visible = ResultFrame::zeroed(self.channels);
        self.new_data = false;
        self.captured = self.last_sequence;
    }
}
