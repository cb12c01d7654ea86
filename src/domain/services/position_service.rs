//! Queue position and time-left estimation.

use std::time::Duration;

use crate::domain::entities::WaitingRecord;

/// Estimated place of one client in the waiting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEstimate {
    /// 1-based position in arrival order
    pub position: usize,
    /// Estimated wait until admission
    pub time_left: Duration,
}

/// Domain service mapping a queue index to (position, time left).
///
/// Clients are admitted in groups of `group_size`, one group every
/// `group_interval`. Arrival order in the waiting list is the only ordering
/// key.
#[derive(Debug, Clone, Copy)]
pub struct PositionEstimator {
    group_size: usize,
    group_interval: Duration,
}

impl PositionEstimator {
    /// Create an estimator. A group size of zero is treated as one.
    pub fn new(group_size: usize, group_interval: Duration) -> Self {
        Self {
            group_size: group_size.max(1),
            group_interval,
        }
    }

    /// Estimate for the client at zero-based `index`.
    ///
    /// `groups_ahead = ceil((index + 1) / group_size)`,
    /// `time_left = groups_ahead * group_interval`, `position = index + 1`.
    pub fn estimate_at(&self, index: usize) -> QueueEstimate {
        let position = index + 1;
        let groups_ahead = position.div_ceil(self.group_size);
        let time_left = self
            .group_interval
            .saturating_mul(u32::try_from(groups_ahead).unwrap_or(u32::MAX));

        QueueEstimate {
            position,
            time_left,
        }
    }

    /// Estimate for `client_id` in `queue`, `None` if the client is not queued.
    pub fn estimate(&self, queue: &[WaitingRecord], client_id: &str) -> Option<QueueEstimate> {
        queue
            .iter()
            .position(|record| record.client_id == client_id)
            .map(|index| self.estimate_at(index))
    }
}
