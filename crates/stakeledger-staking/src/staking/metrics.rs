use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct StakingMetrics {
    positions_opened: AtomicU64,
    top_ups: AtomicU64,
    withdrawals: AtomicU64,
    positions_withdrawn: AtomicU64,
    transfer_failures: AtomicU64,
    rollbacks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub positions_opened: u64,
    pub top_ups: u64,
    pub withdrawals: u64,
    pub positions_withdrawn: u64,
    pub transfer_failures: u64,
    pub rollbacks: u64,
}

impl StakingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment_positions_opened(&self) {
        self.positions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_top_ups(&self) {
        self.top_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_withdrawals(&self, position_closed: bool) {
        self.withdrawals.fetch_add(1, Ordering::Relaxed);
        if position_closed {
            self.positions_withdrawn.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_transfer_failures(&self) {
        self.transfer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            positions_opened: self.positions_opened.load(Ordering::Relaxed),
            top_ups: self.top_ups.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            positions_withdrawn: self.positions_withdrawn.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}
