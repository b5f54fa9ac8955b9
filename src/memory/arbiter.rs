//! Round-robin arbitration of the shared L3 among the cores

use log::debug;

use super::{CoreId, NUM_CORES};

/// Scans from `current + 1` around to `current` and returns the first core
/// with a pending request. With no request pending, `current` is kept.
pub fn next_master(current: CoreId, requests: [bool; NUM_CORES]) -> CoreId {
    (1..=NUM_CORES)
        .map(|i| (current + i) % NUM_CORES)
        .find(|&core| requests[core])
        .unwrap_or(current)
}

/// Arbiter state: the master served at the next idle cycle
#[derive(Clone, Debug, Default)]
pub struct RoundRobinArbiter {
    current_master: CoreId,
    grants: [u64; NUM_CORES],
}

impl RoundRobinArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_master(&self) -> CoreId {
        self.current_master
    }

    /// Number of grants per core since reset
    pub fn grants(&self) -> [u64; NUM_CORES] {
        self.grants
    }

    /// One arbitration round. The current master is served if it is
    /// requesting, otherwise the next requester in cyclic order; the
    /// pointer then moves past the granted core.
    pub fn grant(&mut self, requests: [bool; NUM_CORES]) -> Option<CoreId> {
        let granted = if requests[self.current_master] {
            self.current_master
        } else {
            next_master(self.current_master, requests)
        };
        if !requests[granted] {
            return None;
        }
        self.current_master = next_master(granted, requests);
        self.grants[granted] += 1;
        debug!(
            "L3 grant to core {} (requests {:?}, next {})",
            granted, requests, self.current_master
        );
        Some(granted)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_master_scans_cyclically() {
        assert_eq!(next_master(0, [true; NUM_CORES]), 1);
        assert_eq!(next_master(3, [true; NUM_CORES]), 0);
        assert_eq!(next_master(1, [true, false, false, true]), 3);
        assert_eq!(next_master(3, [false, false, true, false]), 2);
    }

    #[test]
    fn test_next_master_regrants_lone_requester() {
        assert_eq!(next_master(2, [false, false, true, false]), 2);
        // Nobody requesting: keep the current master
        assert_eq!(next_master(2, [false; NUM_CORES]), 2);
    }

    #[test]
    fn test_fairness_from_core0() {
        let mut arbiter = RoundRobinArbiter::new();
        assert_eq!(arbiter.current_master(), 0);
        let grants: Vec<_> = (0..4)
            .filter_map(|_| arbiter.grant([true; NUM_CORES]))
            .collect();
        assert_eq!(grants, vec![0, 1, 2, 3]);
        assert_eq!(arbiter.grants(), [1, 1, 1, 1]);
    }

    #[test]
    fn test_bounded_wait() {
        // Core 0 hammers the L3; core 2 still gets in on the next round
        let mut arbiter = RoundRobinArbiter::new();
        assert_eq!(arbiter.grant([true, false, false, false]), Some(0));
        assert_eq!(arbiter.grant([true, false, true, false]), Some(0));
        assert_eq!(arbiter.grant([true, false, true, false]), Some(2));
        assert_eq!(arbiter.grant([true, false, false, false]), Some(0));
    }

    #[test]
    fn test_no_request_no_grant() {
        let mut arbiter = RoundRobinArbiter::new();
        assert_eq!(arbiter.grant([false; NUM_CORES]), None);
        assert_eq!(arbiter.current_master(), 0);
        assert_eq!(arbiter.grants(), [0; NUM_CORES]);
    }
}
