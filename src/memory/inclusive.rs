//! L2 cache, one per core
//!
//! Inclusive of its L1: a line handed up stays resident here with
//! `in_l1` set. Serves the L1 port first, then the direct bypass port,
//! and talks to the shared L3 through one core port.

use log::{debug, trace};

use super::cache::{Access, Cache, CachePolicy, PendingRequest, Requester};
use super::{AccessType, Clocked, CpuResponse, PortRequest, PortResponse};
use crate::error::MemoryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L2State {
    Idle,
    ReadMiss(PendingRequest),
    WriteMiss(PendingRequest),
    Evict(PendingRequest),
    WaitL3(PendingRequest),
    Complete,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L2Inputs {
    pub l1: PortRequest,
    pub direct: PortRequest,
    pub l3: PortResponse,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L2Outputs {
    pub l1: PortResponse,
    pub direct: CpuResponse,
    pub l3: PortRequest,
}

/// Inclusive L2 cache
pub struct InclusiveCache {
    pub cache: Cache,
    state: L2State,
    outputs: L2Outputs,
}

impl InclusiveCache {
    pub fn make(policy: CachePolicy) -> Self {
        Self {
            cache: Cache::make(policy),
            state: L2State::Idle,
            outputs: Self::idle_outputs(),
        }
    }

    fn idle_outputs() -> L2Outputs {
        L2Outputs {
            l1: PortResponse::idle(true),
            direct: CpuResponse { ready: true, ..Default::default() },
            l3: PortRequest::default(),
        }
    }

    pub fn state(&self) -> &L2State {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == L2State::Idle
    }

    fn fetch_state(pending: PendingRequest) -> L2State {
        match pending.access_type {
            AccessType::Read => L2State::ReadMiss(pending),
            AccessType::Write => L2State::WriteMiss(pending),
        }
    }

    /// Keeps `in_l1` in step with what was handed up or pushed down.
    /// Direct reads mark the line too.
    fn track_inclusion(
        &mut self,
        requester: Requester,
        access_type: AccessType,
        index: usize,
        way: usize,
    ) {
        let line = self.cache.line_mut(index, way);
        match (requester, access_type) {
            (_, AccessType::Read) => line.in_l1 = true,
            // An L1 eviction: the data no longer lives in L1
            (Requester::Upper, AccessType::Write) => line.in_l1 = false,
            (_, AccessType::Write) => {}
        }
    }

    fn respond(
        outputs: &mut L2Outputs,
        requester: Requester,
        data: u8,
        hit: bool,
    ) {
        match requester {
            Requester::Upper => outputs.l1 = PortResponse::respond(data),
            _ => {
                outputs.direct = if hit {
                    CpuResponse::hit(data)
                } else {
                    CpuResponse::miss(data)
                }
            }
        }
    }

    fn lookup(
        &mut self,
        request: PortRequest,
        requester: Requester,
        outputs: &mut L2Outputs,
    ) -> L2State {
        let Some(access_type) = request.access_type() else {
            return L2State::Idle;
        };
        match self.cache.access(&request, access_type, requester) {
            Access::Hit { data, index, way } => {
                trace!(
                    "L2 {:?} hit {:#04x} for {:?}",
                    access_type,
                    request.address,
                    requester
                );
                self.track_inclusion(requester, access_type, index, way);
                Self::respond(outputs, requester, data, true);
                L2State::Complete
            }
            Access::Miss(pending) => {
                debug!(
                    "L2 {:?} miss {:#04x} for {:?}, victim set {} way {} dirty {}",
                    access_type,
                    request.address,
                    requester,
                    pending.victim.index,
                    pending.victim.way,
                    pending.victim.needs_writeback()
                );
                if pending.victim.needs_writeback() {
                    L2State::Evict(pending)
                } else {
                    Self::fetch_state(pending)
                }
            }
        }
    }

    fn fill_or_wait(
        &mut self,
        pending: PendingRequest,
        l3: PortResponse,
        outputs: &mut L2Outputs,
    ) -> L2State {
        if !l3.valid {
            return Self::fetch_state(pending);
        }
        let data = self.cache.fill(&pending, l3.read_data);
        let victim = pending.victim;
        self.track_inclusion(
            pending.requester,
            pending.access_type,
            victim.index,
            victim.way,
        );
        Self::respond(outputs, pending.requester, data, false);
        L2State::Complete
    }

    fn l3_request(&self) -> PortRequest {
        match &self.state {
            L2State::Evict(pending) | L2State::WaitL3(pending) => {
                pending.writeback_request()
            }
            L2State::ReadMiss(pending) | L2State::WriteMiss(pending) => {
                pending.fetch_request()
            }
            L2State::Idle | L2State::Complete => PortRequest::default(),
        }
    }

    /// Every line in `l1_lines` must be resident here
    pub fn verify_inclusion(&self, l1_lines: &[u8]) -> Result<(), MemoryError> {
        for address in l1_lines {
            if !self.cache.is_in_cache(*address) {
                return Err(MemoryError::CacheInconsistency(
                    2,
                    format!("L1 line {:#04x} is not resident in L2", address),
                ));
            }
        }
        Ok(())
    }
}

impl Clocked for InclusiveCache {
    type Inputs = L2Inputs;
    type Outputs = L2Outputs;

    fn step(&mut self, inputs: L2Inputs) -> L2Outputs {
        let mut outputs = L2Outputs::default();

        let state = self.state;
        self.state = match state {
            L2State::Idle if inputs.l1.is_active() => {
                self.lookup(inputs.l1, Requester::Upper, &mut outputs)
            }
            L2State::Idle => {
                self.lookup(inputs.direct, Requester::Direct, &mut outputs)
            }
            L2State::Evict(pending) if inputs.l3.ready => {
                let victim = pending.victim;
                self.cache.invalidate(victim.index, victim.way);
                trace!("L2 victim {:#04x} accepted by L3", victim.address);
                L2State::WaitL3(pending)
            }
            L2State::WaitL3(pending) if inputs.l3.valid => {
                self.cache.record_eviction();
                debug!(
                    "L2 wrote back {:#04x} = {:#04x}",
                    pending.victim.address, pending.victim.data
                );
                Self::fetch_state(pending)
            }
            L2State::ReadMiss(pending) | L2State::WriteMiss(pending) => {
                self.fill_or_wait(pending, inputs.l3, &mut outputs)
            }
            L2State::Complete => L2State::Idle,
            state => state,
        };

        let ready = self.is_idle();
        outputs.l1.ready = ready;
        outputs.direct.ready = ready;
        outputs.l3 = self.l3_request();
        self.outputs = outputs;
        outputs
    }

    fn outputs(&self) -> L2Outputs {
        self.outputs
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.state = L2State::Idle;
        self.outputs = Self::idle_outputs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ticks L2 against an always-ready lower level that returns
    /// `address ^ 0xff` for every read and records every request
    struct Bench {
        l2: InclusiveCache,
        lower: PortResponse,
        lower_completing: bool,
        lower_log: Vec<PortRequest>,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                l2: InclusiveCache::make(CachePolicy::l2()),
                lower: PortResponse::idle(true),
                lower_completing: false,
                lower_log: Vec::new(),
            }
        }

        fn tick(&mut self, l1: PortRequest, direct: PortRequest) -> L2Outputs {
            let request = self.l2.outputs().l3;
            let out = self.l2.step(L2Inputs { l1, direct, l3: self.lower });
            self.lower = if self.lower_completing {
                self.lower_completing = false;
                PortResponse::idle(true)
            } else if request.is_active() {
                self.lower_log.push(request);
                self.lower_completing = true;
                PortResponse::respond(request.address ^ 0xff)
            } else {
                PortResponse::idle(true)
            };
            out
        }

        fn from_l1(&mut self, request: PortRequest) -> PortResponse {
            while !self.l2.is_idle() {
                self.tick(PortRequest::default(), PortRequest::default());
            }
            for _ in 0..50 {
                let out = self.tick(request, PortRequest::default());
                if out.l1.valid {
                    return out.l1;
                }
            }
            panic!("L2 never answered L1 {:?}", request);
        }

        fn direct(&mut self, request: PortRequest) -> CpuResponse {
            while !self.l2.is_idle() {
                self.tick(PortRequest::default(), PortRequest::default());
            }
            for _ in 0..50 {
                let out = self.tick(PortRequest::default(), request);
                if out.direct.valid {
                    return out.direct;
                }
            }
            panic!("L2 never answered direct {:?}", request);
        }
    }

    #[test]
    fn test_l1_fill_sets_in_l1() {
        let mut bench = Bench::new();
        let response = bench.from_l1(PortRequest::read(0x40));
        assert_eq!(response.read_data, 0x40 ^ 0xff);
        let line = bench.l2.cache.line(0x40).copied().unwrap_or_default();
        assert!(line.valid && line.in_l1 && !line.dirty);
    }

    #[test]
    fn test_l1_eviction_clears_in_l1() {
        let mut bench = Bench::new();
        bench.from_l1(PortRequest::read(0x40));
        // L1 pushes its dirty copy back down
        bench.from_l1(PortRequest::write(0x40, 0x12));
        let line = bench.l2.cache.line(0x40).copied().unwrap_or_default();
        assert!(line.valid && line.dirty && !line.in_l1);
        assert_eq!(line.data, 0x12);
        assert_eq!(bench.l2.cache.history.num_hit, 1);
    }

    #[test]
    fn test_eviction_of_unknown_line_allocates() {
        let mut bench = Bench::new();
        bench.from_l1(PortRequest::write(0x84, 0x31));
        // Write-allocate: the line was fetched first
        assert_eq!(bench.lower_log, vec![PortRequest::read(0x84)]);
        let line = bench.l2.cache.line(0x84).copied().unwrap_or_default();
        assert!(line.valid && line.dirty && !line.in_l1);
        assert_eq!(line.data, 0x31);
    }

    #[test]
    fn test_direct_port() {
        let mut bench = Bench::new();
        let response = bench.direct(PortRequest::write(0x10, 0x66));
        assert!(response.cache_miss);
        let response = bench.direct(PortRequest::read(0x10));
        assert!(response.cache_hit);
        assert_eq!(response.data_out, 0x66);
        // Direct reads also mark the line as handed up
        assert!(bench.l2.cache.line(0x10).is_some_and(|line| line.in_l1));
    }

    #[test]
    fn test_l1_port_has_priority() {
        let mut bench = Bench::new();
        let out = bench.tick(PortRequest::read(0x04), PortRequest::read(0x08));
        assert!(!out.l1.ready);
        assert!(matches!(
            bench.l2.state(),
            L2State::ReadMiss(pending) if pending.address == 0x04
                && pending.requester == Requester::Upper
        ));
    }

    #[test]
    fn test_dirty_victim_goes_to_l3_first() {
        let mut bench = Bench::new();
        // Five lines in set 0 (index bits [4:2]) of a 4-way cache
        let addresses = [0x00, 0x20, 0x40, 0x60];
        for (i, address) in addresses.iter().enumerate() {
            bench.from_l1(PortRequest::write(*address, i as u8 + 1));
        }
        bench.lower_log.clear();
        bench.from_l1(PortRequest::read(0x80));
        // Way 0 (0x00) is the oldest
        assert_eq!(
            bench.lower_log,
            vec![PortRequest::write(0x00, 1), PortRequest::read(0x80)]
        );
        assert_eq!(bench.l2.cache.history.num_eviction, 1);
        assert!(!bench.l2.cache.is_in_cache(0x00));
    }

    #[test]
    fn test_verify_inclusion() {
        let mut bench = Bench::new();
        bench.from_l1(PortRequest::read(0x40));
        assert!(bench.l2.verify_inclusion(&[0x40]).is_ok());
        assert!(matches!(
            bench.l2.verify_inclusion(&[0x44]),
            Err(MemoryError::CacheInconsistency(2, _))
        ));
    }
}
