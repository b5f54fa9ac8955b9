//! L1 cache, one per core
//!
//! Labelled exclusive: dirty victims are pushed down into L2. L2 keeps
//! its own copy of every line it hands up, though, so L1 contents are
//! always a subset of L2's resident tags rather than a disjoint partition.

use log::{debug, trace};

use super::cache::{Access, Cache, CachePolicy, PendingRequest, Requester};
use super::{AccessType, Clocked, CpuResponse, PortRequest, PortResponse};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L1State {
    Idle,
    ReadMiss(PendingRequest),
    WriteMiss(PendingRequest),
    /// Holding the victim write until L2 is ready
    Evict(PendingRequest),
    /// Victim accepted by L2, waiting for its completion
    WaitL2(PendingRequest),
    /// Response tick; inputs are ignored
    Complete,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L1Inputs {
    pub cpu: PortRequest,
    pub l2: PortResponse,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L1Outputs {
    pub cpu: CpuResponse,
    pub l2: PortRequest,
}

/// Exclusive (by label) L1 cache
pub struct ExclusiveCache {
    pub cache: Cache,
    state: L1State,
    outputs: L1Outputs,
}

impl ExclusiveCache {
    pub fn make(policy: CachePolicy) -> Self {
        let mut l1 = Self {
            cache: Cache::make(policy),
            state: L1State::Idle,
            outputs: L1Outputs::default(),
        };
        l1.outputs.cpu.ready = true;
        l1
    }

    pub fn state(&self) -> &L1State {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == L1State::Idle
    }

    fn fetch_state(pending: PendingRequest) -> L1State {
        match pending.access_type {
            AccessType::Read => L1State::ReadMiss(pending),
            AccessType::Write => L1State::WriteMiss(pending),
        }
    }

    fn lookup(
        &mut self,
        request: PortRequest,
        access_type: AccessType,
        cpu: &mut CpuResponse,
    ) -> L1State {
        match self.cache.access(&request, access_type, Requester::Upper) {
            Access::Hit { data, .. } => {
                trace!("L1 {:?} hit {:#04x}", access_type, request.address);
                *cpu = CpuResponse::hit(data);
                L1State::Complete
            }
            Access::Miss(pending) => {
                debug!(
                    "L1 {:?} miss {:#04x}, victim set {} way {} dirty {}",
                    access_type,
                    request.address,
                    pending.victim.index,
                    pending.victim.way,
                    pending.victim.needs_writeback()
                );
                if pending.victim.needs_writeback() {
                    L1State::Evict(pending)
                } else {
                    Self::fetch_state(pending)
                }
            }
        }
    }

    fn fill_or_wait(
        &mut self,
        pending: PendingRequest,
        l2: PortResponse,
        cpu: &mut CpuResponse,
    ) -> L1State {
        if !l2.valid {
            return Self::fetch_state(pending);
        }
        let data = self.cache.fill(&pending, l2.read_data);
        *cpu = CpuResponse::miss(data);
        L1State::Complete
    }

    fn l2_request(&self) -> PortRequest {
        match &self.state {
            L1State::Evict(pending) | L1State::WaitL2(pending) => {
                pending.writeback_request()
            }
            L1State::ReadMiss(pending) | L1State::WriteMiss(pending) => {
                pending.fetch_request()
            }
            L1State::Idle | L1State::Complete => PortRequest::default(),
        }
    }
}

impl Clocked for ExclusiveCache {
    type Inputs = L1Inputs;
    type Outputs = L1Outputs;

    fn step(&mut self, inputs: L1Inputs) -> L1Outputs {
        let mut cpu = CpuResponse::default();

        let state = self.state;
        self.state = match state {
            L1State::Idle => match inputs.cpu.access_type() {
                Some(access_type) => self.lookup(inputs.cpu, access_type, &mut cpu),
                None => L1State::Idle,
            },
            L1State::Evict(pending) if inputs.l2.ready => {
                let victim = pending.victim;
                self.cache.invalidate(victim.index, victim.way);
                trace!("L1 victim {:#04x} accepted by L2", victim.address);
                L1State::WaitL2(pending)
            }
            L1State::WaitL2(pending) if inputs.l2.valid => {
                self.cache.record_eviction();
                debug!(
                    "L1 wrote back {:#04x} = {:#04x}",
                    pending.victim.address, pending.victim.data
                );
                Self::fetch_state(pending)
            }
            L1State::ReadMiss(pending) | L1State::WriteMiss(pending) => {
                self.fill_or_wait(pending, inputs.l2, &mut cpu)
            }
            L1State::Complete => L1State::Idle,
            state => state,
        };

        cpu.ready = self.is_idle();
        self.outputs = L1Outputs { cpu, l2: self.l2_request() };
        self.outputs
    }

    fn outputs(&self) -> L1Outputs {
        self.outputs
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.state = L1State::Idle;
        self.outputs = L1Outputs::default();
        self.outputs.cpu.ready = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Stand-in for L2: a flat map that answers every request on the
    /// tick after it appears, and logs every request it serves
    struct FlatLower {
        data: HashMap<u8, u8>,
        served: Vec<PortRequest>,
        response: PortResponse,
        completing: bool,
    }

    impl FlatLower {
        fn new() -> Self {
            Self {
                data: HashMap::new(),
                served: Vec::new(),
                response: PortResponse::idle(true),
                completing: false,
            }
        }

        fn step(&mut self, request: PortRequest) -> PortResponse {
            self.response = if self.completing {
                self.completing = false;
                PortResponse::idle(true)
            } else if let Some(access_type) = request.access_type() {
                self.served.push(request);
                self.completing = true;
                match access_type {
                    AccessType::Read => PortResponse::respond(
                        *self.data.get(&request.address).unwrap_or(&0),
                    ),
                    AccessType::Write => {
                        self.data.insert(request.address, request.write_data);
                        PortResponse::respond(request.write_data)
                    }
                }
            } else {
                PortResponse::idle(true)
            };
            self.response
        }
    }

    struct Bench {
        l1: ExclusiveCache,
        lower: FlatLower,
    }

    impl Bench {
        fn new() -> Self {
            Self { l1: ExclusiveCache::make(CachePolicy::l1()), lower: FlatLower::new() }
        }

        fn tick(&mut self, cpu: PortRequest) -> CpuResponse {
            let l1_out = self.l1.outputs();
            let lower_out = self.lower.response;
            let out = self.l1.step(L1Inputs { cpu, l2: lower_out });
            self.lower.step(l1_out.l2);
            out.cpu
        }

        fn run(&mut self, request: PortRequest) -> CpuResponse {
            while !self.l1.outputs().cpu.ready {
                self.tick(PortRequest::default());
            }
            for _ in 0..50 {
                let response = self.tick(request);
                if response.valid {
                    return response;
                }
            }
            panic!("L1 never answered {:?}", request);
        }
    }

    #[test]
    fn test_round_trip() {
        let mut bench = Bench::new();
        bench.run(PortRequest::write(0x2c, 0x5e));
        let response = bench.run(PortRequest::read(0x2c));
        assert!(response.cache_hit);
        assert_eq!(response.data_out, 0x5e);
    }

    #[test]
    fn test_lru_set0() {
        let mut bench = Bench::new();
        assert!(bench.run(PortRequest::write(0x00, 0x11)).cache_miss);
        assert!(bench.run(PortRequest::write(0x08, 0x22)).cache_miss);
        // Two free ways: nothing was written back
        assert_eq!(bench.l1.cache.history.num_eviction, 0);
        assert!(bench.run(PortRequest::read(0x00)).cache_hit);
        // 0x08 is now least recently used and gets evicted
        assert!(bench.run(PortRequest::read(0x10)).cache_miss);
        assert!(bench.l1.cache.is_in_cache(0x00));
        assert!(!bench.l1.cache.is_in_cache(0x08));
        assert!(bench.run(PortRequest::read(0x08)).cache_miss);
    }

    #[test]
    fn test_dirty_victim_written_back_before_fill() {
        let mut bench = Bench::new();
        bench.run(PortRequest::write(0x00, 0xab));
        bench.run(PortRequest::write(0x08, 0xcd));
        bench.lower.served.clear();

        // Set 0 is full; 0x00 is least recently used
        let response = bench.run(PortRequest::read(0x10));
        assert!(response.cache_miss);
        assert_eq!(
            bench.lower.served,
            vec![PortRequest::write(0x00, 0xab), PortRequest::read(0x10)]
        );
        assert_eq!(bench.l1.cache.history.num_eviction, 1);
    }

    #[test]
    fn test_unaligned_victim_keeps_its_address() {
        let mut bench = Bench::new();
        bench.run(PortRequest::write(0x01, 0xab));
        bench.run(PortRequest::write(0x09, 0xcd));
        bench.lower.served.clear();

        bench.run(PortRequest::read(0x10));
        assert_eq!(
            bench.lower.served,
            vec![PortRequest::write(0x01, 0xab), PortRequest::read(0x10)]
        );
        assert_eq!(bench.lower.data.get(&0x01), Some(&0xab));
        assert_eq!(bench.lower.data.get(&0x00), None);
    }

    #[test]
    fn test_clean_victim_is_dropped() {
        let mut bench = Bench::new();
        bench.lower.data.insert(0x00, 0x01);
        bench.run(PortRequest::read(0x00));
        bench.run(PortRequest::read(0x08));
        bench.lower.served.clear();
        bench.run(PortRequest::read(0x10));
        assert_eq!(bench.lower.served, vec![PortRequest::read(0x10)]);
        assert_eq!(bench.l1.cache.history.num_eviction, 0);
    }

    #[test]
    fn test_counters_match_lookups() {
        let mut bench = Bench::new();
        let addresses = [0x00, 0x08, 0x10, 0x00, 0x02, 0x08, 0x02, 0x18];
        for (i, address) in addresses.iter().enumerate() {
            if i % 2 == 0 {
                bench.run(PortRequest::write(*address, i as u8));
            } else {
                bench.run(PortRequest::read(*address));
            }
        }
        let history = bench.l1.cache.history;
        assert_eq!(history.lookups(), addresses.len() as u64);
    }

    #[test]
    fn test_not_ready_while_busy() {
        let mut bench = Bench::new();
        let response = bench.tick(PortRequest::read(0x40));
        assert!(!response.ready && !response.valid);
        assert!(matches!(bench.l1.state(), L1State::ReadMiss(_)));
    }
}
