//! L3 cache shared by every core
//!
//! Four symmetric core ports are arbitrated round-robin; only the
//! granted core's request occupies the L3 and backing-store datapath
//! until its response has been sent.

use log::{debug, trace};

use super::arbiter::RoundRobinArbiter;
use super::cache::{Access, Cache, CachePolicy, PendingRequest, Requester};
use super::{AccessType, Clocked, CoreId, PortRequest, PortResponse, NUM_CORES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L3State {
    Idle,
    ReadMiss(PendingRequest),
    WriteMiss(PendingRequest),
    Evict(PendingRequest),
    WaitMem(PendingRequest),
    Complete,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L3Inputs {
    pub cores: [PortRequest; NUM_CORES],
    pub memory: PortResponse,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L3Outputs {
    pub cores: [PortResponse; NUM_CORES],
    pub memory: PortRequest,
}

/// Shared L3 cache with its round-robin arbiter
pub struct SharedCache {
    pub cache: Cache,
    pub arbiter: RoundRobinArbiter,
    state: L3State,
    outputs: L3Outputs,
}

impl SharedCache {
    pub fn make(policy: CachePolicy) -> Self {
        Self {
            cache: Cache::make(policy),
            arbiter: RoundRobinArbiter::new(),
            state: L3State::Idle,
            outputs: Self::idle_outputs(),
        }
    }

    fn idle_outputs() -> L3Outputs {
        L3Outputs {
            cores: [PortResponse::idle(true); NUM_CORES],
            memory: PortRequest::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == L3State::Idle
    }

    /// Core whose request currently occupies the L3
    pub fn serving(&self) -> Option<CoreId> {
        match &self.state {
            L3State::ReadMiss(pending)
            | L3State::WriteMiss(pending)
            | L3State::Evict(pending)
            | L3State::WaitMem(pending) => pending.requesting_core(),
            L3State::Idle | L3State::Complete => None,
        }
    }

    fn fetch_state(pending: PendingRequest) -> L3State {
        match pending.access_type {
            AccessType::Read => L3State::ReadMiss(pending),
            AccessType::Write => L3State::WriteMiss(pending),
        }
    }

    fn arbitrate(
        &mut self,
        requests: &[PortRequest; NUM_CORES],
        outputs: &mut L3Outputs,
    ) -> L3State {
        let pending = requests.map(|request| request.is_active());
        let Some(core) = self.arbiter.grant(pending) else {
            return L3State::Idle;
        };
        let request = requests[core];
        let Some(access_type) = request.access_type() else {
            return L3State::Idle;
        };
        match self.cache.access(&request, access_type, Requester::Core(core)) {
            Access::Hit { data, .. } => {
                trace!(
                    "L3 {:?} hit {:#04x} for core {}",
                    access_type,
                    request.address,
                    core
                );
                outputs.cores[core] = PortResponse::respond(data);
                L3State::Complete
            }
            Access::Miss(pending) => {
                debug!(
                    "L3 {:?} miss {:#04x} for core {}, victim set {} way {} dirty {}",
                    access_type,
                    request.address,
                    core,
                    pending.victim.index,
                    pending.victim.way,
                    pending.victim.needs_writeback()
                );
                if pending.victim.needs_writeback() {
                    L3State::Evict(pending)
                } else {
                    Self::fetch_state(pending)
                }
            }
        }
    }

    fn fill_or_wait(
        &mut self,
        pending: PendingRequest,
        memory: PortResponse,
        outputs: &mut L3Outputs,
    ) -> L3State {
        if !memory.valid {
            return Self::fetch_state(pending);
        }
        let data = self.cache.fill(&pending, memory.read_data);
        if let Some(core) = pending.requesting_core() {
            outputs.cores[core] = PortResponse::respond(data);
        }
        L3State::Complete
    }

    fn memory_request(&self) -> PortRequest {
        match &self.state {
            L3State::Evict(pending) | L3State::WaitMem(pending) => {
                pending.writeback_request()
            }
            L3State::ReadMiss(pending) | L3State::WriteMiss(pending) => {
                pending.fetch_request()
            }
            L3State::Idle | L3State::Complete => PortRequest::default(),
        }
    }
}

impl Clocked for SharedCache {
    type Inputs = L3Inputs;
    type Outputs = L3Outputs;

    fn step(&mut self, inputs: L3Inputs) -> L3Outputs {
        let mut outputs = L3Outputs::default();

        let state = self.state;
        self.state = match state {
            L3State::Idle => self.arbitrate(&inputs.cores, &mut outputs),
            L3State::Evict(pending) if inputs.memory.ready => {
                let victim = pending.victim;
                self.cache.invalidate(victim.index, victim.way);
                trace!("L3 victim {:#04x} accepted by memory", victim.address);
                L3State::WaitMem(pending)
            }
            L3State::WaitMem(pending) if inputs.memory.valid => {
                self.cache.record_eviction();
                debug!(
                    "L3 wrote back {:#04x} = {:#04x}",
                    pending.victim.address, pending.victim.data
                );
                Self::fetch_state(pending)
            }
            L3State::ReadMiss(pending) | L3State::WriteMiss(pending) => {
                self.fill_or_wait(pending, inputs.memory, &mut outputs)
            }
            L3State::Complete => L3State::Idle,
            state => state,
        };

        let ready = self.is_idle();
        for port in outputs.cores.iter_mut() {
            port.ready = ready;
        }
        outputs.memory = self.memory_request();
        self.outputs = outputs;
        outputs
    }

    fn outputs(&self) -> L3Outputs {
        self.outputs
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.arbiter.reset();
        self.state = L3State::Idle;
        self.outputs = Self::idle_outputs();
    }
}
