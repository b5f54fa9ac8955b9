//! Four-core system: per-core L1/L2 controllers, the shared L3 and the
//! backing store, advanced in lock-step by one scheduler

use std::collections::VecDeque;

use log::{debug, info};

use crate::error::{MemoryError, SimulatorError, SimulatorResult};
use crate::memory::backing::BackingStore;
use crate::memory::cache::{CacheHistory, CachePolicy};
use crate::memory::hierarchy::{
    CacheHierarchyController, ControllerInputs, PatternCounts,
};
use crate::memory::shared::{L3Inputs, SharedCache};
use crate::memory::{
    AccessType, Clocked, CoreId, CpuResponse, PortRequest, NUM_CORES,
};

/// Hierarchy configuration
#[derive(Clone, Copy, Debug)]
pub struct HierarchyPolicy {
    pub l1: CachePolicy,
    pub l2: CachePolicy,
    pub l3: CachePolicy,
    /// Backing store latency in ticks
    pub memory_latency: u32,
    /// Ticks one access may take before the driver gives up
    pub max_stall_cycles: u64,
}

impl Default for HierarchyPolicy {
    fn default() -> Self {
        Self {
            l1: CachePolicy::l1(),
            l2: CachePolicy::l2(),
            l3: CachePolicy::l3(),
            memory_latency: 1,
            max_stall_cycles: 1000,
        }
    }
}

impl HierarchyPolicy {
    pub fn validate(&self) -> SimulatorResult<()> {
        self.l1.validate(1)?;
        self.l2.validate(2)?;
        self.l3.validate(3)?;
        if self.max_stall_cycles == 0 {
            return Err(SimulatorError::ConfigError(
                "max_stall_cycles must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One CPU-side operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operation {
    pub core: CoreId,
    pub access_type: AccessType,
    pub address: u8,
    pub data: u8,
}

impl Operation {
    pub fn read(core: CoreId, address: u8) -> Self {
        Self { core, access_type: AccessType::Read, address, data: 0 }
    }

    pub fn write(core: CoreId, address: u8, data: u8) -> Self {
        Self { core, access_type: AccessType::Write, address, data }
    }

    pub fn request(&self) -> PortRequest {
        PortRequest::make(self.access_type, self.address, self.data)
    }
}

/// A finished operation as seen by the CPU
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub operation: Operation,
    pub data: u8,
    pub hit: bool,
    pub issued_at: u64,
    pub completed_at: u64,
}

impl Completion {
    pub fn latency(&self) -> u64 {
        self.completed_at - self.issued_at
    }
}

/// Read-only snapshot of every statistics counter
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HierarchyStats {
    pub cycles: u64,
    pub l1: Vec<CacheHistory>,
    pub l2: Vec<CacheHistory>,
    pub l3: CacheHistory,
    pub l3_grants: [u64; NUM_CORES],
    pub patterns: Vec<PatternCounts>,
    pub memory_reads: u64,
    pub memory_writes: u64,
}

pub struct MulticoreSystem {
    pub policy: HierarchyPolicy,
    pub cores: Vec<CacheHierarchyController>,
    pub l3: SharedCache,
    pub memory: BackingStore,

    /// What each CPU drives onto its L1 port
    cpu_requests: [PortRequest; NUM_CORES],
    cycle: u64,
}

impl MulticoreSystem {
    pub fn make(policy: HierarchyPolicy) -> SimulatorResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            cores: (0..NUM_CORES)
                .map(|core| CacheHierarchyController::make(core, policy.l1, policy.l2))
                .collect(),
            l3: SharedCache::make(policy.l3),
            memory: BackingStore::make(policy.memory_latency),
            cpu_requests: [PortRequest::default(); NUM_CORES],
            cycle: 0,
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advances every component by one tick. All inputs are taken from
    /// the outputs registered on the previous tick.
    pub fn tick(&mut self) {
        let l3_out = self.l3.outputs();
        let memory_out = self.memory.outputs();
        let mut l3_requests = [PortRequest::default(); NUM_CORES];

        for (core, controller) in self.cores.iter_mut().enumerate() {
            l3_requests[core] = controller.outputs().l3;
            controller.step(ControllerInputs {
                cpu: self.cpu_requests[core],
                l3: l3_out.cores[core],
            });
        }
        self.l3.step(L3Inputs { cores: l3_requests, memory: memory_out });
        self.memory.step(l3_out.memory);

        self.cycle += 1;
    }

    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    fn check_core(core: CoreId) -> SimulatorResult<()> {
        if core < NUM_CORES {
            Ok(())
        } else {
            Err(MemoryError::InvalidCore(core).into())
        }
    }

    /// CPU-side outputs of a core's L1 after the last tick
    pub fn cpu_response(&self, core: CoreId) -> SimulatorResult<CpuResponse> {
        Self::check_core(core)?;
        Ok(self.cores[core].outputs().cpu)
    }

    fn stalled(&self, operation: &Operation, since: u64) -> SimulatorResult<()> {
        let cycles = self.cycle - since;
        if cycles > self.policy.max_stall_cycles {
            return Err(MemoryError::Stalled {
                core: operation.core,
                address: operation.address,
                cycles,
            }
            .into());
        }
        Ok(())
    }

    /// Runs one operation to completion while every other core idles
    pub fn access(&mut self, operation: Operation) -> SimulatorResult<Completion> {
        let completions = self.run_operations(&[operation])?;
        Ok(completions[0])
    }

    pub fn read(&mut self, core: CoreId, address: u8) -> SimulatorResult<u8> {
        Ok(self.access(Operation::read(core, address))?.data)
    }

    pub fn write(&mut self, core: CoreId, address: u8, data: u8) -> SimulatorResult<()> {
        self.access(Operation::write(core, address, data))?;
        Ok(())
    }

    /// Runs every core's operations concurrently. Each core issues its own
    /// operations in order, one at a time, whenever its L1 is ready.
    /// Completions are returned in the order they finished.
    pub fn run_operations(
        &mut self,
        operations: &[Operation],
    ) -> SimulatorResult<Vec<Completion>> {
        let mut queues: Vec<VecDeque<Operation>> = vec![VecDeque::new(); NUM_CORES];
        for operation in operations {
            Self::check_core(operation.core)?;
            queues[operation.core].push_back(*operation);
        }

        let mut in_flight: [Option<(Operation, u64)>; NUM_CORES] = [None; NUM_CORES];
        let mut completions = Vec::with_capacity(operations.len());

        while completions.len() < operations.len() {
            for core in 0..NUM_CORES {
                if in_flight[core].is_none() && self.cpu_response(core)?.ready {
                    if let Some(operation) = queues[core].pop_front() {
                        debug!("cycle {}: core {} issues {:?}", self.cycle, core, operation);
                        self.cpu_requests[core] = operation.request();
                        in_flight[core] = Some((operation, self.cycle));
                    }
                }
            }

            self.tick();

            for core in 0..NUM_CORES {
                let Some((operation, issued_at)) = in_flight[core] else {
                    continue;
                };
                let response = self.cpu_response(core)?;
                if response.valid {
                    self.cpu_requests[core] = PortRequest::default();
                    in_flight[core] = None;
                    completions.push(Completion {
                        operation,
                        data: response.data_out,
                        hit: response.cache_hit,
                        issued_at,
                        completed_at: self.cycle,
                    });
                } else if let Err(e) = self.stalled(&operation, issued_at) {
                    // Abandoned requests must not be accepted again
                    self.cpu_requests = [PortRequest::default(); NUM_CORES];
                    return Err(e);
                }
            }
        }

        Ok(completions)
    }

    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            cycles: self.cycle,
            l1: self.cores.iter().map(|core| core.l1.cache.history).collect(),
            l2: self.cores.iter().map(|core| core.l2.cache.history).collect(),
            l3: self.l3.cache.history,
            l3_grants: self.l3.arbiter.grants(),
            patterns: self.cores.iter().map(|core| core.classifier.counts).collect(),
            memory_reads: self.memory.num_read,
            memory_writes: self.memory.num_write,
        }
    }

    /// Checks that every core's L1 lines are resident in its L2
    pub fn verify_inclusion(&self) -> SimulatorResult<()> {
        for core in &self.cores {
            core.verify_inclusion()?;
        }
        Ok(())
    }

    /// Clears every cache, counter and in-flight request.
    /// Backing store contents are kept.
    pub fn reset(&mut self) {
        for core in self.cores.iter_mut() {
            core.reset();
        }
        self.l3.reset();
        self.memory.reset();
        self.cpu_requests = [PortRequest::default(); NUM_CORES];
        self.cycle = 0;
        info!("system reset");
    }
}
