//! Per-core cache hierarchy controller: one L1 wired to one L2

use log::trace;

use super::cache::CachePolicy;
use super::exclusive::{ExclusiveCache, L1Inputs};
use super::inclusive::{InclusiveCache, L2Inputs};
use super::{Clocked, CoreId, CpuResponse, PortRequest, PortResponse};
use crate::error::MemoryError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessPattern {
    #[default]
    Random,
    Sequential,
    Stride2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatternCounts {
    pub random: u64,
    pub sequential: u64,
    pub stride2: u64,
}

/// Classifies each accepted CPU address by its distance
/// from the previous one
#[derive(Clone, Debug, Default)]
pub struct AccessPatternClassifier {
    last_address: Option<u8>,
    pub counts: PatternCounts,
}

impl AccessPatternClassifier {
    pub fn classify(&mut self, address: u8) -> AccessPattern {
        let pattern = match self.last_address.map(|last| address.wrapping_sub(last)) {
            Some(1) => AccessPattern::Sequential,
            Some(2) => AccessPattern::Stride2,
            _ => AccessPattern::Random,
        };
        match pattern {
            AccessPattern::Random => self.counts.random += 1,
            AccessPattern::Sequential => self.counts.sequential += 1,
            AccessPattern::Stride2 => self.counts.stride2 += 1,
        }
        self.last_address = Some(address);
        pattern
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerInputs {
    pub cpu: PortRequest,
    pub l3: PortResponse,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerOutputs {
    pub cpu: CpuResponse,
    pub l3: PortRequest,
}

/// One core's private L1 and L2. The L2 bypass port is tied idle.
pub struct CacheHierarchyController {
    pub core: CoreId,
    pub l1: ExclusiveCache,
    pub l2: InclusiveCache,
    pub classifier: AccessPatternClassifier,
}

impl CacheHierarchyController {
    pub fn make(core: CoreId, l1: CachePolicy, l2: CachePolicy) -> Self {
        Self {
            core,
            l1: ExclusiveCache::make(l1),
            l2: InclusiveCache::make(l2),
            classifier: AccessPatternClassifier::default(),
        }
    }

    /// Every valid L1 line must also be valid in L2
    pub fn verify_inclusion(&self) -> Result<(), MemoryError> {
        self.l2.verify_inclusion(&self.l1.cache.resident_addresses())
    }
}

impl Clocked for CacheHierarchyController {
    type Inputs = ControllerInputs;
    type Outputs = ControllerOutputs;

    fn step(&mut self, inputs: ControllerInputs) -> ControllerOutputs {
        // Both levels see what the other registered last tick
        let l1_out = self.l1.outputs();
        let l2_out = self.l2.outputs();

        if self.l1.is_idle() && inputs.cpu.is_active() {
            let pattern = self.classifier.classify(inputs.cpu.address);
            trace!(
                "core {} access {:#04x} classified {:?}",
                self.core,
                inputs.cpu.address,
                pattern
            );
        }

        let l1_next = self.l1.step(L1Inputs { cpu: inputs.cpu, l2: l2_out.l1 });
        let l2_next = self.l2.step(L2Inputs {
            l1: l1_out.l2,
            direct: PortRequest::default(),
            l3: inputs.l3,
        });

        ControllerOutputs { cpu: l1_next.cpu, l3: l2_next.l3 }
    }

    fn outputs(&self) -> ControllerOutputs {
        ControllerOutputs {
            cpu: self.l1.outputs().cpu,
            l3: self.l2.outputs().l3,
        }
    }

    fn reset(&mut self) {
        self.l1.reset();
        self.l2.reset();
        self.classifier = AccessPatternClassifier::default();
    }
}
