//! Tag/data arrays, replacement state and miss bookkeeping
//! shared by every cache level

use log::trace;

use super::{AccessType, CoreId, PortRequest};
use crate::error::{SimulatorError, SimulatorResult};

/// Width of a physical address
pub const ADDRESS_BITS: usize = 8;

pub fn get_log_2(value: usize) -> usize {
    assert!(value > 0);
    (usize::BITS - 1 - value.leading_zeros()) as usize
}

pub fn is_pow_2(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub fn get_mask(bits: usize) -> u8 {
    ((1u16 << bits) - 1) as u8
}

/// Replacement metadata encoding of a level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// One bit per set naming the most recently used of two ways
    LruBit,
    /// One saturating age counter per way, 0 = most recently used
    LruCounter { bits: u32 },
}

/// Geometry and replacement encoding of one cache level.
///
/// An address is split as `| tag | index | offset |` where the
/// offset is `log2(ways)` bits wide by default. Lines hold a single
/// byte and keep their offset, so addresses that differ only in their
/// offset are distinct lines competing for the same set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub sets: usize,
    pub ways: usize,
    pub offset_bits: usize,
    pub replacement: Replacement,
}

impl CachePolicy {
    pub fn make(sets: usize, ways: usize, replacement: Replacement) -> Self {
        Self {
            sets,
            ways,
            offset_bits: if is_pow_2(ways) { get_log_2(ways) } else { 0 },
            replacement,
        }
    }

    /// 4 sets, 2 ways, one LRU bit per set
    pub fn l1() -> Self {
        Self::make(4, 2, Replacement::LruBit)
    }

    /// 8 sets, 4 ways, 2-bit age counters
    pub fn l2() -> Self {
        Self::make(8, 4, Replacement::LruCounter { bits: 2 })
    }

    /// 16 sets, 8 ways, 3-bit age counters
    pub fn l3() -> Self {
        Self::make(16, 8, Replacement::LruCounter { bits: 3 })
    }

    pub fn index_bits(&self) -> usize {
        get_log_2(self.sets)
    }

    pub fn is_valid(&self) -> bool {
        // Set count must be a power of 2
        if !is_pow_2(self.sets) {
            return false;
        }
        if self.ways == 0 {
            return false;
        }
        // Index and offset must leave room for at least one tag bit
        if self.offset_bits + self.index_bits() >= ADDRESS_BITS {
            return false;
        }
        match self.replacement {
            Replacement::LruBit => self.ways == 2,
            Replacement::LruCounter { bits } => {
                (1..=7).contains(&bits) && (1usize << bits) >= self.ways
            }
        }
    }

    pub fn validate(&self, level: usize) -> SimulatorResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SimulatorError::ConfigError(format!(
                "L{} policy is not realizable: {:?}",
                level, self
            )))
        }
    }
}

/// Per-set replacement state
#[derive(Clone, Debug, PartialEq)]
pub enum LruState {
    /// Way most recently touched; the other way is the victim
    Bit(usize),
    Counters { ages: Vec<u8>, max: u8 },
}

impl LruState {
    pub fn make(replacement: Replacement, ways: usize) -> Self {
        match replacement {
            Replacement::LruBit => LruState::Bit(0),
            Replacement::LruCounter { bits } => LruState::Counters {
                ages: vec![0; ways],
                max: get_mask(bits as usize),
            },
        }
    }

    pub fn victim_way(&self) -> usize {
        match self {
            LruState::Bit(mru) => 1 - mru,
            LruState::Counters { ages, .. } => find_lru_way(ages),
        }
    }

    pub fn touch(&mut self, way: usize) {
        match self {
            LruState::Bit(mru) => *mru = way,
            LruState::Counters { ages, max } => update_lru(ages, way, *max),
        }
    }
}

/// The way with the strictly largest age; ties go to the lowest index
pub fn find_lru_way(ages: &[u8]) -> usize {
    let mut result = 0;
    for (way, age) in ages.iter().enumerate() {
        if *age > ages[result] {
            result = way;
        }
    }
    result
}

/// Resets `way` to most recently used and ages every other way,
/// clamping at `max`
pub fn update_lru(ages: &mut [u8], way: usize, max: u8) {
    for (i, age) in ages.iter_mut().enumerate() {
        if i == way {
            *age = 0;
        } else if *age < max {
            *age += 1;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    pub tag: u8,
    pub offset: u8,
    pub valid: bool,
    pub dirty: bool,
    pub data: u8,
    /// Only meaningful in L2: the line was last handed to L1
    pub in_l1: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheSet {
    pub lines: Vec<CacheLine>,
    pub lru: LruState,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
    pub num_eviction: u64,
}

impl CacheHistory {
    pub fn lookups(&self) -> u64 {
        self.num_hit + self.num_miss
    }

    pub fn get_hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.num_hit as f64 / n as f64,
        }
    }
}

/// Line chosen to make room for a miss
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Victim {
    pub index: usize,
    pub way: usize,
    pub address: u8,
    pub data: u8,
    pub valid: bool,
    pub dirty: bool,
}

impl Victim {
    pub fn needs_writeback(&self) -> bool {
        self.valid && self.dirty
    }
}

/// Who a level is serving a request for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requester {
    /// The single port from the level above (the CPU for L1, L1 for L2)
    Upper,
    /// The L2 bypass port
    Direct,
    /// One of the L3 core ports
    Core(CoreId),
}

/// An in-flight miss, kept until its fill completes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub address: u8,
    pub access_type: AccessType,
    pub write_data: u8,
    pub requester: Requester,
    pub victim: Victim,
}

impl PendingRequest {
    pub fn requesting_core(&self) -> Option<CoreId> {
        match self.requester {
            Requester::Core(core) => Some(core),
            _ => None,
        }
    }

    /// Write of the victim toward the next level
    pub fn writeback_request(&self) -> PortRequest {
        PortRequest::write(self.victim.address, self.victim.data)
    }

    /// Write-allocate: both reads and writes fetch first
    pub fn fetch_request(&self) -> PortRequest {
        PortRequest::read(self.address)
    }
}

/// Outcome of a lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Hit { data: u8, index: usize, way: usize },
    Miss(PendingRequest),
}

/// Tag, data and replacement arrays of one level
pub struct Cache {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    offset_bits: usize,
    index_bits: usize,

    pub index_mask: u8,
    pub tag_mask: u8,

    pub sets: Vec<CacheSet>,
}

impl Cache {
    pub fn make(policy: CachePolicy) -> Self {
        assert!(policy.is_valid());

        let offset_bits = policy.offset_bits;
        let index_bits = policy.index_bits();

        Self {
            policy,
            history: CacheHistory::default(),
            offset_bits,
            index_bits,
            index_mask: get_mask(index_bits),
            tag_mask: get_mask(ADDRESS_BITS - offset_bits - index_bits),
            sets: Self::empty_sets(&policy),
        }
    }

    fn empty_sets(policy: &CachePolicy) -> Vec<CacheSet> {
        (0..policy.sets)
            .map(|_| CacheSet {
                lines: vec![CacheLine::default(); policy.ways],
                lru: LruState::make(policy.replacement, policy.ways),
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.sets = Self::empty_sets(&self.policy);
        self.history = CacheHistory::default();
    }

    pub fn get_index(&self, address: u8) -> usize {
        ((address >> self.offset_bits) & self.index_mask) as usize
    }

    pub fn get_offset(&self, address: u8) -> u8 {
        address & get_mask(self.offset_bits)
    }

    pub fn get_tag(&self, address: u8) -> u8 {
        (((address as u16) >> (self.offset_bits + self.index_bits)) as u8)
            & self.tag_mask
    }

    /// Full address of the byte held at `tag`/`index`/`offset`
    pub fn get_address(&self, tag: u8, index: usize, offset: u8) -> u8 {
        ((tag as u16) << (self.offset_bits + self.index_bits)) as u8
            | ((index as u8) << self.offset_bits)
            | offset
    }

    /// Way holding `address`, without touching statistics or LRU state
    pub fn lookup(&self, address: u8) -> Option<usize> {
        let tag = self.get_tag(address);
        let offset = self.get_offset(address);
        self.sets[self.get_index(address)]
            .lines
            .iter()
            .position(|line| line.valid && line.tag == tag && line.offset == offset)
    }

    pub fn line(&self, address: u8) -> Option<&CacheLine> {
        let index = self.get_index(address);
        self.lookup(address).map(|way| &self.sets[index].lines[way])
    }

    pub fn line_mut(&mut self, index: usize, way: usize) -> &mut CacheLine {
        &mut self.sets[index].lines[way]
    }

    pub fn is_in_cache(&self, address: u8) -> bool {
        self.lookup(address).is_some()
    }

    /// Addresses of every valid line
    pub fn resident_addresses(&self) -> Vec<u8> {
        let mut addresses = Vec::new();
        for (index, set) in self.sets.iter().enumerate() {
            for line in set.lines.iter().filter(|line| line.valid) {
                addresses.push(self.get_address(line.tag, index, line.offset));
            }
        }
        addresses
    }

    pub fn select_victim(&self, address: u8) -> Victim {
        let index = self.get_index(address);
        let set = &self.sets[index];
        let way = set.lru.victim_way();
        let line = &set.lines[way];
        Victim {
            index,
            way,
            address: self.get_address(line.tag, index, line.offset),
            data: line.data,
            valid: line.valid,
            dirty: line.dirty,
        }
    }

    /// Looks up `address` and performs the access on a hit.
    /// Every call counts as exactly one hit or one miss.
    pub fn access(
        &mut self,
        request: &PortRequest,
        access_type: AccessType,
        requester: Requester,
    ) -> Access {
        let address = request.address;
        match self.lookup(address) {
            Some(way) => {
                self.history.num_hit += 1;
                let index = self.get_index(address);
                let set = &mut self.sets[index];
                let line = &mut set.lines[way];
                if access_type == AccessType::Write {
                    line.data = request.write_data;
                    line.dirty = true;
                }
                let data = line.data;
                set.lru.touch(way);
                Access::Hit { data, index, way }
            }
            None => {
                self.history.num_miss += 1;
                Access::Miss(PendingRequest {
                    address,
                    access_type,
                    write_data: request.write_data,
                    requester,
                    victim: self.select_victim(address),
                })
            }
        }
    }

    /// Drops the victim line once its write-back has been accepted
    pub fn invalidate(&mut self, index: usize, way: usize) {
        let line = self.line_mut(index, way);
        line.valid = false;
        line.dirty = false;
    }

    pub fn record_eviction(&mut self) {
        self.history.num_eviction += 1;
    }

    /// Installs the fetched (or written) byte into the victim way
    /// and returns the byte now held by the line
    pub fn fill(&mut self, pending: &PendingRequest, fetched: u8) -> u8 {
        let tag = self.get_tag(pending.address);
        let offset = self.get_offset(pending.address);
        let Victim { index, way, .. } = pending.victim;
        let data = match pending.access_type {
            AccessType::Read => fetched,
            AccessType::Write => pending.write_data,
        };
        let set = &mut self.sets[index];
        set.lines[way] = CacheLine {
            tag,
            offset,
            valid: true,
            dirty: pending.access_type == AccessType::Write,
            data,
            in_l1: false,
        };
        set.lru.touch(way);
        trace!(
            "fill {:#04x} into set {} way {} (data {:#04x})",
            pending.address,
            index,
            way,
            data
        );
        data
    }
}
