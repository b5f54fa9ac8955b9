//! Memory hierarchy
//!
//! Every level is a clocked component: `step` consumes the signals its
//! neighbours registered on the previous tick and returns the signals it
//! registers for the next one. Levels talk to each other only through
//! the port types below.

pub mod arbiter;
pub mod backing;
pub mod cache;
pub mod exclusive;
pub mod hierarchy;
pub mod inclusive;
pub mod shared;

use crate::error::{MemoryError, MemoryErrorKind};

pub const NUM_CORES: usize = 4;

pub type CoreId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    /// Resolves a pair of enables. Read wins when both are asserted.
    pub fn from_enables(read_enable: bool, write_enable: bool) -> Option<Self> {
        if read_enable {
            Some(AccessType::Read)
        } else if write_enable {
            Some(AccessType::Write)
        } else {
            None
        }
    }
}

/// Request half of a port
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortRequest {
    pub address: u8,
    pub read_enable: bool,
    pub write_enable: bool,
    pub write_data: u8,
}

impl PortRequest {
    pub fn read(address: u8) -> Self {
        Self { address, read_enable: true, ..Default::default() }
    }

    pub fn write(address: u8, write_data: u8) -> Self {
        Self { address, write_enable: true, write_data, ..Default::default() }
    }

    pub fn make(access_type: AccessType, address: u8, write_data: u8) -> Self {
        match access_type {
            AccessType::Read => Self::read(address),
            AccessType::Write => Self::write(address, write_data),
        }
    }

    pub fn is_active(&self) -> bool {
        self.read_enable || self.write_enable
    }

    pub fn access_type(&self) -> Option<AccessType> {
        AccessType::from_enables(self.read_enable, self.write_enable)
    }
}

/// Response half of a port. `valid` pulses for one tick,
/// `ready` is held while the responder can take a new request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortResponse {
    pub read_data: u8,
    pub valid: bool,
    pub ready: bool,
}

impl PortResponse {
    pub fn respond(read_data: u8) -> Self {
        Self { read_data, valid: true, ready: false }
    }

    pub fn idle(ready: bool) -> Self {
        Self { ready, ..Default::default() }
    }
}

/// CPU-facing response of a cache, with the hit/miss flags of the
/// access that just completed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuResponse {
    pub data_out: u8,
    pub valid: bool,
    pub ready: bool,
    pub cache_hit: bool,
    pub cache_miss: bool,
}

impl CpuResponse {
    pub fn hit(data_out: u8) -> Self {
        Self { data_out, valid: true, cache_hit: true, ..Default::default() }
    }

    pub fn miss(data_out: u8) -> Self {
        Self { data_out, valid: true, cache_miss: true, ..Default::default() }
    }
}

/// A synchronous component advanced once per clock tick
pub trait Clocked {
    type Inputs;
    type Outputs: Copy;

    /// Advances one tick and returns the newly registered outputs
    fn step(&mut self, inputs: Self::Inputs) -> Self::Outputs;

    /// Outputs registered by the last tick
    fn outputs(&self) -> Self::Outputs;

    fn reset(&mut self);
}

/// Narrows a wide address, rejecting anything outside 8 bits
pub fn to_address(value: u32) -> Result<u8, MemoryError> {
    u8::try_from(value).map_err(|_| MemoryError::AccessError {
        address: value,
        kind: MemoryErrorKind::OutOfBounds,
    })
}

pub fn to_data(value: u32) -> Result<u8, MemoryError> {
    u8::try_from(value).map_err(|_| MemoryError::AccessError {
        address: value,
        kind: MemoryErrorKind::InvalidData(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_wins_over_write() {
        // Nothing upstream ever asserts both enables; read priority is
        // kept as an assumption rather than a confirmed requirement.
        let request = PortRequest {
            address: 0x10,
            read_enable: true,
            write_enable: true,
            write_data: 0xee,
        };
        assert_eq!(request.access_type(), Some(AccessType::Read));
        assert_eq!(AccessType::from_enables(false, true), Some(AccessType::Write));
        assert_eq!(AccessType::from_enables(false, false), None);
    }

    #[test]
    fn test_address_width() {
        assert_eq!(to_address(0xff).ok(), Some(0xff));
        assert!(matches!(
            to_address(0x100),
            Err(MemoryError::AccessError { address: 0x100, .. })
        ));
        assert!(to_data(0x1ff).is_err());
    }

    #[test]
    fn test_port_request_builders() {
        let write = PortRequest::make(AccessType::Write, 0x42, 0x99);
        assert!(write.write_enable && !write.read_enable);
        assert_eq!(write.write_data, 0x99);
        assert!(!PortRequest::default().is_active());
    }
}
