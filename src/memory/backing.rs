//! Backing store behind the shared L3: a flat byte array
//! answering on the port protocol after a fixed latency

use log::trace;

use super::{Clocked, PortRequest, PortResponse};

const ADDRESS_WIDTH: usize = 8;
pub const MEMORY_SIZE: usize = 1 << ADDRESS_WIDTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemoryState {
    Idle,
    Busy { request: PortRequest, remaining: u32 },
    Complete,
}

/// Backing store
pub struct BackingStore {
    data: Box<[u8; MEMORY_SIZE]>,
    /// Ticks between accepting a request and answering it
    latency: u32,
    state: MemoryState,
    outputs: PortResponse,

    pub num_read: u64,
    pub num_write: u64,
}

impl BackingStore {
    pub fn make(latency: u32) -> Self {
        Self {
            data: Box::new([0; MEMORY_SIZE]),
            latency,
            state: MemoryState::Idle,
            outputs: PortResponse::idle(true),
            num_read: 0,
            num_write: 0,
        }
    }

    /// Get the byte at the given address, bypassing the port
    pub fn get8(&self, address: u8) -> u8 {
        self.data[address as usize]
    }

    /// Set the byte at the given address, bypassing the port
    pub fn set8(&mut self, address: u8, byte: u8) {
        self.data[address as usize] = byte;
    }

    /// Copy `bytes` in starting at `base`, wrapping at the top of memory
    pub fn load(&mut self, base: u8, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.set8(base.wrapping_add(i as u8), *byte);
        }
    }

    fn perform(&mut self, request: PortRequest) -> PortResponse {
        if request.read_enable {
            self.num_read += 1;
            let byte = self.get8(request.address);
            trace!("memory read {:#04x} -> {:#04x}", request.address, byte);
            PortResponse::respond(byte)
        } else {
            self.num_write += 1;
            self.set8(request.address, request.write_data);
            trace!(
                "memory write {:#04x} <- {:#04x}",
                request.address,
                request.write_data
            );
            PortResponse::respond(request.write_data)
        }
    }
}

impl Clocked for BackingStore {
    type Inputs = PortRequest;
    type Outputs = PortResponse;

    fn step(&mut self, request: PortRequest) -> PortResponse {
        let current = self.state;
        let (state, outputs) = match current {
            MemoryState::Idle if request.is_active() => {
                if self.latency == 0 {
                    (MemoryState::Complete, self.perform(request))
                } else {
                    let remaining = self.latency - 1;
                    (MemoryState::Busy { request, remaining }, PortResponse::idle(false))
                }
            }
            MemoryState::Idle => (MemoryState::Idle, PortResponse::idle(true)),
            MemoryState::Busy { request, remaining: 0 } => {
                (MemoryState::Complete, self.perform(request))
            }
            MemoryState::Busy { request, remaining } => (
                MemoryState::Busy { request, remaining: remaining - 1 },
                PortResponse::idle(false),
            ),
            MemoryState::Complete => (MemoryState::Idle, PortResponse::idle(true)),
        };
        self.state = state;
        self.outputs = outputs;
        outputs
    }

    fn outputs(&self) -> PortResponse {
        self.outputs
    }

    fn reset(&mut self) {
        self.state = MemoryState::Idle;
        self.outputs = PortResponse::idle(true);
        self.num_read = 0;
        self.num_write = 0;
    }
}
