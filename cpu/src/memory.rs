//! Hub memory.
//!
//! The hub has 64KiB of memory: 32KiB of RAM starting at address 0
//! followed by 32KiB of ROM.  Only sixteen address lines exist, so
//! every address is truncated to 16 bits.  Word accesses ignore the
//! lowest address bit and long accesses the lowest two; they are
//! little-endian.
//!
//! Cogs write through the `write_*` methods, which ignore writes to
//! ROM just as the hardware does.  The `direct_write_*` methods are
//! for tooling (for example loading the ROM contents) and can write
//! anywhere.  A [`HubCursor`] walks memory sequentially on behalf of
//! such tools.
use std::fmt::{self, Debug, Formatter};

pub const HUB_MEMORY_SIZE: usize = 0x1_0000;
pub const ROM_BASE: u32 = 0x8000;
const ADDRESS_MASK: u32 = 0xFFFF;

pub(crate) struct HubMemory {
    bytes: Vec<u8>,
}

impl Debug for HubMemory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("HubMemory")
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

fn byte_index(address: u32) -> usize {
    (address & ADDRESS_MASK) as usize
}

fn word_index(address: u32) -> usize {
    (address & ADDRESS_MASK & !1) as usize
}

fn long_index(address: u32) -> usize {
    (address & ADDRESS_MASK & !3) as usize
}

fn is_rom(index: usize) -> bool {
    index >= ROM_BASE as usize
}

impl HubMemory {
    #[must_use]
    pub fn new() -> HubMemory {
        HubMemory {
            bytes: vec![0; HUB_MEMORY_SIZE],
        }
    }

    /// Zeroes all of RAM.  ROM is left alone.
    pub fn clear_ram(&mut self) {
        self.bytes[..ROM_BASE as usize].fill(0);
    }

    /// Copies `image` into RAM starting at address 0.  Any part of the
    /// image which would not fit in RAM is ignored; the number of
    /// bytes copied is returned.
    pub fn load_ram(&mut self, image: &[u8]) -> usize {
        let len = image.len().min(ROM_BASE as usize);
        self.bytes[..len].copy_from_slice(&image[..len]);
        len
    }

    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        self.bytes[byte_index(address)]
    }

    #[must_use]
    pub fn read_word(&self, address: u32) -> u16 {
        let i = word_index(address);
        u16::from_le_bytes([self.bytes[i], self.bytes[i + 1]])
    }

    #[must_use]
    pub fn read_long(&self, address: u32) -> u32 {
        let i = long_index(address);
        u32::from_le_bytes([
            self.bytes[i],
            self.bytes[i + 1],
            self.bytes[i + 2],
            self.bytes[i + 3],
        ])
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let i = byte_index(address);
        if !is_rom(i) {
            self.bytes[i] = value;
        }
    }

    pub fn write_word(&mut self, address: u32, value: u16) {
        let i = word_index(address);
        if !is_rom(i) {
            self.bytes[i..i + 2].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn write_long(&mut self, address: u32, value: u32) {
        let i = long_index(address);
        if !is_rom(i) {
            self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn direct_write_byte(&mut self, address: u32, value: u8) {
        self.bytes[byte_index(address)] = value;
    }

    pub fn direct_write_word(&mut self, address: u32, value: u16) {
        let i = word_index(address);
        self.bytes[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn direct_write_long(&mut self, address: u32, value: u32) {
        let i = long_index(address);
        self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for HubMemory {
    fn default() -> HubMemory {
        HubMemory::new()
    }
}

/// Reads and writes hub memory at a moving address.  Word and long
/// accesses first align the address downwards; every access then
/// moves it past the data.  Writes bypass the hub, so they reach ROM
/// too.
pub struct HubCursor<'a> {
    memory: &'a mut HubMemory,
    address: u32,
}

impl<'a> HubCursor<'a> {
    pub(crate) fn new(memory: &'a mut HubMemory, address: u32) -> HubCursor<'a> {
        HubCursor {
            memory,
            address: address & ADDRESS_MASK,
        }
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn seek(&mut self, address: u32) {
        self.address = address & ADDRESS_MASK;
    }

    fn align(&mut self, size: u32) -> u32 {
        self.address &= !(size - 1);
        let here = self.address;
        self.address = (here + size) & ADDRESS_MASK;
        here
    }

    pub fn read_byte(&mut self) -> u8 {
        let here = self.align(1);
        self.memory.read_byte(here)
    }

    pub fn read_word(&mut self) -> u16 {
        let here = self.align(2);
        self.memory.read_word(here)
    }

    pub fn read_long(&mut self) -> u32 {
        let here = self.align(4);
        self.memory.read_long(here)
    }

    pub fn write_byte(&mut self, value: u8) {
        let here = self.align(1);
        self.memory.direct_write_byte(here, value);
    }

    pub fn write_word(&mut self, value: u16) {
        let here = self.align(2);
        self.memory.direct_write_word(here, value);
    }

    pub fn write_long(&mut self, value: u32) {
        let here = self.align(4);
        self.memory.direct_write_long(here, value);
    }
}

impl Debug for HubCursor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("HubCursor")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
