//! Byte-addressed little-endian memory

use std::collections::BTreeMap;

use super::error::{InterpResult, RuntimeError};

/// First address handed out; address 0 stays unmapped as the null pointer
const BASE_ADDRESS: u64 = 0x1000;
const ALIGNMENT: u64 = 64;

/// Set of disjoint allocations keyed by base address
#[derive(Debug, Clone, Default)]
pub struct Memory {
    regions: BTreeMap<u64, Vec<u8>>,
    next: u64,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next: BASE_ADDRESS,
        }
    }

    /// Allocate `len` zeroed bytes and return the base address
    pub fn alloc(&mut self, len: usize) -> u64 {
        if self.next == 0 {
            self.next = BASE_ADDRESS;
        }
        let base = self.next;
        self.regions.insert(base, vec![0; len]);
        // leave an unmapped gap so overruns are caught
        let end = base + len as u64 + ALIGNMENT;
        self.next = end.div_ceil(ALIGNMENT) * ALIGNMENT;
        base
    }

    pub fn alloc_f32s(&mut self, values: &[f32]) -> u64 {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.alloc_bytes(&bytes)
    }

    pub fn alloc_i32s(&mut self, values: &[i32]) -> u64 {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.alloc_bytes(&bytes)
    }

    pub fn alloc_bytes(&mut self, values: &[u8]) -> u64 {
        let base = self.alloc(values.len());
        if let Some(region) = self.regions.get_mut(&base) {
            region.copy_from_slice(values);
        }
        base
    }

    fn region(&self, addr: u64, len: usize) -> InterpResult<&[u8]> {
        let (&base, bytes) = self
            .regions
            .range(..=addr)
            .next_back()
            .ok_or_else(|| RuntimeError::out_of_bounds(addr, len))?;
        let offset = (addr - base) as usize;
        bytes
            .get(offset..offset + len)
            .ok_or_else(|| RuntimeError::out_of_bounds(addr, len))
    }

    fn region_mut(&mut self, addr: u64, len: usize) -> InterpResult<&mut [u8]> {
        let (&base, bytes) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .ok_or_else(|| RuntimeError::out_of_bounds(addr, len))?;
        let offset = (addr - base) as usize;
        bytes
            .get_mut(offset..offset + len)
            .ok_or_else(|| RuntimeError::out_of_bounds(addr, len))
    }

    /// Read `len` (1..=8) bytes as a zero-extended little-endian integer
    pub fn read(&self, addr: u64, len: usize) -> InterpResult<u64> {
        let bytes = self.region(addr, len)?;
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Write the low `len` (1..=8) bytes of `bits`
    pub fn write(&mut self, addr: u64, len: usize, bits: u64) -> InterpResult<()> {
        let bytes = self.region_mut(addr, len)?;
        bytes.copy_from_slice(&bits.to_le_bytes()[..len]);
        Ok(())
    }

    pub fn read_f32s(&self, addr: u64, count: usize) -> InterpResult<Vec<f32>> {
        (0..count)
            .map(|i| self.read(addr + 4 * i as u64, 4).map(|b| f32::from_bits(b as u32)))
            .collect()
    }

    pub fn read_i32s(&self, addr: u64, count: usize) -> InterpResult<Vec<i32>> {
        (0..count)
            .map(|i| self.read(addr + 4 * i as u64, 4).map(|b| b as u32 as i32))
            .collect()
    }

    pub fn read_bytes(&self, addr: u64, count: usize) -> InterpResult<Vec<u8>> {
        self.region(addr, count).map(<[u8]>::to_vec)
    }
}
