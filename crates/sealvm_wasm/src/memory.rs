//! Guest memory limits and cross-boundary regions.
//!
//! A region is a 12-byte descriptor in guest memory, three little-endian
//! `u32`s: `offset`, `capacity`, `length`. Pointer 0 and a zero-length
//! region both mean "no data".

use crate::error::{VmError, VmResult};
use serde::{Deserialize, Serialize};
use wasmtime::{AsContext, AsContextMut, Memory};

/// WASM page size
pub const PAGE_SIZE: u64 = 65536;

/// Memory limit configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimit {
    /// Maximum memory in bytes
    pub max_bytes: u64,
    /// Maximum number of pages
    pub max_pages: u64,
}

impl MemoryLimit {
    /// Create a new memory limit
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            max_pages: max_bytes.div_ceil(PAGE_SIZE),
        }
    }

    /// Create from a page count
    #[must_use]
    pub fn with_pages(max_pages: u64) -> Self {
        Self {
            max_bytes: max_pages * PAGE_SIZE,
            max_pages,
        }
    }

    /// Check if a page count is within limit
    #[must_use]
    pub fn pages_within_limit(&self, pages: u64) -> bool {
        pages.saturating_mul(PAGE_SIZE) <= self.max_bytes
    }

    /// Limit as `usize` for the runtime's store limiter
    #[must_use]
    pub fn max_bytes_usize(&self) -> usize {
        usize::try_from(self.max_bytes).unwrap_or(usize::MAX)
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        Self::new(16 * 1024 * 1024) // 16MB default
    }
}

/// Size of a region descriptor in guest memory
pub const REGION_SIZE: usize = 12;

/// Region descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Start of the data in guest memory
    pub offset: u32,
    /// Bytes reserved at `offset`
    pub capacity: u32,
    /// Bytes in use
    pub length: u32,
}

impl Region {
    /// Decode a descriptor
    #[must_use]
    pub fn from_bytes(bytes: [u8; REGION_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            offset: word(0),
            capacity: word(4),
            length: word(8),
        }
    }

    /// Encode a descriptor
    #[must_use]
    pub fn to_bytes(&self) -> [u8; REGION_SIZE] {
        let mut out = [0u8; REGION_SIZE];
        out[0..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        out[8..12].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    /// Check the descriptor's invariants
    ///
    /// # Errors
    ///
    /// Returns bad-argument if `length > capacity` or the region wraps the
    /// 32-bit address space
    pub fn validate(&self) -> VmResult<()> {
        if self.length > self.capacity {
            return Err(VmError::bad_argument(format!(
                "region length {} exceeds capacity {}",
                self.length, self.capacity
            )));
        }
        if self.offset.checked_add(self.capacity).is_none() {
            return Err(VmError::bad_argument("region wraps address space"));
        }
        Ok(())
    }
}

fn load_region(memory: &Memory, ctx: impl AsContext, ptr: u32) -> VmResult<Region> {
    let mut buf = [0u8; REGION_SIZE];
    memory
        .read(&ctx, ptr as usize, &mut buf)
        .map_err(|_| VmError::bad_argument(format!("region pointer {} out of bounds", ptr)))?;
    let region = Region::from_bytes(buf);
    region.validate()?;
    Ok(region)
}

/// Copy the data of the region at `ptr` out of guest memory
///
/// Returns `None` for a null pointer or an empty region.
///
/// # Errors
///
/// Returns bad-argument for a malformed or out-of-bounds region, or if the
/// data is longer than `max_len`
pub fn read_region(
    memory: &Memory,
    ctx: impl AsContext,
    ptr: u32,
    max_len: usize,
) -> VmResult<Option<Vec<u8>>> {
    if ptr == 0 {
        return Ok(None);
    }
    let region = load_region(memory, &ctx, ptr)?;
    if region.length == 0 {
        return Ok(None);
    }
    let len = region.length as usize;
    if len > max_len {
        return Err(VmError::bad_argument(format!(
            "region of {} bytes exceeds limit {}",
            len, max_len
        )));
    }
    let mut data = vec![0u8; len];
    memory
        .read(&ctx, region.offset as usize, &mut data)
        .map_err(|_| VmError::bad_argument("region data out of bounds"))?;
    Ok(Some(data))
}

/// Write `data` into the guest-allocated region at `ptr` and set its length
///
/// # Errors
///
/// Returns bad-argument if the region is malformed, out of bounds, or too
/// small for `data`
pub fn write_region(
    memory: &Memory,
    mut ctx: impl AsContextMut,
    ptr: u32,
    data: &[u8],
) -> VmResult<()> {
    let mut region = load_region(memory, &ctx, ptr)?;
    let length = u32::try_from(data.len())
        .map_err(|_| VmError::bad_argument("data exceeds 32-bit length"))?;
    if length > region.capacity {
        return Err(VmError::bad_argument(format!(
            "region capacity {} too small for {} bytes",
            region.capacity, length
        )));
    }
    memory
        .write(&mut ctx, region.offset as usize, data)
        .map_err(|_| VmError::bad_argument("region data out of bounds"))?;
    region.length = length;
    memory
        .write(&mut ctx, ptr as usize, &region.to_bytes())
        .map_err(|_| VmError::bad_argument(format!("region pointer {} out of bounds", ptr)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, MemoryType, Store};

    fn memory() -> (Store<()>, Memory) {
        let mut store = Store::new(&Engine::default(), ());
        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();
        (store, memory)
    }

    fn put_region(store: &mut Store<()>, memory: &Memory, ptr: u32, region: Region) {
        memory
            .write(store, ptr as usize, &region.to_bytes())
            .unwrap();
    }

    #[test]
    fn test_memory_limit_pages() {
        let limit = MemoryLimit::new(PAGE_SIZE * 3 + 1);
        assert_eq!(limit.max_pages, 4);
        assert!(limit.pages_within_limit(3));
        assert!(!limit.pages_within_limit(4));
        assert_eq!(MemoryLimit::with_pages(2).max_bytes, 2 * PAGE_SIZE);
    }

    #[test]
    fn test_region_bytes_layout() {
        let region = Region {
            offset: 0x0102_0304,
            capacity: 16,
            length: 5,
        };
        let bytes = region.to_bytes();
        assert_eq!(&bytes[0..4], &[4, 3, 2, 1]);
        assert_eq!(Region::from_bytes(bytes), region);
    }

    #[test]
    fn test_region_validation() {
        let bad = Region {
            offset: 0,
            capacity: 4,
            length: 5,
        };
        assert!(bad.validate().is_err());
        let wraps = Region {
            offset: u32::MAX,
            capacity: 2,
            length: 0,
        };
        assert!(wraps.validate().is_err());
    }

    #[test]
    fn test_null_and_empty_are_absent() {
        let (mut store, memory) = memory();
        assert_eq!(read_region(&memory, &store, 0, 16).unwrap(), None);
        put_region(
            &mut store,
            &memory,
            64,
            Region {
                offset: 128,
                capacity: 8,
                length: 0,
            },
        );
        assert_eq!(read_region(&memory, &store, 64, 16).unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let (mut store, memory) = memory();
        put_region(
            &mut store,
            &memory,
            64,
            Region {
                offset: 128,
                capacity: 8,
                length: 0,
            },
        );
        write_region(&memory, &mut store, 64, b"hello").unwrap();
        assert_eq!(
            read_region(&memory, &store, 64, 16).unwrap(),
            Some(b"hello".to_vec())
        );
        assert!(write_region(&memory, &mut store, 64, b"too long!").is_err());
        assert!(read_region(&memory, &store, 64, 4).is_err());
    }

    #[test]
    fn test_out_of_bounds_pointer() {
        let (store, memory) = memory();
        assert!(matches!(
            read_region(&memory, &store, PAGE_SIZE as u32, 16),
            Err(VmError::BadArgument(_))
        ));
    }
}
