use crate::{
    board, log,
    kernel::{bitmap::Bitmap, gate::GateLock, Mutex},
};
use core::{fmt, mem, ptr, slice};

/// Why a pool operation could not be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The region start is not aligned for the bitmap words
    Misaligned,
    /// The unit size is not a power of two
    UnitNotPowerOfTwo,
    /// The region is smaller than two units
    TooSmall,
    /// The region size is not a multiple of the unit size
    NotUnitMultiple,
    /// No run of free units large enough
    Exhausted,
    /// The given address range is not inside this pool
    OutOfRange,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned => write!(f, "region start is misaligned"),
            Self::UnitNotPowerOfTwo => write!(f, "unit size is not a power of two"),
            Self::TooSmall => write!(f, "region must be at least two units"),
            Self::NotUnitMultiple => write!(f, "region size is not a multiple of the unit size"),
            Self::Exhausted => write!(f, "no suitable run of free units"),
            Self::OutOfRange => write!(f, "address is not within the pool"),
        }
    }
}

/// A live allocation: a validated offset into the pool plus the unit
/// count the caller asked for. The pool does not record allocation
/// sizes; the handle carries the count to the matching [`Pool::free`].
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct Block {
    /// Byte offset from the pool's usable base
    offset: usize,
    /// Length in units
    units: usize,
}

impl Block {
    /// Byte offset from the pool's usable base
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in units
    pub fn units(&self) -> usize {
        self.units
    }
}

/// A region of fixed-unit-size slots with a gate-protected occupancy
/// bitmap.
///
/// The bitmap words are carved out of the leading unit(s) of the region;
/// the rest is allocatable capacity. One gate per pool serializes every
/// map mutation system-wide, so allocations are totally ordered across
/// cores.
pub struct Pool<'region> {
    /// Diagnostic label
    name: &'static str,
    /// First usable address, past the reserved bitmap units
    base: usize,
    /// Usable byte span, a multiple of `unit`
    size: usize,
    /// Allocation granule, a power of two
    unit: usize,
    /// Occupancy map, behind this pool's gate
    map: GateLock<Bitmap<'region>, { board::MAX_CORES }>,
}

impl<'region> Pool<'region> {
    /// Carves a pool out of a raw region.
    ///
    /// Whole leading units are reserved for the occupancy bitmap; the
    /// remainder becomes allocatable capacity, optionally zeroed. On any
    /// validation failure nothing is written to the region.
    pub fn create(
        name: &'static str,
        region: &'region mut [u8],
        unit: usize,
        zero: bool,
    ) -> Result<Self, PoolError> {
        let total = region.len();
        if !unit.is_power_of_two() {
            log!("pool {}: unit size {:#x} is not a power of two", name, unit);
            return Err(PoolError::UnitNotPowerOfTwo);
        }
        if total < unit * 2 {
            log!("pool {}: size {:#x} must be at least 2x unit {:#x}", name, total, unit);
            return Err(PoolError::TooSmall);
        }
        if total % unit != 0 {
            log!("pool {}: size {:#x} is not a multiple of unit {:#x}", name, total, unit);
            return Err(PoolError::NotUnitMultiple);
        }
        if region.as_ptr() as usize % mem::align_of::<u64>() != 0 {
            log!("pool {}: region start {:p} is misaligned", name, region.as_ptr());
            return Err(PoolError::Misaligned);
        }

        let total_units = total / unit;
        let words = total_units.div_ceil(u64::BITS as usize);
        let reserved_units = (words * mem::size_of::<u64>()).div_ceil(unit);
        let (map_region, data) = region.split_at_mut(reserved_units * unit);
        let capacity = total_units - reserved_units;

        // SAFETY: The start is u64-aligned (checked above) and the
        // reserved units cover at least `words` whole words
        let words = unsafe { slice::from_raw_parts_mut(map_region.as_mut_ptr().cast::<u64>(), words) };

        if zero {
            data.fill(0);
        }

        Ok(Self {
            name,
            base: data.as_ptr() as usize,
            size: data.len(),
            unit,
            map: GateLock::new(Bitmap::new(words, capacity)),
        })
    }

    /// Diagnostic label
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First usable address
    pub fn base(&self) -> usize {
        self.base
    }

    /// Allocation granule in bytes
    pub fn unit_size(&self) -> usize {
        self.unit
    }

    /// Allocatable capacity in units
    pub fn capacity(&self) -> usize {
        self.size / self.unit
    }

    /// Number of units currently allocated
    pub fn occupied(&self) -> usize {
        self.map.lock().occupied()
    }

    /// Allocates `units` contiguous units and returns a handle to them.
    ///
    /// The caller keeps the handle for the matching [`Pool::free`]; the
    /// pool itself only tracks per-unit occupancy.
    pub fn allocate(&self, units: usize) -> Result<Block, PoolError> {
        let mut map = self.map.lock();
        let index = match map.first_n_free(units) {
            Some(index) => index,
            None => {
                log!("pool {}: map is full", self.name);
                return Err(PoolError::Exhausted);
            }
        };
        // The run scan can pass the end of the usable region; re-check
        // the byte range before committing (see `Bitmap::first_n_free`)
        let offset = index * self.unit;
        if offset + units * self.unit > self.size {
            log!("pool {}: no room for {} units", self.name, units);
            return Err(PoolError::Exhausted);
        }
        for i in index..index + units {
            map.set(i);
        }
        Ok(Block { offset, units })
    }

    /// Releases a block, optionally zero-filling it first so freed
    /// memory does not leak previous contents to a future allocation.
    pub fn free(&self, block: Block, zero: bool) -> Result<(), PoolError> {
        let Block { offset, units } = block;
        if offset % self.unit != 0 || offset + units * self.unit > self.size {
            log!("pool {}: free of foreign range {:#x}+{}", self.name, offset, units);
            return Err(PoolError::OutOfRange);
        }
        if zero {
            // SAFETY: The range was validated against the usable region,
            // which this pool exclusively borrows
            unsafe {
                ptr::write_bytes((self.base + offset) as *mut u8, 0, units * self.unit);
            }
        }
        let mut map = self.map.lock();
        let index = offset / self.unit;
        for i in index..index + units {
            map.clear(i);
        }
        Ok(())
    }

    /// Rebuilds a handle from a raw address previously produced by
    /// [`Pool::block_ptr`], validating it against the pool bounds.
    pub fn block_at(&self, addr: usize, units: usize) -> Result<Block, PoolError> {
        if addr < self.base || addr >= self.base + self.size || (addr - self.base) % self.unit != 0
        {
            log!("pool {}: {:#x} is not within this pool", self.name, addr);
            return Err(PoolError::OutOfRange);
        }
        Ok(Block {
            offset: addr - self.base,
            units,
        })
    }

    /// The memory a handle refers to
    pub fn block_ptr(&self, block: &Block) -> *mut u8 {
        debug_assert!(block.offset + block.units * self.unit <= self.size);
        (self.base + block.offset) as *mut u8
    }
}

impl fmt::Debug for Pool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .field("unit", &format_args!("{:#x}", self.unit))
            .field("occupied", &self.occupied())
            .field("gate", self.map.gate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{boxed::Box, vec::Vec};

    /// A unit-aligned arena for pool tests
    #[repr(align(4096))]
    struct Arena<const SIZE: usize>([u8; SIZE]);

    fn arena<const SIZE: usize>() -> &'static mut [u8] {
        &mut Box::leak(Box::new(Arena([0_u8; SIZE]))).0
    }

    #[test]
    fn create_reserves_bitmap_units() {
        // 16 units of 0x200: one word of map fits in one reserved unit
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        assert_eq!(pool.capacity(), 0x2000 / 0x200 - 1);
        assert_eq!(pool.occupied(), 0);
    }

    #[test]
    fn create_rejects_bad_unit_size() {
        let region = arena::<0x2000>();
        region.fill(0xa5);
        let err = Pool::create("p", region, 0x300, true).unwrap_err();
        assert_eq!(err, PoolError::UnitNotPowerOfTwo);
    }

    #[test]
    fn create_failure_performs_no_mutation() {
        let region = arena::<0x2000>();
        region.fill(0xa5);
        assert!(Pool::create("p", region, 0x300, true).is_err());
        assert!(region.iter().all(|&b| b == 0xa5));
    }

    #[test]
    fn create_rejects_tiny_and_ragged_regions() {
        assert_eq!(
            Pool::create("p", &mut arena::<0x2000>()[..0x1000], 0x1000, true).unwrap_err(),
            PoolError::TooSmall
        );
        assert_eq!(
            Pool::create("p", &mut arena::<0x2000>()[..0x1f00], 0x200, true).unwrap_err(),
            PoolError::NotUnitMultiple
        );
    }

    #[test]
    fn create_rejects_misaligned_region() {
        assert_eq!(
            Pool::create("p", &mut arena::<0x3000>()[1..0x2001], 0x200, true).unwrap_err(),
            PoolError::Misaligned
        );
    }

    #[test]
    fn allocate_free_round_trip() {
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        let before = pool.occupied();
        let block = pool.allocate(3).unwrap();
        assert_eq!(pool.occupied(), before + 3);
        pool.free(block, true).unwrap();
        assert_eq!(pool.occupied(), before);
    }

    #[test]
    fn freed_memory_is_zeroed() {
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        let block = pool.allocate(2).unwrap();
        let ptr = pool.block_ptr(&block);
        // SAFETY: the block is live and exclusively ours
        unsafe { ptr::write_bytes(ptr, 0xee, 2 * 0x200) };
        let offset = block.offset();
        pool.free(block, true).unwrap();

        let again = pool.allocate(2).unwrap();
        assert_eq!(again.offset(), offset, "lowest fit should reuse the run");
        let bytes =
            unsafe { slice::from_raw_parts(pool.block_ptr(&again), 2 * 0x200) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn allocations_never_overlap() {
        let pool = Pool::create("p", arena::<0x8000>(), 0x200, true).unwrap();
        let mut live: Vec<Block> = Vec::new();
        let sizes = [1_usize, 3, 2, 1, 4, 2, 1, 1, 5, 2];
        for (round, &units) in sizes.iter().cycle().take(50).enumerate() {
            if round % 3 == 2 && !live.is_empty() {
                let block = live.swap_remove(round % live.len());
                pool.free(block, false).unwrap();
            }
            if let Ok(block) = pool.allocate(units) {
                live.push(block);
            }
        }
        // shadow check: no two live blocks share any byte
        let ranges: Vec<_> = live
            .iter()
            .map(|b| (b.offset(), b.offset() + b.units() * 0x200))
            .collect();
        for (i, &(start_a, end_a)) in ranges.iter().enumerate() {
            for &(start_b, end_b) in &ranges[i + 1..] {
                assert!(end_a <= start_b || end_b <= start_a, "live blocks overlap");
            }
        }
        let total: usize = live.iter().map(Block::units).sum();
        assert_eq!(pool.occupied(), total);
    }

    #[test]
    fn oversized_request_is_refused_by_the_bounds_recheck() {
        // 15 usable units but 64 map bits: the run scan happily finds 16
        // "free" slots, and the byte-range re-check must refuse them
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        assert_eq!(pool.allocate(16).unwrap_err(), PoolError::Exhausted);
        assert_eq!(pool.occupied(), 0);
        assert!(pool.allocate(15).is_ok());
    }

    #[test]
    fn free_of_foreign_address_is_refused() {
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        let block = pool.allocate(1).unwrap();
        assert_eq!(
            pool.block_at(pool.base() + pool.capacity() * 0x200, 1).unwrap_err(),
            PoolError::OutOfRange
        );
        assert_eq!(pool.block_at(pool.base() - 1, 1).unwrap_err(), PoolError::OutOfRange);
        assert_eq!(pool.occupied(), 1);
        pool.free(block, false).unwrap();
    }

    #[test]
    fn block_at_round_trips_live_blocks() {
        let pool = Pool::create("p", arena::<0x2000>(), 0x200, true).unwrap();
        let block = pool.allocate(2).unwrap();
        let addr = pool.block_ptr(&block) as usize;
        let rebuilt = pool.block_at(addr, 2).unwrap();
        assert_eq!(rebuilt, block);
        pool.free(rebuilt, false).unwrap();
        assert_eq!(pool.occupied(), 0);
    }
}
