//! Byte store backed by native (off-heap) memory.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::warn;

use crate::compare;
use crate::config;
use crate::error::{BytesError, Result};
use crate::hash;
use crate::mem;
use crate::refcount::{OwnerToken, RefCount};
use crate::traits::{
    ByteStore, RandomAccess, RandomInput, RandomOutput, LARGE_MEMORY_BLOCK, MAX_NATIVE_CAPACITY,
};

/// A reference-counted store over off-heap memory.
///
/// The store allocates its region up front (`size()` bytes) and frees it on
/// terminal release. An *elastic* native store reports
/// [`MAX_NATIVE_CAPACITY`] as its capacity so that a cursor above it may
/// replace it with a bigger sibling; the allocated size never changes for a
/// given store.
///
/// Blocks smaller than 128 KiB are always zero-filled on allocation; larger
/// blocks are zeroed only when asked, mirroring the behaviour of mapped
/// memory which arrives zeroed from the OS.
pub struct NativeStore {
    /// Base address; null once freed.
    address: AtomicPtr<u8>,
    /// Allocated bytes.
    size: u64,
    /// Logical capacity (`size`, or the elastic maximum).
    capacity: u64,
    /// Whether this store owns (and frees) the allocation.
    dealloc: bool,
    refs: RefCount,
}

// SAFETY: the base address is only dereferenced through the checked
// accessors; plain access requires the single-writer discipline and the
// atomic family is safe for concurrent use.
unsafe impl Send for NativeStore {}
// SAFETY: as above.
unsafe impl Sync for NativeStore {}

impl NativeStore {
    fn of(size: u64, zero_fill: bool, elastic: bool) -> Result<Self> {
        let ptr = if zero_fill || size < LARGE_MEMORY_BLOCK {
            let p = mem::allocate_zeroed(size)?;
            mem::store_fence();
            p
        } else {
            mem::allocate(size)?
        };
        Ok(Self {
            address: AtomicPtr::new(ptr.as_ptr()),
            size,
            capacity: if elastic { MAX_NATIVE_CAPACITY } else { size },
            dealloc: true,
            refs: RefCount::new(),
        })
    }

    /// A zero-filled fixed-capacity store of `size` bytes.
    pub fn fixed_capacity(size: u64) -> Result<Self> {
        Self::of(size, true, false)
    }

    /// A fixed-capacity store with an explicit zero-fill choice.
    pub fn fixed_capacity_with(size: u64, zero_fill: bool) -> Result<Self> {
        Self::of(size, zero_fill, false)
    }

    /// A fixed-capacity store that skips the zero fill for large blocks.
    pub fn lazy_fixed_capacity(size: u64) -> Result<Self> {
        Self::of(size, false, false)
    }

    /// An elastic store of `init_size` allocated bytes, reporting the
    /// elastic maximum as capacity.
    pub fn elastic(init_size: u64) -> Result<Self> {
        Self::of(init_size, false, true)
    }

    /// Copies `data` into a fresh fixed-capacity store.
    pub fn copy_of(data: &[u8]) -> Result<Self> {
        let store = Self::fixed_capacity(data.len() as u64)?;
        store.write_from(0, data)?;
        Ok(store)
    }

    /// A non-owning view over `size` bytes of foreign native memory. The
    /// terminal release only drops the view; the memory is never freed.
    ///
    /// # Safety
    ///
    /// `address` must stay valid for `size` bytes for the lifetime of the
    /// returned store.
    pub unsafe fn follow(address: *mut u8, size: u64) -> Self {
        Self {
            address: AtomicPtr::new(address),
            size,
            capacity: size,
            dealloc: false,
            refs: RefCount::new(),
        }
    }

    #[inline]
    fn base(&self) -> Result<*mut u8> {
        let addr = self.address.load(Ordering::Acquire);
        if addr.is_null() {
            return Err(BytesError::Released);
        }
        Ok(addr)
    }

    /// Address of logical `offset`, after release and bounds checks.
    #[inline]
    fn checked(&self, offset: u64, width: u64) -> Result<*mut u8> {
        let base = self.base()?;
        self.refs.ensure_not_released()?;
        if !config::bounds_check_disabled() && !self.is_inside(offset, width) {
            return Err(BytesError::overflow(offset, width, 0, self.size));
        }
        // SAFETY: offset + width <= size, inside the allocation.
        Ok(unsafe { base.add(offset as usize) })
    }

    fn free_memory(&self) {
        let addr = self.address.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if let Some(ptr) = NonNull::new(addr) {
            if self.dealloc {
                // SAFETY: allocated by `mem::allocate*` with `self.size`
                // and freed exactly once (the swap is the gate).
                unsafe { mem::free(ptr, self.size) };
            }
        }
    }
}

impl Drop for NativeStore {
    fn drop(&mut self) {
        if !self.address.load(Ordering::Acquire).is_null() {
            if config::resource_tracing() && self.refs.ref_count() > 0 {
                warn!(
                    size = self.size,
                    refs = self.refs.ref_count(),
                    "native store dropped with outstanding references; freeing"
                );
            }
            self.free_memory();
        }
    }
}

impl RandomAccess for NativeStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_heap(&self) -> bool {
        false
    }

    fn is_native(&self) -> bool {
        true
    }

    fn address_for_read(&self, offset: u64) -> Result<*const u8> {
        Ok(self.checked(offset, 0)?.cast_const())
    }

    fn address_for_write(&self, offset: u64) -> Result<*mut u8> {
        self.checked(offset, 0)
    }

    fn ensure_not_released(&self) -> Result<()> {
        self.base()?;
        self.refs.ensure_not_released()
    }
}

impl RandomInput for NativeStore {
    fn read_u8(&self, offset: u64) -> Result<u8> {
        // SAFETY: `checked` bounds the access.
        Ok(unsafe { mem::read_u8(self.checked(offset, 1)?) })
    }

    fn read_i16(&self, offset: u64) -> Result<i16> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i16(self.checked(offset, 2)?) })
    }

    fn read_i32(&self, offset: u64) -> Result<i32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i32(self.checked(offset, 4)?) })
    }

    fn read_i64(&self, offset: u64) -> Result<i64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i64(self.checked(offset, 8)?) })
    }

    fn read_f32(&self, offset: u64) -> Result<f32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_f32(self.checked(offset, 4)?) })
    }

    fn read_f64(&self, offset: u64) -> Result<f64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_f64(self.checked(offset, 8)?) })
    }

    fn read_u8_volatile(&self, offset: u64) -> Result<u8> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_u8_volatile(self.checked(offset, 1)?) })
    }

    fn read_i16_volatile(&self, offset: u64) -> Result<i16> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i16_volatile(self.checked(offset, 2)?) })
    }

    fn read_i32_volatile(&self, offset: u64) -> Result<i32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i32_volatile(self.checked(offset, 4)?) })
    }

    fn read_i64_volatile(&self, offset: u64) -> Result<i64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i64_volatile(self.checked(offset, 8)?) })
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<Option<usize>> {
        self.ensure_not_released()?;
        let left = self.read_limit().saturating_sub(offset).min(dst.len() as u64) as usize;
        if left == 0 {
            return Ok(None);
        }
        let src = self.checked(offset, left as u64)?;
        // SAFETY: `src` covers `left` readable bytes.
        unsafe { mem::copy(src, dst.as_mut_ptr(), left) };
        Ok(Some(left))
    }

    unsafe fn native_read(&self, offset: u64, address: *mut u8, len: u64) -> Result<()> {
        let src = self.checked(offset, len)?;
        // SAFETY: bounds checked above; caller vouches for `address`.
        unsafe { mem::copy(src, address, len as usize) };
        Ok(())
    }

    fn read_view_ptr(&self, offset: u64) -> Option<*const u8> {
        let addr = self.address.load(Ordering::Acquire);
        if addr.is_null() {
            return None;
        }
        // SAFETY: address is live; the caller owns range validation.
        Some(unsafe { addr.add(offset as usize) }.cast_const())
    }
}

impl RandomOutput for NativeStore {
    fn write_u8(&self, offset: u64, v: u8) -> Result<()> {
        // SAFETY: `checked` bounds the access.
        unsafe { mem::write_u8(self.checked(offset, 1)?, v) };
        Ok(())
    }

    fn write_i16(&self, offset: u64, v: i16) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i16(self.checked(offset, 2)?, v) };
        Ok(())
    }

    fn write_i32(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_f32(&self, offset: u64, v: f32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_f32(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_f64(&self, offset: u64, v: f64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_f64(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_i32_ordered(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32_ordered(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64_ordered(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64_ordered(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_i32_volatile(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32_volatile(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64_volatile(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64_volatile(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_from(&self, offset: u64, src: &[u8]) -> Result<()> {
        let dst = self.checked(offset, src.len() as u64)?;
        // SAFETY: bounds checked; `src` is a distinct slice.
        unsafe { mem::copy(src.as_ptr(), dst, src.len()) };
        Ok(())
    }

    fn compare_and_swap_i32(&self, offset: u64, expected: i32, value: i32) -> Result<bool> {
        // SAFETY: `checked` bounds the access; atomics need 4-byte
        // alignment of `offset` per the family's contract.
        Ok(unsafe { mem::compare_and_swap_i32(self.checked(offset, 4)?, expected, value) })
    }

    fn compare_and_swap_i64(&self, offset: u64, expected: i64, value: i64) -> Result<bool> {
        // SAFETY: as above, 8-byte alignment.
        Ok(unsafe { mem::compare_and_swap_i64(self.checked(offset, 8)?, expected, value) })
    }

    fn test_and_set_i32(&self, offset: u64, expected: i32, value: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::test_and_set_i32(self.checked(offset, 4)?, expected, value) };
        Ok(())
    }

    fn test_and_set_i64(&self, offset: u64, expected: i64, value: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::test_and_set_i64(self.checked(offset, 8)?, expected, value) };
        Ok(())
    }

    fn zero_out(&self, begin: u64, end: u64) -> Result<()> {
        let begin = begin.max(self.start());
        let end = end.min(self.size);
        if end <= begin {
            return Ok(());
        }
        let addr = self.checked(begin, end - begin)?;
        // SAFETY: the clamped range is inside the allocation.
        unsafe { super::zero_fill_range(addr, end - begin) };
        Ok(())
    }

    unsafe fn native_write(&self, address: *const u8, offset: u64, len: u64) -> Result<()> {
        let dst = self.checked(offset, len)?;
        // SAFETY: bounds checked above; caller vouches for `address`.
        unsafe { mem::copy(address, dst, len as usize) };
        Ok(())
    }

    fn move_range(&self, from: u64, to: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let src = self.checked(from, len)?;
        let dst = self.checked(to, len)?;
        // SAFETY: both ranges bounds-checked; copy_within handles overlap.
        unsafe { mem::copy_within(src, dst, len as usize) };
        Ok(())
    }
}

impl ByteStore for NativeStore {
    fn ref_count(&self) -> i32 {
        self.refs.ref_count()
    }

    fn reserve(&self, owner: &OwnerToken) -> Result<()> {
        self.refs.reserve(owner)
    }

    fn try_reserve(&self, owner: &OwnerToken) -> bool {
        self.refs.try_reserve(owner)
    }

    fn release(&self, owner: &OwnerToken) -> Result<()> {
        if self.refs.release(owner)? {
            self.free_memory();
        }
        Ok(())
    }

    fn release_last(&self, owner: &OwnerToken) -> Result<()> {
        if self.refs.release_last(owner)? {
            self.free_memory();
        }
        Ok(())
    }

    fn reserve_transfer(&self, from: &OwnerToken, to: &OwnerToken) -> Result<()> {
        self.refs.reserve_transfer(from, to)
    }

    fn copy_to(&self, dst: &dyn ByteStore) -> Result<u64> {
        // Native-to-native moves in one pass; anything else goes through
        // the chunked default.
        if let Ok(to) = dst.address_for_write(0) {
            self.ensure_not_released()?;
            dst.ensure_not_released()?;
            let len = self.read_limit().min(dst.size());
            // SAFETY: both regions are live and at least `len` bytes.
            unsafe { self.native_read(0, to, len)? };
            return Ok(len);
        }
        let mut buf = vec![0u8; crate::traits::COPY_CHUNK.min(self.size as usize).max(1)];
        let total = self.read_limit().min(dst.size());
        let mut at = 0u64;
        while at < total {
            let n = buf.len().min((total - at) as usize);
            let Some(got) = self.read_into(at, &mut buf[..n])? else {
                break;
            };
            dst.write_from(at, &buf[..got])?;
            at += got as u64;
        }
        Ok(total)
    }
}

impl PartialEq for NativeStore {
    fn eq(&self, other: &Self) -> bool {
        compare::content_equals(self, other).unwrap_or(false)
    }
}

impl std::hash::Hash for NativeStore {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_i32(hash::hash32(self).unwrap_or(0));
    }
}

impl fmt::Debug for NativeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStore")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("refs", &self.refs.ref_count())
            .field("hash32", &hash::hash32(self).unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_capacity_is_zero_filled() {
        let store = NativeStore::fixed_capacity(256).unwrap();
        for i in 0..256 {
            assert_eq!(store.read_u8(i).unwrap(), 0);
        }
    }

    #[test]
    fn small_lazy_blocks_are_still_zeroed() {
        let store = NativeStore::lazy_fixed_capacity(512).unwrap();
        for i in 0..512 {
            assert_eq!(store.read_u8(i).unwrap(), 0);
        }
    }

    #[test]
    fn primitive_roundtrip() {
        let store = NativeStore::fixed_capacity(64).unwrap();
        store.write_i64(0, i64::MIN).unwrap();
        store.write_i32(8, -1).unwrap();
        store.write_i16(12, 0x7FFF).unwrap();
        store.write_f64(16, 2.5).unwrap();
        assert_eq!(store.read_i64(0).unwrap(), i64::MIN);
        assert_eq!(store.read_i32(8).unwrap(), -1);
        assert_eq!(store.read_i16(12).unwrap(), 0x7FFF);
        assert_eq!(store.read_f64(16).unwrap(), 2.5);
    }

    #[test]
    fn elastic_store_reports_max_capacity() {
        let store = NativeStore::elastic(1024).unwrap();
        assert_eq!(store.size(), 1024);
        assert_eq!(store.capacity(), MAX_NATIVE_CAPACITY);
        assert!(store.is_native());
        assert!(!store.is_heap());
    }

    #[test]
    fn addresses_translate_offsets() {
        let store = NativeStore::fixed_capacity(32).unwrap();
        let a0 = store.address_for_read(0).unwrap();
        let a9 = store.address_for_read(9).unwrap();
        assert_eq!(a9 as usize - a0 as usize, 9);
    }

    #[test]
    fn release_frees_and_blocks_access() {
        let store = NativeStore::fixed_capacity(64).unwrap();
        store.write_i32(0, 7).unwrap();
        store.release(&OwnerToken::INIT).unwrap();
        assert_eq!(store.read_i32(0).unwrap_err(), BytesError::Released);
        assert!(store.address_for_read(0).is_err());
    }

    #[test]
    fn native_roundtrip_through_raw_memory() {
        let src = NativeStore::copy_of(&[9, 8, 7, 6, 5]).unwrap();
        let dst = NativeStore::fixed_capacity(5).unwrap();
        let to = dst.address_for_write(0).unwrap();
        // SAFETY: `dst` owns at least 5 writable bytes at `to`.
        unsafe { src.native_read(0, to, 5).unwrap() };
        let mut out = [0u8; 5];
        dst.read_into(0, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 6, 5]);
    }

    #[test]
    fn followed_memory_is_not_freed() {
        let owner = NativeStore::fixed_capacity(32).unwrap();
        owner.write_i32(0, 77).unwrap();
        let addr = owner.address_for_write(0).unwrap();
        // SAFETY: `owner` outlives the follower in this test.
        let follower = unsafe { NativeStore::follow(addr, 32) };
        assert_eq!(follower.read_i32(0).unwrap(), 77);
        follower.release(&OwnerToken::INIT).unwrap();
        // The followed region is still intact.
        assert_eq!(owner.read_i32(0).unwrap(), 77);
    }

    #[test]
    fn copy_to_native_sibling() {
        let src = NativeStore::copy_of(&[1, 2, 3, 4]).unwrap();
        let dst = NativeStore::fixed_capacity(16).unwrap();
        assert_eq!(src.copy_to(&dst).unwrap(), 4);
        let mut out = [0u8; 4];
        dst.read_into(0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }
}
