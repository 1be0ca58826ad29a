//! The zero-capacity sentinel store.

use crate::error::{BytesError, Result};
use crate::refcount::OwnerToken;
use crate::traits::{ByteStore, RandomAccess, RandomInput, RandomOutput};

const UNSUPPORTED: BytesError = BytesError::Unsupported("null store");

/// A zero-capacity placeholder store.
///
/// Used where a store slot must hold *something* but no memory exists yet:
/// every memory operation fails with `Unsupported`, every reference-count
/// operation is a no-op with a permanent count of zero, and the store is
/// declared neither heap nor native. The process-wide instance is
/// [`NullStore::instance`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullStore;

impl NullStore {
    /// The immortal process-wide instance.
    #[must_use]
    pub fn instance() -> &'static Self {
        static INSTANCE: NullStore = NullStore;
        &INSTANCE
    }
}

impl RandomAccess for NullStore {
    fn capacity(&self) -> u64 {
        0
    }

    fn is_heap(&self) -> bool {
        false
    }

    fn is_native(&self) -> bool {
        false
    }

    fn address_for_read(&self, _offset: u64) -> Result<*const u8> {
        Err(UNSUPPORTED)
    }

    fn address_for_write(&self, _offset: u64) -> Result<*mut u8> {
        Err(UNSUPPORTED)
    }

    fn ensure_not_released(&self) -> Result<()> {
        Err(BytesError::Released)
    }
}

impl RandomInput for NullStore {
    fn read_u8(&self, _offset: u64) -> Result<u8> {
        Err(UNSUPPORTED)
    }

    fn read_i16(&self, _offset: u64) -> Result<i16> {
        Err(UNSUPPORTED)
    }

    fn read_i32(&self, _offset: u64) -> Result<i32> {
        Err(UNSUPPORTED)
    }

    fn read_i64(&self, _offset: u64) -> Result<i64> {
        Err(UNSUPPORTED)
    }

    fn read_f32(&self, _offset: u64) -> Result<f32> {
        Err(UNSUPPORTED)
    }

    fn read_f64(&self, _offset: u64) -> Result<f64> {
        Err(UNSUPPORTED)
    }

    fn read_u8_volatile(&self, _offset: u64) -> Result<u8> {
        Err(UNSUPPORTED)
    }

    fn read_i16_volatile(&self, _offset: u64) -> Result<i16> {
        Err(UNSUPPORTED)
    }

    fn read_i32_volatile(&self, _offset: u64) -> Result<i32> {
        Err(UNSUPPORTED)
    }

    fn read_i64_volatile(&self, _offset: u64) -> Result<i64> {
        Err(UNSUPPORTED)
    }

    fn read_into(&self, _offset: u64, _dst: &mut [u8]) -> Result<Option<usize>> {
        Err(UNSUPPORTED)
    }

    unsafe fn native_read(&self, _offset: u64, _address: *mut u8, _len: u64) -> Result<()> {
        Err(UNSUPPORTED)
    }
}

impl RandomOutput for NullStore {
    fn write_u8(&self, _offset: u64, _v: u8) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i16(&self, _offset: u64, _v: i16) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i32(&self, _offset: u64, _v: i32) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i64(&self, _offset: u64, _v: i64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_f32(&self, _offset: u64, _v: f32) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_f64(&self, _offset: u64, _v: f64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i32_ordered(&self, _offset: u64, _v: i32) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i64_ordered(&self, _offset: u64, _v: i64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i32_volatile(&self, _offset: u64, _v: i32) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_i64_volatile(&self, _offset: u64, _v: i64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn write_from(&self, _offset: u64, _src: &[u8]) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn compare_and_swap_i32(&self, _offset: u64, _expected: i32, _value: i32) -> Result<bool> {
        Err(UNSUPPORTED)
    }

    fn compare_and_swap_i64(&self, _offset: u64, _expected: i64, _value: i64) -> Result<bool> {
        Err(UNSUPPORTED)
    }

    fn test_and_set_i32(&self, _offset: u64, _expected: i32, _value: i32) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn test_and_set_i64(&self, _offset: u64, _expected: i64, _value: i64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn zero_out(&self, _begin: u64, _end: u64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    unsafe fn native_write(&self, _address: *const u8, _offset: u64, _len: u64) -> Result<()> {
        Err(UNSUPPORTED)
    }

    fn move_range(&self, _from: u64, _to: u64, _len: u64) -> Result<()> {
        Err(UNSUPPORTED)
    }
}

impl ByteStore for NullStore {
    fn ref_count(&self) -> i32 {
        0
    }

    fn reserve(&self, _owner: &OwnerToken) -> Result<()> {
        Ok(())
    }

    fn try_reserve(&self, _owner: &OwnerToken) -> bool {
        false
    }

    fn release(&self, _owner: &OwnerToken) -> Result<()> {
        Ok(())
    }

    fn release_last(&self, _owner: &OwnerToken) -> Result<()> {
        Ok(())
    }

    fn reserve_transfer(&self, _from: &OwnerToken, _to: &OwnerToken) -> Result<()> {
        Ok(())
    }
}
