//! 64-bit content hashing over byte stores.
//!
//! A length-conditioned mixer over four 64-bit lanes, derived from eight
//! fixed 32-bit constants. Two variants produce identical results for the
//! same bytes on the same host:
//!
//! - [`optimised`]: walks raw memory through the store's read address;
//!   picked for native backings. Dispatches on a handful of length classes
//!   so short inputs stay branch-cheap.
//! - [`vanilla`]: walks the store through its logical offset API; works for
//!   any backing.
//!
//! The hash is deterministic for a given host byte order but deliberately
//! not portable across endianness: the top halves of each lane are selected
//! with [`mem::HI_BYTES`].
//!
//! No heap allocation happens while hashing.

use crate::error::Result;
use crate::mem;
use crate::traits::RandomInput;

/// Mixing constant, sign-extended from the 32-bit literal.
const K0: i64 = 0x6d0f_27bd;
const K1: i64 = 0xc1f3_bfc9_u32 as i32 as i64;
const K2: i64 = 0x6b19_2397;
const K3: i64 = 0x6b91_5657;
/// Multiplicative constant, sign-extended from the 32-bit literal.
const M0: i64 = 0x5bc8_0bad;
const M1: i64 = 0xea75_85d7_u32 as i32 as i64;
const M2: i64 = 0x7a64_6e19;
const M3: i64 = 0x855d_d4db_u32 as i32 as i64;

/// Spreads entropy across the word: `x ^ rotl(x, 26) ^ rotr(x, 17)`.
#[inline]
#[must_use]
pub fn agitate(mut l: i64) -> i64 {
    l ^= l.rotate_left(26);
    l ^= l.rotate_right(17);
    l
}

#[inline]
fn hash0(l: i64, hi: i64) -> i64 {
    agitate(l.wrapping_mul(K0).wrapping_add(hi.wrapping_mul(K1)))
}

/// 64-bit hash of a single value.
#[inline]
#[must_use]
pub fn hash_long(l: i64) -> i64 {
    hash0(l, l >> 32)
}

/// 64-bit content hash over the store's readable bytes.
pub fn hash(store: &dyn RandomInput) -> Result<i64> {
    hash_len(store, store.read_remaining())
}

/// 64-bit content hash over `len` bytes from the store's read position.
pub fn hash_len(store: &dyn RandomInput, len: u64) -> Result<i64> {
    if len == 0 {
        return Ok(0);
    }
    if store.is_native() {
        let addr = store.address_for_read(store.read_position())?;
        // SAFETY: the store vouches for `len` readable bytes at `addr`
        // (`len` is within read_remaining of a live, reserved store).
        return Ok(unsafe { optimised::apply(addr, len) });
    }
    vanilla::apply(store, len)
}

/// 32-bit fold of [`hash`].
pub fn hash32(store: &dyn RandomInput) -> Result<i32> {
    Ok(fold32(hash(store)?))
}

/// 32-bit fold of [`hash_len`].
pub fn hash32_len(store: &dyn RandomInput, len: u64) -> Result<i32> {
    Ok(fold32(hash_len(store, len)?))
}

#[inline]
fn fold32(h: i64) -> i32 {
    (h ^ (h >> 32)) as i32
}

#[inline]
fn lane_update(h: &mut [i64; 4], l: [i64; 4]) {
    let a: [i64; 4] = [
        i64::from((l[0] >> 32) as i32),
        i64::from((l[1] >> 32) as i32),
        i64::from((l[2] >> 32) as i32),
        i64::from((l[3] >> 32) as i32),
    ];
    h[0] = h[0].wrapping_add(l[0].wrapping_add(a[1]).wrapping_sub(a[2]).wrapping_mul(M0));
    h[1] = h[1].wrapping_add(l[1].wrapping_add(a[2]).wrapping_sub(a[3]).wrapping_mul(M1));
    h[2] = h[2].wrapping_add(l[2].wrapping_add(a[3]).wrapping_sub(a[0]).wrapping_mul(M2));
    h[3] = h[3].wrapping_add(l[3].wrapping_add(a[0]).wrapping_sub(a[1]).wrapping_mul(M3));
}

#[inline]
fn lane_remix(h: &mut [i64; 4]) {
    h[0] = h[0].wrapping_mul(K0);
    h[1] = h[1].wrapping_mul(K1);
    h[2] = h[2].wrapping_mul(K2);
    h[3] = h[3].wrapping_mul(K3);
}

#[inline]
fn lane_finish(h: [i64; 4]) -> i64 {
    agitate(h[0]) ^ agitate(h[1]) ^ agitate(h[2]) ^ agitate(h[3])
}

/// Address-based variant for native backings.
pub(crate) mod optimised {
    use super::*;

    /// Hashes `len` bytes at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for `len` reads.
    pub(crate) unsafe fn apply(addr: *const u8, len: u64) -> i64 {
        // SAFETY: forwarded from the caller throughout this module.
        unsafe {
            if len < 8 {
                return hash_long(read_incomplete(addr, len as i64));
            }
            if len == 8 {
                return hash_long(mem::read_i64(addr));
            }
            if len < 16 {
                return apply_9_to_16(addr, len);
            }
            if len <= 32 {
                return apply_17_to_32(addr, len);
            }
            if len & 31 == 0 {
                return apply_multiple_of_32(addr, len);
            }
            apply_any(addr, len)
        }
    }

    unsafe fn apply_9_to_16(addr: *const u8, len: u64) -> i64 {
        let mut h = seed(len);
        // SAFETY: len in 9..=15, both reads stay inside the range.
        let l0 = unsafe { read_incomplete(addr, len as i64) };
        let l1 = unsafe { read_incomplete(addr.add(8), len as i64 - 8) };
        lane_update(&mut h, [l0, l1, 0, 0]);
        lane_finish(h)
    }

    unsafe fn apply_17_to_32(addr: *const u8, len: u64) -> i64 {
        let mut h = seed(len);
        // SAFETY: len in 16..=32; the incomplete reads bound themselves.
        let l = unsafe {
            [
                mem::read_i64(addr),
                mem::read_i64(addr.add(8)),
                read_incomplete(addr.add(16), len as i64 - 16),
                read_incomplete(addr.add(24), len as i64 - 24),
            ]
        };
        lane_update(&mut h, l);
        lane_finish(h)
    }

    unsafe fn apply_multiple_of_32(addr: *const u8, len: u64) -> i64 {
        let mut h = seed(len);
        let mut i = 0u64;
        while i + 32 <= len {
            if i > 0 {
                lane_remix(&mut h);
            }
            // SAFETY: i + 32 <= len.
            let p = unsafe { addr.add(i as usize) };
            let l = unsafe {
                [
                    mem::read_i64(p),
                    mem::read_i64(p.add(8)),
                    mem::read_i64(p.add(16)),
                    mem::read_i64(p.add(24)),
                ]
            };
            lane_update(&mut h, l);
            i += 32;
        }
        lane_finish(h)
    }

    unsafe fn apply_any(addr: *const u8, len: u64) -> i64 {
        let mut h = seed(len);
        let mut i = 0u64;
        while i + 32 <= len {
            if i > 0 {
                lane_remix(&mut h);
            }
            // SAFETY: i + 32 <= len.
            let p = unsafe { addr.add(i as usize) };
            let l = unsafe {
                [
                    mem::read_i64(p),
                    mem::read_i64(p.add(8)),
                    mem::read_i64(p.add(16)),
                    mem::read_i64(p.add(24)),
                ]
            };
            lane_update(&mut h, l);
            i += 32;
        }
        let left = (len - i) as i64;
        if left > 0 {
            if i > 0 {
                lane_remix(&mut h);
            }
            // SAFETY: all reads below bound themselves by `left`.
            let p = unsafe { addr.add(i as usize) };
            let l = if left <= 16 {
                unsafe {
                    [
                        read_incomplete(p, left),
                        read_incomplete(p.add(8), left - 8),
                        0,
                        0,
                    ]
                }
            } else {
                unsafe {
                    [
                        mem::read_i64(p),
                        mem::read_i64(p.add(8)),
                        read_incomplete(p.add(16), left - 16),
                        read_incomplete(p.add(24), left - 24),
                    ]
                }
            };
            lane_update(&mut h, l);
        }
        lane_finish(h)
    }

    fn seed(len: u64) -> [i64; 4] {
        [(len as i64).wrapping_mul(K0), 0, 0, 0]
    }

    /// Assembles up to eight bytes into a zero-extended 64-bit value,
    /// composing host-order partial loads.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for `max(len, 0).min(8)` reads.
    pub(crate) unsafe fn read_incomplete(addr: *const u8, len: i64) -> i64 {
        // SAFETY: every arm reads at most `len` bytes.
        unsafe {
            match len {
                i64::MIN..=0 => 0,
                1 => i64::from(mem::read_u8(addr)),
                2 => i64::from(mem::read_i16(addr) as u16),
                3 => {
                    let lo = i64::from(mem::read_i16(addr) as u16);
                    let hi = i64::from(mem::read_u8(addr.add(2)));
                    if mem::IS_LITTLE_ENDIAN {
                        lo | (hi << 16)
                    } else {
                        (lo << 8) | hi
                    }
                }
                4 => i64::from(mem::read_i32(addr) as u32),
                5 => {
                    let lo = i64::from(mem::read_i32(addr) as u32);
                    let hi = i64::from(mem::read_u8(addr.add(4)));
                    if mem::IS_LITTLE_ENDIAN {
                        lo | (hi << 32)
                    } else {
                        (lo << 8) | hi
                    }
                }
                6 => {
                    let lo = i64::from(mem::read_i32(addr) as u32);
                    let hi = i64::from(mem::read_i16(addr.add(4)) as u16);
                    if mem::IS_LITTLE_ENDIAN {
                        lo | (hi << 32)
                    } else {
                        (lo << 16) | hi
                    }
                }
                7 => {
                    let lo = i64::from(mem::read_i32(addr) as u32);
                    let mid = i64::from(mem::read_i16(addr.add(4)) as u16);
                    let hi = i64::from(mem::read_u8(addr.add(6)));
                    if mem::IS_LITTLE_ENDIAN {
                        lo | (mid << 32) | (hi << 48)
                    } else {
                        (lo << 24) | (mid << 8) | hi
                    }
                }
                _ => mem::read_i64(addr),
            }
        }
    }
}

/// Offset-API variant for any backing.
pub(crate) mod vanilla {
    use super::*;

    pub(crate) fn apply(store: &dyn RandomInput, len: u64) -> Result<i64> {
        let begin = store.read_position();
        if len <= 8 {
            let l = incomplete(store, begin, len as i64)?;
            return Ok(hash0(l, l >> 32));
        }
        let mut h = [(len as i64).wrapping_mul(K0), 0, 0, 0];
        let mut i = 0u64;
        while i + 32 <= len {
            if i > 0 {
                lane_remix(&mut h);
            }
            let at = begin + i;
            let l = [
                store.read_i64(at)?,
                store.read_i64(at + 8)?,
                store.read_i64(at + 16)?,
                store.read_i64(at + 24)?,
            ];
            // The top halves come straight from memory here; for full
            // longs that is identical to shifting the value.
            let a = [
                i64::from(store.read_i32(at + mem::HI_BYTES)?),
                i64::from(store.read_i32(at + 8 + mem::HI_BYTES)?),
                i64::from(store.read_i32(at + 16 + mem::HI_BYTES)?),
                i64::from(store.read_i32(at + 24 + mem::HI_BYTES)?),
            ];
            h[0] = h[0].wrapping_add(l[0].wrapping_add(a[1]).wrapping_sub(a[2]).wrapping_mul(M0));
            h[1] = h[1].wrapping_add(l[1].wrapping_add(a[2]).wrapping_sub(a[3]).wrapping_mul(M1));
            h[2] = h[2].wrapping_add(l[2].wrapping_add(a[3]).wrapping_sub(a[0]).wrapping_mul(M2));
            h[3] = h[3].wrapping_add(l[3].wrapping_add(a[0]).wrapping_sub(a[1]).wrapping_mul(M3));
            i += 32;
        }
        let left = (len - i) as i64;
        if left > 0 {
            if i > 0 {
                lane_remix(&mut h);
            }
            let at = begin + i;
            let l = if left <= 16 {
                [
                    incomplete(store, at, left)?,
                    incomplete(store, at + 8, left - 8)?,
                    0,
                    0,
                ]
            } else {
                [
                    store.read_i64(at)?,
                    store.read_i64(at + 8)?,
                    incomplete(store, at + 16, left - 16)?,
                    incomplete(store, at + 24, left - 24)?,
                ]
            };
            lane_update(&mut h, l);
        }
        Ok(lane_finish(h))
    }

    /// Store-side twin of [`optimised::read_incomplete`], composing the
    /// same host-order partial loads through the offset API.
    fn incomplete(store: &dyn RandomInput, offset: u64, len: i64) -> Result<i64> {
        Ok(match len {
            i64::MIN..=0 => 0,
            1 => i64::from(store.read_u8(offset)?),
            2 => i64::from(store.read_u16(offset)?),
            3 => {
                let lo = i64::from(store.read_u16(offset)?);
                let hi = i64::from(store.read_u8(offset + 2)?);
                if mem::IS_LITTLE_ENDIAN {
                    lo | (hi << 16)
                } else {
                    (lo << 8) | hi
                }
            }
            4 => i64::from(store.read_u32(offset)?),
            5 => {
                let lo = i64::from(store.read_u32(offset)?);
                let hi = i64::from(store.read_u8(offset + 4)?);
                if mem::IS_LITTLE_ENDIAN {
                    lo | (hi << 32)
                } else {
                    (lo << 8) | hi
                }
            }
            6 => {
                let lo = i64::from(store.read_u32(offset)?);
                let hi = i64::from(store.read_u16(offset + 4)?);
                if mem::IS_LITTLE_ENDIAN {
                    lo | (hi << 32)
                } else {
                    (lo << 16) | hi
                }
            }
            7 => {
                let lo = i64::from(store.read_u32(offset)?);
                let mid = i64::from(store.read_u16(offset + 4)?);
                let hi = i64::from(store.read_u8(offset + 6)?);
                if mem::IS_LITTLE_ENDIAN {
                    lo | (mid << 32) | (hi << 48)
                } else {
                    (lo << 24) | (mid << 8) | hi
                }
            }
            _ => store.read_i64(offset)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HeapStore, NativeStore};

    fn pattern(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect()
    }

    #[test]
    fn empty_input_hashes_to_zero() {
        let store = HeapStore::wrap(Vec::new());
        assert_eq!(hash(&store).unwrap(), 0);
    }

    #[test]
    fn variants_agree_across_backings() {
        for n in [1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 15, 16, 17, 24, 31, 32, 33, 63, 64, 100, 256] {
            let data = pattern(n);
            let heap = HeapStore::copy_of(&data);
            let native = NativeStore::copy_of(&data).unwrap();
            assert_eq!(
                hash(&heap).unwrap(),
                hash(&native).unwrap(),
                "variant mismatch at len {n}"
            );
        }
    }

    #[test]
    fn single_byte_flip_changes_hash() {
        let data: Vec<u8> = (0u8..32).collect();
        let reference = hash(&HeapStore::copy_of(&data)).unwrap();
        for i in 0..32 {
            let mut mutated = data.clone();
            mutated[i] ^= 0x40;
            let h = hash(&HeapStore::copy_of(&mutated)).unwrap();
            assert_ne!(h, reference, "flip at byte {i} did not change the hash");
        }
    }

    #[test]
    fn hash_is_pure() {
        let data = pattern(77);
        let a = HeapStore::copy_of(&data);
        let b = HeapStore::copy_of(&data);
        assert_eq!(hash(&a).unwrap(), hash(&b).unwrap());
        assert_eq!(hash(&a).unwrap(), hash(&a).unwrap());
    }

    #[test]
    fn hash32_folds_the_long_hash() {
        let data: Vec<u8> = (0u8..32).collect();
        let store = HeapStore::copy_of(&data);
        let h = hash(&store).unwrap();
        assert_eq!(hash32(&store).unwrap(), (h ^ (h >> 32)) as i32);
    }

    #[test]
    fn length_prefix_matters() {
        let store = HeapStore::copy_of(&pattern(64));
        let h40 = hash_len(&store, 40).unwrap();
        let h64 = hash_len(&store, 64).unwrap();
        assert_ne!(h40, h64);
    }

    #[test]
    fn agitate_is_an_involution_free_mixer() {
        // Fixed points would weaken the finisher; zero must stay zero.
        assert_eq!(agitate(0), 0);
        assert_ne!(agitate(1), 1);
        assert_ne!(agitate(-1), 0);
    }
}
