//! Property tests for store and cursor invariants.

use proptest::prelude::*;

use zbuf::{
    compare, hash, ByteStore, Bytes, HeapStore, NativeStore, RandomAccess, RandomInput,
    RandomOutput, StreamInput, StreamOutput,
};

proptest! {
    /// Writing any value at any legal offset reads back identically, on
    /// both backings.
    #[test]
    fn primitive_roundtrip(offset in 0u64..56, v in any::<i64>()) {
        let heap = HeapStore::with_capacity(64);
        let native = NativeStore::fixed_capacity(64).unwrap();
        for store in [&heap as &dyn ByteStore, &native] {
            store.write_i64(offset, v).unwrap();
            prop_assert_eq!(store.read_i64(offset).unwrap(), v);
            store.write_f64(offset, f64::from_bits(v as u64)).unwrap();
            prop_assert_eq!(
                store.read_f64(offset).unwrap().to_bits(),
                v as u64
            );
        }
    }

    /// A bulk write followed by a bulk read reproduces the input.
    #[test]
    fn bulk_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let store = HeapStore::with_capacity(512);
        store.write_from(0, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        if data.is_empty() {
            prop_assert_eq!(store.read_into(512, &mut out).unwrap(), None);
        } else {
            prop_assert_eq!(store.read_into(0, &mut out).unwrap(), Some(data.len()));
            prop_assert_eq!(out, data);
        }
    }

    /// After `zero_out(o, o + n)` every byte of the range reads zero and
    /// bytes outside are untouched.
    #[test]
    fn zero_out_clears_exactly_the_range(begin in 0u64..128, len in 0u64..128) {
        let store = HeapStore::wrap(vec![0xEE; 256]);
        let end = begin + len;
        store.zero_out(begin, end).unwrap();
        for i in 0..256u64 {
            let expect = if i >= begin && i < end { 0 } else { 0xEE };
            prop_assert_eq!(store.read_u8(i).unwrap(), expect);
        }
    }

    /// `move_range` relocates content for any legal geometry.
    #[test]
    fn move_range_relocates(
        data in proptest::collection::vec(any::<u8>(), 1..64),
        from in 0u64..64,
        to in 0u64..64,
    ) {
        let store = HeapStore::with_capacity(128);
        store.write_from(from, &data).unwrap();
        store.move_range(from, to, data.len() as u64).unwrap();
        let mut out = vec![0u8; data.len()];
        store.read_into(to, &mut out).unwrap();
        prop_assert_eq!(out, data);
    }

    /// The content hash is pure and backing-independent.
    #[test]
    fn hash_is_pure_across_backings(data in proptest::collection::vec(any::<u8>(), 0..300)) {
        let heap = HeapStore::copy_of(&data);
        let native = NativeStore::copy_of(&data).unwrap();
        let h = hash::hash(&heap).unwrap();
        prop_assert_eq!(h, hash::hash(&native).unwrap());
        prop_assert_eq!(h, hash::hash(&heap).unwrap());
    }

    /// Content equality agrees with byte-wise comparison under the
    /// zero-extension rule.
    #[test]
    fn content_equality_matches_model(
        a in proptest::collection::vec(any::<u8>(), 0..96),
        b in proptest::collection::vec(any::<u8>(), 0..96),
    ) {
        let sa = HeapStore::copy_of(&a);
        let sb = NativeStore::copy_of(&b).unwrap();

        let n = a.len().max(b.len());
        let mut ma = a.clone();
        ma.resize(n, 0);
        let mut mb = b.clone();
        mb.resize(n, 0);
        let model = ma == mb;

        prop_assert_eq!(compare::content_equals(&sa, &sb).unwrap(), model);
        prop_assert_eq!(compare::content_equals(&sb, &sa).unwrap(), model);
    }

    /// Sequential writes advance the writer by the width written, and a
    /// matching read sequence returns the values in order.
    #[test]
    fn sequential_positions_advance(values in proptest::collection::vec(any::<i32>(), 1..32)) {
        let mut bytes = Bytes::elastic_with(16, 1 << 16).unwrap();
        for v in &values {
            bytes.put_i32(*v).unwrap();
        }
        prop_assert_eq!(bytes.write_position(), values.len() as u64 * 4);
        for v in &values {
            prop_assert_eq!(bytes.get_i32().unwrap(), *v);
        }
        prop_assert_eq!(bytes.read_position(), bytes.write_position());
    }

    /// The incomplete long read pads missing bytes with zeros.
    #[test]
    fn incomplete_long_zero_extends(data in proptest::collection::vec(any::<u8>(), 0..8)) {
        let mut bytes = Bytes::wrap(vec![0u8; 16]).unwrap();
        bytes.put_slice(&data).unwrap();

        let expected = match data.len() {
            4 => u64::from(u32::from_ne_bytes(data[..4].try_into().unwrap())) as i64,
            _ => {
                let mut v = 0u64;
                for (i, byte) in data.iter().enumerate() {
                    v |= u64::from(*byte) << (i * 8);
                }
                v as i64
            }
        };
        prop_assert_eq!(bytes.read_long_incomplete(0).unwrap(), expected);
    }

    /// Elastic growth preserves every byte written before the resize.
    #[test]
    fn growth_preserves_prefix(
        prefix in proptest::collection::vec(any::<u8>(), 1..64),
        tail_len in 64usize..512,
    ) {
        let mut bytes = Bytes::elastic_with(64, 1 << 16).unwrap();
        bytes.put_slice(&prefix).unwrap();
        bytes.put_slice(&vec![0x5A; tail_len]).unwrap();
        for (i, v) in prefix.iter().enumerate() {
            prop_assert_eq!(bytes.read_u8(i as u64).unwrap(), *v);
        }
    }
}
