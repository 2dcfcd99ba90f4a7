//! Hashes behind consistent-hashing selection.
//!
//! - `murmur3_32`: MurmurHash3 x86_32, turns the affinity key into a hash seed.
//! - `jump_hash`: Lamping & Veach jump consistent hash; growing the bucket
//!   count from n to n+1 moves only ~1/(n+1) of keys.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

#[inline]
fn mix_k(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k.wrapping_mul(C2)
}

/// MurmurHash3 (x86, 32-bit).
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, b) in tail.iter().enumerate() {
            k |= u32::from(*b) << (8 * i);
        }
        h ^= mix_k(k);
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Map `key` to a bucket in `[0, buckets)`. `buckets` must be positive.
pub fn jump_hash(mut key: u64, buckets: i32) -> i32 {
    debug_assert!(buckets > 0, "jump_hash needs at least one bucket");
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < i64::from(buckets) {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1i64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur_known_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        assert_eq!(
            murmur3_32(b"The quick brown fox jumps over the lazy dog", 0),
            0x2e4f_f723
        );
        assert_eq!(murmur3_32(b"example.com", 0), 0x6971_e733);
    }

    #[test]
    fn jump_known_vectors() {
        assert_eq!(jump_hash(1, 10), 6);
        assert_eq!(jump_hash(1, 100), 55);
        assert_eq!(jump_hash(2, 100), 62);
        assert_eq!(jump_hash(0xdead_beef, 100), 87);
        assert_eq!(jump_hash(0, 100), 0);
    }

    #[test]
    fn single_bucket_is_always_zero() {
        for key in [0u64, 1, 42, u64::MAX] {
            assert_eq!(jump_hash(key, 1), 0);
        }
    }

    #[test]
    fn output_in_range_and_deterministic() {
        let mut key = 0x9e37_79b9_7f4a_7c15u64;
        for buckets in 1..=64 {
            for _ in 0..200 {
                key = key.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let b = jump_hash(key, buckets);
                assert!((0..buckets).contains(&b));
                assert_eq!(b, jump_hash(key, buckets));
            }
        }
    }

    #[test]
    fn growing_buckets_moves_few_keys() {
        const SAMPLES: u64 = 100_000;
        for buckets in [1, 4, 9, 31] {
            let mut moved = 0u64;
            let mut key = 0x2545_f491_4f6c_dd1du64;
            for _ in 0..SAMPLES {
                key ^= key << 13;
                key ^= key >> 7;
                key ^= key << 17;
                let before = jump_hash(key, buckets);
                let after = jump_hash(key, buckets + 1);
                if before != after {
                    // keys only ever move into the new bucket
                    assert_eq!(after, buckets);
                    moved += 1;
                }
            }
            let fraction = moved as f64 / SAMPLES as f64;
            let expected = 1.0 / f64::from(buckets + 1);
            assert!(
                (fraction - expected).abs() <= expected * 0.2,
                "buckets={buckets} moved={fraction} expected={expected}"
            );
        }
    }
}
