//! Deterministic pseudo-random generation for worker buffer fills.
//!
//! Every worker derives its buffer contents and pointer-chase permutation from
//! a fixed per-thread seed, so a run configuration is exactly reproducible.
//! splitmix64 is used instead of a `rand` generator because the mixing
//! constants are part of the contract: the same seed must produce the same
//! stress pattern across builds and platforms.

/// Advances `state` and returns the next 64-bit value of the splitmix64
/// sequence. Pure mixing function: identical input state always yields an
/// identical output and successor state.
#[inline]
pub fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// In-place Fisher–Yates shuffle of a `u32` slice, driven by `splitmix64`.
///
/// Draws for position `i` are taken by rejection sampling against
/// `u64::MAX - (u64::MAX % (i + 1))`, so the index in `[0, i]` is uniform
/// with no modulo bias. Slices of length 0 or 1 are a no-op.
pub fn shuffle32(a: &mut [u32], state: &mut u64) {
    let n = a.len();
    if n <= 1 {
        return;
    }
    for i in (1..n).rev() {
        let bound = (i as u64) + 1;
        let limit = u64::MAX - (u64::MAX % bound);
        let mut r = splitmix64(state);
        while r >= limit {
            r = splitmix64(state);
        }
        let j = (r % bound) as usize;
        a.swap(i, j);
    }
}

/// Sattolo variant of the shuffle: draws the partner index strictly below
/// `i`, which yields a uniformly random permutation made of a *single* cycle.
/// This is what the pointer-chase kernel needs — a plain Fisher–Yates result
/// can decompose into short cycles and let the chase collapse onto a few hot
/// cache lines.
pub fn cycle_shuffle32(a: &mut [u32], state: &mut u64) {
    let n = a.len();
    if n <= 1 {
        return;
    }
    for i in (1..n).rev() {
        let bound = i as u64;
        let limit = u64::MAX - (u64::MAX % bound);
        let mut r = splitmix64(state);
        while r >= limit {
            r = splitmix64(state);
        }
        let j = (r % bound) as usize;
        a.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitmix64_is_deterministic() {
        let mut s1 = 0xDEAD_BEEF_u64;
        let mut s2 = 0xDEAD_BEEF_u64;
        let a = (splitmix64(&mut s1), splitmix64(&mut s1));
        let b = (splitmix64(&mut s2), splitmix64(&mut s2));
        assert_eq!(a, b);
        assert_eq!(s1, s2);
        // No trivial short cycle for a common seed.
        assert_ne!(a.0, a.1);
    }

    #[test]
    fn splitmix64_matches_reference_vectors() {
        // First outputs of the published splitmix64 sequence for seed 0.
        let mut s = 0u64;
        assert_eq!(splitmix64(&mut s), 0xE220_A839_7B1D_CDAF);
        assert_eq!(splitmix64(&mut s), 0x6E78_9E6A_A1B9_65F4);
    }

    #[test]
    fn shuffle_produces_a_permutation() {
        let mut a: Vec<u32> = (0..1000).collect();
        let mut seed = 42u64;
        shuffle32(&mut a, &mut seed);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..1000).collect::<Vec<u32>>());
        // With n = 1000 the identity permutation is astronomically unlikely.
        assert_ne!(a, (0..1000).collect::<Vec<u32>>());
    }

    #[test]
    fn shuffle_is_seed_deterministic() {
        let mut a: Vec<u32> = (0..64).collect();
        let mut b: Vec<u32> = (0..64).collect();
        let mut sa = 7u64;
        let mut sb = 7u64;
        shuffle32(&mut a, &mut sa);
        shuffle32(&mut b, &mut sb);
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_short_slices_are_noops() {
        let mut seed = 1u64;
        let mut empty: [u32; 0] = [];
        shuffle32(&mut empty, &mut seed);

        let mut one = [99u32];
        shuffle32(&mut one, &mut seed);
        assert_eq!(one, [99]);
        // Degenerate inputs must not advance the generator.
        assert_eq!(seed, 1);
    }

    #[test]
    fn cycle_shuffle_is_one_cycle() {
        let mut seed = 0xC1C1_u64;
        for n in [2usize, 3, 17, 256] {
            let mut a: Vec<u32> = (0..n as u32).collect();
            cycle_shuffle32(&mut a, &mut seed);

            let mut visited = vec![false; n];
            let mut cur = 0usize;
            for _ in 0..n {
                assert!(!visited[cur], "revisited {cur} before cycle closed");
                visited[cur] = true;
                cur = a[cur] as usize;
            }
            assert_eq!(cur, 0, "walk of length {n} did not return to start");
            assert!(visited.iter().all(|&v| v));
        }
    }

    #[test]
    fn shuffle_position_occupancy_is_uniform() {
        const TRIALS: usize = 100_000;
        let mut seed = 0x5EED_u64;
        // counts[value][index]
        let mut counts = [[0usize; 3]; 3];

        for _ in 0..TRIALS {
            let mut a = [0u32, 1, 2];
            shuffle32(&mut a, &mut seed);
            for (idx, &v) in a.iter().enumerate() {
                counts[v as usize][idx] += 1;
            }
        }

        let expected = TRIALS as f64 / 3.0;
        for row in &counts {
            for &c in row {
                let deviation = (c as f64 - expected).abs() / expected;
                assert!(
                    deviation < 0.02,
                    "occupancy {c} deviates {deviation:.4} from uniform"
                );
            }
        }
    }
}
