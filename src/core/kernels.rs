//! Branch-free stress kernels.
//!
//! Four independent inner loops, each saturating a different hardware path:
//! - **FPU**: fused multiply-add throughput over three float vectors.
//! - **Integer**: ALU bit-mixing with a serial accumulator dependency.
//! - **Stream**: bulk write then read+write memory bandwidth.
//! - **Pointer chase**: serial cache-defeating traversal of a shuffled cycle.
//!
//! Kernels operate on memory owned by the calling worker; they allocate
//! nothing and perform no I/O. All arithmetic wraps intentionally — outputs
//! are never read for correctness, only produced for throughput.

use std::hint::black_box;

/// Upper bound on the integer kernel working set, in 64-bit words.
///
/// Carried over from the original calibration: the integer kernel touches at
/// most 8 KiB per pass regardless of the configured buffer size, so larger
/// buffers do not proportionally raise ALU stress intensity. Changing this
/// changes calibrated per-pass cost.
pub const INT_KERNEL_MAX_WORDS: usize = 1024;

/// Rounds each kernel repeats its sweep per worker pass.
pub const KERNEL_PASS_ROUNDS: usize = 4;

/// Floating-point multiply-add sweep: `c[i] = a[i] * b[i] + c[i]`, repeated
/// `iters` times over all elements. Slices are expected to be equal length;
/// the shortest bounds the sweep.
pub fn kernel_fpu(a: &[f32], b: &[f32], c: &mut [f32], iters: usize) {
    let n = a.len().min(b.len()).min(c.len());
    for _ in 0..iters {
        for i in 0..n {
            c[i] = a[i].mul_add(b[i], c[i]);
        }
    }
}

/// 64-bit finalizer-style mixer used by the integer kernel.
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    x = x.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    x ^ (x >> 33)
}

/// Integer/bitwise sweep. Folds a mixed value of every word into a serial
/// accumulator, then feeds accumulator plus bit-rotations of the word back
/// into the buffer. Callers cap `dst` at [`INT_KERNEL_MAX_WORDS`].
pub fn kernel_int(dst: &mut [u64], iters: usize) {
    let mut acc: u64 = 0xC0_FFEE;
    for _ in 0..iters {
        for (i, w) in dst.iter_mut().enumerate() {
            acc ^= mix64(w.wrapping_add(i as u64));
            *w = acc.wrapping_add(*w << 1).wrapping_add(*w >> 3);
        }
    }
    black_box(acc);
}

/// Memory bandwidth sweep: fill the first half of the buffer with a fixed
/// byte pattern (pure write), then copy it over the second half (read+write).
pub fn kernel_stream(buf: &mut [u8]) {
    let half = buf.len() / 2;
    buf[..half].fill(0xA5);
    buf.copy_within(..half, half);
}

/// Pointer-chase sweep: starting at index 0, follow `current = idx[current]`
/// for `rounds * idx.len()` steps. The index array must form a single cycle
/// over `[0, len)` so the chase never collapses into a short loop; each load
/// depends on the previous one, which is what defeats the prefetcher.
///
/// Returns the final position so the dependency chain survives optimization.
pub fn kernel_ptrchase(idx: &[u32], rounds: usize) -> u32 {
    if idx.is_empty() {
        return 0;
    }
    let mut cur: u32 = 0;
    for _ in 0..rounds {
        for _ in 0..idx.len() {
            cur = idx[cur as usize];
        }
    }
    black_box(cur)
}
