//! Stress worker threads.
//!
//! Each worker owns a private buffer (and, for the pointer-chase kernel, an
//! index cycle), fills both deterministically from its per-thread seed, and
//! then spins on the enabled kernels until either its own flag or the run
//! flag clears. Nothing else ever touches a worker's buffers; the only state
//! a worker shares is its `WorkerSlot` and the telemetry it publishes through
//! `RunShared`.

use std::collections::TryReserveError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use log::error;

use crate::telemetry::RunShared;
use crate::util::rng::{cycle_shuffle32, splitmix64};
use crate::util::try_zeroed_vec;

use super::controller::KernelSet;
use super::kernels::{
    INT_KERNEL_MAX_WORDS, KERNEL_PASS_ROUNDS, kernel_fpu, kernel_int, kernel_ptrchase,
    kernel_stream,
};

/// Base constant workers add their id to when seeding, so buffer contents and
/// chase cycles are reproducible per configuration yet distinct per worker.
pub const WORKER_SEED_BASE: u64 = 0x1234_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    Ok = 0,
    /// Buffer or index allocation failed; the worker never entered the
    /// stress loop. One-way transition.
    AllocFailed = 1,
}

/// The per-worker state visible outside the worker thread. The controller
/// clears `running` during shutdown; telemetry readers poll `iters` and
/// `status`; everything else a worker owns stays private to it.
pub struct WorkerSlot {
    id: usize,
    running: AtomicBool,
    iters: AtomicU64,
    status: AtomicU8,
}

impl WorkerSlot {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            running: AtomicBool::new(false),
            iters: AtomicU64::new(0),
            status: AtomicU8::new(WorkerStatus::Ok as u8),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.iters.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> WorkerStatus {
        match self.status.load(Ordering::Relaxed) {
            0 => WorkerStatus::Ok,
            _ => WorkerStatus::AllocFailed,
        }
    }

    fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    fn fail_alloc(&self) {
        self.status.store(WorkerStatus::AllocFailed as u8, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
    }

    fn bump_iters(&self) -> u64 {
        self.iters.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Builds the pointer-chase index array for a domain of `n` entries: a
/// uniformly random permutation consisting of one cycle through all of
/// `[0, n)`, so the chase starting at 0 touches every entry before closing.
pub fn build_chase_cycle(n: usize, seed: &mut u64) -> Result<Vec<u32>, TryReserveError> {
    let n = n.min(u32::MAX as usize);
    let mut idx = Vec::new();
    idx.try_reserve_exact(n)?;
    idx.extend(0..n as u32);
    cycle_shuffle32(&mut idx, seed);
    Ok(idx)
}

/// Worker thread entry point.
///
/// Allocation failures are non-fatal to the run: the worker records
/// `AllocFailed`, bumps the shared error counter, logs, and terminates
/// without entering the stress loop. Partial allocations unwind via drop.
pub fn worker_main(
    buf_bytes: usize,
    kernels: KernelSet,
    slot: Arc<WorkerSlot>,
    shared: Arc<RunShared>,
) {
    let tid = slot.id();

    let mut heap: Vec<u64> = match try_zeroed_vec(buf_bytes / 8) {
        Ok(v) => v,
        Err(_) => {
            error!("[T{tid}] buffer allocation failed ({buf_bytes} bytes)");
            shared.count_error();
            slot.fail_alloc();
            return;
        }
    };

    let mut seed = WORKER_SEED_BASE + tid as u64;

    // Pointer-chase index domain follows the configured buffer, one entry
    // per u32 the buffer could hold. A zero-memory run has no domain and
    // simply skips the chase.
    let idx: Vec<u32> = if kernels.ptrchase && !heap.is_empty() {
        match build_chase_cycle(buf_bytes / 4, &mut seed) {
            Ok(v) => v,
            Err(_) => {
                error!("[T{tid}] index allocation failed ({} entries)", buf_bytes / 4);
                shared.count_error();
                slot.fail_alloc();
                return;
            }
        }
    } else {
        Vec::new()
    };

    // Zero-memory configurations are legal: CPU-bound kernels run over a
    // small fixed working set on the worker's stack instead.
    let mut stack_ws = [0u64; INT_KERNEL_MAX_WORDS];
    let ws: &mut [u64] = if heap.is_empty() { &mut stack_ws } else { &mut heap };

    init_working_set(ws, kernels, &mut seed);

    slot.start();
    while slot.is_running() && shared.is_running() {
        if kernels.fpu {
            let floats = as_floats_mut(ws);
            let per = floats.len() / 3;
            if per > 0 {
                let (a, rest) = floats.split_at_mut(per);
                let (b, c) = rest.split_at_mut(per);
                kernel_fpu(a, b, &mut c[..per], KERNEL_PASS_ROUNDS);
            }
        }
        if kernels.int {
            let cap = ws.len().min(INT_KERNEL_MAX_WORDS);
            kernel_int(&mut ws[..cap], KERNEL_PASS_ROUNDS);
        }
        if kernels.stream {
            kernel_stream(as_bytes_mut(ws));
        }
        if kernels.ptrchase && !idx.is_empty() {
            kernel_ptrchase(&idx, KERNEL_PASS_ROUNDS);
        }

        let done = slot.bump_iters();
        shared.add_iteration();
        shared.publish_iters(tid, done as u32);
    }
    // Buffer and index array drop here, on every exit path.
}

/// Deterministic working-set fill, in the same draw order for every run of
/// the same configuration: float triples first when the FPU kernel wants
/// them, then every word when the integer kernel does.
fn init_working_set(ws: &mut [u64], kernels: KernelSet, seed: &mut u64) {
    if kernels.fpu {
        let floats = as_floats_mut(ws);
        let per = floats.len() / 3;
        for i in 0..per {
            floats[i] = (splitmix64(seed) & 0xFFFF) as f32 / 65535.0;
            floats[per + i] = (splitmix64(seed) & 0xFFFF) as f32 / 65535.0;
            floats[2 * per + i] = (splitmix64(seed) & 0xFFFF) as f32 / 65535.0;
        }
    }
    if kernels.int {
        for w in ws.iter_mut() {
            *w = splitmix64(seed);
        }
    }
}

fn as_floats_mut(words: &mut [u64]) -> &mut [f32] {
    // Plain-old-data reinterpretation; u64 alignment and size cover f32, so
    // prefix and suffix are empty.
    unsafe { words.align_to_mut::<f32>().1 }
}

fn as_bytes_mut(words: &mut [u64]) -> &mut [u8] {
    unsafe { words.align_to_mut::<u8>().1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn int_only() -> KernelSet {
        KernelSet { fpu: false, int: true, stream: false, ptrchase: false }
    }

    fn spawn_worker(
        buf_bytes: usize,
        kernels: KernelSet,
        slot: &Arc<WorkerSlot>,
        shared: &Arc<RunShared>,
    ) -> thread::JoinHandle<()> {
        let s = Arc::clone(slot);
        let sh = Arc::clone(shared);
        thread::spawn(move || worker_main(buf_bytes, kernels, s, sh))
    }

    fn running_shared(threads: usize) -> Arc<RunShared> {
        let shared = Arc::new(RunShared::new());
        shared.begin();
        shared.install_iter_history(vec![vec![0u32; 8]; threads]);
        shared
    }

    #[test]
    fn worker_respects_stop_flag() {
        let shared = running_shared(1);
        let slot = Arc::new(WorkerSlot::new(0));
        let handle = spawn_worker(1 << 20, int_only(), &slot, &shared);

        thread::sleep(Duration::from_millis(100));
        slot.request_stop();
        handle.join().expect("worker joins after stop");

        assert_eq!(slot.status(), WorkerStatus::Ok);
        assert!(slot.iterations() > 0);
        assert!(shared.total_iterations() >= slot.iterations());
        assert_eq!(shared.error_count(), 0);
    }

    #[test]
    fn worker_runs_cpu_only_without_memory() {
        let shared = running_shared(1);
        let slot = Arc::new(WorkerSlot::new(0));
        let all = KernelSet { fpu: true, int: true, stream: true, ptrchase: true };
        let handle = spawn_worker(0, all, &slot, &shared);

        thread::sleep(Duration::from_millis(100));
        shared.request_stop();
        handle.join().expect("worker joins after run stop");

        assert_eq!(slot.status(), WorkerStatus::Ok);
        assert!(slot.iterations() > 0);
    }

    #[test]
    fn worker_records_alloc_failure_without_entering_loop() {
        let shared = running_shared(1);
        let slot = Arc::new(WorkerSlot::new(0));
        // Far beyond any allocatable size; try_reserve fails deterministically.
        let handle = spawn_worker(usize::MAX & !7, int_only(), &slot, &shared);
        handle.join().expect("failed worker still returns");

        assert_eq!(slot.status(), WorkerStatus::AllocFailed);
        assert_eq!(slot.iterations(), 0);
        assert_eq!(shared.error_count(), 1);
        assert!(!slot.is_running());
    }

    #[test]
    fn worker_publishes_iterations_into_history() {
        let shared = running_shared(2);
        let slot = Arc::new(WorkerSlot::new(1));
        let handle = spawn_worker(1 << 16, int_only(), &slot, &shared);

        thread::sleep(Duration::from_millis(100));
        slot.request_stop();
        handle.join().unwrap();

        let (rows, pos) = shared.iteration_history();
        assert_eq!(rows[1][pos] as u64, slot.iterations());
        // Worker 0 never ran; its row stays zeroed.
        assert!(rows[0].iter().all(|&v| v == 0));
    }

    #[test]
    fn one_failed_worker_does_not_stop_the_others() {
        let shared = running_shared(2);
        let bad_slot = Arc::new(WorkerSlot::new(0));
        let good_slot = Arc::new(WorkerSlot::new(1));
        let bad = spawn_worker(usize::MAX & !7, int_only(), &bad_slot, &shared);
        let good = spawn_worker(1 << 16, int_only(), &good_slot, &shared);

        bad.join().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(good_slot.is_running());

        good_slot.request_stop();
        good.join().unwrap();

        assert_eq!(bad_slot.status(), WorkerStatus::AllocFailed);
        assert_eq!(good_slot.status(), WorkerStatus::Ok);
        assert!(good_slot.iterations() > 0);
        assert_eq!(shared.error_count(), 1);
    }

    #[test]
    fn chase_cycle_is_hamiltonian() {
        for (n, mut seed) in [(1usize, 1u64), (2, 7), (1024, WORKER_SEED_BASE), (4096, 3)] {
            let idx = build_chase_cycle(n, &mut seed).unwrap();
            assert_eq!(idx.len(), n);

            let mut visited = vec![false; n];
            let mut cur = 0u32;
            for _ in 0..n {
                assert!(!visited[cur as usize]);
                visited[cur as usize] = true;
                cur = idx[cur as usize];
            }
            assert_eq!(cur, 0, "chase of {n} steps must close the cycle at 0");
            assert!(visited.iter().all(|&v| v));
        }
    }

    #[test]
    fn chase_cycle_is_seed_deterministic() {
        let mut s1 = WORKER_SEED_BASE + 3;
        let mut s2 = WORKER_SEED_BASE + 3;
        assert_eq!(
            build_chase_cycle(512, &mut s1).unwrap(),
            build_chase_cycle(512, &mut s2).unwrap()
        );
        let mut s3 = WORKER_SEED_BASE + 4;
        assert_ne!(
            build_chase_cycle(512, &mut s2).unwrap(),
            build_chase_cycle(512, &mut s3).unwrap()
        );
    }
}
