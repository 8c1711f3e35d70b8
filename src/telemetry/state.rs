//! Shared per-run state handed to every thread of a stress run.
//!
//! `RunShared` is the one cross-thread object: the kill-switch flag, the
//! aggregate counters, and the lock-guarded telemetry buffers. Workers and
//! the sampler never touch buffer internals directly; every access goes
//! through an accessor that takes the matching lock, so the reader (whatever
//! renders the telemetry) and the writers can never race on a buffer family.
//! No code path holds two of these locks at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::worker::{WorkerSlot, WorkerStatus};

use super::history::{CpuHistory, IterHistory};

/// Sentinel temperature meaning "no reading available", in °C.
pub const TEMP_UNAVAILABLE: f64 = -274.0;

pub struct RunShared {
    running: AtomicBool,
    errors: AtomicU32,
    total_iters: AtomicU64,
    history: Mutex<IterHistory>,
    cpu: Mutex<CpuHistory>,
    temp: Mutex<f64>,
    workers: Mutex<Vec<Arc<WorkerSlot>>>,
}

impl RunShared {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            errors: AtomicU32::new(0),
            total_iters: AtomicU64::new(0),
            history: Mutex::new(IterHistory::default()),
            cpu: Mutex::new(CpuHistory::default()),
            temp: Mutex::new(TEMP_UNAVAILABLE),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Resets counters and raises the run flag. Controller entry only.
    pub(crate) fn begin(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.total_iters.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
    }

    /// The single authoritative kill-switch read by every thread.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Requests a cooperative stop. Idempotent.
    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }

    pub(crate) fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_iterations(&self) -> u64 {
        self.total_iters.load(Ordering::Relaxed)
    }

    pub(crate) fn add_iteration(&self) {
        self.total_iters.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes a worker's iteration count into its history slot for the
    /// current sampling window.
    pub(crate) fn publish_iters(&self, tid: usize, count: u32) {
        self.history.lock().record(tid, count);
    }

    /// Rotates the iteration history to the next sampling window.
    pub(crate) fn advance_sample_window(&self) {
        self.history.lock().advance();
    }

    /// Stores the latest per-core usage sample.
    pub(crate) fn publish_cpu(&self, usage: &[f64]) {
        self.cpu.lock().push(usage);
    }

    pub(crate) fn publish_temp(&self, celsius: f64) {
        *self.temp.lock() = celsius;
    }

    /// Latest temperature in °C, or [`TEMP_UNAVAILABLE`].
    pub fn temperature(&self) -> f64 {
        *self.temp.lock()
    }

    /// Snapshot of the latest per-core usage fractions.
    pub fn cpu_usage(&self) -> Vec<f64> {
        self.cpu.lock().usage().to_vec()
    }

    /// Mean usage across cores for the latest sample.
    pub fn cpu_average(&self) -> f64 {
        self.cpu.lock().average()
    }

    /// Snapshot of the per-core usage rings: `(rings, position, filled)`.
    pub fn cpu_history(&self) -> (Vec<Vec<f64>>, usize, usize) {
        let cpu = self.cpu.lock();
        (cpu.rings().to_vec(), cpu.position(), cpu.filled())
    }

    /// Snapshot of the per-thread iteration matrix and its write position.
    pub fn iteration_history(&self) -> (Vec<Vec<u32>>, usize) {
        let h = self.history.lock();
        (h.rows().to_vec(), h.position())
    }

    /// Per-worker view for renderers: `(iterations, status)` per thread
    /// slot, so a failed worker is distinguishable in the telemetry.
    pub fn worker_snapshot(&self) -> Vec<(u64, WorkerStatus)> {
        self.workers.lock().iter().map(|s| (s.iterations(), s.status())).collect()
    }

    pub(crate) fn install_workers(&self, slots: Vec<Arc<WorkerSlot>>) {
        *self.workers.lock() = slots;
    }

    pub(crate) fn install_iter_history(&self, rows: Vec<Vec<u32>>) {
        self.history.lock().install(rows);
    }

    pub(crate) fn install_cpu_history(&self, usage: Vec<f64>, rings: Vec<Vec<f64>>) {
        self.cpu.lock().install(usage, rings);
    }

    /// Releases every telemetry buffer under its own lock and resets the
    /// temperature cell. Leaves the struct reusable for the next run.
    pub(crate) fn clear_telemetry(&self) {
        self.history.lock().clear();
        self.cpu.lock().clear();
        self.workers.lock().clear();
        *self.temp.lock() = TEMP_UNAVAILABLE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_reset_on_begin() {
        let s = RunShared::new();
        s.count_error();
        s.add_iteration();
        s.begin();
        assert_eq!(s.error_count(), 0);
        assert_eq!(s.total_iterations(), 0);
        assert!(s.is_running());
        s.request_stop();
        assert!(!s.is_running());
    }

    #[test]
    fn telemetry_round_trip_and_clear() {
        let s = RunShared::new();
        s.install_iter_history(vec![vec![0u32; 4]; 2]);
        s.install_cpu_history(vec![0.0; 2], vec![vec![0.0; 8]; 2]);

        s.publish_iters(1, 42);
        s.publish_cpu(&[0.5, 0.75]);
        s.publish_temp(55.0);

        let (rows, pos) = s.iteration_history();
        assert_eq!(rows[1][pos], 42);
        assert_eq!(s.cpu_usage(), vec![0.5, 0.75]);
        assert!((s.cpu_average() - 0.625).abs() < 1e-9);
        assert_eq!(s.temperature(), 55.0);

        s.clear_telemetry();
        assert!(s.iteration_history().0.is_empty());
        assert!(s.cpu_usage().is_empty());
        assert_eq!(s.temperature(), TEMP_UNAVAILABLE);
    }
}
