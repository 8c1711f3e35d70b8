//! # hardstress
//!
//! Configurable hardware stress-testing engine: saturates CPU compute units,
//! memory bandwidth, and cache/prefetch paths with concurrent worker threads
//! while a sampler thread collects per-core utilization and temperature for
//! whoever renders them.
//!
//! ## Architecture
//! - **Workers (N):** each owns a private buffer filled deterministically
//!   from a per-thread seed and spins on the enabled stress kernels (FPU,
//!   integer, stream, pointer-chase) until signalled.
//! - **Sampler:** snapshots per-core CPU usage (`/proc/stat` deltas on
//!   Linux) and temperature once per second into lock-guarded ring buffers.
//! - **Controller:** allocates, spawns, enforces the duration, and tears
//!   everything down through one unified path on success and failure alike.
//!
//! ## Concurrency
//! - One atomic run flag is the only shutdown signal; stopping is
//!   cooperative (workers finish their current pass).
//! - Telemetry buffers sit behind per-family mutexes; no path holds two.
//! - Worker buffers are exclusively owned; nothing else reads them.
//!
//! ## Entry points
//! [`start`] validates a [`RunConfig`] and returns a [`RunHandle`]
//! immediately; [`start_with`] additionally takes caller-supplied
//! [`Instruments`] (CPU source, temperature probe). The run finishes on its
//! own when a duration is set, or on [`RunHandle::stop`]. The `Finished`
//! event fires exactly once.

pub mod core;
pub mod telemetry;
pub mod util;

pub use crate::core::controller::{
    DEFAULT_DURATION_SEC, DEFAULT_MEM_MIB, EngineEvent, Instruments, KernelSet, MONITOR_POLL_MS,
    RunConfig, RunHandle, RunSummary, StartError, start, start_with,
};
pub use crate::core::kernels::{INT_KERNEL_MAX_WORDS, KERNEL_PASS_ROUNDS};
pub use crate::core::worker::{WORKER_SEED_BASE, WorkerStatus};
pub use crate::telemetry::cpu::{CpuSampleSource, CpuTimes, NullCpuSource, ProcStatSource};
pub use crate::telemetry::{
    NullTempProbe, RunShared, SAMPLE_INTERVAL_MS, TEMP_UNAVAILABLE, TemperatureProbe,
};
