//! Run controller: lifecycle of one stress run.
//!
//! The controller thread owns the whole run: it allocates the telemetry
//! buffers, spawns the sampler and the workers, enforces the configured
//! duration, and tears everything down again through a single teardown path
//! that is reachable from every failure point. Stage functions return
//! `Result` and teardown runs unconditionally afterwards, so a failed
//! allocation or spawn can never leave threads unjoined or buffers installed.
//!
//! External surface: [`start`] validates and returns immediately with a
//! [`RunHandle`]; [`RunHandle::stop`] is an asynchronous, idempotent request;
//! the `Finished` event fires exactly once when teardown completes.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{error, info, warn};
use thiserror::Error;

use crate::telemetry::cpu::{CpuSampleSource, CpuTimes, default_cpu_source};
use crate::telemetry::history::{CPU_HISTORY_SAMPLES, HISTORY_SAMPLES};
use crate::telemetry::sampler::{NullTempProbe, SamplerCtx, TemperatureProbe, sampler_main};
use crate::telemetry::state::RunShared;
use crate::util::{total_system_memory, try_zeroed_vec};

use super::worker::{WorkerSlot, WorkerStatus, worker_main};

/// Interval between duration checks in the monitoring loop.
pub const MONITOR_POLL_MS: u64 = 200;

/// Default memory per worker thread, in MiB.
pub const DEFAULT_MEM_MIB: usize = 256;

/// Default run duration, in seconds.
pub const DEFAULT_DURATION_SEC: u64 = 300;

/// Which stress kernels a run executes. At least one must be enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelSet {
    pub fpu: bool,
    pub int: bool,
    pub stream: bool,
    pub ptrchase: bool,
}

impl KernelSet {
    pub fn any(&self) -> bool {
        self.fpu || self.int || self.stream || self.ptrchase
    }

    pub fn all() -> Self {
        Self { fpu: true, int: true, stream: true, ptrchase: true }
    }
}

/// Configuration for one stress run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Worker thread count; 0 autodetects the logical core count.
    pub threads: usize,
    /// Private buffer size per worker, in MiB. 0 is legal (CPU-only run).
    pub mem_mib_per_thread: usize,
    /// Run duration in seconds; 0 runs until [`RunHandle::stop`].
    pub duration_secs: u64,
    /// Pin worker `i` to logical core `i % core_count`.
    pub pin_affinity: bool,
    pub kernels: KernelSet,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            mem_mib_per_thread: DEFAULT_MEM_MIB,
            duration_secs: DEFAULT_DURATION_SEC,
            pin_affinity: false,
            kernels: KernelSet::all(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    /// Rejected before any allocation; user-correctable, not a run fault.
    #[error("no stress kernel selected")]
    NoKernelSelected,
    #[error("failed to spawn controller thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Events delivered to whoever holds the [`RunHandle`].
#[derive(Debug)]
pub enum EngineEvent {
    /// The sampler completed a telemetry snapshot; redraw hint.
    SampleTick,
    /// Teardown completed. Sent exactly once per run.
    Finished(RunSummary),
}

/// Final accounting for a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub total_iterations: u64,
    pub errors: u32,
    pub worker_status: Vec<WorkerStatus>,
}

/// Handle to a running stress test. Dropping the handle detaches the run;
/// it keeps going until its duration elapses or the process exits.
pub struct RunHandle {
    shared: Arc<RunShared>,
    events: Receiver<EngineEvent>,
    controller: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Requests a cooperative stop. Asynchronous and idempotent: workers
    /// finish their current kernel pass, then the controller tears down and
    /// the `Finished` event fires. Calling this after completion is a no-op.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Telemetry read surface for this run.
    pub fn shared(&self) -> &Arc<RunShared> {
        &self.shared
    }

    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    /// Blocks until the controller has finished teardown; returns the run
    /// summary unless it was already consumed from [`events`](Self::events).
    pub fn wait(mut self) -> Option<RunSummary> {
        if let Some(h) = self.controller.take() {
            let _ = h.join();
        }
        let mut summary = None;
        while let Ok(ev) = self.events.try_recv() {
            if let EngineEvent::Finished(s) = ev {
                summary = Some(s);
            }
        }
        summary
    }
}

/// Measurement collaborators handed to the sampler thread. [`Default`] wires
/// the platform CPU source and a probe that reports no temperature; embedders
/// with a real sensor pass their own probe through [`start_with`].
pub struct Instruments {
    pub cpu_source: Box<dyn CpuSampleSource>,
    pub temp_probe: Box<dyn TemperatureProbe>,
}

impl Default for Instruments {
    fn default() -> Self {
        Self { cpu_source: default_cpu_source(), temp_probe: Box::new(NullTempProbe) }
    }
}

/// Validates the configuration and spawns the controller thread for one
/// stress run. Returns immediately; the run proceeds in the background.
pub fn start(config: RunConfig) -> Result<RunHandle, StartError> {
    start_with(config, Instruments::default())
}

/// [`start`] with caller-supplied measurement collaborators.
pub fn start_with(config: RunConfig, instruments: Instruments) -> Result<RunHandle, StartError> {
    if !config.kernels.any() {
        return Err(StartError::NoKernelSelected);
    }
    let shared = Arc::new(RunShared::new());
    let (tx, rx) = unbounded();
    let sh = Arc::clone(&shared);
    let controller = thread::Builder::new()
        .name("hs-controller".into())
        .spawn(move || controller_main(config, sh, tx, Allocs::unlimited(), instruments))?;
    Ok(RunHandle { shared, events: rx, controller: Some(controller) })
}

/// Marker for an aborted setup stage; the failure is already logged and
/// counted by the time this propagates.
struct Abort;

/// Fallible allocation front for everything the controller sizes at run
/// start. Carries an optional budget so tests can fail the N-th allocation
/// and exercise the teardown path from any point in the sequence.
pub(crate) struct Allocs {
    budget: Option<usize>,
}

impl Allocs {
    pub(crate) fn unlimited() -> Self {
        Self { budget: None }
    }

    #[cfg(test)]
    fn fail_after(n: usize) -> Self {
        Self { budget: Some(n) }
    }

    fn admit(&mut self) -> bool {
        match self.budget.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }

    fn vec<T: Clone + Default>(&mut self, len: usize, what: &'static str) -> Result<Vec<T>, Abort> {
        if self.admit() {
            if let Ok(v) = try_zeroed_vec(len) {
                return Ok(v);
            }
        }
        error!("[controller] failed to allocate {what}");
        Err(Abort)
    }

    fn gate(&mut self, what: &'static str) -> Result<(), Abort> {
        if self.admit() {
            return Ok(());
        }
        error!("[controller] failed to allocate {what}");
        Err(Abort)
    }
}

struct RunState {
    slots: Vec<Arc<WorkerSlot>>,
    workers: Vec<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
}

pub(crate) fn controller_main(
    cfg: RunConfig,
    shared: Arc<RunShared>,
    events: Sender<EngineEvent>,
    mut allocs: Allocs,
    instruments: Instruments,
) {
    shared.begin();
    let start_time = Instant::now();
    let threads = if cfg.threads == 0 { num_cpus::get().max(1) } else { cfg.threads };

    info!(
        "[controller] run start: {threads} threads, {} MiB/thread, duration {} s, pin={}",
        cfg.mem_mib_per_thread, cfg.duration_secs, cfg.pin_affinity
    );
    if let Some(total) = total_system_memory() {
        // Saturate: an oversized request still just warns here and fails in
        // the workers' own allocation path.
        let want = (threads as u64)
            .saturating_mul(cfg.mem_mib_per_thread as u64)
            .saturating_mul(1024 * 1024);
        if want > total {
            warn!(
                "[controller] configured working set ({want} bytes) exceeds physical memory ({total} bytes)"
            );
        }
    }

    let mut state = RunState { slots: Vec::new(), workers: Vec::new(), sampler: None };
    if run_stages(&cfg, threads, &shared, &events, &mut allocs, &mut state, instruments, start_time)
        .is_err()
    {
        shared.count_error();
        shared.request_stop();
    }
    teardown(&shared, &mut state, &events, start_time);
}

#[allow(clippy::too_many_arguments)]
fn run_stages(
    cfg: &RunConfig,
    threads: usize,
    shared: &Arc<RunShared>,
    events: &Sender<EngineEvent>,
    allocs: &mut Allocs,
    state: &mut RunState,
    instruments: Instruments,
    start_time: Instant,
) -> Result<(), Abort> {
    let cores = num_cpus::get().max(1);

    // ALLOCATING. Telemetry matrices row by row, then the scratch buffers
    // the sampler hands back and forth. Any failure here aborts the run
    // before a single thread exists.
    let usage = allocs.vec::<f64>(cores, "CPU usage buffer")?;
    let mut cpu_rings = allocs.vec::<Vec<f64>>(cores, "CPU history table")?;
    for ring in cpu_rings.iter_mut() {
        *ring = allocs.vec::<f64>(CPU_HISTORY_SAMPLES, "CPU history ring")?;
    }
    let prev = allocs.vec::<CpuTimes>(cores, "CPU sample buffer")?;
    let curr = allocs.vec::<CpuTimes>(cores, "CPU sample buffer")?;

    // A bounded run keeps one column per second so its full history fits
    // without wrapping; unbounded runs fall back to the default window.
    let span = cfg.duration_secs.max(HISTORY_SAMPLES as u64) as usize;
    let mut iter_rows = allocs.vec::<Vec<u32>>(threads, "iteration history table")?;
    for row in iter_rows.iter_mut() {
        *row = allocs.vec::<u32>(span, "iteration history row")?;
    }

    shared.install_cpu_history(usage, cpu_rings);
    shared.install_iter_history(iter_rows);

    allocs.gate("worker slots")?;
    state.slots = (0..threads).map(|i| Arc::new(WorkerSlot::new(i))).collect();
    shared.install_workers(state.slots.clone());
    allocs.gate("worker handles")?;
    state.workers = Vec::with_capacity(threads);

    // SPAWNING. Sampler first, so telemetry covers worker startup.
    let ctx = SamplerCtx {
        source: instruments.cpu_source,
        probe: instruments.temp_probe,
        prev,
        curr,
    };
    let sh = Arc::clone(shared);
    let ev = events.clone();
    match thread::Builder::new()
        .name("hs-sampler".into())
        .spawn(move || sampler_main(sh, ctx, ev))
    {
        Ok(h) => state.sampler = Some(h),
        Err(e) => {
            error!("[controller] failed to start sampler thread: {e}");
            return Err(Abort);
        }
    }

    let core_ids =
        if cfg.pin_affinity { core_affinity::get_core_ids().unwrap_or_default() } else { Vec::new() };
    let buf_bytes = cfg.mem_mib_per_thread.saturating_mul(1024 * 1024);
    for i in 0..threads {
        let slot = Arc::clone(&state.slots[i]);
        let sh = Arc::clone(shared);
        let kernels = cfg.kernels;
        let pin = (!core_ids.is_empty()).then(|| core_ids[i % core_ids.len()]);
        let spawned = thread::Builder::new().name(format!("hs-worker-{i}")).spawn(move || {
            if let Some(core) = pin {
                if !core_affinity::set_for_current(core) {
                    warn!("[T{i}] failed to pin to core {core:?}");
                }
            }
            worker_main(buf_bytes, kernels, slot, sh);
        });
        match spawned {
            Ok(h) => state.workers.push(h),
            Err(e) => {
                error!("[controller] failed to start worker {i}: {e}");
                return Err(Abort);
            }
        }
    }

    // MONITORING. The stop request may come from the duration check here or
    // from RunHandle::stop; either way the flag is the only signal.
    while shared.is_running() {
        if cfg.duration_secs > 0
            && start_time.elapsed() >= Duration::from_secs(cfg.duration_secs)
        {
            info!("[controller] duration of {} s reached, stopping", cfg.duration_secs);
            shared.request_stop();
            break;
        }
        thread::sleep(Duration::from_millis(MONITOR_POLL_MS));
    }
    Ok(())
}

/// Unified teardown, reachable from every stage. Joins only what was
/// actually spawned, releases the telemetry buffers, and fires the
/// completion event exactly once.
fn teardown(
    shared: &Arc<RunShared>,
    state: &mut RunState,
    events: &Sender<EngineEvent>,
    start_time: Instant,
) {
    shared.request_stop();
    for slot in &state.slots {
        slot.request_stop();
    }
    for h in state.workers.drain(..) {
        if h.join().is_err() {
            error!("[controller] worker thread panicked");
        }
    }
    if let Some(h) = state.sampler.take() {
        if h.join().is_err() {
            error!("[controller] sampler thread panicked");
        }
    }

    let summary = RunSummary {
        elapsed: start_time.elapsed(),
        total_iterations: shared.total_iterations(),
        errors: shared.error_count(),
        worker_status: state.slots.iter().map(|s| s.status()).collect(),
    };
    shared.clear_telemetry();

    info!(
        "[controller] run finished: {} iterations, {} errors, {:.1} s",
        summary.total_iterations,
        summary.errors,
        summary.elapsed.as_secs_f64()
    );
    let _ = events.send(EngineEvent::Finished(summary));
}
