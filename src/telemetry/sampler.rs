//! Telemetry sampler thread.
//!
//! Runs alongside the workers for the whole run: once per interval it samples
//! per-core CPU usage and temperature, pushes them into the shared history,
//! rotates the iteration-history window, and emits a tick event as a redraw
//! hint for whoever renders the telemetry. The sampler never blocks a worker;
//! all handoff happens through `RunShared` accessors.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;
use log::warn;

use crate::core::controller::EngineEvent;

use super::cpu::{CpuSampleSource, CpuTimes, compute_usage};
use super::state::{RunShared, TEMP_UNAVAILABLE};

/// Interval between telemetry snapshots, in milliseconds.
pub const SAMPLE_INTERVAL_MS: u64 = 1000;

/// External temperature collaborator. Implementations feed a °C value into
/// shared state; sensor-specific parsing lives outside the core.
pub trait TemperatureProbe: Send {
    /// Latest CPU temperature in °C, or [`TEMP_UNAVAILABLE`].
    fn sample(&mut self) -> f64;
}

/// Probe used when no temperature collaborator is wired in.
pub struct NullTempProbe;

impl TemperatureProbe for NullTempProbe {
    fn sample(&mut self) -> f64 {
        TEMP_UNAVAILABLE
    }
}

/// Everything the sampler thread owns: the sampling source, the probe, and
/// the snapshot scratch buffers allocated by the controller.
pub(crate) struct SamplerCtx {
    pub source: Box<dyn CpuSampleSource>,
    pub probe: Box<dyn TemperatureProbe>,
    pub prev: Vec<CpuTimes>,
    pub curr: Vec<CpuTimes>,
}

pub(crate) fn sampler_main(shared: Arc<RunShared>, mut ctx: SamplerCtx, events: Sender<EngineEvent>) {
    let cores = ctx.prev.len();
    let mut usage = vec![0.0f64; cores];

    // Baseline snapshot so the first interval produces a real delta.
    if let Err(e) = ctx.source.sample(&mut ctx.prev) {
        warn!("[sampler] could not capture initial CPU sample: {e}");
    }

    while shared.is_running() {
        thread::sleep(Duration::from_millis(SAMPLE_INTERVAL_MS));
        if !shared.is_running() {
            break;
        }

        match ctx.source.sample(&mut ctx.curr) {
            Ok(read) => {
                for core in 0..cores {
                    usage[core] = if core < read {
                        compute_usage(&ctx.prev[core], &ctx.curr[core])
                    } else {
                        0.0
                    };
                }
                std::mem::swap(&mut ctx.prev, &mut ctx.curr);
            }
            Err(e) => {
                warn!("[sampler] CPU sample failed: {e}");
                usage.fill(0.0);
            }
        }
        shared.publish_cpu(&usage);
        shared.publish_temp(ctx.probe.sample());

        // Rotate the iteration window last so workers publish into a zeroed
        // column for the whole of the next interval.
        shared.advance_sample_window();

        // Redraw hint; nobody listening is fine.
        let _ = events.send(EngineEvent::SampleTick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::cpu::NullCpuSource;
    use crossbeam::channel::unbounded;

    #[test]
    fn sampler_exits_when_run_flag_clears() {
        let shared = Arc::new(RunShared::new());
        shared.begin();
        shared.install_cpu_history(vec![0.0; 2], vec![vec![0.0; 4]; 2]);
        shared.install_iter_history(vec![vec![0u32; 4]; 1]);

        let (tx, _rx) = unbounded();
        let ctx = SamplerCtx {
            source: Box::new(NullCpuSource),
            probe: Box::new(NullTempProbe),
            prev: vec![CpuTimes::default(); 2],
            curr: vec![CpuTimes::default(); 2],
        };
        let s = shared.clone();
        let handle = thread::spawn(move || sampler_main(s, ctx, tx));

        shared.request_stop();
        handle.join().expect("sampler joins after stop");
    }
}
