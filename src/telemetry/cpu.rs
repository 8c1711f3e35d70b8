//! CPU time sampling behind a small capability interface.
//!
//! The sampler thread only depends on [`CpuSampleSource`]; the Linux variant
//! reads `/proc/stat` per-core counters and usage is derived from the delta
//! between two snapshots. On other platforms a null source reports all cores
//! idle rather than failing the run.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Raw per-core CPU time counters, in clock ticks, as exposed by the kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    fn idle_ticks(&self) -> u64 {
        self.idle + self.iowait
    }

    fn busy_ticks(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }
}

/// Usage fraction between two snapshots of the same core, clamped to
/// `[0.0, 1.0]`. A zero total delta (no time passed, or a counter reset)
/// reads as idle.
pub fn compute_usage(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_prev = prev.idle_ticks() + prev.busy_ticks();
    let total_curr = curr.idle_ticks() + curr.busy_ticks();
    let total_delta = total_curr.saturating_sub(total_prev);
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle_ticks().saturating_sub(prev.idle_ticks());
    let busy = total_delta.saturating_sub(idle_delta) as f64 / total_delta as f64;
    busy.clamp(0.0, 1.0)
}

/// Source of raw per-core CPU time snapshots.
///
/// `sample` fills `out` front-to-back and returns the number of cores it
/// could read; the caller treats unread cores as idle.
pub trait CpuSampleSource: Send {
    fn sample(&mut self, out: &mut [CpuTimes]) -> io::Result<usize>;
}

/// `/proc/stat` backed source (Linux).
pub struct ProcStatSource {
    path: PathBuf,
}

impl ProcStatSource {
    pub fn new() -> Self {
        Self { path: PathBuf::from("/proc/stat") }
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampleSource for ProcStatSource {
    fn sample(&mut self, out: &mut [CpuTimes]) -> io::Result<usize> {
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_proc_stat(&text, out))
    }
}

/// Parses per-core `cpuN` lines; the aggregate `cpu` line is skipped.
/// Stops at the first non-cpu line, mirroring the layout of `/proc/stat`.
fn parse_proc_stat(text: &str, out: &mut [CpuTimes]) -> usize {
    let mut count = 0;
    for line in text.lines() {
        if count >= out.len() || !line.starts_with("cpu") {
            break;
        }
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { break };
        if label == "cpu" {
            continue;
        }
        let mut ticks = [0u64; 8];
        let mut parsed = 0;
        for slot in ticks.iter_mut() {
            match fields.next().and_then(|f| f.parse().ok()) {
                Some(v) => {
                    *slot = v;
                    parsed += 1;
                }
                None => break,
            }
        }
        if parsed == 8 {
            out[count] = CpuTimes {
                user: ticks[0],
                nice: ticks[1],
                system: ticks[2],
                idle: ticks[3],
                iowait: ticks[4],
                irq: ticks[5],
                softirq: ticks[6],
                steal: ticks[7],
            };
            count += 1;
        }
    }
    count
}

/// Fallback source for platforms without a sampling implementation:
/// reports zero cores read, so every core shows as idle.
pub struct NullCpuSource;

impl CpuSampleSource for NullCpuSource {
    fn sample(&mut self, _out: &mut [CpuTimes]) -> io::Result<usize> {
        Ok(0)
    }
}

/// Platform-selected default source.
pub fn default_cpu_source() -> Box<dyn CpuSampleSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcStatSource::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NullCpuSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
cpu  100 0 100 800 0 0 0 0 0 0
cpu0 50 0 50 400 10 2 3 5 0 0
cpu1 50 0 50 400 0 0 0 0 0 0
intr 12345 0 0
ctxt 999
";

    #[test]
    fn parses_per_core_lines_and_skips_aggregate() {
        let mut out = [CpuTimes::default(); 4];
        let n = parse_proc_stat(SAMPLE, &mut out);
        assert_eq!(n, 2);
        assert_eq!(out[0].user, 50);
        assert_eq!(out[0].iowait, 10);
        assert_eq!(out[0].steal, 5);
        assert_eq!(out[1].idle, 400);
    }

    #[test]
    fn parse_respects_output_capacity() {
        let mut out = [CpuTimes::default(); 1];
        assert_eq!(parse_proc_stat(SAMPLE, &mut out), 1);
    }

    #[test]
    fn usage_delta_math() {
        let prev = CpuTimes { user: 100, idle: 900, ..Default::default() };
        let curr = CpuTimes { user: 150, idle: 950, ..Default::default() };
        // 50 busy ticks out of 100 total.
        assert!((compute_usage(&prev, &curr) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn usage_zero_delta_is_idle() {
        let t = CpuTimes { user: 10, idle: 10, ..Default::default() };
        assert_eq!(compute_usage(&t, &t), 0.0);
    }

    #[test]
    fn usage_counter_regression_clamps() {
        let prev = CpuTimes { user: 200, idle: 900, ..Default::default() };
        let curr = CpuTimes { user: 100, idle: 950, ..Default::default() };
        let u = compute_usage(&prev, &curr);
        assert!((0.0..=1.0).contains(&u));
    }
}
