//! Circular history buffers behind the telemetry locks.
//!
//! Two buffer families: the per-thread iteration matrix (one row per worker,
//! one column per sampling window) and the per-core CPU usage ring. Both are
//! installed by the controller at run start and cleared again at teardown, so
//! the same shared state can be reused across runs without leaking.

/// Default number of sampling windows kept for the iteration history.
pub const HISTORY_SAMPLES: usize = 240;

/// Number of samples kept per core for the CPU usage history.
pub const CPU_HISTORY_SAMPLES: usize = 60;

/// Per-thread iteration history: `rows[tid][pos]` holds the iteration count
/// worker `tid` last published in sampling window `pos`.
///
/// Workers write only their own row at the current position; the sampler owns
/// the position and zeroes each column as the window rotates into it.
#[derive(Debug, Default)]
pub struct IterHistory {
    rows: Vec<Vec<u32>>,
    pos: usize,
}

impl IterHistory {
    pub(crate) fn install(&mut self, rows: Vec<Vec<u32>>) {
        self.rows = rows;
        self.pos = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.rows = Vec::new();
        self.pos = 0;
    }

    /// Records `count` for worker `tid` in the current sampling window.
    /// Out-of-range rows (already-cleared state) are ignored.
    pub(crate) fn record(&mut self, tid: usize, count: u32) {
        if let Some(row) = self.rows.get_mut(tid) {
            if let Some(slot) = row.get_mut(self.pos) {
                *slot = count;
            }
        }
    }

    /// Rotates to the next sampling window, zeroing the column so stale
    /// values from the previous lap never show up as fresh data.
    pub(crate) fn advance(&mut self) {
        let len = self.rows.first().map_or(0, Vec::len);
        if len == 0 {
            return;
        }
        self.pos = (self.pos + 1) % len;
        for row in &mut self.rows {
            if let Some(slot) = row.get_mut(self.pos) {
                *slot = 0;
            }
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }
}

/// Per-core CPU telemetry: the latest usage fraction per logical core
/// (0.0–1.0) plus a ring of recent samples per core.
#[derive(Debug, Default)]
pub struct CpuHistory {
    usage: Vec<f64>,
    rings: Vec<Vec<f64>>,
    pos: usize,
    filled: usize,
}

impl CpuHistory {
    pub(crate) fn install(&mut self, usage: Vec<f64>, rings: Vec<Vec<f64>>) {
        self.usage = usage;
        self.rings = rings;
        self.pos = 0;
        self.filled = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.usage = Vec::new();
        self.rings = Vec::new();
        self.pos = 0;
        self.filled = 0;
    }

    /// Stores the latest per-core usage and pushes it into the ring.
    /// Values are clamped to `[0.0, 1.0]` on the way in.
    pub(crate) fn push(&mut self, sample: &[f64]) {
        let len = self.rings.first().map_or(0, Vec::len);
        if len == 0 || self.usage.is_empty() {
            return;
        }
        // First push lands at position 0; later pushes rotate.
        if self.filled > 0 {
            self.pos = (self.pos + 1) % len;
        }
        for (core, slot) in self.usage.iter_mut().enumerate() {
            let v = sample.get(core).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            *slot = v;
            if let Some(ring) = self.rings.get_mut(core) {
                ring[self.pos] = v;
            }
        }
        if self.filled < len {
            self.filled += 1;
        }
    }

    pub fn usage(&self) -> &[f64] {
        &self.usage
    }

    /// Mean usage across cores for the latest sample.
    pub fn average(&self) -> f64 {
        if self.usage.is_empty() {
            return 0.0;
        }
        self.usage.iter().sum::<f64>() / self.usage.len() as f64
    }

    pub fn rings(&self) -> &[Vec<f64>] {
        &self.rings
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn filled(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize) -> Vec<Vec<u32>> {
        vec![vec![0u32; cols]; rows]
    }

    #[test]
    fn iter_history_records_at_current_window() {
        let mut h = IterHistory::default();
        h.install(matrix(2, 4));

        h.record(0, 10);
        h.record(1, 20);
        assert_eq!(h.rows()[0][0], 10);
        assert_eq!(h.rows()[1][0], 20);

        h.advance();
        h.record(0, 30);
        assert_eq!(h.position(), 1);
        assert_eq!(h.rows()[0][1], 30);
        // Previous window untouched.
        assert_eq!(h.rows()[0][0], 10);
    }

    #[test]
    fn iter_history_wraps_and_zeroes_reused_columns() {
        let mut h = IterHistory::default();
        h.install(matrix(1, 3));
        h.record(0, 7);
        for _ in 0..3 {
            h.advance();
        }
        // Wrapped back onto the column that held 7; it must be zeroed.
        assert_eq!(h.position(), 0);
        assert_eq!(h.rows()[0][0], 0);
    }

    #[test]
    fn iter_history_ignores_writes_after_clear() {
        let mut h = IterHistory::default();
        h.install(matrix(1, 2));
        h.clear();
        h.record(0, 5);
        h.advance();
        assert!(h.rows().is_empty());
    }

    #[test]
    fn cpu_history_clamps_and_rotates() {
        let mut h = CpuHistory::default();
        h.install(vec![0.0; 2], vec![vec![0.0; 3]; 2]);

        h.push(&[0.5, 1.7]);
        assert_eq!(h.usage(), &[0.5, 1.0]);
        assert_eq!(h.position(), 0);
        assert_eq!(h.filled(), 1);

        h.push(&[-0.2, 0.25]);
        assert_eq!(h.usage(), &[0.0, 0.25]);
        assert_eq!(h.position(), 1);
        assert_eq!(h.rings()[1][1], 0.25);

        h.push(&[0.1]);
        // Missing cores read as idle.
        assert_eq!(h.usage(), &[0.1, 0.0]);
        assert_eq!(h.filled(), 3);

        h.push(&[0.9, 0.9]);
        assert_eq!(h.position(), 0);
        assert_eq!(h.filled(), 3);
    }

    #[test]
    fn cpu_history_average() {
        let mut h = CpuHistory::default();
        h.install(vec![0.0; 4], vec![vec![0.0; 2]; 4]);
        h.push(&[1.0, 0.0, 0.5, 0.5]);
        assert!((h.average() - 0.5).abs() < 1e-9);
        h.clear();
        assert_eq!(h.average(), 0.0);
    }
}
