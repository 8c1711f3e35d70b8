pub mod rng;

use std::collections::TryReserveError;

/// Fallible zeroed-vector allocation. Every buffer the engine sizes from user
/// configuration goes through this instead of `vec![]`, so an oversized
/// request surfaces as an error path rather than an abort.
pub(crate) fn try_zeroed_vec<T: Clone + Default>(len: usize) -> Result<Vec<T>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, T::default());
    Ok(v)
}

/// Total physical memory in bytes, read from `/proc/meminfo`.
/// Used only for an oversubscription warning before a run.
#[cfg(target_os = "linux")]
pub fn total_system_memory() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(not(target_os = "linux"))]
pub fn total_system_memory() -> Option<u64> {
    None
}
