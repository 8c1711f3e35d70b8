pub mod cpu;
pub mod history;
pub mod sampler;
pub mod state;

pub use history::{CPU_HISTORY_SAMPLES, HISTORY_SAMPLES};
pub use sampler::{NullTempProbe, SAMPLE_INTERVAL_MS, TemperatureProbe};
pub use state::{RunShared, TEMP_UNAVAILABLE};
