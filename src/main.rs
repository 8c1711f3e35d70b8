//! Interactive terminal front-end for the stress engine.
//!
//! Presentation glue only: prompts for a run configuration, starts the run,
//! and echoes telemetry on every sampler tick. All the actual work happens
//! in the library; this binary just consumes the event channel and the
//! telemetry read surface.

use std::io::{Write, stdin, stdout};
use std::sync::Arc;
use std::thread;

use log::info;

use hardstress::{
    DEFAULT_MEM_MIB, EngineEvent, KernelSet, RunConfig, RunShared, RunSummary, TEMP_UNAVAILABLE,
    WorkerStatus, start,
};

fn main() {
    env_logger::init();
    info!("=== HARDSTRESS START ===");

    loop {
        match prompt_menu().as_str() {
            "1" | "" => run(prompt_config()),
            "2" => run(RunConfig { duration_secs: 60, ..RunConfig::default() }),
            "3" => {
                info!("=== HARDSTRESS EXIT ===");
                return;
            }
            other => println!("Unrecognized option '{other}', please try again."),
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌────────────────────────────────────────┐");
    println!("│  1) Configure and start a run          │");
    println!("│  2) Quick run (defaults, 60 s)         │");
    println!("│  3) Exit                               │");
    println!("└────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_line(label: &str) -> String {
    print!("{label}: ");
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_usize(label: &str, default: usize) -> usize {
    prompt_line(&format!("{label} [default: {default}]")).parse().unwrap_or(default)
}

fn prompt_u64(label: &str, default: u64) -> u64 {
    prompt_line(&format!("{label} [default: {default}]")).parse().unwrap_or(default)
}

fn prompt_bool(label: &str, default: bool) -> bool {
    let hint = if default { "Y/n" } else { "y/N" };
    match prompt_line(&format!("{label} [{hint}]")).to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

fn prompt_config() -> RunConfig {
    RunConfig {
        threads: prompt_usize("Worker threads (0 = all logical cores)", 0),
        mem_mib_per_thread: prompt_usize("Memory per thread in MiB", DEFAULT_MEM_MIB),
        duration_secs: prompt_u64("Duration in seconds (0 = until stopped)", 60),
        pin_affinity: prompt_bool("Pin workers to cores", true),
        kernels: KernelSet {
            fpu: prompt_bool("Enable FPU kernel", true),
            int: prompt_bool("Enable integer kernel", true),
            stream: prompt_bool("Enable memory stream kernel", true),
            ptrchase: prompt_bool("Enable pointer-chase kernel", true),
        },
    }
}

fn run(cfg: RunConfig) {
    let unbounded_run = cfg.duration_secs == 0;
    let handle = match start(cfg) {
        Ok(h) => h,
        Err(e) => {
            println!("Cannot start run: {e}");
            return;
        }
    };

    if unbounded_run {
        // Main thread waits for Enter; a helper echoes telemetry meanwhile.
        let rx = handle.events().clone();
        let shared = Arc::clone(handle.shared());
        let printer = thread::spawn(move || {
            for ev in rx.iter() {
                match ev {
                    EngineEvent::SampleTick => print_status(&shared),
                    EngineEvent::Finished(summary) => {
                        print_summary(&summary);
                        break;
                    }
                }
            }
        });

        println!("Run started; press Enter to stop.");
        let mut line = String::new();
        let _ = stdin().read_line(&mut line);
        handle.stop();
        let _ = printer.join();
        let _ = handle.wait();
    } else {
        println!("Run started.");
        while let Ok(ev) = handle.events().recv() {
            match ev {
                EngineEvent::SampleTick => print_status(handle.shared()),
                EngineEvent::Finished(summary) => {
                    print_summary(&summary);
                    break;
                }
            }
        }
        let _ = handle.wait();
    }
}

fn print_status(shared: &RunShared) {
    let temp = shared.temperature();
    let temp_str =
        if temp > TEMP_UNAVAILABLE { format!("{temp:.0} °C") } else { "n/a".to_string() };
    println!(
        "iters: {:>12}  errors: {:>3}  cpu: {:>5.1}%  temp: {}",
        shared.total_iterations(),
        shared.error_count(),
        shared.cpu_average() * 100.0,
        temp_str
    );
}

fn print_summary(summary: &RunSummary) {
    let failed =
        summary.worker_status.iter().filter(|&&s| s == WorkerStatus::AllocFailed).count();
    println!(
        "\nRun finished after {:.1} s: {} iterations across {} workers ({} failed), {} errors.",
        summary.elapsed.as_secs_f64(),
        summary.total_iterations,
        summary.worker_status.len(),
        failed,
        summary.errors
    );
}
