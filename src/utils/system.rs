// src/utils/system.rs: System functions

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::debug;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines the number of physical cores and the current CPU load.
///
/// # Returns
///
/// Result<(usize, f32)> physical cores, current cpu usage
pub async fn detect_cores_and_load() -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::everything());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(100))).await;
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    let cpu_load = system.global_cpu_usage();
    Ok((physical_cores, cpu_load))
}


/// Finds the amount of total and available RAM.
///
/// # Returns
///
/// Result<(u64, u64)> total ram, available ram
pub fn detect_ram() -> Result<(u64, u64)> {
    let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_memory();
    let (total_ram, available_ram) = (system.total_memory(), system.available_memory());

    if total_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }
    Ok((total_ram, available_ram))
}


/// Checks the thread hint against the machine. The hint is passed to the tools unchanged;
/// this only produces the warning to log.
///
/// # Arguments
///
/// * `threads` - Thread hint from the command line.
/// * `physical_cores` - Detected physical cores.
/// * `cpu_load` - Global CPU usage in percent.
///
/// # Returns
/// Warning text when the hint oversubscribes the cores or the machine is already busy.
pub fn thread_hint_warning(threads: u32, physical_cores: usize, cpu_load: f32) -> Option<String> {
    debug!("Detected {} physical cores; CPU load {:.1}%; thread hint {}", physical_cores, cpu_load, threads);
    if threads as usize > physical_cores {
        return Some(format!(
            "Thread hint {} exceeds the {} physical cores; tophat and samtools will oversubscribe",
            threads, physical_cores
        ));
    }
    if cpu_load > 80.0 {
        return Some(format!("CPU load is already {:.1}%; multithreaded steps may run slowly", cpu_load));
    }
    None
}
