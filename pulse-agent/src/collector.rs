//! Metric sampling.
//!
//! Two independent samplers feed one shared state: the runtime sampler
//! reads the allocator counters, rolls a random gauge, and bumps the
//! poll counter; the host sampler reads total/free memory, per-CPU
//! utilization, and the process footprint via sysinfo. Each sampler
//! overwrites its values in place; nothing is differenced across
//! samples.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use sysinfo::{CpuExt, ProcessExt, System, SystemExt};
use tokio::sync::RwLock;
use tracing::debug;

use crate::alloc::{self, AllocStats};

const MIN_RANDOM_VALUE: f64 = 100.0;
const MAX_RANDOM_VALUE: f64 = 100_000.0;

/// Shared sampled state, written by the pollers and read by the
/// reporter.
pub type SharedMetrics = Arc<RwLock<Metrics>>;

/// The values collected since process start.
#[derive(Debug, Default)]
pub struct Metrics {
    // runtime sampler
    pub alloc: AllocStats,
    pub random_value: f64,
    pub poll_count: i64,
    // host sampler
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub total_memory: f64,
    pub free_memory: f64,
    pub cpu_utilization: Vec<f64>,
}

impl Metrics {
    /// Refresh the allocator statistics, roll `RandomValue`, and bump
    /// `PollCount`.
    pub fn update_runtime(&mut self) {
        self.alloc = alloc::stats();
        self.random_value = rand::thread_rng().gen_range(MIN_RANDOM_VALUE..MAX_RANDOM_VALUE);
        self.poll_count += 1;

        debug!(poll_count = self.poll_count, "runtime metrics updated");
    }

    /// Refresh host memory, CPU utilization, and the process memory
    /// footprint. CPU percentages are meaningful from the second
    /// refresh onward.
    pub fn update_host(&mut self, sys: &mut System) {
        sys.refresh_memory();
        sys.refresh_cpu();

        self.total_memory = sys.total_memory() as f64;
        self.free_memory = sys.free_memory() as f64;
        self.cpu_utilization =
            sys.cpus().iter().map(|cpu| f64::from(cpu.cpu_usage())).collect();

        if let Ok(pid) = sysinfo::get_current_pid() {
            sys.refresh_process(pid);
            if let Some(process) = sys.process(pid) {
                self.resident_bytes = process.memory();
                self.virtual_bytes = process.virtual_memory();
            }
        }

        debug!(cpus = self.cpu_utilization.len(), "host metrics updated");
    }

    /// Flatten the gauges into the report map. The name set is fixed;
    /// gauges with no counterpart in this process report zero.
    pub fn gauge_report(&self) -> HashMap<String, f64> {
        let alloc = &self.alloc;
        let live = alloc.live_bytes as f64;

        let mut report = HashMap::with_capacity(32 + self.cpu_utilization.len());

        report.insert("Alloc".to_string(), live);
        report.insert("BuckHashSys".to_string(), 0.0);
        report.insert("Frees".to_string(), alloc.deallocations as f64);
        report.insert("GCCPUFraction".to_string(), 0.0);
        report.insert("GCSys".to_string(), 0.0);
        report.insert("HeapAlloc".to_string(), live);
        report.insert(
            "HeapIdle".to_string(),
            (self.resident_bytes.saturating_sub(alloc.live_bytes)) as f64,
        );
        report.insert("HeapInuse".to_string(), live);
        report.insert(
            "HeapObjects".to_string(),
            alloc.allocations.saturating_sub(alloc.deallocations) as f64,
        );
        report.insert("HeapReleased".to_string(), 0.0);
        report.insert("HeapSys".to_string(), self.resident_bytes as f64);
        report.insert("LastGC".to_string(), 0.0);
        report.insert("Lookups".to_string(), 0.0);
        report.insert("MCacheInuse".to_string(), 0.0);
        report.insert("MCacheSys".to_string(), 0.0);
        report.insert("MSpanInuse".to_string(), 0.0);
        report.insert("MSpanSys".to_string(), 0.0);
        report.insert("Mallocs".to_string(), alloc.allocations as f64);
        report.insert("NextGC".to_string(), 0.0);
        report.insert("NumForcedGC".to_string(), 0.0);
        report.insert("NumGC".to_string(), 0.0);
        report.insert("OtherSys".to_string(), 0.0);
        report.insert("PauseTotalNs".to_string(), 0.0);
        report.insert("StackInuse".to_string(), 0.0);
        report.insert("StackSys".to_string(), 0.0);
        report.insert("Sys".to_string(), self.virtual_bytes as f64);
        report.insert("TotalAlloc".to_string(), alloc.total_bytes as f64);

        report.insert("RandomValue".to_string(), self.random_value);

        report.insert("TotalMemory".to_string(), self.total_memory);
        report.insert("FreeMemory".to_string(), self.free_memory);
        for (cpu, utilization) in self.cpu_utilization.iter().enumerate() {
            report.insert(format!("CPUutilization{cpu}"), *utilization);
        }

        report
    }

    /// Flatten the counters into the report map.
    pub fn counter_report(&self) -> HashMap<String, i64> {
        let mut report = HashMap::with_capacity(1);
        report.insert("PollCount".to_string(), self.poll_count);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_runtime_bumps_poll_count() {
        let mut metrics = Metrics::default();

        metrics.update_runtime();
        metrics.update_runtime();

        assert_eq!(metrics.poll_count, 2);
        assert!(metrics.random_value >= MIN_RANDOM_VALUE);
        assert!(metrics.random_value < MAX_RANDOM_VALUE);
    }

    #[test]
    fn test_gauge_report_has_fixed_name_set() {
        let mut metrics = Metrics::default();
        metrics.update_runtime();
        metrics.cpu_utilization = vec![10.0, 20.0];

        let report = metrics.gauge_report();

        for name in [
            "Alloc",
            "BuckHashSys",
            "Frees",
            "GCCPUFraction",
            "GCSys",
            "HeapAlloc",
            "HeapIdle",
            "HeapInuse",
            "HeapObjects",
            "HeapReleased",
            "HeapSys",
            "LastGC",
            "Lookups",
            "MCacheInuse",
            "MCacheSys",
            "MSpanInuse",
            "MSpanSys",
            "Mallocs",
            "NextGC",
            "NumForcedGC",
            "NumGC",
            "OtherSys",
            "PauseTotalNs",
            "StackInuse",
            "StackSys",
            "Sys",
            "TotalAlloc",
            "RandomValue",
            "TotalMemory",
            "FreeMemory",
            "CPUutilization0",
            "CPUutilization1",
        ] {
            assert!(report.contains_key(name), "missing gauge {name}");
        }
        assert_eq!(report.len(), 32);
    }

    #[test]
    fn test_counter_report() {
        let mut metrics = Metrics::default();
        metrics.update_runtime();

        let report = metrics.counter_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report["PollCount"], 1);
    }

    #[test]
    fn test_update_host_fills_cpu_and_memory() {
        let mut metrics = Metrics::default();
        let mut sys = System::new();

        metrics.update_host(&mut sys);

        assert!(metrics.total_memory > 0.0);
        assert!(!metrics.cpu_utilization.is_empty());
    }
}
