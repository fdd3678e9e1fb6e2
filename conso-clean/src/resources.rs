//! Host resource availability.
//!
//! The stage reports how much memory and CPU the host had free while it ran.
//! [`SystemResourceProbe`] samples the host; [`FixedResourceProbe`] returns a
//! preset snapshot.

use crate::prelude::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Free resources of the host at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Available memory in GB, 2 decimals
    pub ram_available_gb: f64,
    /// Idle CPU share over the sampling interval, 1 decimal
    pub cpu_available_pct: f64,
    /// Logical cores times the idle share, 2 decimals
    pub available_logical_cores: f64,
    /// Physical cores times the idle share, 2 decimals
    pub available_physical_cores: f64,
}

impl ResourceSnapshot {
    /// Builds a snapshot from raw measurements, rounding as reported.
    pub fn from_measurements(
        ram_available_gb: f64,
        cpu_available_pct: f64,
        logical_cores: usize,
        physical_cores: usize,
    ) -> Self {
        let cpu_available_pct = cpu_available_pct.clamp(0.0, 100.0);
        let share = cpu_available_pct / 100.0;
        Self {
            ram_available_gb: round_to(ram_available_gb, 2),
            cpu_available_pct: round_to(cpu_available_pct, 1),
            available_logical_cores: round_to(logical_cores as f64 * share, 2),
            available_physical_cores: round_to(physical_cores as f64 * share, 2),
        }
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Source of [`ResourceSnapshot`]s.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Takes one snapshot. May wait for a sampling interval.
    async fn snapshot(&self) -> Result<ResourceSnapshot>;
}

/// Samples `/proc` on Linux.
///
/// Memory comes from `MemAvailable` in `/proc/meminfo`. CPU availability is
/// the idle share of the time elapsed between two `/proc/stat` readings taken
/// `interval` apart. Other platforms report zero memory and an idle CPU.
#[derive(Debug, Clone)]
pub struct SystemResourceProbe {
    interval: Duration,
}

impl SystemResourceProbe {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for SystemResourceProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl ResourceProbe for SystemResourceProbe {
    async fn snapshot(&self) -> Result<ResourceSnapshot> {
        let (ram_gb, cpu_pct) = sample(self.interval).await?;
        let snapshot = ResourceSnapshot::from_measurements(
            ram_gb,
            cpu_pct,
            num_cpus::get(),
            num_cpus::get_physical(),
        );
        debug!(?snapshot, "Sampled host resources");
        Ok(snapshot)
    }
}

#[cfg(target_os = "linux")]
async fn sample(interval: Duration) -> Result<(f64, f64)> {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await?;
    let available_kb = parse_mem_available_kb(&meminfo).ok_or_else(|| {
        CleanError::Internal("MemAvailable not found in /proc/meminfo".to_string())
    })?;

    let before = read_cpu_times().await?;
    tokio::time::sleep(interval).await;
    let after = read_cpu_times().await?;

    let ram_gb = available_kb as f64 / (1024.0 * 1024.0);
    Ok((ram_gb, after.idle_pct_since(&before)))
}

#[cfg(not(target_os = "linux"))]
async fn sample(interval: Duration) -> Result<(f64, f64)> {
    tokio::time::sleep(interval).await;
    Ok((0.0, 100.0))
}

#[cfg(target_os = "linux")]
async fn read_cpu_times() -> Result<CpuTimes> {
    let stat = tokio::fs::read_to_string("/proc/stat").await?;
    CpuTimes::parse(&stat)
        .ok_or_else(|| CleanError::Internal("no cpu line in /proc/stat".to_string()))
}

/// Extracts `MemAvailable` (kB) from the contents of `/proc/meminfo`.
pub fn parse_mem_available_kb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Aggregate CPU counters from the first line of `/proc/stat`, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait
    pub idle: u64,
    /// user through steal
    pub total: u64,
}

impl CpuTimes {
    /// Parses the `cpu ` summary line.
    pub fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|line| line.starts_with("cpu "))?;
        // user nice system idle iowait irq softirq steal; guest time is
        // already included in user.
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .map(|v| v.parse().ok())
            .collect::<Option<_>>()?;
        if fields.len() < 4 {
            return None;
        }
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        Some(Self {
            idle,
            total: fields.iter().sum(),
        })
    }

    /// Idle share in percent of the ticks elapsed since `earlier`.
    pub fn idle_pct_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 100.0;
        }
        let idle = self.idle.saturating_sub(earlier.idle);
        100.0 * idle as f64 / total as f64
    }
}

/// Returns the same snapshot every time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedResourceProbe(pub ResourceSnapshot);

#[async_trait]
impl ResourceProbe for FixedResourceProbe {
    async fn snapshot(&self) -> Result<ResourceSnapshot> {
        Ok(self.0)
    }
}
