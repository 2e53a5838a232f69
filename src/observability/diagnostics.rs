//! Debug-mode process diagnostics.
//!
//! When `server.debug` is set, two background captures run:
//! - CPU usage of this process, sampled every second for six minutes, written to `ddns.cprof`
//! - a memory snapshot taken after five minutes, written to `ddns.mprof`
//!
//! Both stop early on shutdown; the CPU capture still writes what it has.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

pub const CPU_PROFILE_FILE: &str = "ddns.cprof";
pub const MEMORY_PROFILE_FILE: &str = "ddns.mprof";

/// Timings and output location of the debug captures.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub dir: PathBuf,
    pub cpu_window: Duration,
    pub sample_interval: Duration,
    pub memory_delay: Duration,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            cpu_window: Duration::from_secs(6 * 60),
            sample_interval: Duration::from_secs(1),
            memory_delay: Duration::from_secs(5 * 60),
        }
    }
}

impl Diagnostics {
    pub fn cpu_profile_path(&self) -> PathBuf {
        self.dir.join(CPU_PROFILE_FILE)
    }

    pub fn memory_profile_path(&self) -> PathBuf {
        self.dir.join(MEMORY_PROFILE_FILE)
    }

    /// Start both captures. Each handle resolves once its file is written or shutdown fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> (JoinHandle<()>, JoinHandle<()>) {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                tracing::warn!(error = e, "Diagnostics unavailable on this platform");
                return (tokio::spawn(async {}), tokio::spawn(async {}));
            }
        };

        tracing::info!(
            cpu_profile = %self.cpu_profile_path().display(),
            memory_profile = %self.memory_profile_path().display(),
            "Debug diagnostics enabled"
        );

        let memory_shutdown = shutdown.resubscribe();
        let cpu = tokio::spawn(capture_cpu(
            pid,
            self.cpu_profile_path(),
            self.cpu_window,
            self.sample_interval,
            shutdown,
        ));
        let memory = tokio::spawn(capture_memory(
            pid,
            self.memory_profile_path(),
            self.memory_delay,
            memory_shutdown,
        ));
        (cpu, memory)
    }
}

async fn capture_cpu(
    pid: Pid,
    path: PathBuf,
    window: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut system = System::new();
    let started = Instant::now();
    let mut out = format!("# pid={} interval_ms={}\n", pid, interval.as_millis());

    // The first refresh only primes the usage counters.
    system.refresh_process(pid);
    let mut ticker = time::interval(interval);
    ticker.tick().await;

    while started.elapsed() < window {
        tokio::select! {
            _ = ticker.tick() => {
                if !system.refresh_process(pid) {
                    break;
                }
                if let Some(process) = system.process(pid) {
                    let _ = writeln!(out, "{} {:.2}", started.elapsed().as_millis(), process.cpu_usage());
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("CPU capture interrupted by shutdown");
                break;
            }
        }
    }

    write_profile(&path, out).await;
}

async fn capture_memory(
    pid: Pid,
    path: PathBuf,
    delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = time::sleep(delay) => {}
        _ = shutdown.recv() => {
            tracing::debug!("Memory snapshot cancelled by shutdown");
            return;
        }
    }

    let mut system = System::new();
    system.refresh_memory();
    system.refresh_process(pid);

    let mut out = format!("pid={}\n", pid);
    if let Some(process) = system.process(pid) {
        let _ = writeln!(out, "rss_bytes={}", process.memory());
        let _ = writeln!(out, "virtual_bytes={}", process.virtual_memory());
    }
    let _ = writeln!(out, "system_used_bytes={}", system.used_memory());
    let _ = writeln!(out, "system_total_bytes={}", system.total_memory());

    write_profile(&path, out).await;
}

async fn write_profile(path: &Path, contents: String) {
    match tokio::fs::write(path, contents).await {
        Ok(()) => tracing::info!(path = %path.display(), "Profile written"),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to write profile"),
    }
}
