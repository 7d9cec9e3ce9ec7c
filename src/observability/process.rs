//! Default process metrics.
//!
//! Sampled from `/proc/self` at scrape time on Linux. Other platforms only
//! report the start time. A proc file that cannot be read or parsed skips its
//! sample rather than failing the scrape.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::registry::{write_family, Collector};

const CPU_SECONDS: &str = "process_cpu_seconds_total";
const RESIDENT_MEMORY: &str = "process_resident_memory_bytes";
const VIRTUAL_MEMORY: &str = "process_virtual_memory_bytes";
const OPEN_FDS: &str = "process_open_fds";
const START_TIME: &str = "process_start_time_seconds";

/// Kernel USER_HZ; fixed at 100 on every mainstream Linux ABI.
#[cfg(target_os = "linux")]
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Collector for process CPU, memory, file descriptors and start time.
pub struct ProcessCollector {
    start_time: f64,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self { start_time }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw numbers read from the proc filesystem.
#[derive(Debug, Default, PartialEq)]
struct ProcSample {
    cpu_seconds: Option<f64>,
    resident_bytes: Option<f64>,
    virtual_bytes: Option<f64>,
    open_fds: Option<f64>,
}

/// Parse user + system CPU seconds out of `/proc/<pid>/stat`.
///
/// The command name field may contain spaces and parentheses, so fields are
/// counted from the last `)`.
fn parse_stat_cpu_seconds(stat: &str, ticks_per_sec: f64) -> Option<f64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After the name: state(0) ... utime(11) stime(12)
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((utime + stime) as f64 / ticks_per_sec)
}

/// Parse a `kB` line such as `VmRSS:   1234 kB` from `/proc/<pid>/status`.
fn parse_status_kb(status: &str, key: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with(key))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some((kb * 1024) as f64)
}

#[cfg(target_os = "linux")]
fn sample() -> ProcSample {
    use std::fs;

    let mut sample = ProcSample::default();
    if let Ok(stat) = fs::read_to_string("/proc/self/stat") {
        sample.cpu_seconds = parse_stat_cpu_seconds(&stat, CLOCK_TICKS_PER_SEC);
    }
    if let Ok(status) = fs::read_to_string("/proc/self/status") {
        sample.resident_bytes = parse_status_kb(&status, "VmRSS:");
        sample.virtual_bytes = parse_status_kb(&status, "VmSize:");
    }
    if let Ok(entries) = fs::read_dir("/proc/self/fd") {
        sample.open_fds = Some(entries.count() as f64);
    }
    sample
}

#[cfg(not(target_os = "linux"))]
fn sample() -> ProcSample {
    ProcSample::default()
}

impl Collector for ProcessCollector {
    fn names(&self) -> Vec<&str> {
        vec![CPU_SECONDS, RESIDENT_MEMORY, VIRTUAL_MEMORY, OPEN_FDS, START_TIME]
    }

    fn render(&self, out: &mut String) -> fmt::Result {
        let s = sample();

        if let Some(v) = s.cpu_seconds {
            write_family(
                out,
                CPU_SECONDS,
                "Total user and system CPU time spent in seconds.",
                "counter",
                v,
            )?;
        }
        if let Some(v) = s.resident_bytes {
            write_family(out, RESIDENT_MEMORY, "Resident memory size in bytes.", "gauge", v)?;
        }
        if let Some(v) = s.virtual_bytes {
            write_family(out, VIRTUAL_MEMORY, "Virtual memory size in bytes.", "gauge", v)?;
        }
        if let Some(v) = s.open_fds {
            write_family(out, OPEN_FDS, "Number of open file descriptors.", "gauge", v)?;
        }
        write_family(
            out,
            START_TIME,
            "Start time of the process since unix epoch in seconds.",
            "gauge",
            self.start_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_handles_spaces_in_command() {
        let stat =
            "4242 (my (weird) app) S 1 4242 4242 0 -1 4194560 500 0 0 0 250 50 0 0 20 0 8 0 100 0";
        assert_eq!(parse_stat_cpu_seconds(stat, 100.0), Some(3.0));
    }

    #[test]
    fn test_parse_stat_rejects_truncated_input() {
        assert_eq!(parse_stat_cpu_seconds("1 (x) S 1 2", 100.0), None);
        assert_eq!(parse_stat_cpu_seconds("garbage", 100.0), None);
    }

    #[test]
    fn test_parse_status_kb() {
        let status = "Name:\tapp\nVmSize:\t  2048 kB\nVmRSS:\t   512 kB\n";
        assert_eq!(parse_status_kb(status, "VmRSS:"), Some(512.0 * 1024.0));
        assert_eq!(parse_status_kb(status, "VmSize:"), Some(2048.0 * 1024.0));
        assert_eq!(parse_status_kb(status, "VmSwap:"), None);
    }

    #[test]
    fn test_render_always_reports_start_time() {
        let collector = ProcessCollector::new();
        let mut out = String::new();
        collector.render(&mut out).unwrap();
        assert!(out.contains("# TYPE process_start_time_seconds gauge\n"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_render_reads_proc_on_linux() {
        let collector = ProcessCollector::new();
        let mut out = String::new();
        collector.render(&mut out).unwrap();
        assert!(out.contains("process_cpu_seconds_total "));
        assert!(out.contains("process_resident_memory_bytes "));
    }
}
