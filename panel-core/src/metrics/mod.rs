//! Host monitoring snapshot for the panel
//!
//! Provides a point-in-time view of the device:
//! - CPU usage and frequency (current / max)
//! - CPU temperature (vcgencmd, then kernel thermal zone)
//! - Memory usage statistics
//! - Disk usage of the filesystem holding the confined root
//! - Auxiliary temperature sensors (NVMe smart-log), behind a flag
//! - Uptime since boot
//!
//! Capturing never fails: every value that cannot be read is reported as
//! [`Reading::Unavailable`].

use crate::format::{human_uptime, round1};
use chrono::Utc;
use parking_lot::Mutex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// A monitored value, or an explicit marker that it could not be read
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Reading<T> {
    Available(T),
    Unavailable,
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Available(v) => Some(v),
            Reading::Unavailable => None,
        }
    }
}

impl<T> From<Option<T>> for Reading<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reading::Unavailable, Reading::Available)
    }
}

impl Reading<f64> {
    /// `"48.3°C"` style rendering, `"N/A"` when unavailable
    pub fn display(&self, unit: &str) -> String {
        match self {
            Reading::Available(v) => format!("{v}{unit}"),
            Reading::Unavailable => "N/A".to_string(),
        }
    }
}

/// Complete monitoring snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: f64,
    pub cpu_temp: Reading<f64>,
    /// MHz
    pub cpu_freq_current: Reading<f64>,
    /// MHz
    pub cpu_freq_max: Reading<f64>,
    pub mem_total: u64,
    pub mem_used: u64,
    pub mem_percent: f64,
    pub disk: Reading<DiskUsage>,
    pub sensors: SensorMap,
    pub selected_sensor: Option<String>,
    pub selected_temp: Reading<f64>,
    pub uptime: Uptime,
}

/// Usage of the filesystem holding the confined root, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Uptime {
    pub seconds: u64,
    pub display: String,
}

/// Individual auxiliary temperature sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: String,
    pub celsius: f64,
}

/// Sensor name -> temperature, in the order the sensors were reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorMap(Vec<SensorReading>);

impl SensorMap {
    /// Insert, replacing a previous reading with the same name
    pub fn insert(&mut self, name: String, celsius: f64) {
        match self.0.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.celsius = celsius,
            None => self.0.push(SensorReading { name, celsius }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SensorReading> {
        self.0.iter().find(|s| s.name == name)
    }

    pub fn first(&self) -> Option<&SensorReading> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.0.iter()
    }

    /// Preferred sensor when present, otherwise the first one reported
    pub fn select(&self, preferred: Option<&str>) -> Option<&SensorReading> {
        preferred
            .filter(|name| !name.is_empty())
            .and_then(|name| self.get(name))
            .or_else(|| self.first())
    }
}

impl Serialize for SensorMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for sensor in &self.0 {
            map.serialize_entry(&sensor.name, &sensor.celsius)?;
        }
        map.end()
    }
}

/// Where and how each value is read
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Disk usage is reported for the filesystem holding this path
    pub disk_path: PathBuf,
    pub show_aux_sensors: bool,
    pub aux_sensor_command: Vec<String>,
    pub cpu_temp_command: Vec<String>,
    pub thermal_zone: PathBuf,
    pub max_freq_path: PathBuf,
    pub command_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            disk_path: PathBuf::from("/"),
            show_aux_sensors: false,
            aux_sensor_command: ["sudo", "nvme", "smart-log", "/dev/nvme0"]
                .map(String::from)
                .to_vec(),
            cpu_temp_command: ["vcgencmd", "measure_temp"].map(String::from).to_vec(),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            max_freq_path: PathBuf::from("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq"),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Long-lived sampler; CPU usage is measured between two captures
pub struct MonitorProbe {
    sys: Mutex<System>,
}

impl MonitorProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
        }
    }

    /// Collect a fresh snapshot; never fails
    pub async fn capture(&self, settings: &MonitorSettings, preferred_sensor: Option<&str>) -> MetricsSnapshot {
        debug!("Collecting monitoring snapshot...");

        let (cpu_percent, cpu_freq_current, mem_total, mem_used) = {
            let mut sys = self.sys.lock();
            sys.refresh_cpu();
            sys.refresh_memory();
            let freq = sys.cpus().first().map(|c| c.frequency()).filter(|mhz| *mhz > 0);
            (
                round1(sys.global_cpu_info().cpu_usage() as f64),
                Reading::from(freq.map(|mhz| round1(mhz as f64))),
                sys.total_memory(),
                sys.used_memory(),
            )
        };
        let mem_percent = if mem_total > 0 {
            round1(mem_used as f64 / mem_total as f64 * 100.0)
        } else {
            0.0
        };

        let disk = disk_usage(&settings.disk_path);
        let cpu_temp = read_cpu_temp(settings).await;
        let cpu_freq_max = read_max_freq(&settings.max_freq_path).await;

        let sensors = if settings.show_aux_sensors {
            read_aux_sensors(settings).await
        } else {
            SensorMap::default()
        };
        let selected = sensors.select(preferred_sensor).cloned();

        let seconds = (Utc::now().timestamp().max(0) as u64).saturating_sub(System::boot_time());

        MetricsSnapshot {
            cpu_percent,
            cpu_temp,
            cpu_freq_current,
            cpu_freq_max,
            mem_total,
            mem_used,
            mem_percent,
            disk,
            selected_temp: Reading::from(selected.as_ref().map(|s| s.celsius)),
            selected_sensor: selected.map(|s| s.name),
            sensors,
            uptime: Uptime {
                seconds,
                display: human_uptime(seconds),
            },
        }
    }
}

impl Default for MonitorProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage of the filesystem holding `path`, symlinks followed
fn disk_usage(path: &Path) -> Reading<DiskUsage> {
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<&Path> = disks.list().iter().map(|d| d.mount_point()).collect();

    let Some(index) = holding_mount(path, &mounts) else {
        debug!(path = %path.display(), "no mounted filesystem found");
        return Reading::Unavailable;
    };
    let disk = &disks.list()[index];

    let total = disk.total_space();
    let free = disk.available_space();
    let used = total.saturating_sub(free);
    let percent = if total > 0 {
        round1(used as f64 / total as f64 * 100.0)
    } else {
        0.0
    };
    Reading::Available(DiskUsage {
        total,
        used,
        free,
        percent,
    })
}

/// Index of the longest mount point prefixing the canonical form of `path`
fn holding_mount(path: &Path, mounts: &[&Path]) -> Option<usize> {
    let path = std::fs::canonicalize(path).ok()?;
    mounts
        .iter()
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(index, _)| index)
}

async fn read_cpu_temp(settings: &MonitorSettings) -> Reading<f64> {
    if let Some(celsius) = run_command(&settings.cpu_temp_command, settings.command_timeout)
        .await
        .as_deref()
        .and_then(parse_vcgencmd_temp)
    {
        return Reading::Available(round1(celsius));
    }

    debug!("vcgencmd unavailable, falling back to thermal zone");
    match tokio::fs::read_to_string(&settings.thermal_zone).await {
        Ok(raw) => Reading::from(parse_thermal_zone(&raw).map(round1)),
        Err(e) => {
            debug!("thermal zone unreadable: {}", e);
            Reading::Unavailable
        }
    }
}

async fn read_max_freq(path: &Path) -> Reading<f64> {
    let raw = tokio::fs::read_to_string(path).await.ok();
    Reading::from(
        raw.and_then(|r| r.trim().parse::<f64>().ok())
            .map(|khz| round1(khz / 1000.0)),
    )
}

async fn read_aux_sensors(settings: &MonitorSettings) -> SensorMap {
    match run_command(&settings.aux_sensor_command, settings.command_timeout).await {
        Some(output) => parse_sensor_lines(&output).unwrap_or_else(|| {
            debug!("auxiliary sensor output not understood");
            SensorMap::default()
        }),
        None => SensorMap::default(),
    }
}

/// Run a command bounded by `timeout`; stdout on success only
async fn run_command(command: &[String], timeout: Duration) -> Option<String> {
    let (program, args) = command.split_first()?;
    let child = AsyncCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(program = %program, "command exited with {}", output.status);
            None
        }
        Ok(Err(e)) => {
            debug!(program = %program, "command failed to start: {}", e);
            None
        }
        Err(_) => {
            debug!(program = %program, "command timed out after {:?}", timeout);
            None
        }
    }
}

/// `temp=48.3'C` -> 48.3
fn parse_vcgencmd_temp(output: &str) -> Option<f64> {
    let (_, value) = output.trim().split_once('=')?;
    value.split('\'').next()?.trim().parse().ok()
}

/// Millidegrees as exposed by the kernel -> degrees
fn parse_thermal_zone(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().map(|milli| milli / 1000.0)
}

/// Parse `name : value ...` lines mentioning a temperature
///
/// Returns `None` as soon as one such line cannot be understood.
fn parse_sensor_lines(output: &str) -> Option<SensorMap> {
    let mut sensors = SensorMap::default();
    for line in output.lines() {
        if !line.to_lowercase().contains("temperature") {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        let token = value.split_whitespace().next()?;
        let numeric: String = token
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        sensors.insert(name.trim().to_string(), numeric.parse().ok()?);
    }
    Some(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_devkit::TestTree;

    const NVME_OUTPUT: &str = "Smart Log for NVME device:nvme0 namespace-id:ffffffff\n\
        critical_warning                    : 0\n\
        temperature                         : 41 C (314 Kelvin)\n\
        available_spare                     : 100%\n\
        Temperature Sensor 1                : 41 C (314 Kelvin)\n\
        Temperature Sensor 2                : 44°C (317 Kelvin)\n";

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn offline_settings(tree: &TestTree) -> MonitorSettings {
        MonitorSettings {
            disk_path: tree.root().to_path_buf(),
            cpu_temp_command: vec!["definitely-not-a-command-xyz".into()],
            thermal_zone: tree.path("no-thermal"),
            max_freq_path: tree.path("no-freq"),
            command_timeout: Duration::from_millis(500),
            ..MonitorSettings::default()
        }
    }

    #[test]
    fn test_parse_vcgencmd_temp() {
        assert_eq!(parse_vcgencmd_temp("temp=48.3'C\n"), Some(48.3));
        assert_eq!(parse_vcgencmd_temp("garbage"), None);
    }

    #[test]
    fn test_parse_thermal_zone() {
        assert_eq!(parse_thermal_zone("48312\n"), Some(48.312));
        assert_eq!(parse_thermal_zone(""), None);
    }

    #[test]
    fn test_parse_sensor_lines() {
        let sensors = parse_sensor_lines(NVME_OUTPUT).unwrap();
        let names: Vec<&str> = sensors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["temperature", "Temperature Sensor 1", "Temperature Sensor 2"]);
        assert_eq!(sensors.get("Temperature Sensor 2").unwrap().celsius, 44.0);

        assert_eq!(parse_sensor_lines("temperature without separator"), None);
        assert!(parse_sensor_lines("nothing relevant").unwrap().is_empty());
    }

    #[test]
    fn test_sensor_selection_falls_back_to_first() {
        let mut sensors = SensorMap::default();
        sensors.insert("a".into(), 40.0);
        sensors.insert("b".into(), 50.0);

        assert_eq!(sensors.select(Some("b")).unwrap().name, "b");
        assert_eq!(sensors.select(Some("missing")).unwrap().name, "a");
        assert_eq!(sensors.select(Some("")).unwrap().name, "a");
        assert_eq!(sensors.select(None).unwrap().name, "a");
        assert!(SensorMap::default().select(Some("a")).is_none());
    }

    #[tokio::test]
    async fn test_disabled_aux_sensors_are_never_read() {
        let tree = TestTree::new();
        let settings = MonitorSettings {
            show_aux_sensors: false,
            aux_sensor_command: shell(&format!("printf '{}'", "Temperature Sensor 1 : 41 C\\n")),
            ..offline_settings(&tree)
        };

        let snapshot = MonitorProbe::new().capture(&settings, Some("Temperature Sensor 1")).await;
        assert!(snapshot.sensors.is_empty());
        assert_eq!(snapshot.selected_sensor, None);
        assert_eq!(snapshot.selected_temp, Reading::Unavailable);
    }

    #[tokio::test]
    async fn test_enabled_aux_sensors_select_preferred() {
        let tree = TestTree::new();
        let script = tree.file("nvme.txt", NVME_OUTPUT);
        let settings = MonitorSettings {
            show_aux_sensors: true,
            aux_sensor_command: vec!["cat".into(), script.display().to_string()],
            ..offline_settings(&tree)
        };
        let probe = MonitorProbe::new();

        let snapshot = probe.capture(&settings, Some("Temperature Sensor 2")).await;
        assert_eq!(snapshot.sensors.iter().count(), 3);
        assert_eq!(snapshot.selected_sensor.as_deref(), Some("Temperature Sensor 2"));
        assert_eq!(snapshot.selected_temp, Reading::Available(44.0));

        let snapshot = probe.capture(&settings, Some("gone")).await;
        assert_eq!(snapshot.selected_sensor.as_deref(), Some("temperature"));
    }

    #[tokio::test]
    async fn test_failing_sensor_command_yields_empty_map() {
        let tree = TestTree::new();
        let settings = MonitorSettings {
            show_aux_sensors: true,
            aux_sensor_command: shell("exit 1"),
            ..offline_settings(&tree)
        };

        let snapshot = MonitorProbe::new().capture(&settings, None).await;
        assert!(snapshot.sensors.is_empty());
        assert_eq!(snapshot.selected_temp, Reading::Unavailable);
    }

    #[tokio::test]
    async fn test_cpu_temp_fallback_chain() {
        let tree = TestTree::new();
        let probe = MonitorProbe::new();

        let settings = MonitorSettings {
            cpu_temp_command: shell("echo \"temp=51.2'C\""),
            ..offline_settings(&tree)
        };
        assert_eq!(probe.capture(&settings, None).await.cpu_temp, Reading::Available(51.2));

        tree.file("thermal", "47860\n");
        let settings = MonitorSettings {
            thermal_zone: tree.path("thermal"),
            ..offline_settings(&tree)
        };
        assert_eq!(probe.capture(&settings, None).await.cpu_temp, Reading::Available(47.9));

        let settings = offline_settings(&tree);
        let snapshot = probe.capture(&settings, None).await;
        assert_eq!(snapshot.cpu_temp, Reading::Unavailable);
        assert_eq!(snapshot.cpu_temp.display("°C"), "N/A");
        assert_eq!(snapshot.cpu_freq_max, Reading::Unavailable);
    }

    #[tokio::test]
    async fn test_hanging_command_is_bounded() {
        let tree = TestTree::new();
        let settings = MonitorSettings {
            cpu_temp_command: shell("sleep 10"),
            command_timeout: Duration::from_millis(200),
            ..offline_settings(&tree)
        };

        let started = std::time::Instant::now();
        let snapshot = MonitorProbe::new().capture(&settings, None).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(snapshot.cpu_temp, Reading::Unavailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_holding_mount_follows_symlinked_root() {
        let tree = TestTree::new();
        let ssd = std::fs::canonicalize(tree.sibling("ssd")).unwrap();
        std::fs::create_dir_all(ssd.join("RetroPie")).unwrap();
        tree.symlink("RetroPie", &ssd.join("RetroPie"));

        let mounts = [Path::new("/"), ssd.as_path()];
        assert_eq!(holding_mount(&tree.path("RetroPie"), &mounts), Some(1));
        assert_eq!(holding_mount(tree.root(), &mounts), Some(0));
        assert_eq!(holding_mount(&tree.path("missing"), &mounts), None);
    }

    #[tokio::test]
    async fn test_snapshot_basics() {
        let tree = TestTree::new();
        tree.file("max_freq", "1800000\n");
        let settings = MonitorSettings {
            max_freq_path: tree.path("max_freq"),
            ..offline_settings(&tree)
        };

        let snapshot = MonitorProbe::new().capture(&settings, None).await;
        assert_eq!(snapshot.cpu_freq_max, Reading::Available(1800.0));
        assert!(snapshot.mem_total > 0);
        assert!((0.0..=100.0).contains(&snapshot.mem_percent));
        assert!(!snapshot.uptime.display.is_empty());
        if let Reading::Available(disk) = snapshot.disk {
            assert_eq!(disk.used + disk.free, disk.total);
        }

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cpu_temp"]["status"], "unavailable");
        assert_eq!(json["cpu_freq_max"]["value"], 1800.0);
        assert!(json["sensors"].as_object().unwrap().is_empty());
    }
}
