//! Configuration for the DPSD analyzer
//!
//! Loaded from a TOML file with sections mirroring the parameter groups of
//! the detector setup: `[io]`, `[setup]`, `[peak]`, `[separation]`, `[led]`.
//! Every field has a default so a partial file (or none at all) yields a
//! usable configuration.
//!
//! # Example
//! ```ignore
//! let config = Config::load("dpsd.toml")?;
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::common::AnalysisError;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub setup: SetupConfig,
    #[serde(default)]
    pub peak: PeakConfig,
    #[serde(default)]
    pub separation: SeparationConfig,
    #[serde(default)]
    pub led: LedConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject out-of-range parameters before any processing starts
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.setup.time_bin <= 0.0 {
            return Err(AnalysisError::parameter(format!(
                "time_bin must be > 0 (got {})",
                self.setup.time_bin
            )));
        }
        if self.led.dt <= 0.0 {
            return Err(AnalysisError::parameter(format!(
                "led.dt must be > 0 (got {})",
                self.led.dt
            )));
        }
        if self.separation.marker == 0 {
            return Err(AnalysisError::parameter("marker must be non-zero"));
        }
        if self.separation.ph_channels == 0 {
            return Err(AnalysisError::parameter("ph_channels must be > 0"));
        }
        if self.separation.ps_channels == 0 {
            return Err(AnalysisError::parameter("ps_channels must be > 0"));
        }
        if self.peak.baseline_start == 0 {
            return Err(AnalysisError::parameter("baseline_start must be > 0"));
        }
        if self.peak.front + self.peak.tail == 0 {
            return Err(AnalysisError::parameter("front + tail must be > 0"));
        }
        if self.led.front + self.led.tail == 0 {
            return Err(AnalysisError::parameter("led front + tail must be > 0"));
        }
        Ok(())
    }

    /// Resolve the acquisition files to process.
    ///
    /// An explicit `ha_file` wins; otherwise each shot number is expanded to
    /// `<base_dir>/<shot/100>/<shot>/HA_<shot>.dat`, falling back to the flat
    /// `<base_dir>/<shot/100>/HA_<shot>.dat` layout when the per-shot
    /// directory does not exist. Shot-resolved paths force the md5 gate.
    pub fn resolve_inputs(&self) -> Vec<InputFile> {
        if !self.io.ha_file.trim().is_empty() {
            return vec![InputFile {
                path: PathBuf::from(self.io.ha_file.trim()),
                shot: None,
                check_md5: self.io.check_md5,
            }];
        }
        self.io
            .shots
            .iter()
            .map(|&shot| InputFile {
                path: shot_path(&self.io.base_dir, shot),
                shot: Some(shot),
                check_md5: true,
            })
            .collect()
    }
}

/// One resolved acquisition file
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub shot: Option<u32>,
    pub check_md5: bool,
}

fn shot_path(base_dir: &str, shot: u32) -> PathBuf {
    let shot100 = shot / 100;
    let deep = PathBuf::from(base_dir).join(shot100.to_string()).join(shot.to_string());
    let dir = if deep.exists() {
        deep
    } else {
        PathBuf::from(base_dir).join(shot100.to_string())
    };
    dir.join(format!("HA_{}.dat", shot))
}

// =============================================================================
// Sections
// =============================================================================

/// Input selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    /// Explicit acquisition file; empty means "resolve from shots"
    #[serde(default)]
    pub ha_file: String,

    /// Shot numbers to process when no explicit file is given
    #[serde(default)]
    pub shots: Vec<u32>,

    /// Root of the shot directory tree
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Require the `<file>.md5` sibling to exist (contents are not read)
    #[serde(default)]
    pub check_md5: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            ha_file: String::new(),
            shots: Vec::new(),
            base_dir: default_base_dir(),
            check_md5: false,
        }
    }
}

fn default_base_dir() -> String {
    "./acq".to_string()
}

/// Time axis and analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Width of one count-rate bin [s]
    #[serde(default = "default_time_bin")]
    pub time_bin: f64,

    /// Start of the analysed interval [s]
    #[serde(default)]
    pub t_beg: f64,

    /// End of the analysed interval [s]; <= 0 means "until the last event"
    #[serde(default = "default_t_end")]
    pub t_end: f64,

    /// Number of samples analysed per pulse
    #[serde(default = "default_tof_window_length")]
    pub tof_window_length: usize,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            time_bin: default_time_bin(),
            t_beg: 0.0,
            t_end: default_t_end(),
            tof_window_length: default_tof_window_length(),
        }
    }
}

fn default_time_bin() -> f64 {
    0.01
}
fn default_t_end() -> f64 {
    -1.0
}
fn default_tof_window_length() -> usize {
    220
}

/// Per-pulse feature extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakConfig {
    /// Samples averaged at the window head for the baseline
    #[serde(default = "default_baseline_start")]
    pub baseline_start: usize,

    /// Samples averaged at the window tail for the baseline
    #[serde(default = "default_baseline_end")]
    pub baseline_end: usize,

    /// Subtract the baseline before integration
    #[serde(default = "default_true")]
    pub subtract_baseline: bool,

    /// Peak-detection threshold (counts above baseline)
    #[serde(default = "default_threshold")]
    pub threshold: i32,

    /// Rising-edge samples of the peak-detection window
    #[serde(default = "default_front")]
    pub front: usize,

    /// Falling-edge samples of the peak-detection window
    #[serde(default = "default_tail")]
    pub tail: usize,

    /// Upper saturation limit (counts)
    #[serde(default = "default_saturation_high")]
    pub saturation_high: i32,

    /// Lower saturation limit (counts)
    #[serde(default = "default_saturation_low")]
    pub saturation_low: i32,

    /// Short-gate length from the pulse maximum (samples)
    #[serde(default = "default_short_gate")]
    pub short_gate: usize,

    /// Long-gate length from the pulse maximum (samples)
    #[serde(default = "default_long_gate")]
    pub long_gate: usize,

    /// Baseline-recovery tolerance ending the total-gate search
    #[serde(default = "default_max_difference")]
    pub max_difference: f32,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            baseline_start: default_baseline_start(),
            baseline_end: default_baseline_end(),
            subtract_baseline: true,
            threshold: default_threshold(),
            front: default_front(),
            tail: default_tail(),
            saturation_high: default_saturation_high(),
            saturation_low: default_saturation_low(),
            short_gate: default_short_gate(),
            long_gate: default_long_gate(),
            max_difference: default_max_difference(),
        }
    }
}

fn default_baseline_start() -> usize {
    40
}
fn default_baseline_end() -> usize {
    30
}
fn default_true() -> bool {
    true
}
fn default_threshold() -> i32 {
    2000
}
fn default_front() -> usize {
    3
}
fn default_tail() -> usize {
    5
}
fn default_saturation_high() -> i32 {
    7800
}
fn default_saturation_low() -> i32 {
    -1000
}
fn default_short_gate() -> usize {
    8
}
fn default_long_gate() -> usize {
    60
}
fn default_max_difference() -> f32 {
    10.0
}

/// Neutron/gamma separation in the PH/PS plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Reference integral mapping total charge to PH bin units
    #[serde(default = "default_marker")]
    pub marker: u32,

    /// Number of pulse-height channels
    #[serde(default = "default_ph_channels")]
    pub ph_channels: usize,

    /// Number of pulse-shape channels
    #[serde(default = "default_ps_channels")]
    pub ps_channels: usize,

    /// PH channel where the separator changes slope
    #[serde(default = "default_line_change")]
    pub line_change: i32,

    /// Separator slope below the knot
    #[serde(default = "default_slope1")]
    pub slope1: f32,

    /// Separator slope above the knot
    #[serde(default = "default_slope2")]
    pub slope2: f32,

    /// Separator intercept
    #[serde(default = "default_offset")]
    pub offset: f32,

    /// DD neutron energy window [PH channels]
    #[serde(default = "default_dd_lower")]
    pub dd_lower: i32,
    #[serde(default = "default_dd_upper")]
    pub dd_upper: i32,

    /// DT neutron energy window [PH channels]
    #[serde(default = "default_dt_lower")]
    pub dt_lower: i32,
    #[serde(default = "default_dt_upper")]
    pub dt_upper: i32,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            ph_channels: default_ph_channels(),
            ps_channels: default_ps_channels(),
            line_change: default_line_change(),
            slope1: default_slope1(),
            slope2: default_slope2(),
            offset: default_offset(),
            dd_lower: default_dd_lower(),
            dd_upper: default_dd_upper(),
            dt_lower: default_dt_lower(),
            dt_upper: default_dt_upper(),
        }
    }
}

fn default_marker() -> u32 {
    4000
}
fn default_ph_channels() -> usize {
    256
}
fn default_ps_channels() -> usize {
    128
}
fn default_line_change() -> i32 {
    70
}
fn default_slope1() -> f32 {
    0.5
}
fn default_slope2() -> f32 {
    0.04
}
fn default_offset() -> f32 {
    20.0
}
fn default_dd_lower() -> i32 {
    30
}
fn default_dd_upper() -> i32 {
    80
}
fn default_dt_lower() -> i32 {
    140
}
fn default_dt_upper() -> i32 {
    220
}

/// LED reference-pulse handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    /// Apply the time-sliced gain correction
    #[serde(default = "default_true")]
    pub correction: bool,

    /// Gain-tracking slot width [s]
    #[serde(default = "default_led_dt")]
    pub dt: f64,

    /// Peak-window parameters used for LED-flagged pulses
    #[serde(default = "default_led_front")]
    pub front: usize,
    #[serde(default = "default_led_tail")]
    pub tail: usize,

    /// Target gain in PH bin units
    #[serde(default = "default_led_reference")]
    pub reference: i32,

    /// LED acceptance box in the PH/PS plane (strict bounds)
    #[serde(default = "default_led_xmin")]
    pub xmin: i32,
    #[serde(default = "default_led_xmax")]
    pub xmax: i32,
    #[serde(default = "default_led_ymin")]
    pub ymin: i32,
    #[serde(default = "default_led_ymax")]
    pub ymax: i32,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            correction: true,
            dt: default_led_dt(),
            front: default_led_front(),
            tail: default_led_tail(),
            reference: default_led_reference(),
            xmin: default_led_xmin(),
            xmax: default_led_xmax(),
            ymin: default_led_ymin(),
            ymax: default_led_ymax(),
        }
    }
}

fn default_led_dt() -> f64 {
    0.2
}
fn default_led_front() -> usize {
    10
}
fn default_led_tail() -> usize {
    20
}
fn default_led_reference() -> i32 {
    420
}
fn default_led_xmin() -> i32 {
    60
}
fn default_led_xmax() -> i32 {
    85
}
fn default_led_ymin() -> i32 {
    60
}
fn default_led_ymax() -> i32 {
    105
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.setup.time_bin, 0.01);
        assert_eq!(config.setup.tof_window_length, 220);
        assert_eq!(config.peak.baseline_start, 40);
        assert_eq!(config.separation.ph_channels, 256);
        assert!(config.led.correction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[io]
ha_file = "/data/HA_29795.dat"
check_md5 = true

[setup]
time_bin = 0.002
t_beg = 1.0
t_end = 8.0
tof_window_length = 180

[peak]
baseline_start = 30
baseline_end = 20
threshold = 1500
short_gate = 10
long_gate = 50
max_difference = 5.0
subtract_baseline = false

[separation]
marker = 5000
ph_channels = 512
ps_channels = 256
line_change = 90
slope1 = 0.4
slope2 = 0.02
offset = 25.0

[led]
correction = false
dt = 0.1
reference = 400
xmin = 50
xmax = 80
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.io.ha_file, "/data/HA_29795.dat");
        assert!(config.io.check_md5);
        assert_eq!(config.setup.time_bin, 0.002);
        assert_eq!(config.setup.tof_window_length, 180);
        assert_eq!(config.peak.threshold, 1500);
        assert!(!config.peak.subtract_baseline);
        assert_eq!(config.separation.marker, 5000);
        assert_eq!(config.separation.ph_channels, 512);
        assert!(!config.led.correction);
        assert_eq!(config.led.xmin, 50);
        // Unspecified fields keep their defaults
        assert_eq!(config.led.ymin, 60);
        assert_eq!(config.peak.front, 3);
    }

    #[test]
    fn validate_rejects_bad_time_bin() {
        let config = Config::from_toml("[setup]\ntime_bin = 0.0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("time_bin"));
    }

    #[test]
    fn validate_rejects_bad_led_dt() {
        let config = Config::from_toml("[led]\ndt = -0.5\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_marker() {
        let config = Config::from_toml("[separation]\nmarker = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("marker"));
    }

    #[test]
    fn validate_rejects_zero_channels() {
        let config = Config::from_toml("[separation]\nph_channels = 0\n").unwrap();
        assert!(config.validate().is_err());
        let config = Config::from_toml("[separation]\nps_channels = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_file_wins_over_shots() {
        let toml = r#"
[io]
ha_file = "/data/HA_1.dat"
shots = [101, 102]
"#;
        let config = Config::from_toml(toml).unwrap();
        let inputs = config.resolve_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].path, PathBuf::from("/data/HA_1.dat"));
        assert_eq!(inputs[0].shot, None);
        assert!(!inputs[0].check_md5);
    }

    #[test]
    fn shots_resolve_to_shot_tree() {
        let toml = r#"
[io]
shots = [29795]
base_dir = "/raw/NSP"
"#;
        let config = Config::from_toml(toml).unwrap();
        let inputs = config.resolve_inputs();
        assert_eq!(inputs.len(), 1);
        // Neither directory exists in the test environment, so the flat
        // fallback applies
        assert_eq!(inputs[0].path, PathBuf::from("/raw/NSP/297/HA_29795.dat"));
        assert_eq!(inputs[0].shot, Some(29795));
        assert!(inputs[0].check_md5);
    }

    #[test]
    fn no_inputs_when_nothing_configured() {
        let config = Config::from_toml("").unwrap();
        assert!(config.resolve_inputs().is_empty());
    }
}
