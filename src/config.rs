//! Configuration types for viseme generation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, VisemeError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthpieceConfig {
    /// Timeline synthesis tuning.
    pub timeline: TimelineConfig,
    /// External phonemizer settings.
    pub phonemizer: PhonemizerConfig,
    /// Keyframe output settings.
    pub store: StoreConfig,
}

/// How phoneme durations are resolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingPolicy {
    /// Use phonemizer durations when present, equal shares otherwise.
    #[default]
    Auto,
    /// Always split the target duration equally, ignoring reported timing.
    Uniform,
}

/// Keyframe emission for equal-share (untimed) slots.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntimedEmission {
    /// Hold the slot's shape, sampled at `frame_rate`.
    #[default]
    Sampled,
    /// Onset/release pair per slot, like timed phonemes.
    Dwell,
}

/// Highest accepted `frame_rate` in Hz.
pub const MAX_FRAME_RATE: u32 = 240;

/// Timeline synthesis tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Offset in seconds between a phoneme boundary and its onset/release key.
    pub dwell_offset_secs: f64,
    /// Reported timing is rescaled only when it misses the target by more
    /// than this many seconds.
    pub rescale_tolerance_secs: f64,
    /// Sampling rate in Hz for [`UntimedEmission::Sampled`].
    pub frame_rate: u32,
    /// Decimal places keyframe times are rounded to (None = no rounding).
    pub time_precision: Option<u32>,
    /// Duration resolution policy.
    pub timing: TimingPolicy,
    /// Emission strategy for untimed phonemes.
    pub untimed_emission: UntimedEmission,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            dwell_offset_secs: 0.01,
            rescale_tolerance_secs: 0.05,
            frame_rate: 60,
            time_precision: Some(4),
            timing: TimingPolicy::default(),
            untimed_emission: UntimedEmission::default(),
        }
    }
}

impl TimelineConfig {
    /// Reject values the synthesizer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.dwell_offset_secs.is_finite() || self.dwell_offset_secs < 0.0 {
            return Err(VisemeError::Config(
                "dwell_offset_secs must be a non-negative number".into(),
            ));
        }
        if !self.rescale_tolerance_secs.is_finite() || self.rescale_tolerance_secs < 0.0 {
            return Err(VisemeError::Config(
                "rescale_tolerance_secs must be a non-negative number".into(),
            ));
        }
        if self.frame_rate == 0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(VisemeError::Config(format!(
                "frame_rate must be between 1 and {MAX_FRAME_RATE}"
            )));
        }
        if let Some(precision) = self.time_precision {
            if precision > 9 {
                return Err(VisemeError::Config(
                    "time_precision must be at most 9 decimal places".into(),
                ));
            }
            // Rounding must not merge or erase keys one frame or offset apart.
            let step = 10f64.powi(-(precision as i32));
            let frame = 1.0 / f64::from(self.frame_rate);
            let offset = self.dwell_offset_secs;
            if step >= frame || (offset > 0.0 && step >= offset) {
                return Err(VisemeError::Config(format!(
                    "time_precision {precision} is too coarse for frame_rate {} and dwell_offset_secs {}",
                    self.frame_rate, self.dwell_offset_secs
                )));
            }
        }
        Ok(())
    }
}

/// Which external phonemizer produces the phoneme stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonemizerMode {
    /// `espeak-ng --pho` with per-phoneme durations.
    #[default]
    Espeak,
    /// A TTS script that writes audio plus a JSON phoneme list.
    #[serde(alias = "python")]
    Script,
}

impl std::fmt::Display for PhonemizerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Espeak => "espeak",
            Self::Script => "script",
        })
    }
}

/// External phonemizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonemizerConfig {
    /// Mode used when a request does not name one.
    pub default_mode: PhonemizerMode,
    /// Kill the phonemizer process after this many seconds.
    pub timeout_secs: u64,
    pub espeak: EspeakConfig,
    pub script: ScriptConfig,
}

impl Default for PhonemizerConfig {
    fn default() -> Self {
        Self {
            default_mode: PhonemizerMode::default(),
            timeout_secs: 30,
            espeak: EspeakConfig::default(),
            script: ScriptConfig::default(),
        }
    }
}

/// espeak-ng invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EspeakConfig {
    /// Binary name (looked up on PATH) or absolute path.
    pub binary: PathBuf,
    /// Voice passed to `-v`.
    pub voice: String,
}

impl Default for EspeakConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("espeak-ng"),
            voice: "it".to_owned(),
        }
    }
}

/// TTS script invocation: `<interpreter> <script> <text> <wav> <json>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Interpreter binary name or path.
    pub interpreter: PathBuf,
    /// Script path. Script mode is unavailable when unset.
    pub script_path: Option<PathBuf>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python"),
            script_path: None,
        }
    }
}

/// Keyframe output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory `blendshapes-<id>.json` files are written to.
    pub output_dir: PathBuf,
    /// Prefix of returned retrieval handles, e.g. `""` gives `/blendshapes-<id>.json`.
    pub url_prefix: String,
    /// Files older than this are removed by `prune`.
    pub max_age_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_dir: crate::app_dirs::public_dir(),
            url_prefix: String::new(),
            max_age_secs: 3600,
        }
    }
}

impl MouthpieceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VisemeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VisemeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.timeline.validate()?;
        if self.phonemizer.timeout_secs == 0 {
            return Err(VisemeError::Config(
                "phonemizer.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.phonemizer.espeak.voice.trim().is_empty() {
            return Err(VisemeError::Config(
                "phonemizer.espeak.voice must not be empty".into(),
            ));
        }
        Ok(())
    }
}
