use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::window::WindowFunction;
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub particles: ParticleConfig,
    #[serde(default)]
    pub shake: ShakeConfig,
    #[serde(default)]
    pub warning: WarningConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub fonts: FontConfig,
    /// Fixed seed for particle placement and shake offsets. Unset = OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Number of render buckets. Unset = available hardware parallelism.
    #[serde(default)]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub order: usize,
    pub lowpass_hz: f64,
    pub highpass_hz: f64,
    /// Write the bass-filtered signal next to the project as a float WAV.
    pub dump_filtered: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub window: WindowFunction,
    /// Samples analysed per frame = samples played per frame * this.
    pub input_size_multiplier: f64,
    pub display_bins: usize,
    pub min_freq: f64,
    pub max_freq: f64,
    /// Height of the dB window below the observed peak.
    pub db_range: f64,
    /// The dB window never sits lower than `noise_floor_db + db_range`.
    pub noise_floor_db: f64,
    /// 0.0 = max smoothing, 1.0 = no smoothing.
    pub alpha: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    pub count: usize,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Horizontal speed (px/s) at silence and at full magnitude.
    pub slow_speed: f64,
    pub fast_speed: f64,
    pub min_vertical_speed: f64,
    pub max_vertical_speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    pub intensity_scale: f64,
    /// Offset range in pixels at full intensity (for a 1920 wide frame).
    pub max_offset: f64,
    /// Use one offset for all colour channels of the main composite.
    pub red_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    pub visible_seconds: f64,
    pub fadeout_seconds: f64,
    /// Save the rendered warning as a PNG next to its text file.
    pub dump: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LayoutVariant {
    #[default]
    Circle,
    Classic,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub variant: LayoutVariant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub title: String,
    pub title_size: f32,
    pub warning_header: String,
    pub warning_header_size: f32,
    pub warning_content: String,
    pub warning_content_size: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            threads: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order: 16,
            lowpass_hz: 80.0,
            highpass_hz: 20.0,
            dump_filtered: false,
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            window: WindowFunction::Nuttall,
            input_size_multiplier: default_fps() / 10.0,
            display_bins: 512,
            min_freq: 20.0,
            max_freq: 200.0,
            db_range: 25.0,
            noise_floor_db: -120.0,
            alpha: 0.7,
        }
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: 256,
            min_radius: 2.0,
            max_radius: 12.0,
            slow_speed: 10.0,
            fast_speed: 400.0,
            min_vertical_speed: -20.0,
            max_vertical_speed: 20.0,
        }
    }
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            intensity_scale: 0.15,
            max_offset: 128.0,
            red_only: true,
        }
    }
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            visible_seconds: 3.0,
            fadeout_seconds: 2.0,
            dump: false,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            title: "Roboto-Regular.ttf".into(),
            title_size: 60.0,
            warning_header: "BarberChop.otf".into(),
            warning_header_size: 120.0,
            warning_content: "arial_narrow_7.ttf".into(),
            warning_content_size: 48.0,
        }
    }
}

fn default_width() -> u32 { 1920 }
fn default_height() -> u32 { 1080 }
fn default_fps() -> f64 { 60.0 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

impl Config {
    /// Reject values the pipeline cannot work with before any stage runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.output.width == 0 || self.output.height == 0 {
            return bad(format!("resolution {}x{}", self.output.width, self.output.height));
        }
        if !(self.output.fps > 0.0) {
            return bad(format!("fps must be positive, got {}", self.output.fps));
        }
        if self.output.threads == Some(0) {
            return bad("threads must be at least 1".into());
        }
        let s = &self.spectrum;
        if s.display_bins < 2 {
            return bad(format!("display_bins must be at least 2, got {}", s.display_bins));
        }
        if !(s.min_freq > 0.0 && s.max_freq > s.min_freq) {
            return bad(format!("frequency range {}..{} Hz", s.min_freq, s.max_freq));
        }
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            return bad(format!("spectrum alpha must be in (0, 1], got {}", s.alpha));
        }
        if !(s.db_range > 0.0) {
            return bad(format!("db_range must be positive, got {}", s.db_range));
        }
        if !(s.input_size_multiplier > 0.0) {
            return bad(format!(
                "input_size_multiplier must be positive, got {}",
                s.input_size_multiplier
            ));
        }
        let p = &self.particles;
        if p.min_radius < 0.0 || p.max_radius < p.min_radius {
            return bad(format!("particle radius range {}..{}", p.min_radius, p.max_radius));
        }
        if p.max_vertical_speed < p.min_vertical_speed {
            return bad("particle vertical speed range is reversed".into());
        }
        if self.warning.visible_seconds < 0.0 || self.warning.fadeout_seconds < 0.0 {
            return bad("warning durations must not be negative".into());
        }
        Ok(())
    }
}
