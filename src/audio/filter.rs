//! Butterworth low-pass + high-pass cascade that derives the bass signal.
//!
//! Each filter of order N is built from N/2 second-order sections with the
//! Butterworth Q of its pole pair. Coefficients and state are kept in f64:
//! at 20 Hz against a 44.1 kHz rate the poles sit very close to the unit
//! circle and single precision drifts.

use anyhow::{Context, Result};
use std::f64::consts::{PI, TAU};
use std::path::{Path, PathBuf};

use crate::config::FilterConfig;

use super::track::{AudioTrack, SampleRange, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    LowPass,
    HighPass,
}

/// DF2T biquad (RBJ cookbook coefficients).
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    fn new(response: Response, f0: f64, fs: f64, q: f64) -> Self {
        let w0 = TAU * f0 / fs;
        let cos = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match response {
            Response::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            Response::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Second-order sections run back to back.
#[derive(Debug, Clone)]
pub struct Cascade {
    stages: Vec<Biquad>,
}

impl Cascade {
    /// Butterworth filter of even `order` with cutoff `f0`.
    pub fn butterworth(response: Response, order: usize, f0: f64, fs: f64) -> Result<Self, String> {
        if order == 0 || order % 2 != 0 {
            return Err(format!("filter order must be even and non-zero, got {order}"));
        }
        if !(fs > 0.0) {
            return Err(format!("sample rate must be positive, got {fs}"));
        }
        if !(f0 > 0.0 && f0 < fs / 2.0) {
            return Err(format!("cutoff {f0} Hz outside (0, {}) Hz", fs / 2.0));
        }
        let stages = butterworth_q_factors(order)
            .into_iter()
            .map(|q| Biquad::new(response, f0, fs, q))
            .collect();
        Ok(Self { stages })
    }

    #[inline]
    pub fn process(&mut self, sample: f64) -> f64 {
        let mut out = sample;
        for stage in self.stages.iter_mut() {
            out = stage.process(out);
        }
        out
    }
}

/// Q of each pole pair of a Butterworth filter, lowest first.
fn butterworth_q_factors(order: usize) -> Vec<f64> {
    let n_biquads = order / 2;
    (0..n_biquads)
        .rev()
        .map(|k| {
            let theta = (2.0 * k as f64 + 1.0) * PI / (2.0 * order as f64);
            1.0 / (2.0 * theta.sin())
        })
        .collect()
}

/// Low-pass then high-pass every channel of the track into its bass buffer.
///
/// Invalid filter parameters are logged and the bass buffer stays silent.
pub fn apply_bass_filter(track: &mut AudioTrack, config: &FilterConfig) {
    let fs = track.sample_rate() as f64;
    let design = |response, f0| Cascade::butterworth(response, config.order, f0, fs);
    let (lowpass, highpass) = match (
        design(Response::LowPass, config.lowpass_hz),
        design(Response::HighPass, config.highpass_hz),
    ) {
        (Ok(lp), Ok(hp)) => (lp, hp),
        (Err(e), _) | (_, Err(e)) => {
            log::error!("Bass filter skipped: {}", e);
            return;
        }
    };

    let channels = track.channels();
    let raw = track.signal(Signal::Raw);
    let mut bass = vec![0.0f32; raw.len()];
    let mut range = SampleRange::default();

    for c in 0..channels {
        let mut lp = lowpass.clone();
        let mut hp = highpass.clone();
        for (i, &s) in raw.iter().enumerate().skip(c).step_by(channels) {
            let y = hp.process(lp.process(s as f64)) as f32;
            bass[i] = y;
            range.observe(y);
        }
    }

    log::debug!(
        "Bass filter: order {}, {}..{} Hz, range [{:.4}, {:.4}]",
        config.order,
        config.highpass_hz,
        config.lowpass_hz,
        range.min,
        range.max
    );
    track.set_bass(bass, range);
}

pub fn filtered_dump_path(project_dir: &Path, config: &FilterConfig) -> PathBuf {
    project_dir.join(format!(
        "__filtered_{}_{}.wav",
        config.lowpass_hz, config.highpass_hz
    ))
}

/// Write the bass buffer as a 32-bit float WAV.
pub fn dump_filtered(track: &AudioTrack, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: track.channels() as u16,
        sample_rate: track.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &s in track.signal(Signal::Bass) {
        writer.write_sample(s)?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;
    log::info!("Wrote filtered audio to {}", path.display());
    Ok(())
}
