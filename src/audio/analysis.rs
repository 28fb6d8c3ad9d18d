use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::SpectrumConfig;

use super::features::{DbWindow, FrequencyGrid, RawSpectrum, SpectralFrame};
use super::interp::{sample_catmull_rom, smooth};
use super::timing::FrameTiming;
use super::track::{AudioTrack, Signal};

/// Added to magnitudes before the log so silence stays finite.
const MAG_EPSILON: f64 = 1e-12;

/// Everything the per-frame FFT needs that does not change between frames.
pub struct SpectralPlan {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    sample_rate: f64,
    /// Raw-bin band kept between passes, inclusive. Raw index `r` is FFT bin `r + 1`.
    band: (usize, usize),
    /// Same band restricted to the displayed frequency range, for the peak search.
    display_band: (usize, usize),
}

impl SpectralPlan {
    pub fn new(timing: &FrameTiming, sample_rate: u32, config: &SpectrumConfig) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(timing.fft_size);
        let sample_rate = sample_rate as f64;
        let fft_size = timing.fft_size;
        let last = (fft_size / 2).saturating_sub(1);

        let to_raw = |freq: f64| fft_size as f64 * freq / sample_rate - 1.0;
        let p_min = to_raw(config.min_freq);
        let p_max = to_raw(config.max_freq);
        let clamp_raw = |p: f64| (p.max(0.0) as usize).min(last);
        let band = (
            clamp_raw(p_min.floor() - 1.0),
            clamp_raw(p_max.ceil() + 1.0),
        );
        let display_band = {
            let lo = clamp_raw(p_min.ceil());
            let hi = clamp_raw(p_max.floor());
            if lo <= hi {
                (lo, hi)
            } else {
                band
            }
        };

        log::debug!(
            "Spectral plan: fft {} ({:.2} Hz/bin), window {} ({:?}), raw bins {}..={}",
            fft_size,
            sample_rate / fft_size as f64,
            timing.window_size,
            config.window,
            band.0,
            band.1
        );

        Self {
            fft,
            fft_size,
            window: config.window.build(timing.window_size),
            sample_rate,
            band,
            display_band,
        }
    }

    /// Fractional raw-bin index of `freq`.
    pub fn raw_position(&self, freq: f64) -> f64 {
        self.fft_size as f64 * freq / self.sample_rate - 1.0
    }

    #[cfg(test)]
    /// Frequency of raw-bin index `r`.
    pub fn raw_freq(&self, r: usize) -> f64 {
        (r + 1) as f64 * self.sample_rate / self.fft_size as f64
    }
}

/// Per-worker FFT state. Never shared between threads.
pub struct SpectrumContext {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumContext {
    pub fn new(plan: &SpectralPlan) -> Self {
        let fft = Arc::clone(&plan.fft);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); plan.fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Windowed, zero-padded FFT of the channel-averaged track starting at
    /// sample frame `offset`, reduced to the plan's band in dB.
    pub fn analyze(&mut self, track: &AudioTrack, plan: &SpectralPlan, offset: i64) -> RawSpectrum {
        for (n, slot) in self.buffer.iter_mut().enumerate() {
            let s = match plan.window.get(n) {
                Some(w) => track.mono(Signal::Raw, offset + n as i64) * w,
                None => 0.0,
            };
            *slot = Complex::new(s, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / plan.fft_size as f64;
        let (first, last) = plan.band;
        let db = (first..=last)
            .map(|r| {
                let k = (r + 1) as f64;
                // sqrt(freq / bin0_freq) == sqrt(k)
                let mag = self.buffer[r + 1].norm() as f64 * k.sqrt() * scale;
                (20.0 * (mag + MAG_EPSILON).log10()) as f32
            })
            .collect();

        RawSpectrum {
            first_bin: first,
            db,
        }
    }
}

/// Display spectra for every output frame plus the window they were normalized to.
pub struct SpectralAnalysis {
    pub window: DbWindow,
    pub grid: FrequencyGrid,
    pub frames: Vec<SpectralFrame>,
}

pub fn analyze(track: &AudioTrack, timing: &FrameTiming, config: &SpectrumConfig) -> SpectralAnalysis {
    let plan = SpectralPlan::new(timing, track.sample_rate(), config);
    let total = track.frames();

    log::info!("Pass 1: Raw spectra ({} frames)...", timing.frame_count);
    let raw: Vec<RawSpectrum> = (0..timing.frame_count)
        .into_par_iter()
        .map_init(
            || SpectrumContext::new(&plan),
            |ctx, i| ctx.analyze(track, &plan, timing.window_offset(i, total)),
        )
        .collect();

    let window = db_window(&raw, &plan, config);
    log::info!(
        "Global dB window: [{:.1}, {:.1}]",
        window.min_db,
        window.max_db
    );

    log::info!(
        "Pass 2: Resampling to {} bins (alpha={:.2})...",
        config.display_bins,
        config.alpha
    );
    let grid = FrequencyGrid::linear(config.min_freq, config.max_freq, config.display_bins);
    let frames = resample_and_smooth(&raw, &plan, &grid, &window, config.alpha);

    SpectralAnalysis {
        window,
        grid,
        frames,
    }
}

/// Global window: ceiling of the loudest displayed bin over all frames,
/// never below `noise_floor_db + db_range`.
fn db_window(raw: &[RawSpectrum], plan: &SpectralPlan, config: &SpectrumConfig) -> DbWindow {
    let (lo, hi) = plan.display_band;
    let observed = raw
        .iter()
        .flat_map(|spectrum| {
            let from = lo - spectrum.first_bin;
            let to = hi - spectrum.first_bin;
            spectrum.db[from..=to].iter().copied()
        })
        .fold(f32::NEG_INFINITY, f32::max) as f64;

    let floor = config.noise_floor_db + config.db_range;
    let max_db = if observed.is_finite() {
        observed.ceil().max(floor)
    } else {
        floor
    };
    DbWindow {
        min_db: max_db - config.db_range,
        max_db,
    }
}

fn resample_and_smooth(
    raw: &[RawSpectrum],
    plan: &SpectralPlan,
    grid: &FrequencyGrid,
    window: &DbWindow,
    alpha: f64,
) -> Vec<SpectralFrame> {
    let mut frames: Vec<SpectralFrame> = Vec::with_capacity(raw.len());
    let mut clamped: Vec<f32> = Vec::new();

    for spectrum in raw {
        clamped.clear();
        clamped.extend(spectrum.db.iter().map(|&d| window.clamp(d as f64) as f32));

        let previous = frames.last().map(|f| f.magnitudes.as_slice());
        let magnitudes = grid
            .freqs()
            .iter()
            .enumerate()
            .map(|(j, &freq)| {
                let p = plan.raw_position(freq) - spectrum.first_bin as f64;
                let value = sample_catmull_rom(&clamped, p);
                let value = match previous {
                    Some(prev) => smooth(prev[j] as f64, value, alpha),
                    None => value,
                };
                window.clamp(value) as f32
            })
            .collect();

        frames.push(SpectralFrame {
            grid: grid.clone(),
            magnitudes,
        });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn config(min_freq: f64, max_freq: f64, alpha: f64) -> SpectrumConfig {
        SpectrumConfig {
            min_freq,
            max_freq,
            alpha,
            ..SpectrumConfig::default()
        }
    }

    fn run(track: &AudioTrack, config: &SpectrumConfig) -> (FrameTiming, SpectralAnalysis) {
        let timing = FrameTiming::new(track.frames(), track.sample_rate(), 60.0, 6.0).unwrap();
        let analysis = analyze(track, &timing, config);
        (timing, analysis)
    }

    fn tone(freq: f64, sr: u32, seconds: f64) -> AudioTrack {
        let n = (sr as f64 * seconds) as usize;
        let samples = (0..n)
            .map(|i| (0.5 * (TAU * freq * i as f64 / sr as f64).sin()) as f32)
            .collect();
        AudioTrack::new(samples, 1, sr).unwrap()
    }

    #[test]
    fn frames_cover_timing_and_stay_in_window() {
        let track = tone(100.0, 44100, 1.0);
        let (timing, analysis) = run(&track, &SpectrumConfig::default());
        assert_eq!(analysis.frames.len(), timing.frame_count);
        let w = analysis.window;
        assert!((w.max_db - w.min_db - 25.0).abs() < 1e-9);
        for frame in &analysis.frames {
            assert_eq!(frame.magnitudes.len(), 512);
            let freqs: Vec<f64> = frame.pairs().map(|(f, _)| f).collect();
            assert!(freqs.windows(2).all(|p| p[1] > p[0]));
            for (_, db) in frame.pairs() {
                assert!(db >= w.min_db - 1e-3 && db <= w.max_db + 1e-3);
            }
        }
    }

    #[test]
    fn one_sample_window_analyzes_without_panicking() {
        let track = tone(100.0, 44100, 0.25);
        let timing = FrameTiming::new(track.frames(), track.sample_rate(), 60.0, 0.001).unwrap();
        let analysis = analyze(&track, &timing, &SpectrumConfig::default());
        assert_eq!(analysis.frames.len(), timing.frame_count);
        assert!(analysis.frames.iter().all(|f| f.magnitudes.len() == 512));
    }

    #[test]
    fn silent_track_sits_on_the_noise_floor() {
        let track = AudioTrack::new(vec![0.0; 44100], 1, 44100).unwrap();
        let (_, analysis) = run(&track, &SpectrumConfig::default());
        assert_eq!(analysis.window.max_db, -95.0);
        assert_eq!(analysis.window.min_db, -120.0);
        assert!(analysis
            .frames
            .iter()
            .all(|f| f.magnitudes.iter().all(|&m| m == -120.0)));
    }

    #[test]
    fn analysis_is_deterministic() {
        let track = tone(60.0, 22050, 0.5);
        let (_, a) = run(&track, &SpectrumConfig::default());
        let (_, b) = run(&track, &SpectrumConfig::default());
        assert_eq!(a.window, b.window);
        for (fa, fb) in a.frames.iter().zip(b.frames.iter()) {
            assert_eq!(fa.magnitudes, fb.magnitudes);
        }
    }

    #[test]
    fn steady_tone_peaks_at_its_frequency() {
        let track = tone(100.0, 44100, 1.0);
        let (_, analysis) = run(&track, &config(20.0, 200.0, 0.7));
        let mid = &analysis.frames[30];
        let (peak_freq, _) = mid
            .pairs()
            .fold((0.0, f64::NEG_INFINITY), |best, p| if p.1 > best.1 { p } else { best });
        assert!((peak_freq - 100.0).abs() < 8.0, "peak at {peak_freq}");
    }

    #[test]
    fn sweep_peak_follows_the_sweep() {
        // Linear sweep 20 -> 2000 Hz over 2 s, stereo, 48 kHz.
        let sr = 48000u32;
        let seconds = 2.0;
        let k = (2000.0 - 20.0) / seconds;
        let n = (sr as f64 * seconds) as usize;
        let samples: Vec<f32> = (0..n)
            .flat_map(|i| {
                let t = i as f64 / sr as f64;
                let s = (0.5 * (TAU * (20.0 * t + 0.5 * k * t * t)).sin()) as f32;
                [s, s]
            })
            .collect();
        let track = AudioTrack::new(samples, 2, sr).unwrap();
        let (timing, analysis) = run(&track, &config(20.0, 2000.0, 1.0));
        assert_eq!(timing.frame_count, 120);

        // Frame 60 is centred on t = 1.0 s, where the sweep is at 1010 Hz.
        let (peak_freq, _) = analysis.frames[60]
            .pairs()
            .fold((0.0, f64::NEG_INFINITY), |best, p| if p.1 > best.1 { p } else { best });
        assert!((peak_freq - 1010.0).abs() < 40.0, "peak at {peak_freq}");
    }

    #[test]
    fn raw_band_covers_display_neighbours() {
        let track = tone(100.0, 44100, 0.2);
        let timing = FrameTiming::new(track.frames(), 44100, 60.0, 6.0).unwrap();
        let cfg = SpectrumConfig::default();
        let plan = SpectralPlan::new(&timing, 44100, &cfg);
        let p_min = plan.raw_position(cfg.min_freq);
        let p_max = plan.raw_position(cfg.max_freq);
        assert!(plan.band.0 as f64 <= p_min.floor() - 1.0);
        assert!(plan.band.1 as f64 >= p_max.ceil() + 1.0);
        assert!((plan.raw_freq(0) - 44100.0 / 8192.0).abs() < 1e-9);
    }
}
