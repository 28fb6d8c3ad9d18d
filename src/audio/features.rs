use serde::Serialize;
use std::sync::Arc;

/// Raw per-frame spectrum in dB, restricted to the FFT bins the display band
/// needs. `db[k]` belongs to bin `first_bin + k`.
#[derive(Clone, Debug)]
pub struct RawSpectrum {
    pub first_bin: usize,
    pub db: Vec<f32>,
}

/// Global display window found over the whole track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DbWindow {
    pub min_db: f64,
    pub max_db: f64,
}

impl DbWindow {
    #[inline]
    pub fn clamp(&self, db: f64) -> f64 {
        db.clamp(self.min_db, self.max_db)
    }

    /// Position of `db` inside the window, 0.0 at the floor, 1.0 at the top.
    #[inline]
    pub fn normalize(&self, db: f64) -> f64 {
        let range = self.max_db - self.min_db;
        if range <= 0.0 {
            return 0.0;
        }
        ((db - self.min_db) / range).clamp(0.0, 1.0)
    }
}

/// Display frequencies shared by every frame: linearly spaced, strictly increasing.
#[derive(Clone, Debug)]
pub struct FrequencyGrid {
    freqs: Arc<[f64]>,
}

impl FrequencyGrid {
    pub fn linear(min_freq: f64, max_freq: f64, bins: usize) -> Self {
        let step = if bins > 1 {
            (max_freq - min_freq) / (bins - 1) as f64
        } else {
            0.0
        };
        let freqs: Vec<f64> = (0..bins).map(|i| min_freq + step * i as f64).collect();
        Self {
            freqs: freqs.into(),
        }
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn min_freq(&self) -> f64 {
        self.freqs.first().copied().unwrap_or(0.0)
    }

    pub fn max_freq(&self) -> f64 {
        self.freqs.last().copied().unwrap_or(0.0)
    }

    /// Fractional display-bin index of `freq`.
    pub fn position(&self, freq: f64) -> f64 {
        let (lo, hi) = (self.min_freq(), self.max_freq());
        if self.freqs.len() < 2 || hi <= lo {
            return 0.0;
        }
        (freq - lo) / (hi - lo) * (self.freqs.len() - 1) as f64
    }
}

/// Smoothed, normalized display spectrum of one output frame.
#[derive(Clone, Debug)]
pub struct SpectralFrame {
    pub grid: FrequencyGrid,
    /// dB magnitude per display bin, clamped to the track's [`DbWindow`].
    pub magnitudes: Vec<f32>,
}

impl SpectralFrame {
    /// (frequency, magnitude_dB) pairs in increasing frequency order.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.grid
            .freqs()
            .iter()
            .copied()
            .zip(self.magnitudes.iter().map(|&m| m as f64))
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Magnitude at an arbitrary frequency inside the grid (Catmull-Rom).
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        super::interp::sample_catmull_rom(&self.magnitudes, self.grid.position(freq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_linear_and_inclusive() {
        let grid = FrequencyGrid::linear(20.0, 200.0, 10);
        assert_eq!(grid.len(), 10);
        assert_eq!(grid.min_freq(), 20.0);
        assert!((grid.max_freq() - 200.0).abs() < 1e-9);
        assert!(grid.freqs().windows(2).all(|w| w[1] > w[0]));
        assert!((grid.position(200.0) - 9.0).abs() < 1e-9);
        assert_eq!(grid.position(20.0), 0.0);
    }

    #[test]
    fn db_window_normalizes() {
        let w = DbWindow {
            min_db: -30.0,
            max_db: -5.0,
        };
        assert_eq!(w.normalize(-30.0), 0.0);
        assert_eq!(w.normalize(-5.0), 1.0);
        assert_eq!(w.normalize(-100.0), 0.0);
        assert!((w.normalize(-17.5) - 0.5).abs() < 1e-12);
        assert_eq!(w.clamp(3.0), -5.0);
    }

    #[test]
    fn frames_share_the_grid() {
        let grid = FrequencyGrid::linear(20.0, 200.0, 4);
        let a = SpectralFrame {
            grid: grid.clone(),
            magnitudes: vec![-10.0; 4],
        };
        let b = SpectralFrame {
            grid,
            magnitudes: vec![-20.0; 4],
        };
        assert!(std::ptr::eq(a.grid.freqs().as_ptr(), b.grid.freqs().as_ptr()));
        let pairs: Vec<_> = a.pairs().collect();
        assert_eq!(pairs[0], (20.0, -10.0));
        assert_eq!(pairs.len(), 4);
        assert!((b.magnitude_at(110.0) + 20.0).abs() < 1e-9);
    }
}
