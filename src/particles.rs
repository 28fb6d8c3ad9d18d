//! Frequency-coupled particle field.
//!
//! Every particle is bound to one frequency of the display band. Each output
//! frame it reads that frequency's magnitude and drifts right faster the louder
//! it is. The field is advanced sequentially before rendering and produces one
//! immutable snapshot per frame.

use rand::Rng;

use crate::audio::features::{DbWindow, SpectralFrame};
use crate::audio::interp::{lerp, smooth};
use crate::config::ParticleConfig;

/// Reference width the configured radii and speeds are given for.
const REFERENCE_WIDTH: f64 = 1920.0;

#[derive(Debug, Clone)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub freq: f64,
    pub radius: f64,
    pub speed: f64,
    pub vertical_speed: f64,
}

/// Position and size of one particle in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

pub type ParticleSnapshot = Vec<ParticleState>;

pub struct ParticleField {
    particles: Vec<Particle>,
    width: f64,
    height: f64,
    fps: f64,
    alpha: f64,
    slow_speed: f64,
    fast_speed: f64,
}

impl ParticleField {
    pub fn new<R: Rng>(
        config: &ParticleConfig,
        width: u32,
        height: u32,
        fps: f64,
        alpha: f64,
        freq_range: (f64, f64),
        rng: &mut R,
    ) -> Self {
        let width = width as f64;
        let height = height as f64;
        let scale = width / REFERENCE_WIDTH;
        let min_radius = config.min_radius * scale;
        let max_radius = config.max_radius * scale;
        let (min_freq, max_freq) = freq_range;
        let log_min = min_freq.ln();
        let log_span = (max_freq / min_freq).ln();

        let particles = (0..config.count)
            .map(|_| {
                let t: f64 = rng.random();
                let freq = (log_min + log_span * t).exp();
                // Low frequencies get the big particles.
                let base_radius = lerp(max_radius, min_radius, t);
                let radius = lerp(min_radius, base_radius, rng.random::<f64>());
                let vertical_speed = if config.max_vertical_speed > config.min_vertical_speed {
                    rng.random_range(config.min_vertical_speed..=config.max_vertical_speed)
                } else {
                    config.min_vertical_speed
                };
                Particle {
                    x: rng.random_range(-radius..=width + radius),
                    y: rng.random_range(-radius..=height + radius),
                    freq,
                    radius,
                    speed: 0.0,
                    vertical_speed: vertical_speed * scale,
                }
            })
            .collect();

        Self {
            particles,
            width,
            height,
            fps,
            alpha,
            slow_speed: config.slow_speed * scale,
            fast_speed: config.fast_speed * scale,
        }
    }

    #[cfg(test)]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advance every particle by one output frame.
    pub fn update(&mut self, spectrum: &SpectralFrame, window: &DbWindow) {
        let dt = 1.0 / self.fps;
        for p in self.particles.iter_mut() {
            let level = if spectrum.is_empty() {
                0.0
            } else {
                window.normalize(spectrum.magnitude_at(p.freq))
            };
            let target = lerp(self.slow_speed, self.fast_speed, level);
            p.speed = smooth(p.speed, target, self.alpha);
            p.x = wrap(p.x + p.speed * dt, p.radius, self.width);
            p.y = wrap(p.y + p.vertical_speed * dt, p.radius, self.height);
        }
    }

    pub fn snapshot(&self) -> ParticleSnapshot {
        self.particles
            .iter()
            .map(|p| ParticleState {
                x: p.x as f32,
                y: p.y as f32,
                radius: p.radius as f32,
            })
            .collect()
    }

    /// Run the field over the whole track, one snapshot per spectral frame.
    pub fn simulate(&mut self, frames: &[SpectralFrame], window: &DbWindow) -> Vec<ParticleSnapshot> {
        frames
            .iter()
            .map(|frame| {
                self.update(frame, window);
                self.snapshot()
            })
            .collect()
    }
}

/// Wrap `v` into `[-r, extent + r]`.
fn wrap(v: f64, r: f64, extent: f64) -> f64 {
    let span = extent + 2.0 * r;
    if span <= 0.0 {
        return v;
    }
    (v + r).rem_euclid(span) - r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FrequencyGrid;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WINDOW: DbWindow = DbWindow {
        min_db: -30.0,
        max_db: -5.0,
    };

    fn spectrum(db: f32) -> SpectralFrame {
        SpectralFrame {
            grid: FrequencyGrid::linear(20.0, 200.0, 64),
            magnitudes: vec![db; 64],
        }
    }

    fn field(seed: u64) -> ParticleField {
        let mut rng = StdRng::seed_from_u64(seed);
        ParticleField::new(&ParticleConfig::default(), 320, 180, 60.0, 0.7, (20.0, 200.0), &mut rng)
    }

    #[test]
    fn initial_particles_respect_ranges() {
        let f = field(1);
        let scale = 320.0 / REFERENCE_WIDTH;
        assert_eq!(f.particles().len(), 256);
        for p in f.particles() {
            assert!(p.freq >= 20.0 - 1e-9 && p.freq <= 200.0 + 1e-9);
            assert!(p.radius >= 2.0 * scale - 1e-9 && p.radius <= 12.0 * scale + 1e-9);
            assert!(p.x >= -p.radius && p.x <= 320.0 + p.radius);
            assert!(p.y >= -p.radius && p.y <= 180.0 + p.radius);
            assert_eq!(p.speed, 0.0);
        }
    }

    #[test]
    fn particles_stay_inside_the_wrapped_canvas() {
        let mut f = field(2);
        let loud = spectrum(-5.0);
        for _ in 0..600 {
            f.update(&loud, &WINDOW);
        }
        for p in f.particles() {
            assert!(p.x >= -p.radius && p.x <= 320.0 + p.radius, "x {}", p.x);
            assert!(p.y >= -p.radius && p.y <= 180.0 + p.radius, "y {}", p.y);
        }
    }

    #[test]
    fn speed_follows_magnitude() {
        let scale = 320.0 / REFERENCE_WIDTH;
        let mut f = field(3);
        for _ in 0..100 {
            f.update(&spectrum(-5.0), &WINDOW);
        }
        assert!(f.particles().iter().all(|p| (p.speed - 400.0 * scale).abs() < 1e-6));
        for _ in 0..100 {
            f.update(&spectrum(-60.0), &WINDOW);
        }
        assert!(f.particles().iter().all(|p| (p.speed - 10.0 * scale).abs() < 1e-6));
    }

    #[test]
    fn seeded_fields_are_reproducible() {
        let frames: Vec<_> = (0..10).map(|i| spectrum(-30.0 + i as f32 * 2.5)).collect();
        let a = field(42).simulate(&frames, &WINDOW);
        let b = field(42).simulate(&frames, &WINDOW);
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn wrap_moves_across_edges() {
        assert_eq!(wrap(105.0, 2.0, 100.0), 1.0);
        assert_eq!(wrap(-3.0, 2.0, 100.0), 101.0);
        assert_eq!(wrap(50.0, 2.0, 100.0), 50.0);
    }
}
