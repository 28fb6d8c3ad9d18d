//! Interpolation helpers shared by the spectrum resampler and the particle field.

/// Uniform Catmull-Rom segment between `p1` (t = 0) and `p2` (t = 1).
#[inline]
pub fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Sample `values` at a fractional index using the four neighbours
/// `a-1, a, b, b+1` with `a = floor(position)` and `b = ceil(position)`.
/// Indices outside the slice are clamped to its ends.
pub fn sample_catmull_rom(values: &[f32], position: f64) -> f64 {
    match values.len() {
        0 => return 0.0,
        1 => return values[0] as f64,
        _ => {}
    }
    let last = (values.len() - 1) as i64;
    let position = position.clamp(0.0, last as f64);
    let a = position.floor() as i64;
    let b = position.ceil() as i64;
    let t = position - a as f64;

    let at = |i: i64| values[i.clamp(0, last) as usize] as f64;
    catmull_rom(at(a - 1), at(a), at(b), at(b + 1), t)
}

/// One-pole low-pass step: `alpha * current + (1 - alpha) * previous`.
#[inline]
pub fn smooth(previous: f64, current: f64, alpha: f64) -> f64 {
    alpha * current + (1.0 - alpha) * previous
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_reproduce_control_points() {
        assert_eq!(catmull_rom(9.0, -3.0, 4.0, 100.0, 0.0), -3.0);
        assert!((catmull_rom(9.0, -3.0, 4.0, 100.0, 1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn integral_positions_hit_samples_exactly() {
        let values = [-30.0f32, -12.5, -7.0, -22.0, -29.0];
        for (i, v) in values.iter().enumerate() {
            assert!((sample_catmull_rom(&values, i as f64) - *v as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn linear_data_stays_linear() {
        let values: Vec<f32> = (0..8).map(|i| i as f32 * 2.0).collect();
        let v = sample_catmull_rom(&values, 3.25);
        assert!((v - 6.5).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_positions_clamp() {
        let values = [1.0f32, 2.0, 3.0];
        assert_eq!(sample_catmull_rom(&values, -4.0), 1.0);
        assert_eq!(sample_catmull_rom(&values, 17.0), 3.0);
        assert_eq!(sample_catmull_rom(&[], 1.0), 0.0);
        assert_eq!(sample_catmull_rom(&[5.0], 0.3), 5.0);
    }

    #[test]
    fn smoothing_converges_on_constant_input() {
        let alpha = 0.3;
        let target = -12.0;
        let mut s: f64 = -60.0;
        let initial_error = (s - target).abs();
        for k in 1..=40 {
            s = smooth(s, target, alpha);
            let bound = initial_error * (1.0f64 - alpha).powi(k) + 1e-9;
            assert!((s - target).abs() <= bound);
        }
        assert!((s - target).abs() < 1e-4);
    }
}
