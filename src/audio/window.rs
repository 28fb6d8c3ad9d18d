use serde::Deserialize;
use std::f64::consts::TAU;

/// Analysis windows applied before the FFT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowFunction {
    /// Nuttall, with the coefficients GNU Octave uses for `nuttallwin`.
    #[default]
    Nuttall,
    BlackmanHarris,
}

impl WindowFunction {
    fn coefficients(self) -> [f64; 4] {
        match self {
            WindowFunction::Nuttall => [0.355768, 0.487396, 0.144232, 0.012604],
            WindowFunction::BlackmanHarris => [0.35875, 0.48829, 0.14128, 0.01168],
        }
    }

    /// Symmetric window of `size` points.
    pub fn build(self, size: usize) -> Vec<f32> {
        if size == 0 {
            return Vec::new();
        }
        if size == 1 {
            return vec![1.0];
        }
        let [a0, a1, a2, a3] = self.coefficients();
        let denom = (size - 1) as f64;
        (0..size)
            .map(|n| {
                let x = TAU * n as f64 / denom;
                (a0 - a1 * x.cos() + a2 * (2.0 * x).cos() - a3 * (3.0 * x).cos()) as f32
            })
            .collect()
    }
}
