// Synthetic frames for unit tests: flat sky with Gaussian noise plus
// rendered Gaussian stars, reproducible from a seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::frame::{ExposureParams, Frame};

pub struct SyntheticFrame {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub exposure: ExposureParams,
}

impl SyntheticFrame {
    /// Flat background with zero-mean Gaussian noise of the given sigma.
    pub fn new(width: usize, height: usize, background: f64, noise: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(background, noise)
            .expect("noise sigma must be finite and non-negative");
        let data = (0..width * height)
            .map(|_| normal.sample(&mut rng) as f32)
            .collect();
        Self {
            data,
            width,
            height,
            exposure: ExposureParams::default(),
        }
    }

    pub fn set(&mut self, x: usize, y: usize, v: f64) {
        self.data[y * self.width + x] = v as f32;
    }

    /// Add a circular Gaussian star with the given peak amplitude, sampled
    /// at pixel centers.
    pub fn add_gaussian_star(&mut self, x: f64, y: f64, sigma: f64, amplitude: f64) {
        let two_s2 = 2.0 * sigma * sigma;
        for py in 0..self.height {
            for px in 0..self.width {
                let dx = px as f64 - x;
                let dy = py as f64 - y;
                let v = amplitude * (-(dx * dx + dy * dy) / two_s2).exp();
                self.data[py * self.width + px] += v as f32;
            }
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(self.width, self.height, self.data)
            .unwrap()
            .with_exposure(self.exposure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_matches_requested_sigma() {
        let synth = SyntheticFrame::new(100, 100, 500.0, 4.0, 3);
        let n = synth.data.len() as f64;
        let mean = synth.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = synth
            .data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        assert!((mean - 500.0).abs() < 0.2, "mean {}", mean);
        assert!((var.sqrt() - 4.0).abs() < 0.2, "sigma {}", var.sqrt());
    }

    #[test]
    fn test_zero_noise_is_flat() {
        let synth = SyntheticFrame::new(8, 8, 42.0, 0.0, 1);
        assert!(synth.data.iter().all(|&v| v == 42.0));
    }
}
