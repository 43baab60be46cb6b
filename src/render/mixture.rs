use ndarray::ArrayViewMut2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Components farther than this many standard deviations from their centre are not rendered
const RENDER_NSIGMA: f64 = 8.0;

/// Normalised 2-D Gaussian scaled by `amp`, covariance is `[[xx, xy], [xy, yy]]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gaussian2 {
    pub amp: f64,
    pub mean: [f64; 2],
    pub cov: [f64; 3],
}

impl Gaussian2 {
    pub fn circular(amp: f64, mean: [f64; 2], var: f64) -> Self {
        Self {
            amp,
            mean,
            cov: [var, 0.0, var],
        }
    }

    #[inline]
    fn det(&self) -> f64 {
        self.cov[0] * self.cov[2] - self.cov[1] * self.cov[1]
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let [xx, xy, yy] = self.cov;
        let det = self.det();
        let dx = x - self.mean[0];
        let dy = y - self.mean[1];
        let q = (dx * dx * yy - 2.0 * dx * dy * xy + dy * dy * xx) / det;
        self.amp * f64::exp(-0.5 * q) / (TAU * det.sqrt())
    }

    /// Convolution of two Gaussians, amplitudes multiply, means and covariances add
    pub fn convolve(&self, other: &Self) -> Self {
        Self {
            amp: self.amp * other.amp,
            mean: [self.mean[0] + other.mean[0], self.mean[1] + other.mean[1]],
            cov: [
                self.cov[0] + other.cov[0],
                self.cov[1] + other.cov[1],
                self.cov[2] + other.cov[2],
            ],
        }
    }

    /// Half-size of the box holding the component, pixels
    fn extent(&self) -> f64 {
        let [xx, xy, yy] = self.cov;
        let half_trace = 0.5 * (xx + yy);
        let max_eigenvalue = half_trace + f64::sqrt((0.5 * (xx - yy)).powi(2) + xy * xy);
        RENDER_NSIGMA * max_eigenvalue.sqrt()
    }
}

/// Sum of [Gaussian2] components
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mixture {
    pub components: Vec<Gaussian2>,
}

impl Mixture {
    pub fn new(components: Vec<Gaussian2>) -> Self {
        Self { components }
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.components.iter().map(|g| g.eval(x, y)).sum()
    }

    pub fn total_amp(&self) -> f64 {
        self.components.iter().map(|g| g.amp).sum()
    }

    pub fn convolve(&self, other: &Self) -> Self {
        self.components
            .iter()
            .flat_map(|a| other.components.iter().map(move |b| a.convolve(b)))
            .collect::<Vec<_>>()
            .into()
    }

    pub fn shifted(mut self, dx: f64, dy: f64) -> Self {
        for g in self.components.iter_mut() {
            g.mean[0] += dx;
            g.mean[1] += dy;
        }
        self
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        for g in self.components.iter_mut() {
            g.amp *= factor;
        }
        self
    }

    /// Add `flux` times the mixture sampled at pixel centres, pixel `[row, col]` is at `(x=col, y=row)`
    pub fn render_add(&self, flux: f64, mut image: ArrayViewMut2<f64>) {
        if flux == 0.0 {
            return;
        }
        let (nrows, ncols) = image.dim();
        for g in self.components.iter() {
            let extent = g.extent();
            if !extent.is_finite() {
                continue;
            }
            let (col_lo, col_hi) = clip_range(g.mean[0], extent, ncols);
            let (row_lo, row_hi) = clip_range(g.mean[1], extent, nrows);
            for row in row_lo..row_hi {
                for col in col_lo..col_hi {
                    image[[row, col]] += flux * g.eval(col as f64, row as f64);
                }
            }
        }
    }
}

impl From<Vec<Gaussian2>> for Mixture {
    fn from(components: Vec<Gaussian2>) -> Self {
        Self::new(components)
    }
}

fn clip_range(center: f64, extent: f64, size: usize) -> (usize, usize) {
    let lo = (center - extent).floor().max(0.0);
    let hi = (center + extent).ceil() + 1.0;
    let hi = hi.min(size as f64).max(0.0);
    (lo.min(hi) as usize, hi as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn gaussian_is_normalised() {
        let g = Gaussian2 {
            amp: 1.0,
            mean: [20.0, 20.0],
            cov: [4.0, 1.0, 3.0],
        };
        let mut image = Array2::zeros((41, 41));
        Mixture::new(vec![g]).render_add(1.0, image.view_mut());
        assert_abs_diff_eq!(image.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn convolution_adds_variances() {
        let a = Mixture::new(vec![Gaussian2::circular(0.5, [1.0, 2.0], 1.0)]);
        let b = Mixture::new(vec![
            Gaussian2::circular(1.0, [0.0, 0.0], 2.0),
            Gaussian2::circular(1.0, [0.5, 0.0], 3.0),
        ]);
        let c = a.convolve(&b);
        assert_eq!(c.components.len(), 2);
        assert_abs_diff_eq!(c.total_amp(), 1.0);
        assert_eq!(c.components[0].cov, [3.0, 0.0, 3.0]);
        assert_eq!(c.components[1].mean, [1.5, 2.0]);
    }

    #[test]
    fn render_clips_to_image() {
        let m = Mixture::new(vec![Gaussian2::circular(1.0, [-100.0, -100.0], 1.0)]);
        let mut image = Array2::zeros((10, 10));
        m.render_add(1.0, image.view_mut());
        assert_eq!(image.sum(), 0.0);
    }

    #[test]
    fn row_is_y_and_column_is_x() {
        let m = Mixture::new(vec![Gaussian2::circular(1.0, [7.0, 2.0], 0.5)]);
        let mut image = Array2::zeros((10, 10));
        m.render_add(1.0, image.view_mut());
        let (argmax, _) = image
            .indexed_iter()
            .fold(((0, 0), f64::MIN), |acc, (idx, &v)| if v > acc.1 { (idx, v) } else { acc });
        assert_eq!(argmax, (2, 7));
    }
}
