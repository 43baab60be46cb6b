use crate::render::mixture::{Gaussian2, Mixture};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Standard deviation of the default circular PSF, pixels
pub const DEFAULT_PSF_SIGMA: f64 = 2.0;

/// Point-spread function of a band as handed over by the extraction step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PsfDescriptor {
    /// No measured PSF, use a circular Gaussian of [DEFAULT_PSF_SIGMA]
    Default,
    /// Pixelized PSF stamp, centred on its central pixel
    Pixelized(Array2<f64>),
}

impl From<Option<Array2<f64>>> for PsfDescriptor {
    fn from(stamp: Option<Array2<f64>>) -> Self {
        match stamp {
            Some(stamp) => Self::Pixelized(stamp),
            None => Self::Default,
        }
    }
}

impl PsfDescriptor {
    /// Unit-flux PSF mixture centred at the origin
    ///
    /// Pixelized stamps are replaced by the circular Gaussian with the same second moment.
    pub fn mixture(&self) -> Mixture {
        match self {
            Self::Default => default_mixture(),
            Self::Pixelized(stamp) => match moment_matched_variance(stamp) {
                Some(var) => Mixture::new(vec![Gaussian2::circular(1.0, [0.0, 0.0], var)]),
                None => {
                    log::warn!("PSF stamp has no positive flux, falling back to the default PSF");
                    default_mixture()
                }
            },
        }
    }
}

fn default_mixture() -> Mixture {
    Mixture::new(vec![Gaussian2::circular(
        1.0,
        [0.0, 0.0],
        DEFAULT_PSF_SIGMA * DEFAULT_PSF_SIGMA,
    )])
}

fn moment_matched_variance(stamp: &Array2<f64>) -> Option<f64> {
    let positive = || {
        stamp
            .indexed_iter()
            .filter(|&(_, &v)| v > 0.0)
            .map(|((row, col), &v)| (col as f64, row as f64, v))
    };
    let total: f64 = positive().map(|(_, _, v)| v).sum();
    if !(total > 0.0) {
        return None;
    }
    let cx = positive().map(|(x, _, v)| x * v).sum::<f64>() / total;
    let cy = positive().map(|(_, y, v)| y * v).sum::<f64>() / total;
    let r2 = positive()
        .map(|(x, y, v)| ((x - cx).powi(2) + (y - cy).powi(2)) * v)
        .sum::<f64>()
        / total;
    let var = 0.5 * r2;
    (var.is_finite() && var > 0.0).then_some(var)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn default_psf() {
        let m = PsfDescriptor::from(None).mixture();
        assert_eq!(m.components.len(), 1);
        assert_eq!(m.components[0].cov, [4.0, 0.0, 4.0]);
    }

    #[test]
    fn pixelized_gaussian_recovers_variance() {
        let sigma: f64 = 1.5;
        let stamp = Array2::from_shape_fn((31, 31), |(row, col)| {
            let r2 = (row as f64 - 15.0).powi(2) + (col as f64 - 15.0).powi(2);
            f64::exp(-0.5 * r2 / sigma.powi(2))
        });
        let m = PsfDescriptor::Pixelized(stamp).mixture();
        assert_abs_diff_eq!(m.components[0].cov[0], sigma.powi(2), epsilon = 1e-6);
        assert_abs_diff_eq!(m.total_amp(), 1.0);
    }

    #[test]
    fn empty_stamp_falls_back_to_default() {
        let m = PsfDescriptor::Pixelized(Array2::zeros((5, 5))).mixture();
        assert_eq!(m, default_mixture());
    }
}
