//! Forward model renderer
//!
//! Sources are rendered as PSF-convolved mixtures of Gaussians sampled at pixel centres, in the
//! cutout-local pixel frame with unit photometric calibration and a constant sky.

pub mod mixture;
pub use mixture::{Gaussian2, Mixture};

pub mod profiles;

pub mod psf;
pub use psf::{DEFAULT_PSF_SIGMA, PsfDescriptor};

use crate::model::{ModelTrait, SourceModel};
use crate::types::{Image, Mask};

use ndarray::Zip;

/// Renderable image: data, inverse variance, PSF, photometric band and sky
#[derive(Clone, Debug)]
pub struct FitImage {
    pub data: Image,
    /// Inverse variance, zero at masked pixels
    pub invvar: Image,
    pub psf: Mixture,
    /// Index of this band in the models' flux vectors
    pub band_index: usize,
    pub band: String,
    pub sky: f64,
}

impl FitImage {
    pub fn new(
        data: Image,
        weight: &Image,
        mask: &Mask,
        psf: &PsfDescriptor,
        band_index: usize,
        band: impl Into<String>,
        sky: f64,
    ) -> Self {
        assert_eq!(data.dim(), weight.dim(), "data and weight should have the same shape");
        assert_eq!(data.dim(), mask.dim(), "data and mask should have the same shape");
        let invvar = Zip::from(weight)
            .and(mask)
            .map_collect(|&w, &masked| if masked || !w.is_finite() { 0.0 } else { w.max(0.0) });
        Self {
            data,
            invvar,
            psf: psf.mixture(),
            band_index,
            band: band.into(),
            sky,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Contribution of a single source to `image`, sky excluded
pub fn source_image(image: &FitImage, model: &SourceModel) -> Image {
    let mut out = Image::zeros(image.dim());
    let flux = model.fluxes().get(image.band_index);
    model.mixture(&image.psf).render_add(flux, out.view_mut());
    out
}

pub fn model_image(image: &FitImage, models: &[SourceModel]) -> Image {
    let mut out = Image::from_elem(image.dim(), image.sky);
    for model in models {
        let flux = model.fluxes().get(image.band_index);
        model.mixture(&image.psf).render_add(flux, out.view_mut());
    }
    out
}

/// `(data - model) * sqrt(invvar)`
pub fn chi_image(image: &FitImage, models: &[SourceModel]) -> Image {
    let model = model_image(image, models);
    Zip::from(&image.data)
        .and(&model)
        .and(&image.invvar)
        .map_collect(|&d, &m, &iv| (d - m) * iv.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fluxes, PixPos};

    use approx::assert_abs_diff_eq;

    fn flat_image(n: usize) -> FitImage {
        FitImage::new(
            Image::zeros((n, n)),
            &Image::ones((n, n)),
            &Mask::from_elem((n, n), false),
            &PsfDescriptor::Default,
            0,
            "r",
            0.5,
        )
    }

    #[test]
    fn masked_pixels_have_zero_invvar() {
        let mut mask = Mask::from_elem((4, 4), false);
        mask[[1, 2]] = true;
        let image = FitImage::new(
            Image::zeros((4, 4)),
            &Image::from_elem((4, 4), 2.0),
            &mask,
            &PsfDescriptor::Default,
            0,
            "r",
            0.0,
        );
        assert_eq!(image.invvar[[1, 2]], 0.0);
        assert_eq!(image.invvar[[0, 0]], 2.0);
    }

    #[test]
    fn model_image_adds_sky_and_flux() {
        let image = flat_image(41);
        let model = SourceModel::point_source(PixPos::new(20.0, 20.0), Fluxes::uniform(100.0, 1));
        let rendered = model_image(&image, &[model]);
        assert_abs_diff_eq!(rendered.sum(), 100.0 + 0.5 * 41.0 * 41.0, epsilon = 1e-3);
    }

    #[test]
    fn chi_is_zero_for_perfect_model() {
        let mut image = flat_image(31);
        let model = SourceModel::point_source(PixPos::new(15.3, 14.8), Fluxes::uniform(10.0, 1));
        image.data = model_image(&image, std::slice::from_ref(&model));
        let chi = chi_image(&image, &[model]);
        assert_abs_diff_eq!(chi.mapv(f64::abs).sum(), 0.0, epsilon = 1e-12);
    }
}
