use crate::error::BlobError;
use crate::render::PsfDescriptor;
use crate::types::{Image, Mask};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Global background statistics of a band, estimated upstream
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundStats {
    /// Background level
    pub level: f64,
    /// Background rms
    pub rms: f64,
}

/// Single-band image of a brick with everything needed to fit it
#[derive(Clone, Debug)]
pub struct BandImage {
    pub name: String,
    pub image: Image,
    /// Inverse variance
    pub weight: Image,
    /// `true` marks bad pixels
    pub mask: Mask,
    pub psf: PsfDescriptor,
    pub background: Option<BackgroundStats>,
}

impl BandImage {
    /// Band with unit weights, no masked pixels and the default PSF
    pub fn new(name: impl Into<String>, image: Image) -> Self {
        let dim = image.dim();
        Self {
            name: name.into(),
            image,
            weight: Image::ones(dim),
            mask: Mask::from_elem(dim, false),
            psf: PsfDescriptor::Default,
            background: None,
        }
    }

    pub fn with_weight(mut self, weight: Image) -> Self {
        assert_eq!(
            weight.dim(),
            self.image.dim(),
            "image and weight should have the same shape"
        );
        self.weight = weight;
        self
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        assert_eq!(
            mask.dim(),
            self.image.dim(),
            "image and mask should have the same shape"
        );
        self.mask = mask;
        self
    }

    pub fn with_psf(mut self, psf: PsfDescriptor) -> Self {
        self.psf = psf;
        self
    }

    pub fn with_background(mut self, background: BackgroundStats) -> Self {
        self.background = Some(background);
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }

    pub(crate) fn check_shape(&self, expected: (usize, usize)) -> Result<(), BlobError> {
        for (name, actual) in [
            ("image", self.image.dim()),
            ("weight", self.weight.dim()),
            ("mask", self.mask.dim()),
        ] {
            if actual != expected {
                return Err(BlobError::ShapeMismatch {
                    name,
                    actual,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// `true` unless every weight is exactly one, which marks an image without a weight map
pub fn is_weighted(weight: &Image) -> bool {
    weight.iter().any(|&w| w != 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_band_is_unweighted() {
        let band = BandImage::new("r", Image::zeros((3, 4)));
        assert!(!is_weighted(&band.weight));
        assert!(band.mask.iter().all(|&m| !m));
        assert_eq!(band.dim(), (3, 4));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let mut band = BandImage::new("r", Image::zeros((3, 4)));
        band.mask = Mask::from_elem((4, 4), false);
        assert_eq!(
            band.check_shape((3, 4)),
            Err(BlobError::ShapeMismatch {
                name: "mask",
                actual: (4, 4),
                expected: (3, 4)
            })
        );
    }

    #[test]
    #[should_panic]
    fn weight_of_wrong_shape() {
        BandImage::new("r", Image::zeros((3, 4))).with_weight(Image::ones((4, 3)));
    }
}
