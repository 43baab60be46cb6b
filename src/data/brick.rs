use crate::data::{BandImage, Catalog};
use crate::error::BlobError;
use crate::types::{BlobId, BlobMap, SegMap};
use crate::wcs::SkyTransform;

use itertools::Itertools;

/// Multi-band image region with its detection products
#[derive(Debug)]
pub struct Brick {
    pub bands: Vec<BandImage>,
    pub blobmap: BlobMap,
    pub segmap: SegMap,
    pub catalog: Catalog,
    /// Arcsec per pixel
    pub pixel_scale: f64,
    pub sky_transform: Option<Box<dyn SkyTransform>>,
}

impl Brick {
    /// All arrays must have the shape of the blob map
    pub fn new(
        bands: Vec<BandImage>,
        blobmap: BlobMap,
        segmap: SegMap,
        catalog: Catalog,
        pixel_scale: f64,
    ) -> Result<Self, BlobError> {
        assert!(
            pixel_scale.is_finite() && pixel_scale > 0.0,
            "pixel_scale must be positive"
        );
        let dim = blobmap.dim();
        if segmap.dim() != dim {
            return Err(BlobError::ShapeMismatch {
                name: "segmap",
                actual: segmap.dim(),
                expected: dim,
            });
        }
        for band in bands.iter() {
            band.check_shape(dim)?;
        }
        Ok(Self {
            bands,
            blobmap,
            segmap,
            catalog,
            pixel_scale,
            sky_transform: None,
        })
    }

    pub fn with_sky_transform(mut self, transform: impl SkyTransform + 'static) -> Self {
        self.sky_transform = Some(Box::new(transform));
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.blobmap.dim()
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|band| band.name.as_str()).collect()
    }

    /// Distinct non-zero blob ids in increasing order
    pub fn blob_ids(&self) -> Vec<BlobId> {
        self.blobmap
            .iter()
            .copied()
            .filter(|&id| id != 0)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Image;

    #[test]
    fn blob_ids_are_sorted_and_unique() {
        let mut blobmap = BlobMap::zeros((4, 4));
        blobmap[[0, 0]] = 3;
        blobmap[[3, 3]] = 1;
        blobmap[[2, 1]] = 3;
        let brick = Brick::new(
            vec![],
            blobmap,
            SegMap::zeros((4, 4)),
            Catalog::default(),
            0.15,
        )
        .unwrap();
        assert_eq!(brick.blob_ids(), [1, 3]);
    }

    #[test]
    fn band_shape_is_checked() {
        let err = Brick::new(
            vec![BandImage::new("r", Image::zeros((3, 4)))],
            BlobMap::zeros((4, 4)),
            SegMap::zeros((4, 4)),
            Catalog::default(),
            0.15,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BlobError::ShapeMismatch {
                name: "image",
                actual: (3, 4),
                expected: (4, 4)
            }
        );
    }
}
