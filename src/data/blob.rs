use crate::config::FitConfig;
use crate::data::{BackgroundStats, Brick};
use crate::error::{BlobError, PhotometryError};
use crate::model::PixPos;
use crate::render::{FitImage, PsfDescriptor};
use crate::types::{BlobId, Image, Mask, SegMap, SourceId};

use itertools::Itertools;
use ndarray::{Zip, s};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Catalog seeds of a source in the cutout frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceSeed {
    pub sid: SourceId,
    pub x: f64,
    pub y: f64,
    pub flux: f64,
    pub a: f64,
    pub b: f64,
    /// Position angle, radians
    pub theta: f64,
}

/// Cutout of a single band
#[derive(Clone, Debug)]
pub struct BlobBand {
    pub name: String,
    pub image: Image,
    pub weight: Image,
    /// Bad pixels and pixels outside of the blob
    pub mask: Mask,
    /// Bad pixels of the band alone
    pub bad_pixels: Mask,
    pub psf: PsfDescriptor,
    pub background: Option<BackgroundStats>,
}

/// Group of blended sources cut out of a [Brick]
#[derive(Clone, Debug)]
pub struct Blob {
    pub id: BlobId,
    /// Brick pixel `[row, column]` of the cutout pixel `[0, 0]`
    pub origin: (usize, usize),
    pub bands: Vec<BlobBand>,
    pub segmap: SegMap,
    /// `true` inside the blob
    pub footprint: Mask,
    /// One seed per source, in parent catalog order
    pub seeds: Vec<SourceSeed>,
    /// Arcsec per pixel
    pub pixel_scale: f64,
}

impl Blob {
    /// Cut blob `blob_id` out of `brick`
    ///
    /// The cutout is the bounding box of the blob grown by `blob_buffer` pixels. Pixels of other
    /// blobs and of the background are masked in every band. Fails for a blob that is absent
    /// from the blob map, one covering more than `sparse_thresh` of a blob map larger than
    /// `sparse_size` pixels, and for segments without a catalog row.
    pub fn extract(brick: &Brick, blob_id: BlobId, config: &FitConfig) -> Result<Self, BlobError> {
        let in_blob = brick.blobmap.mapv(|id| id == blob_id);
        let n_pixels = in_blob.iter().filter(|&&inside| inside).count();
        if n_pixels == 0 {
            return Err(BlobError::EmptyBlob { blob_id });
        }
        let size = brick.blobmap.len();
        let fraction = n_pixels as f64 / size as f64;
        if fraction > config.sparse_thresh && size > config.sparse_size {
            return Err(BlobError::DegenerateBlob {
                blob_id,
                fraction,
                size,
            });
        }

        let (rows, cols) = bounding_box(&in_blob, config.blob_buffer);
        let footprint = in_blob.slice(s![rows.0..rows.1, cols.0..cols.1]).to_owned();
        let cut = |a: &Image| a.slice(s![rows.0..rows.1, cols.0..cols.1]).to_owned();
        let bands = brick
            .bands
            .iter()
            .map(|band| {
                let bad_pixels = band.mask.slice(s![rows.0..rows.1, cols.0..cols.1]).to_owned();
                BlobBand {
                    name: band.name.clone(),
                    image: cut(&band.image),
                    weight: cut(&band.weight),
                    mask: Zip::from(&bad_pixels)
                        .and(&footprint)
                        .map_collect(|&bad, &inside| bad || !inside),
                    bad_pixels,
                    psf: band.psf.clone(),
                    background: band.background,
                }
            })
            .collect();
        let segmap = brick
            .segmap
            .slice(s![rows.0..rows.1, cols.0..cols.1])
            .to_owned();

        let mut sids = BTreeSet::new();
        Zip::from(&segmap).and(&footprint).for_each(|&sid, &inside| {
            if inside && sid != 0 {
                sids.insert(sid);
            }
        });
        if let Some(&sid) = sids.iter().find(|&&sid| !brick.catalog.contains(sid)) {
            return Err(BlobError::SegmentWithoutSource { blob_id, sid });
        }
        if sids.is_empty() {
            return Err(BlobError::NoSources { blob_id });
        }
        let seeds = brick
            .catalog
            .rows()
            .iter()
            .filter(|row| sids.contains(&row.sid))
            .map(|row| SourceSeed {
                sid: row.sid,
                x: row.x - cols.0 as f64,
                y: row.y - rows.0 as f64,
                flux: row.flux,
                a: row.a,
                b: row.b,
                theta: row.theta,
            })
            .collect();

        Ok(Self {
            id: blob_id,
            origin: (rows.0, cols.0),
            bands,
            segmap,
            footprint,
            seeds,
            pixel_scale: brick.pixel_scale,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.segmap.dim()
    }

    pub fn n_sources(&self) -> usize {
        self.seeds.len()
    }

    pub fn sids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.seeds.iter().map(|seed| seed.sid)
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|band| band.name == name)
    }

    pub fn band(&self, name: &str) -> Result<&BlobBand, PhotometryError> {
        self.band_index(name)
            .map(|i| &self.bands[i])
            .ok_or_else(|| PhotometryError::UnknownBand(name.to_owned()))
    }

    /// Renderable images of all bands, in band order
    pub fn fit_images(&self) -> Vec<FitImage> {
        self.bands
            .iter()
            .enumerate()
            .map(|(i, band)| fit_image(band, i))
            .collect()
    }

    /// Renderable images of the named bands, band indices follow the order of `names`
    pub fn fit_images_for<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<FitImage>, PhotometryError> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Ok(fit_image(self.band(name.as_ref())?, i)))
            .collect()
    }

    /// Position in the brick frame
    pub fn to_parent(&self, pos: PixPos) -> PixPos {
        PixPos::new(pos.x + self.origin.1 as f64, pos.y + self.origin.0 as f64)
    }
}

fn fit_image(band: &BlobBand, band_index: usize) -> FitImage {
    FitImage::new(
        band.image.clone(),
        &band.weight,
        &band.mask,
        &band.psf,
        band_index,
        band.name.clone(),
        0.0,
    )
}

/// Half-open row and column ranges of the `true` pixels grown by `buffer`, clamped to the array
fn bounding_box(mask: &Mask, buffer: usize) -> ((usize, usize), (usize, usize)) {
    let (nrows, ncols) = mask.dim();
    let inside = || {
        mask.indexed_iter()
            .filter(|&(_, &inside)| inside)
            .map(|(idx, _)| idx)
    };
    let range = |minmax: Option<(usize, usize)>, size: usize| match minmax {
        Some((lo, hi)) => (lo.saturating_sub(buffer), (hi + 1 + buffer).min(size)),
        None => (0, 0),
    };
    (
        range(inside().map(|(row, _)| row).minmax().into_option(), nrows),
        range(inside().map(|(_, col)| col).minmax().into_option(), ncols),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BandImage, Catalog, SourceRow};
    use crate::types::BlobMap;

    /// 20x20 brick with blob 1 covering rows 4..8 and columns 5..10, blob 2 a single pixel
    fn brick() -> Brick {
        let mut blobmap = BlobMap::zeros((20, 20));
        blobmap.slice_mut(s![4..8, 5..10]).fill(1);
        blobmap[[15, 15]] = 2;
        let mut segmap = SegMap::zeros((20, 20));
        segmap.slice_mut(s![4..8, 5..7]).fill(11);
        segmap.slice_mut(s![4..8, 7..10]).fill(12);
        segmap[[15, 15]] = 13;
        let catalog = Catalog::new(vec![
            SourceRow::new(13, 15.0, 15.0, 1.0, 1.0, 1.0, 0.0),
            SourceRow::new(12, 8.0, 6.0, 2.0, 2.0, 1.0, 0.5),
            SourceRow::new(11, 5.5, 5.0, 3.0, 1.0, 1.0, 0.0),
        ]);
        let image = Image::from_shape_fn((20, 20), |(row, col)| (row * 20 + col) as f64);
        Brick::new(
            vec![BandImage::new("r", image)],
            blobmap,
            segmap,
            catalog,
            0.15,
        )
        .unwrap()
    }

    fn config() -> FitConfig {
        FitConfig {
            blob_buffer: 2,
            ..FitConfig::default()
        }
    }

    #[test]
    fn cutout_is_grown_bounding_box() {
        let blob = Blob::extract(&brick(), 1, &config()).unwrap();
        assert_eq!(blob.origin, (2, 3));
        assert_eq!(blob.dim(), (8, 9));
        assert_eq!(blob.bands[0].image[[0, 0]], (2 * 20 + 3) as f64);
        assert!(blob.bands[0].mask[[0, 0]]);
        assert!(!blob.bands[0].mask[[2, 2]]);
    }

    #[test]
    fn catalog_slice_matches_segments() {
        let blob = Blob::extract(&brick(), 1, &config()).unwrap();
        assert_eq!(blob.sids().collect::<Vec<_>>(), [12, 11]);
        let seed = blob.seeds[0];
        assert_eq!((seed.x, seed.y), (5.0, 4.0));
        assert_eq!(blob.to_parent(PixPos::new(seed.x, seed.y)), PixPos::new(8.0, 6.0));
    }

    #[test]
    fn buffer_is_clamped_to_brick() {
        let blob = Blob::extract(&brick(), 2, &FitConfig::default()).unwrap();
        assert_eq!(blob.origin, (10, 10));
        assert_eq!(blob.dim(), (10, 10));
        assert_eq!(blob.n_sources(), 1);
    }

    #[test]
    fn empty_blob() {
        assert_eq!(
            Blob::extract(&brick(), 5, &config()).unwrap_err(),
            BlobError::EmptyBlob { blob_id: 5 }
        );
    }

    #[test]
    fn blob_without_segments() {
        let mut brick = brick();
        brick.segmap[[15, 15]] = 0;
        assert_eq!(
            Blob::extract(&brick, 2, &config()).unwrap_err(),
            BlobError::NoSources { blob_id: 2 }
        );
    }

    #[test]
    fn degenerate_blob() {
        let config = FitConfig {
            sparse_thresh: 0.01,
            sparse_size: 100,
            ..config()
        };
        assert!(matches!(
            Blob::extract(&brick(), 1, &config),
            Err(BlobError::DegenerateBlob { blob_id: 1, size: 400, .. })
        ));
    }

    #[test]
    fn segment_without_source() {
        let mut brick = brick();
        brick.segmap[[5, 5]] = 99;
        assert_eq!(
            Blob::extract(&brick, 1, &config()).unwrap_err(),
            BlobError::SegmentWithoutSource {
                blob_id: 1,
                sid: 99
            }
        );
    }

    #[test]
    fn unknown_band() {
        let blob = Blob::extract(&brick(), 1, &config()).unwrap();
        assert_eq!(
            blob.fit_images_for(&["r", "g"]).unwrap_err(),
            PhotometryError::UnknownBand("g".into())
        );
        assert_eq!(blob.fit_images_for(&["r"]).unwrap().len(), 1);
    }
}
