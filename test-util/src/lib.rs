//! Synthetic multi-band fields of Gaussian stars with their detection products

use blob_fit::ndarray::Array2;
use lazy_static::lazy_static;
use rand::prelude::*;
use rand_distr::StandardNormal;

/// Width of the rendered stars, matches the default PSF
pub const STAR_SIGMA: f64 = 2.0;

/// Pixels closer than this to a star are in its segment
pub const SEGMENT_RADIUS: f64 = 6.0;

#[derive(Clone, Debug)]
pub struct SyntheticSource {
    pub sid: u64,
    pub blob_id: u32,
    /// Column
    pub x: f64,
    /// Row
    pub y: f64,
    /// One flux per band
    pub flux: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct SyntheticField {
    pub bands: Vec<String>,
    /// One image per band
    pub images: Vec<Array2<f64>>,
    /// Inverse variance shared by every band
    pub weight: Array2<f64>,
    pub segmap: Array2<u64>,
    pub blobmap: Array2<u32>,
    pub sources: Vec<SyntheticSource>,
}

impl SyntheticField {
    /// Render `sources` on a `(rows, columns)` grid with Gaussian noise of `noise_sigma`
    ///
    /// Zero noise gives unit weights. Each pixel within `SEGMENT_RADIUS` of a source belongs to
    /// the nearest one and to its blob.
    pub fn new(
        dim: (usize, usize),
        bands: &[&str],
        sources: Vec<SyntheticSource>,
        noise_sigma: f64,
        seed: u64,
    ) -> Self {
        for source in sources.iter() {
            assert_eq!(source.flux.len(), bands.len(), "one flux per band is required");
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let norm = 1.0 / (2.0 * std::f64::consts::PI * STAR_SIGMA * STAR_SIGMA);
        let images = (0..bands.len())
            .map(|band| {
                Array2::from_shape_fn(dim, |(row, col)| {
                    let signal: f64 = sources
                        .iter()
                        .map(|s| {
                            let r2 = (col as f64 - s.x).powi(2) + (row as f64 - s.y).powi(2);
                            s.flux[band] * norm * f64::exp(-0.5 * r2 / (STAR_SIGMA * STAR_SIGMA))
                        })
                        .sum();
                    let noise: f64 = rng.sample(StandardNormal);
                    signal + noise_sigma * noise
                })
            })
            .collect();
        let weight = if noise_sigma > 0.0 {
            Array2::from_elem(dim, 1.0 / (noise_sigma * noise_sigma))
        } else {
            Array2::ones(dim)
        };

        let owner = Array2::from_shape_fn(dim, |(row, col)| {
            sources
                .iter()
                .map(|s| {
                    let r2 = (col as f64 - s.x).powi(2) + (row as f64 - s.y).powi(2);
                    (r2, s)
                })
                .filter(|(r2, _)| *r2 <= SEGMENT_RADIUS * SEGMENT_RADIUS)
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, s)| (s.sid, s.blob_id))
        });
        let segmap = owner.mapv(|o| o.map_or(0, |(sid, _)| sid));
        let blobmap = owner.mapv(|o| o.map_or(0, |(_, blob_id)| blob_id));

        Self {
            bands: bands.iter().map(|&b| b.to_owned()).collect(),
            images,
            weight,
            segmap,
            blobmap,
            sources,
        }
    }
}

lazy_static! {
    /// 48x64 two-band field: a blend of two stars in blob 1 and an isolated star in blob 2
    pub static ref STAR_FIELD: SyntheticField = SyntheticField::new(
        (48, 64),
        &["g", "r"],
        vec![
            SyntheticSource {
                sid: 1,
                blob_id: 1,
                x: 14.0,
                y: 20.0,
                flux: vec![4000.0, 6000.0],
            },
            SyntheticSource {
                sid: 2,
                blob_id: 1,
                x: 23.5,
                y: 24.0,
                flux: vec![3000.0, 2000.0],
            },
            SyntheticSource {
                sid: 3,
                blob_id: 2,
                x: 48.0,
                y: 30.0,
                flux: vec![5000.0, 5000.0],
            },
        ],
        2.0,
        0,
    );
}
