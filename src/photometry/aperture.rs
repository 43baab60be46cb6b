use crate::error::PhotometryError;
use crate::types::{Image, Mask, SourceId};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Samples per pixel side used to integrate partially covered pixels
pub const SUBPIXELS: usize = 5;

/// Image aperture photometry is measured on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Observed pixels
    Image,
    /// Rendered forced-photometry models
    Model,
    /// Observed minus model
    Residual,
}

impl ImageType {
    pub const ALL: [Self; 3] = [Self::Image, Self::Model, Self::Residual];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Model => "model",
            Self::Residual => "residual",
        }
    }
}

impl FromStr for ImageType {
    type Err = PhotometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "model" => Ok(Self::Model),
            "residual" => Ok(Self::Residual),
            _ => Err(PhotometryError::InvalidImageType(s.to_owned())),
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApertureFlux {
    pub radius_arcsec: f64,
    pub flux: f64,
    pub flux_err: f64,
}

/// Aperture fluxes of every source of a blob in a single band and image type
#[derive(Clone, Debug, PartialEq)]
pub struct AperturePhotometry {
    pub band: String,
    pub image_type: ImageType,
    /// One entry per source, one flux per aperture radius
    pub sources: Vec<(SourceId, Vec<ApertureFlux>)>,
}

impl AperturePhotometry {
    /// Catalog key, spaces of the band name are replaced by underscores
    pub fn key(&self) -> String {
        format!("{}_{}", self.band.replace(' ', "_"), self.image_type)
    }
}

/// Sum of `image` inside a circle and its error
///
/// Partially covered pixels count with the fraction of their `SUBPIXELS × SUBPIXELS` samples
/// inside the circle, masked pixels are skipped. Pixel `[row, col]` is centred at
/// `(x = col, y = row)`.
pub fn aperture_sum(
    image: &Image,
    variance: &Image,
    mask: &Mask,
    center: (f64, f64),
    radius: f64,
) -> (f64, f64) {
    let (x0, y0) = center;
    let (nrows, ncols) = image.dim();
    let lo = |c: f64| (c - radius - 1.0).floor().max(0.0) as usize;
    let hi = |c: f64, size: usize| ((c + radius + 1.0).ceil().max(0.0) as usize + 1).min(size);
    let step = 1.0 / SUBPIXELS as f64;
    let r2 = radius * radius;

    let mut sum = 0.0;
    let mut var = 0.0;
    for row in lo(y0)..hi(y0, nrows) {
        for col in lo(x0)..hi(x0, ncols) {
            if mask[[row, col]] {
                continue;
            }
            let mut inside = 0;
            for i in 0..SUBPIXELS {
                let dy = row as f64 - 0.5 + (i as f64 + 0.5) * step - y0;
                for j in 0..SUBPIXELS {
                    let dx = col as f64 - 0.5 + (j as f64 + 0.5) * step - x0;
                    if dx * dx + dy * dy <= r2 {
                        inside += 1;
                    }
                }
            }
            if inside == 0 {
                continue;
            }
            let fraction = inside as f64 / (SUBPIXELS * SUBPIXELS) as f64;
            sum += fraction * image[[row, col]];
            var += fraction * variance[[row, col]];
        }
    }
    (sum, var.sqrt())
}
