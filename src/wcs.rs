//! Pixel to sky coordinate transforms

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Maps brick pixel coordinates to (RA, Dec) in degrees
pub trait SkyTransform: Debug + Send + Sync {
    fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64);
}

/// Gnomonic (`TAN`) projection with a linear `CD` matrix
///
/// `crpix` is the reference pixel in the zero-based brick frame, `crval` its (RA, Dec) in
/// degrees and `cd` maps pixel offsets to intermediate world coordinates in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TanWcs {
    pub crpix: [f64; 2],
    pub crval: [f64; 2],
    pub cd: [[f64; 2]; 2],
}

impl TanWcs {
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2]) -> Self {
        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        assert!(det.is_finite() && det != 0.0, "CD matrix must be invertible");
        Self { crpix, crval, cd }
    }

    /// North-up, east-left frame with a square pixel of `pixel_scale` arcsec
    pub fn north_up(crpix: [f64; 2], crval: [f64; 2], pixel_scale: f64) -> Self {
        let scale = pixel_scale / 3600.0;
        Self::new(crpix, crval, [[-scale, 0.0], [0.0, scale]])
    }
}

impl SkyTransform for TanWcs {
    fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix[0];
        let dy = y - self.crpix[1];
        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval[0].to_radians();
        let (sin_dec0, cos_dec0) = self.crval[1].to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;
        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2(xi.hypot(denom));

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }
}
