//! Catalog records of the fitted models

use crate::cascade::CascadeSolution;
use crate::data::{Blob, Catalog};
use crate::error::CatalogError;
use crate::forced::ForcedSolution;
use crate::model::{ModelFamily, ModelTrait};
use crate::types::{BlobId, SourceId};
use crate::wcs::SkyTransform;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Forced photometry of a source in a single band
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BandMeasurement {
    pub band: String,
    pub flux: f64,
    pub flux_err: f64,
    pub chisq: f64,
}

/// Shape of an extended source with standard errors, position angle in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeMeasurement {
    pub re: f64,
    pub re_err: f64,
    pub ab: f64,
    pub ab_err: f64,
    pub phi: f64,
    pub phi_err: f64,
}

/// Fit results of a single source, positions in brick pixels
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitRecord {
    pub sid: SourceId,
    pub blob_id: BlobId,
    pub solmodel: ModelFamily,
    pub bands: Vec<BandMeasurement>,
    pub x_model: f64,
    pub y_model: f64,
    pub x_model_err: f64,
    pub y_model_err: f64,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    /// Chi-square of the winning trial
    pub solved_chisq: f64,
    /// Chi-square after the final joint optimization
    pub final_chisq: f64,
    /// Only for extended families
    pub shape: Option<ShapeMeasurement>,
}

impl FitRecord {
    pub fn band(&self, name: &str) -> Option<&BandMeasurement> {
        self.bands.iter().find(|m| m.band == name)
    }
}

/// One record per source of `blob`
///
/// Every source must have a row in `catalog`.
pub fn project(
    blob: &Blob,
    solution: &CascadeSolution,
    forced: &ForcedSolution,
    catalog: &Catalog,
    sky: Option<&dyn SkyTransform>,
) -> Result<Vec<FitRecord>, CatalogError> {
    solution
        .sources
        .iter()
        .zip(forced.models.iter())
        .enumerate()
        .map(|(i, (solved, model))| {
            catalog.row_index(blob.id, solved.sid)?;

            let pos = blob.to_parent(model.position());
            let [x_err, y_err] = solved.position_error();
            let (ra, dec) = match sky {
                Some(sky) => {
                    let (ra, dec) = sky.pixel_to_world(pos.x, pos.y);
                    (Some(ra), Some(dec))
                }
                None => (None, None),
            };
            let bands = forced
                .bands
                .iter()
                .enumerate()
                .map(|(j, band)| BandMeasurement {
                    band: band.clone(),
                    flux: forced.flux(i, j),
                    flux_err: forced.flux_err(i, j),
                    chisq: forced.chisq[[i, j]],
                })
                .collect();
            let shape = match (model.shape(), solved.shape_error()) {
                (Some(shape), Some([re_err, ab_err, phi_err])) => Some(ShapeMeasurement {
                    re: shape.re,
                    re_err,
                    ab: shape.ab,
                    ab_err,
                    phi: shape.phi,
                    phi_err,
                }),
                _ => None,
            };

            Ok(FitRecord {
                sid: solved.sid,
                blob_id: blob.id,
                solmodel: solved.family(),
                bands,
                x_model: pos.x,
                y_model: pos.y,
                x_model_err: x_err,
                y_model_err: y_err,
                ra,
                dec,
                solved_chisq: solved.solution.chisq,
                final_chisq: solved.final_chisq,
                shape,
            })
        })
        .collect()
}
