//! Blob-by-blob processing of a brick

use crate::cascade::{Cascade, CascadeSolution};
use crate::config::FitConfig;
use crate::data::{Blob, Brick};
use crate::driver::OptimizationDriver;
use crate::engine::{FitEngine, LmEngine};
use crate::error::{ConfigError, PipelineError};
use crate::forced::{ForcedPhotometry, ForcedSolution};
use crate::photometry::{
    AperturePhotometry, ImageType, ResidualDetection, aperture_photometry, detect_residual_sources,
};
use crate::projection::{FitRecord, project};
use crate::types::BlobId;

use rayon::prelude::*;

/// Everything measured on a single blob, ready to be written into the parent catalog
#[derive(Clone, Debug, PartialEq)]
pub struct BlobReport {
    pub blob_id: BlobId,
    pub solution: CascadeSolution,
    pub forced: ForcedSolution,
    pub records: Vec<FitRecord>,
    pub aperture: Vec<AperturePhotometry>,
    pub residuals: Vec<ResidualDetection>,
}

/// Outcome of [BlobFitter::fit_brick]
#[derive(Debug, Default, PartialEq)]
pub struct BrickSummary {
    /// Blobs written into the catalog
    pub fitted: Vec<BlobId>,
    /// Blobs refused by the extraction
    pub rejected: Vec<(BlobId, PipelineError)>,
    /// Blobs that failed later on
    pub failed: Vec<(BlobId, PipelineError)>,
}

impl BrickSummary {
    pub fn n_blobs(&self) -> usize {
        self.fitted.len() + self.rejected.len() + self.failed.len()
    }
}

/// Fits blobs of a brick with a given engine and configuration
#[derive(Clone, Debug)]
pub struct BlobFitter<E: FitEngine = LmEngine> {
    pub engine: E,
    pub config: FitConfig,
}

impl<E: FitEngine> BlobFitter<E> {
    /// Panics on a configuration rejected by [FitConfig::validate], see [BlobFitter::try_new]
    pub fn new(engine: E, config: FitConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        Self { engine, config }
    }

    pub fn try_new(engine: E, config: FitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    /// Extract, fit, photometer and project a single blob
    ///
    /// The catalog of `brick` is only read, results are returned in the report.
    pub fn fit_blob(&self, brick: &Brick, blob_id: BlobId) -> Result<BlobReport, PipelineError> {
        let config = &self.config;
        let blob = Blob::extract(brick, blob_id, config)?;
        let available = brick.band_names();
        let modeling_bands = FitConfig::select_bands(&config.modeling_bands, &available);
        let forced_bands = FitConfig::select_bands(&config.forced_bands, &available);
        log::debug!(
            "blob {blob_id}: {} sources, cutout {:?} at {:?}",
            blob.n_sources(),
            blob.dim(),
            blob.origin
        );

        let driver = OptimizationDriver::from_config(&self.engine, config, blob_id);
        let modeling_images = blob.fit_images_for(&modeling_bands)?;
        let solution = Cascade::new(&driver, config.exp_dev_thresh).run(
            &modeling_images,
            &blob.segmap,
            &blob.seeds,
        )?;

        let forced_images = blob.fit_images_for(&forced_bands)?;
        let sids: Vec<_> = blob.sids().collect();
        let forced = ForcedPhotometry::new(&driver).run(
            &forced_images,
            &blob.segmap,
            &sids,
            &solution.models(),
        )?;
        let records = project(
            &blob,
            &solution,
            &forced,
            &brick.catalog,
            brick.sky_transform.as_deref(),
        )?;

        let mut aperture = vec![];
        if config.run_aperture_photometry {
            for &band in forced_bands.iter() {
                for image_type in ImageType::ALL {
                    aperture.push(aperture_photometry(
                        &blob,
                        &forced,
                        band,
                        image_type.as_str(),
                        config.sub_background,
                        config,
                    )?);
                }
            }
        }
        let mut residuals = vec![];
        if config.run_residual_detection {
            for &band in forced_bands.iter() {
                residuals.push(detect_residual_sources(
                    &blob,
                    &forced,
                    band,
                    config.sub_background,
                    config,
                )?);
            }
        }

        log::info!(
            "blob {blob_id}: solved {}",
            records
                .iter()
                .map(|record| format!("{}={}", record.sid, record.solmodel))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(BlobReport {
            blob_id,
            solution,
            forced,
            records,
            aperture,
            residuals,
        })
    }

    /// Fit every blob of `brick` in parallel and write the results into its catalog
    ///
    /// Blobs share no state while fitted, the catalog is updated afterwards blob by blob.
    /// Rejected and failed blobs leave their rows untouched.
    pub fn fit_brick(&self, brick: &mut Brick) -> BrickSummary {
        let blob_ids = brick.blob_ids();
        let results: Vec<_> = {
            let brick = &*brick;
            blob_ids
                .par_iter()
                .map(|&blob_id| (blob_id, self.fit_blob(brick, blob_id)))
                .collect()
        };

        let mut summary = BrickSummary::default();
        for (blob_id, result) in results {
            let written = result.and_then(|report| {
                brick
                    .catalog
                    .apply_report(&report)
                    .map_err(PipelineError::from)
            });
            match written {
                Ok(()) => summary.fitted.push(blob_id),
                Err(err @ PipelineError::Blob(_)) => {
                    log::warn!("blob {blob_id} rejected: {err}");
                    summary.rejected.push((blob_id, err));
                }
                Err(err) => {
                    log::warn!("blob {blob_id} failed: {err}");
                    summary.failed.push((blob_id, err));
                }
            }
        }
        log::info!(
            "brick: {} blobs fitted, {} rejected, {} failed",
            summary.fitted.len(),
            summary.rejected.len(),
            summary.failed.len()
        );
        summary
    }
}
