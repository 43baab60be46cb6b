use crate::config::FitConfig;
use crate::engine::FitEngine;
use crate::error::FitError;
use crate::model::{ModelTrait, ParamKind, SourceModel};
use crate::render::FitImage;
use crate::types::{BlobId, Image, SegMap, SourceId};

use ndarray::Zip;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage an optimization belongs to, used to report failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Stage {
    /// Model-selection trial at (decision level, sublevel)
    Trial { level: u8, sublevel: u8 },
    FinalOptimization,
    ForcedPhotometry,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trial { level, sublevel } => write!(f, "Morph Model ({level}, {sublevel})"),
            Self::FinalOptimization => write!(f, "Final Optimization"),
            Self::ForcedPhotometry => write!(f, "Forced Photometry"),
        }
    }
}

/// Variances of the free parameters of a single model
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamVariance(Vec<(ParamKind, f64)>);

impl ParamVariance {
    pub fn get(&self, kind: ParamKind) -> Option<f64> {
        self.0.iter().find(|(k, _)| *k == kind).map(|&(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKind, f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ParamKind, f64)> for ParamVariance {
    fn from_iter<I: IntoIterator<Item = (ParamKind, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DriverOutcome {
    /// Number of optimizer iterations made
    pub n_steps: usize,
    /// Log-likelihood improvement of the last iteration
    pub dlnp: f64,
    /// One entry per model, in model order
    pub variances: Vec<ParamVariance>,
}

/// Bounded optimizer loop around a [FitEngine]
///
/// Runs up to `max_steps` iterations and stops as soon as one improves the log-likelihood by
/// less than `convergence_threshold`. Hitting the iteration cap is not an error.
#[derive(Clone, Debug)]
pub struct OptimizationDriver<'a, E: FitEngine + ?Sized> {
    engine: &'a E,
    pub max_steps: usize,
    pub convergence_threshold: f64,
    pub blob_id: BlobId,
}

impl<'a, E: FitEngine + ?Sized> OptimizationDriver<'a, E> {
    pub fn new(engine: &'a E, max_steps: usize, convergence_threshold: f64, blob_id: BlobId) -> Self {
        assert!(max_steps > 0, "max_steps must be positive");
        Self {
            engine,
            max_steps,
            convergence_threshold,
            blob_id,
        }
    }

    pub fn from_config(engine: &'a E, config: &FitConfig, blob_id: BlobId) -> Self {
        Self::new(
            engine,
            config.max_steps,
            config.convergence_threshold,
            blob_id,
        )
    }

    pub fn engine(&self) -> &'a E {
        self.engine
    }

    pub fn optimize(
        &self,
        images: &[FitImage],
        models: &mut [SourceModel],
        stage: Stage,
    ) -> Result<DriverOutcome, FitError> {
        let mut n_steps = 0;
        let mut dlnp = 0.0;
        let mut variance = vec![];
        while n_steps < self.max_steps {
            let step = self
                .engine
                .optimize_step(images, models)
                .map_err(|source| FitError::Optimizer {
                    blob_id: self.blob_id,
                    stage,
                    source,
                })?;
            n_steps += 1;
            dlnp = step.dlnp;
            variance = step.variance;
            if dlnp < self.convergence_threshold {
                break;
            }
        }
        log::debug!(
            "blob {}: {stage} finished after {n_steps} steps, dlnp = {dlnp:.3e}",
            self.blob_id
        );
        Ok(DriverOutcome {
            n_steps,
            dlnp,
            variances: self.partition_variance(models, variance)?,
        })
    }

    fn partition_variance(
        &self,
        models: &[SourceModel],
        variance: Vec<f64>,
    ) -> Result<Vec<ParamVariance>, FitError> {
        let expected: usize = models.iter().map(|m| m.n_free_params()).sum();
        if variance.len() != expected {
            return Err(FitError::VarianceMismatch {
                blob_id: self.blob_id,
                expected,
                actual: variance.len(),
            });
        }
        let mut values = variance.into_iter();
        Ok(models
            .iter()
            .map(|m| m.free_params().into_iter().zip(values.by_ref()).collect())
            .collect())
    }

    /// Chi image of every band
    pub fn chi_images(&self, images: &[FitImage], models: &[SourceModel]) -> Vec<Image> {
        images
            .iter()
            .map(|image| self.engine.chi_image(image, models))
            .collect()
    }
}

/// Sum of chi² over the pixels owned by `sid`
pub fn source_chisq(chi: &Image, segmap: &SegMap, sid: SourceId) -> f64 {
    let mut sum = 0.0;
    Zip::from(chi).and(segmap).for_each(|&c, &owner| {
        if owner == sid {
            sum += c * c;
        }
    });
    sum
}
