//! Optimization engines
//!
//! An engine advances all free parameters of a set of models by a single optimizer iteration,
//! fitting them jointly to one image per band. Iterating until convergence is the job of
//! [crate::OptimizationDriver].

mod lm;
pub use lm::LmEngine;

use crate::error::EngineError;
use crate::model::SourceModel;
use crate::render::{self, FitImage};
use crate::types::Image;

/// Outcome of a single optimizer iteration
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizeStep {
    /// Improvement of the log-likelihood, `(chi2_before - chi2_after) / 2`
    pub dlnp: f64,
    /// Variance of every free parameter, model after model in the order of
    /// [crate::ModelTrait::free_params]
    pub variance: Vec<f64>,
}

pub trait FitEngine: Sync {
    fn optimize_step(
        &self,
        images: &[FitImage],
        models: &mut [SourceModel],
    ) -> Result<OptimizeStep, EngineError>;

    fn model_image(&self, image: &FitImage, models: &[SourceModel]) -> Image {
        render::model_image(image, models)
    }

    fn chi_image(&self, image: &FitImage, models: &[SourceModel]) -> Image {
        render::chi_image(image, models)
    }
}

impl<E: FitEngine + ?Sized> FitEngine for &E {
    fn optimize_step(
        &self,
        images: &[FitImage],
        models: &mut [SourceModel],
    ) -> Result<OptimizeStep, EngineError> {
        (**self).optimize_step(images, models)
    }

    fn model_image(&self, image: &FitImage, models: &[SourceModel]) -> Image {
        (**self).model_image(image, models)
    }

    fn chi_image(&self, image: &FitImage, models: &[SourceModel]) -> Image {
        (**self).chi_image(image, models)
    }
}
