use crate::engine::{FitEngine, OptimizeStep};
use crate::error::EngineError;
use crate::model::{ModelTrait, ParamKind, SourceModel};
use crate::render::{self, FitImage};
use crate::types::Image;

use nalgebra::{DMatrix, DVector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Damped least-squares (Levenberg-Marquardt) engine
///
/// Every call to [FitEngine::optimize_step] linearizes the models around the current
/// parameters with central finite differences, solves the damped normal equations
/// `(JᵀJ + λ diag(JᵀJ)) δ = Jᵀr` and accepts the first step that does not increase
/// chi-square, raising `λ` by `lambda_factor` after each rejected step. Variances are the
/// diagonal of `(JᵀJ)⁻¹`, or `1 / diag(JᵀJ)` when the system is singular.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "LevenbergMarquardt")]
pub struct LmEngine {
    pub initial_lambda: f64,
    pub lambda_factor: f64,
    pub max_lambda_tries: usize,
}

impl LmEngine {
    /// Create a new [LmEngine]
    ///
    /// # Arguments
    /// - `initial_lambda`: damping of the first trial step
    /// - `lambda_factor`: damping multiplier applied after a rejected step, must exceed 1
    /// - `max_lambda_tries`: number of trial steps before the iteration is declared stalled
    pub fn new(initial_lambda: f64, lambda_factor: f64, max_lambda_tries: usize) -> Self {
        assert!(
            initial_lambda.is_finite() && initial_lambda > 0.0,
            "initial_lambda must be positive"
        );
        assert!(
            lambda_factor.is_finite() && lambda_factor > 1.0,
            "lambda_factor must be greater than unity"
        );
        assert!(max_lambda_tries > 0, "max_lambda_tries must be positive");
        Self {
            initial_lambda,
            lambda_factor,
            max_lambda_tries,
        }
    }

    #[inline]
    pub fn default_initial_lambda() -> f64 {
        1e-3
    }

    #[inline]
    pub fn default_lambda_factor() -> f64 {
        10.0
    }

    #[inline]
    pub fn default_max_lambda_tries() -> usize {
        10
    }
}

impl Default for LmEngine {
    fn default() -> Self {
        Self::new(
            Self::default_initial_lambda(),
            Self::default_lambda_factor(),
            Self::default_max_lambda_tries(),
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct FreeParam {
    model: usize,
    kind: ParamKind,
}

fn collect_free_params(models: &[SourceModel]) -> Vec<FreeParam> {
    models
        .iter()
        .enumerate()
        .flat_map(|(model, m)| {
            m.free_params()
                .into_iter()
                .map(move |kind| FreeParam { model, kind })
        })
        .collect()
}

fn n_pixels(images: &[FitImage]) -> usize {
    images.iter().map(|image| image.data.len()).sum()
}

fn weighted_residuals(images: &[FitImage], models: &[SourceModel]) -> DVector<f64> {
    let values = images.iter().flat_map(|image| {
        let model = render::model_image(image, models);
        image
            .data
            .iter()
            .zip(image.invvar.iter())
            .zip(model.iter())
            .map(|((&d, &iv), &m)| (d - m) * iv.sqrt())
            .collect::<Vec<_>>()
    });
    DVector::from_iterator(n_pixels(images), values)
}

fn chi2(images: &[FitImage], models: &[SourceModel]) -> f64 {
    images
        .iter()
        .map(|image| render::chi_image(image, models).mapv(|chi| chi * chi).sum())
        .sum()
}

/// Derivative of the model of every image with respect to `kind`, `None` where it vanishes
fn derivative(images: &[FitImage], model: &SourceModel, kind: ParamKind) -> Vec<Option<Image>> {
    if let ParamKind::Flux(band) = kind {
        return images
            .iter()
            .map(|image| {
                (image.band_index == band).then(|| {
                    let mut unit = Image::zeros(image.dim());
                    model.mixture(&image.psf).render_add(1.0, unit.view_mut());
                    unit
                })
            })
            .collect();
    }

    let value = model.get_param(kind);
    let h = kind.derivative_step(value);
    let mut hi = model.clone();
    hi.set_param(kind, value + h);
    let mut lo = model.clone();
    lo.set_param(kind, value - h);
    // Position angle wraps around, the rendered model doesn't
    let dv = match kind {
        ParamKind::Phi => 2.0 * h,
        _ => hi.get_param(kind) - lo.get_param(kind),
    };
    if dv == 0.0 {
        return vec![None; images.len()];
    }
    images
        .iter()
        .map(|image| {
            let plus = render::source_image(image, &hi);
            let minus = render::source_image(image, &lo);
            Some((plus - minus) / dv)
        })
        .collect()
}

fn jacobian(images: &[FitImage], models: &[SourceModel], params: &[FreeParam]) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(n_pixels(images), params.len());
    for (j, param) in params.iter().enumerate() {
        let mut column = jac.column_mut(j);
        let mut offset = 0;
        for (image, d_model) in images
            .iter()
            .zip(derivative(images, &models[param.model], param.kind))
        {
            if let Some(d_model) = d_model {
                for (k, (&dm, &iv)) in d_model.iter().zip(image.invvar.iter()).enumerate() {
                    column[offset + k] = dm * iv.sqrt();
                }
            }
            offset += image.data.len();
        }
    }
    jac
}

fn set_params(models: &mut [SourceModel], params: &[FreeParam], values: impl Iterator<Item = f64>) {
    for (param, value) in params.iter().zip(values) {
        models[param.model].set_param(param.kind, value);
    }
}

fn variances(alpha: &DMatrix<f64>) -> Vec<f64> {
    match alpha.clone().cholesky() {
        Some(chol) => chol.inverse().diagonal().iter().copied().collect(),
        None => alpha
            .diagonal()
            .iter()
            .map(|&d| if d > 0.0 { d.recip() } else { f64::INFINITY })
            .collect(),
    }
}

impl FitEngine for LmEngine {
    fn optimize_step(
        &self,
        images: &[FitImage],
        models: &mut [SourceModel],
    ) -> Result<OptimizeStep, EngineError> {
        let params = collect_free_params(models);
        if params.is_empty() {
            return Err(EngineError::NoFreeParameters);
        }

        let residuals = weighted_residuals(images, models);
        let chi2_before = residuals.norm_squared();
        if !chi2_before.is_finite() {
            return Err(EngineError::NonFinite("chi-square"));
        }
        let jac = jacobian(images, models, &params);
        if jac.iter().any(|x| !x.is_finite()) {
            return Err(EngineError::NonFinite("Jacobian"));
        }
        let alpha = jac.tr_mul(&jac);
        let beta = jac.tr_mul(&residuals);

        let max_diag = alpha.diagonal().iter().fold(0.0_f64, |acc, &d| acc.max(d));
        let diag_floor = f64::max(max_diag * 1e-12, f64::MIN_POSITIVE);
        let start: Vec<f64> = params
            .iter()
            .map(|p| models[p.model].get_param(p.kind))
            .collect();

        let mut lambda = self.initial_lambda;
        let mut factorized = false;
        let mut dlnp = 0.0;
        for _ in 0..self.max_lambda_tries {
            let mut damped = alpha.clone();
            for i in 0..params.len() {
                damped[(i, i)] += lambda * alpha[(i, i)].max(diag_floor);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= self.lambda_factor;
                continue;
            };
            factorized = true;
            let delta = chol.solve(&beta);
            set_params(
                models,
                &params,
                start.iter().zip(delta.iter()).map(|(v, d)| v + d),
            );
            let chi2_after = chi2(images, models);
            if chi2_after.is_finite() && chi2_after <= chi2_before {
                dlnp = 0.5 * (chi2_before - chi2_after);
                break;
            }
            set_params(models, &params, start.iter().copied());
            lambda *= self.lambda_factor;
        }
        if !factorized {
            return Err(EngineError::SingularSystem);
        }

        Ok(OptimizeStep {
            dlnp,
            variance: variances(&alpha),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fluxes, GalaxyShape, ModelFamily, PixPos};
    use crate::render::PsfDescriptor;
    use crate::types::Mask;

    use approx::assert_relative_eq;

    fn synthetic_image(n: usize, truth: &[SourceModel], band_index: usize) -> FitImage {
        let mut image = FitImage::new(
            Image::zeros((n, n)),
            &Image::ones((n, n)),
            &Mask::from_elem((n, n), false),
            &PsfDescriptor::Default,
            band_index,
            format!("band{band_index}"),
            0.0,
        );
        image.data = render::model_image(&image, truth);
        image
    }

    fn iterate(engine: &LmEngine, images: &[FitImage], models: &mut [SourceModel]) {
        for _ in 0..50 {
            let step = engine.optimize_step(images, models).unwrap();
            assert!(step.dlnp >= 0.0);
            if step.dlnp < 1e-10 {
                break;
            }
        }
    }

    #[test]
    fn point_source_is_recovered() {
        let truth = SourceModel::point_source(PixPos::new(20.3, 19.6), Fluxes::uniform(500.0, 1));
        let images = [synthetic_image(41, std::slice::from_ref(&truth), 0)];
        let mut models = [SourceModel::point_source(
            PixPos::new(20.0, 20.0),
            Fluxes::uniform(300.0, 1),
        )];
        iterate(&LmEngine::default(), &images, &mut models);
        let fit = models[0].position();
        assert_relative_eq!(fit.x, 20.3, max_relative = 1e-5);
        assert_relative_eq!(fit.y, 19.6, max_relative = 1e-5);
        assert_relative_eq!(models[0].fluxes().first(), 500.0, max_relative = 1e-5);
    }

    #[test]
    fn flux_only_fit_in_two_bands() {
        let shape = GalaxyShape::new(3.0, 0.6, 30.0);
        let pos = PixPos::new(25.0, 24.0);
        let truth = SourceModel::new(
            ModelFamily::ExpGalaxy,
            pos,
            Fluxes::new(vec![1000.0, 250.0]),
            shape,
        );
        let images = [
            synthetic_image(51, std::slice::from_ref(&truth), 0),
            synthetic_image(51, std::slice::from_ref(&truth), 1),
        ];
        let mut model = SourceModel::new(ModelFamily::ExpGalaxy, pos, Fluxes::uniform(1.0, 2), shape);
        model.freeze_all_but_flux();
        let mut models = [model];
        iterate(&LmEngine::default(), &images, &mut models);
        assert_relative_eq!(models[0].fluxes().get(0), 1000.0, max_relative = 1e-6);
        assert_relative_eq!(models[0].fluxes().get(1), 250.0, max_relative = 1e-6);
        assert_eq!(models[0].shape(), Some(shape));
    }

    #[test]
    fn variance_per_free_parameter() {
        let truth = SourceModel::point_source(PixPos::new(15.0, 15.0), Fluxes::uniform(100.0, 1));
        let images = [synthetic_image(31, std::slice::from_ref(&truth), 0)];
        let mut models = [
            truth.clone(),
            SourceModel::new(
                ModelFamily::DevGalaxy,
                PixPos::new(5.0, 6.0),
                Fluxes::uniform(10.0, 1),
                GalaxyShape::new(1.5, 0.8, 10.0),
            ),
        ];
        let step = LmEngine::default()
            .optimize_step(&images, &mut models)
            .unwrap();
        let expected = models.iter().map(|m| m.n_free_params()).sum::<usize>();
        assert_eq!(step.variance.len(), expected);
        assert!(step.variance.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn no_free_parameters() {
        let images = [synthetic_image(11, &[], 0)];
        assert_eq!(
            LmEngine::default().optimize_step(&images, &mut []),
            Err(EngineError::NoFreeParameters)
        );
    }

    #[test]
    fn non_finite_data() {
        let mut image = synthetic_image(11, &[], 0);
        image.data[[3, 3]] = f64::NAN;
        let mut models = [SourceModel::point_source(
            PixPos::new(5.0, 5.0),
            Fluxes::uniform(1.0, 1),
        )];
        assert_eq!(
            LmEngine::default().optimize_step(&[image], &mut models),
            Err(EngineError::NonFinite("chi-square"))
        );
    }

    #[test]
    #[should_panic]
    fn lambda_factor_must_exceed_one() {
        LmEngine::new(1e-3, 1.0, 10);
    }
}
