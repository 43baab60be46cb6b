//! Forced photometry: flux-only refit of the solved morphology

use crate::driver::{OptimizationDriver, Stage, source_chisq};
use crate::engine::FitEngine;
use crate::error::FitError;
use crate::model::{Fluxes, ModelTrait, ParamKind, SourceModel};
use crate::render::FitImage;
use crate::types::{SegMap, SourceId};

use ndarray::Array2;

/// Band-resolved fluxes of the solved models
#[derive(Clone, Debug, PartialEq)]
pub struct ForcedSolution {
    /// Band names, in the order of the flux vectors
    pub bands: Vec<String>,
    /// Solved models with fitted per-band fluxes
    pub models: Vec<SourceModel>,
    /// Chi-square of each source (rows) in each band (columns) over the pixels it owns
    pub chisq: Array2<f64>,
    /// Flux variance of each source (rows) in each band (columns)
    pub flux_variance: Array2<f64>,
}

impl ForcedSolution {
    pub fn flux(&self, source: usize, band: usize) -> f64 {
        self.models[source].fluxes().get(band)
    }

    pub fn flux_err(&self, source: usize, band: usize) -> f64 {
        self.flux_variance[[source, band]].sqrt()
    }
}

pub struct ForcedPhotometry<'d, 'e, E: FitEngine + ?Sized> {
    driver: &'d OptimizationDriver<'e, E>,
}

impl<'d, 'e, E: FitEngine + ?Sized> ForcedPhotometry<'d, 'e, E> {
    pub fn new(driver: &'d OptimizationDriver<'e, E>) -> Self {
        Self { driver }
    }

    /// Fit fluxes of `models` jointly in every band of `images`, everything else frozen
    ///
    /// Fluxes start from the first-band flux of each model replicated over the bands, so the
    /// result doesn't depend on the fluxes a previous run left in the models.
    pub fn run(
        &self,
        images: &[FitImage],
        segmap: &SegMap,
        sids: &[SourceId],
        models: &[SourceModel],
    ) -> Result<ForcedSolution, FitError> {
        assert_eq!(sids.len(), models.len(), "one source id per model is required");
        let n_bands = images.len();
        let mut models: Vec<SourceModel> = models
            .iter()
            .map(|model| {
                let flux = Fluxes::uniform(model.fluxes().first(), n_bands);
                let mut model = model.clone().with_fluxes(flux);
                model.freeze_all_but_flux();
                model
            })
            .collect();

        let outcome = self
            .driver
            .optimize(images, &mut models, Stage::ForcedPhotometry)?;
        let chi = self.driver.chi_images(images, &models);

        let shape = (models.len(), n_bands);
        let chisq = Array2::from_shape_fn(shape, |(i, j)| source_chisq(&chi[j], segmap, sids[i]));
        let flux_variance = Array2::from_shape_fn(shape, |(i, j)| {
            outcome.variances[i]
                .get(ParamKind::Flux(images[j].band_index))
                .unwrap_or(f64::NAN)
        });
        log::debug!(
            "blob {}: forced photometry of {} sources in {n_bands} bands",
            self.driver.blob_id,
            models.len()
        );

        Ok(ForcedSolution {
            bands: images.iter().map(|image| image.band.clone()).collect(),
            models,
            chisq,
            flux_variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LmEngine;
    use crate::model::{GalaxyShape, ModelFamily, PixPos};
    use crate::render::{self, PsfDescriptor};
    use crate::types::{Image, Mask};

    use approx::assert_relative_eq;
    use ndarray::s;

    fn truth() -> Vec<SourceModel> {
        vec![
            SourceModel::point_source(PixPos::new(10.0, 12.0), Fluxes::new(vec![300.0, 120.0])),
            SourceModel::new(
                ModelFamily::ExpGalaxy,
                PixPos::new(22.0, 18.0),
                Fluxes::new(vec![800.0, 1000.0]),
                GalaxyShape::new(2.5, 0.5, 60.0),
            ),
        ]
    }

    fn images(truth: &[SourceModel]) -> Vec<FitImage> {
        ["g", "r"]
            .into_iter()
            .enumerate()
            .map(|(i, band)| {
                let mut image = FitImage::new(
                    Image::zeros((32, 32)),
                    &Image::from_elem((32, 32), 4.0),
                    &Mask::from_elem((32, 32), false),
                    &PsfDescriptor::Default,
                    i,
                    band,
                    0.0,
                );
                image.data = render::model_image(&image, truth);
                image
            })
            .collect()
    }

    fn segmap() -> SegMap {
        let mut segmap = SegMap::zeros((32, 32));
        segmap.slice_mut(s![.., ..16]).fill(1);
        segmap.slice_mut(s![.., 16..]).fill(2);
        segmap
    }

    /// Solved models as they leave the cascade: right morphology, single-band flux
    fn solved() -> Vec<SourceModel> {
        truth()
            .into_iter()
            .map(|model| {
                let flux = Fluxes::uniform(0.5 * model.fluxes().first(), 1);
                model.with_fluxes(flux)
            })
            .collect()
    }

    #[test]
    fn fluxes_are_recovered_in_every_band() {
        let truth = truth();
        let engine = LmEngine::default();
        let driver = OptimizationDriver::new(&engine, 20, 1e-9, 1);
        let forced = ForcedPhotometry::new(&driver)
            .run(&images(&truth), &segmap(), &[1, 2], &solved())
            .unwrap();
        assert_eq!(forced.bands, ["g", "r"]);
        for (i, model) in truth.iter().enumerate() {
            for band in 0..2 {
                assert_relative_eq!(
                    forced.flux(i, band),
                    model.fluxes().get(band),
                    max_relative = 1e-6
                );
                assert!(forced.flux_err(i, band) > 0.0);
                assert!(forced.chisq[[i, band]] < 1e-6);
            }
            assert_eq!(forced.models[i].position(), model.position());
            assert_eq!(forced.models[i].shape(), model.shape());
        }
    }

    #[test]
    fn idempotent() {
        let truth = truth();
        let images = images(&truth);
        let engine = LmEngine::default();
        let driver = OptimizationDriver::new(&engine, 20, 1e-9, 1);
        let forced = ForcedPhotometry::new(&driver);
        let first = forced.run(&images, &segmap(), &[1, 2], &solved()).unwrap();
        let second = forced.run(&images, &segmap(), &[1, 2], &first.models).unwrap();
        for i in 0..2 {
            for band in 0..2 {
                assert_relative_eq!(
                    first.flux(i, band),
                    second.flux(i, band),
                    max_relative = 1e-8
                );
            }
        }
    }
}
