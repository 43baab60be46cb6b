//! Morphological model-selection cascade
//!
//! Sources start as point sources and are promoted to more complex families level by level. At
//! every (level, sublevel) all sources of the blob are staged and fitted jointly, and the
//! chi-square of every unsolved source is recorded in its [TrialTable]. After the last sublevel
//! of a level the decision functions of [decision] either solve a source or promote it. Once
//! every source is solved, the winning models are optimized jointly one last time.

pub mod decision;
pub use decision::{Verdict, decide, decide_level0, decide_level1, decide_level2};

mod state;
pub use state::{DecisionLevel, Solution, SourceState, Trial, TrialCoord, TrialTable};

use crate::data::SourceSeed;
use crate::driver::{OptimizationDriver, ParamVariance, Stage, source_chisq};
use crate::engine::FitEngine;
use crate::error::FitError;
use crate::model::{GalaxyShape, ModelFamily, ModelTrait, ParamKind, PixPos, SourceModel};
use crate::render::FitImage;
use crate::staging::stage_models;
use crate::types::{SegMap, SourceId};

/// Solved source after the final joint optimization
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedSource {
    pub sid: SourceId,
    pub solution: Solution,
    /// Model after the final joint optimization
    pub model: SourceModel,
    /// Chi-square of the first band after the final joint optimization
    pub final_chisq: f64,
    /// Variance of the position fitted at the first trial
    pub position_variance: ParamVariance,
    /// Variance of the free parameters at the final joint optimization
    pub final_variance: ParamVariance,
    pub trials: TrialTable,
}

impl SolvedSource {
    pub fn family(&self) -> ModelFamily {
        self.solution.family
    }

    /// Standard errors of (x, y), `NaN` where the position was frozen
    pub fn position_error(&self) -> [f64; 2] {
        [ParamKind::X, ParamKind::Y].map(|kind| {
            self.position_variance
                .get(kind)
                .map_or(f64::NAN, f64::sqrt)
        })
    }

    /// Standard errors of (re, ab, phi) for extended families
    pub fn shape_error(&self) -> Option<[f64; 3]> {
        if !self.family().is_extended() {
            return None;
        }
        Some(
            GalaxyShape::PARAMS
                .map(|kind| self.final_variance.get(kind).map_or(f64::NAN, f64::sqrt)),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CascadeSolution {
    /// One entry per source, in catalog order
    pub sources: Vec<SolvedSource>,
}

impl CascadeSolution {
    pub fn models(&self) -> Vec<SourceModel> {
        self.sources.iter().map(|s| s.model.clone()).collect()
    }
}

/// Model-selection cascade of a single blob
pub struct Cascade<'d, 'e, E: FitEngine + ?Sized> {
    driver: &'d OptimizationDriver<'e, E>,
    exp_dev_thresh: f64,
}

impl<'d, 'e, E: FitEngine + ?Sized> Cascade<'d, 'e, E> {
    pub fn new(driver: &'d OptimizationDriver<'e, E>, exp_dev_thresh: f64) -> Self {
        Self {
            driver,
            exp_dev_thresh,
        }
    }

    /// Run all levels until every source is solved, then optimize the solution jointly
    ///
    /// `images` are the modelling bands, the chi-square of the first one decides between
    /// families. Any optimizer failure aborts the whole cascade.
    pub fn run(
        &self,
        images: &[FitImage],
        segmap: &SegMap,
        seeds: &[SourceSeed],
    ) -> Result<CascadeSolution, FitError> {
        let mut states: Vec<SourceState> =
            seeds.iter().map(|seed| SourceState::new(seed.sid)).collect();
        let mut anchors = None;
        let mut level = DecisionLevel::Zero;
        loop {
            self.run_level(level, images, segmap, seeds, &mut states, &mut anchors)?;
            if states.iter().all(SourceState::is_solved) {
                break;
            }
            level = match level.next() {
                Some(next) => next,
                None => {
                    let sid = states
                        .iter()
                        .find(|state| !state.is_solved())
                        .map_or(0, |state| state.sid);
                    return Err(FitError::Unresolved {
                        blob_id: self.driver.blob_id,
                        sid,
                    });
                }
            };
        }
        self.final_optimization(images, segmap, states)
    }

    fn run_level(
        &self,
        level: DecisionLevel,
        images: &[FitImage],
        segmap: &SegMap,
        seeds: &[SourceSeed],
        states: &mut [SourceState],
        anchors: &mut Option<Vec<PixPos>>,
    ) -> Result<(), FitError> {
        for (sublevel, &family) in level.families().iter().enumerate() {
            let coord = TrialCoord::new(level, sublevel as u8);
            for state in states.iter_mut().filter(|state| !state.is_solved()) {
                state.family = family;
                state.level = level;
            }
            self.run_trial(coord, images, segmap, seeds, states, anchors)?;
        }

        for state in states.iter_mut().filter(|state| !state.is_solved()) {
            match decide(level, &state.trials, self.exp_dev_thresh) {
                Some(Verdict::Solved { family, coord }) => {
                    state.solve(family, coord);
                    log::debug!(
                        "blob {}: source {} solved as {family} at {coord}",
                        self.driver.blob_id,
                        state.sid
                    );
                }
                Some(Verdict::Promote(family)) => state.family = family,
                None => {}
            }
        }
        Ok(())
    }

    fn run_trial(
        &self,
        coord: TrialCoord,
        images: &[FitImage],
        segmap: &SegMap,
        seeds: &[SourceSeed],
        states: &mut [SourceState],
        anchors: &mut Option<Vec<PixPos>>,
    ) -> Result<(), FitError> {
        let families: Vec<_> = states.iter().map(|state| state.family).collect();
        let mut models = stage_models(&families, seeds, images.len(), anchors.as_deref());
        let outcome = self.driver.optimize(images, &mut models, coord.stage())?;
        let chi = self.driver.chi_images(images, &models);

        if coord == TrialCoord::POINT_SOURCE {
            *anchors = Some(models.iter().map(|m| m.position()).collect());
            for (state, variance) in states.iter_mut().zip(&outcome.variances) {
                state.position_variance = Some(position_only(variance));
            }
        }

        for (state, model) in states.iter_mut().zip(models) {
            if state.is_solved() {
                continue;
            }
            let chisq = chi.first().map_or(0.0, |chi| source_chisq(chi, segmap, state.sid));
            log::debug!(
                "blob {}: {} source {} {} chisq = {chisq:.3}",
                self.driver.blob_id,
                coord.stage(),
                state.sid,
                model.name(),
            );
            state.trials.insert(coord, Trial { model, chisq });
        }
        Ok(())
    }

    fn final_optimization(
        &self,
        images: &[FitImage],
        segmap: &SegMap,
        states: Vec<SourceState>,
    ) -> Result<CascadeSolution, FitError> {
        let solved: Vec<(SourceState, Solution)> = states
            .into_iter()
            .filter_map(|mut state| state.solution.take().map(|solution| (state, solution)))
            .collect();
        let mut models: Vec<_> = solved.iter().map(|(_, s)| s.model.clone()).collect();
        let outcome = self
            .driver
            .optimize(images, &mut models, Stage::FinalOptimization)?;
        let chi = self.driver.chi_images(images, &models);

        let sources = solved
            .into_iter()
            .zip(models)
            .zip(outcome.variances)
            .map(|(((state, solution), model), final_variance)| {
                let final_chisq = chi.first().map_or(0.0, |chi| source_chisq(chi, segmap, state.sid));
                SolvedSource {
                    sid: state.sid,
                    solution,
                    model,
                    final_chisq,
                    position_variance: state.position_variance.unwrap_or_default(),
                    final_variance,
                    trials: state.trials,
                }
            })
            .collect();
        Ok(CascadeSolution { sources })
    }
}

fn position_only(variance: &ParamVariance) -> ParamVariance {
    variance
        .iter()
        .filter(|(kind, _)| matches!(kind, ParamKind::X | ParamKind::Y))
        .copied()
        .collect()
}
