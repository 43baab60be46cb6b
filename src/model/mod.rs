//! Parametric source models
//!
//! Every model family is its own struct carrying its own parameters, [SourceModel] is the tagged
//! variant over them. Parameters are addressed by [ParamKind] and listed in a fixed order:
//! position, per-band flux, de Vaucouleurs fraction, shape.

mod family;
pub use family::ModelFamily;

mod galaxy;
pub use galaxy::{COMPACT_GALAXY_RE, CompactGalaxy, CompositeGalaxy, DevGalaxy, ExpGalaxy};

mod params;
pub use params::{Fluxes, GalaxyShape, MIN_AB, MIN_RE, ParamFreeze, ParamKind, PixPos};

mod point_source;
pub use point_source::PointSource;

use crate::render::Mixture;

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[enum_dispatch]
pub trait ModelTrait {
    fn family(&self) -> ModelFamily;

    fn position(&self) -> PixPos;

    fn fluxes(&self) -> &Fluxes;

    fn fluxes_mut(&mut self) -> &mut Fluxes;

    /// Shape of extended models, `None` for point sources
    fn shape(&self) -> Option<GalaxyShape>;

    fn freeze(&self) -> &ParamFreeze;

    fn freeze_mut(&mut self) -> &mut ParamFreeze;

    /// All parameters, free or frozen
    fn all_params(&self) -> Vec<ParamKind>;

    fn get_param(&self, kind: ParamKind) -> f64;

    /// Set a parameter, values outside of the parameter domain are clamped into it
    fn set_param(&mut self, kind: ParamKind, value: f64);

    /// Unit-flux image of the source convolved with `psf`
    fn mixture(&self, psf: &Mixture) -> Mixture;

    /// Parameters the optimizer may change, in the order of the variance vector
    fn free_params(&self) -> Vec<ParamKind> {
        let freeze = *self.freeze();
        self.all_params()
            .into_iter()
            .filter(|&kind| !freeze.is_frozen(kind))
            .collect()
    }

    fn n_free_params(&self) -> usize {
        self.free_params().len()
    }

    fn freeze_position(&mut self) {
        self.freeze_mut().position = true;
    }

    fn freeze_all_but_flux(&mut self) {
        *self.freeze_mut() = ParamFreeze::all_but_flux();
    }

    fn name(&self) -> &'static str {
        self.family().name()
    }
}

#[enum_dispatch(ModelTrait)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum SourceModel {
    PointSource(PointSource),
    CompactGalaxy(CompactGalaxy),
    ExpGalaxy(ExpGalaxy),
    DevGalaxy(DevGalaxy),
    CompositeGalaxy(CompositeGalaxy),
}

impl SourceModel {
    /// Fresh model of `family`, `shape` is ignored by families without a free shape
    pub fn new(family: ModelFamily, pos: PixPos, flux: Fluxes, shape: GalaxyShape) -> Self {
        match family {
            ModelFamily::PointSource => PointSource::new(pos, flux).into(),
            ModelFamily::CompactGalaxy => CompactGalaxy::new(pos, flux).into(),
            ModelFamily::ExpGalaxy => ExpGalaxy::new(pos, flux, shape).into(),
            ModelFamily::DevGalaxy => DevGalaxy::new(pos, flux, shape).into(),
            ModelFamily::CompositeGalaxy => {
                CompositeGalaxy::new(pos, flux, CompositeGalaxy::default_frac_dev(), shape).into()
            }
        }
    }

    pub fn point_source(pos: PixPos, flux: Fluxes) -> Self {
        PointSource::new(pos, flux).into()
    }

    /// Same morphology with the flux vector replaced
    pub fn with_fluxes(mut self, flux: Fluxes) -> Self {
        *self.fluxes_mut() = flux;
        self
    }
}

pub(super) fn position_flux_params(n_bands: usize) -> impl Iterator<Item = ParamKind> {
    [ParamKind::X, ParamKind::Y]
        .into_iter()
        .chain((0..n_bands).map(ParamKind::Flux))
}

pub(super) fn get_position_flux(pos: &PixPos, flux: &Fluxes, kind: ParamKind) -> Option<f64> {
    match kind {
        ParamKind::X => Some(pos.x),
        ParamKind::Y => Some(pos.y),
        ParamKind::Flux(i) if i < flux.len() => Some(flux.get(i)),
        _ => None,
    }
}

pub(super) fn set_position_flux(
    pos: &mut PixPos,
    flux: &mut Fluxes,
    kind: ParamKind,
    value: f64,
) -> bool {
    match kind {
        ParamKind::X => pos.x = value,
        ParamKind::Y => pos.y = value,
        ParamKind::Flux(i) if i < flux.len() => flux.set(i, value),
        _ => return false,
    }
    true
}

pub(super) fn missing_param(family: ModelFamily, kind: ParamKind) -> ! {
    panic!("{kind:?} is not a parameter of {family}")
}
