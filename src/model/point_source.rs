use crate::model::{
    Fluxes, GalaxyShape, ModelFamily, ModelTrait, ParamFreeze, ParamKind, PixPos,
    get_position_flux, missing_param, position_flux_params, set_position_flux,
};
use crate::render::Mixture;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Point source

An unresolved source: the image is the PSF scaled by the flux of each band.

- Parameters: **x**, **y**, **flux** per band
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PointSource {
    pub pos: PixPos,
    pub flux: Fluxes,
    pub frozen: ParamFreeze,
}

impl PointSource {
    pub fn new(pos: PixPos, flux: Fluxes) -> Self {
        Self {
            pos,
            flux,
            frozen: ParamFreeze::default(),
        }
    }

    pub fn doc() -> &'static str {
        DOC
    }
}

impl ModelTrait for PointSource {
    fn family(&self) -> ModelFamily {
        ModelFamily::PointSource
    }

    fn position(&self) -> PixPos {
        self.pos
    }

    fn fluxes(&self) -> &Fluxes {
        &self.flux
    }

    fn fluxes_mut(&mut self) -> &mut Fluxes {
        &mut self.flux
    }

    fn shape(&self) -> Option<GalaxyShape> {
        None
    }

    fn freeze(&self) -> &ParamFreeze {
        &self.frozen
    }

    fn freeze_mut(&mut self) -> &mut ParamFreeze {
        &mut self.frozen
    }

    fn all_params(&self) -> Vec<ParamKind> {
        position_flux_params(self.flux.len()).collect()
    }

    fn get_param(&self, kind: ParamKind) -> f64 {
        get_position_flux(&self.pos, &self.flux, kind)
            .unwrap_or_else(|| missing_param(self.family(), kind))
    }

    fn set_param(&mut self, kind: ParamKind, value: f64) {
        if !set_position_flux(&mut self.pos, &mut self.flux, kind, value) {
            missing_param(self.family(), kind)
        }
    }

    fn mixture(&self, psf: &Mixture) -> Mixture {
        psf.clone().shifted(self.pos.x, self.pos.y)
    }
}
