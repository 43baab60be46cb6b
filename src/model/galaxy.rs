use crate::model::{
    Fluxes, GalaxyShape, ModelFamily, ModelTrait, ParamFreeze, ParamKind, PixPos,
    get_position_flux, missing_param, position_flux_params, set_position_flux,
};
use crate::render::profiles::{DEV_PROFILE, EXP_PROFILE};
use crate::render::{Gaussian2, Mixture};

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Effective radius of [CompactGalaxy], pixels
pub const COMPACT_GALAXY_RE: f64 = 0.45;

fn profile_mixture(profile: &[(f64, f64)], shape: &GalaxyShape, pos: PixPos) -> Mixture {
    profile
        .iter()
        .map(|&(amp, var)| Gaussian2 {
            amp,
            mean: [pos.x, pos.y],
            cov: shape.covariance(var),
        })
        .collect::<Vec<_>>()
        .into()
}

macro_const! {
    const COMPACT_DOC: &str = r#"
Compact galaxy

Exponential profile with a fixed small round shape, effective radius is
[COMPACT_GALAXY_RE] pixels. Distinguishes barely resolved sources from point sources.

- Parameters: **x**, **y**, **flux** per band
"#;
}

#[doc = COMPACT_DOC!()]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompactGalaxy {
    pub pos: PixPos,
    pub flux: Fluxes,
    pub frozen: ParamFreeze,
}

impl CompactGalaxy {
    pub fn new(pos: PixPos, flux: Fluxes) -> Self {
        Self {
            pos,
            flux,
            frozen: ParamFreeze::default(),
        }
    }

    pub fn fixed_shape() -> GalaxyShape {
        GalaxyShape::new(COMPACT_GALAXY_RE, 1.0, 0.0)
    }

    pub fn doc() -> &'static str {
        COMPACT_DOC
    }
}

impl ModelTrait for CompactGalaxy {
    fn family(&self) -> ModelFamily {
        ModelFamily::CompactGalaxy
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
        Some(Self::fixed_shape())
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
        profile_mixture(&EXP_PROFILE, &Self::fixed_shape(), self.pos).convolve(psf)
    }
}

macro_rules! single_profile_galaxy {
    ($name: ident, $family: expr, $profile: ident, $doc: ident $(,)?) => {
        #[doc = $doc!()]
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
        pub struct $name {
            pub pos: PixPos,
            pub flux: Fluxes,
            pub shape: GalaxyShape,
            pub frozen: ParamFreeze,
        }

        impl $name {
            pub fn new(pos: PixPos, flux: Fluxes, shape: GalaxyShape) -> Self {
                Self {
                    pos,
                    flux,
                    shape,
                    frozen: ParamFreeze::default(),
                }
            }

            pub fn doc() -> &'static str {
                $doc
            }
        }

        impl ModelTrait for $name {
            fn family(&self) -> ModelFamily {
                $family
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
                Some(self.shape)
            }

            fn freeze(&self) -> &ParamFreeze {
                &self.frozen
            }

            fn freeze_mut(&mut self) -> &mut ParamFreeze {
                &mut self.frozen
            }

            fn all_params(&self) -> Vec<ParamKind> {
                position_flux_params(self.flux.len())
                    .chain(GalaxyShape::PARAMS)
                    .collect()
            }

            fn get_param(&self, kind: ParamKind) -> f64 {
                get_position_flux(&self.pos, &self.flux, kind)
                    .or_else(|| self.shape.get(kind))
                    .unwrap_or_else(|| missing_param(self.family(), kind))
            }

            fn set_param(&mut self, kind: ParamKind, value: f64) {
                if !set_position_flux(&mut self.pos, &mut self.flux, kind, value)
                    && !self.shape.set(kind, value)
                {
                    missing_param(self.family(), kind)
                }
            }

            fn mixture(&self, psf: &Mixture) -> Mixture {
                profile_mixture(&$profile, &self.shape, self.pos).convolve(psf)
            }
        }
    };
}

macro_const! {
    const EXP_DOC: &str = r#"
Exponential-disk galaxy

Sersic profile with index 1.

- Parameters: **x**, **y**, **flux** per band, effective radius **re**, axis ratio **ab**,
  position angle **phi**
"#;
}

single_profile_galaxy!(ExpGalaxy, ModelFamily::ExpGalaxy, EXP_PROFILE, EXP_DOC);

macro_const! {
    const DEV_DOC: &str = r#"
de Vaucouleurs galaxy

Sersic profile with index 4, typical of elliptical galaxies.

- Parameters: **x**, **y**, **flux** per band, effective radius **re**, axis ratio **ab**,
  position angle **phi**
"#;
}

single_profile_galaxy!(DevGalaxy, ModelFamily::DevGalaxy, DEV_PROFILE, DEV_DOC);

macro_const! {
    const COMPOSITE_DOC: &str = r#"
Composite galaxy

Sum of an exponential and a de Vaucouleurs component sharing position and shape. The total flux
is split between them by the de Vaucouleurs fraction **frac_dev**, clamped to [0, 1].

- Parameters: **x**, **y**, **flux** per band, **frac_dev**, effective radius **re**, axis ratio
  **ab**, position angle **phi**
"#;
}

#[doc = COMPOSITE_DOC!()]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositeGalaxy {
    pub pos: PixPos,
    pub flux: Fluxes,
    pub frac_dev: f64,
    pub shape: GalaxyShape,
    pub frozen: ParamFreeze,
}

impl CompositeGalaxy {
    pub fn new(pos: PixPos, flux: Fluxes, frac_dev: f64, shape: GalaxyShape) -> Self {
        Self {
            pos,
            flux,
            frac_dev: frac_dev.clamp(0.0, 1.0),
            shape,
            frozen: ParamFreeze::default(),
        }
    }

    #[inline]
    pub fn default_frac_dev() -> f64 {
        0.5
    }

    pub fn doc() -> &'static str {
        COMPOSITE_DOC
    }
}

impl ModelTrait for CompositeGalaxy {
    fn family(&self) -> ModelFamily {
        ModelFamily::CompositeGalaxy
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
        Some(self.shape)
    }

    fn freeze(&self) -> &ParamFreeze {
        &self.frozen
    }

    fn freeze_mut(&mut self) -> &mut ParamFreeze {
        &mut self.frozen
    }

    fn all_params(&self) -> Vec<ParamKind> {
        position_flux_params(self.flux.len())
            .chain([ParamKind::FracDev])
            .chain(GalaxyShape::PARAMS)
            .collect()
    }

    fn get_param(&self, kind: ParamKind) -> f64 {
        match kind {
            ParamKind::FracDev => self.frac_dev,
            _ => get_position_flux(&self.pos, &self.flux, kind)
                .or_else(|| self.shape.get(kind))
                .unwrap_or_else(|| missing_param(self.family(), kind)),
        }
    }

    fn set_param(&mut self, kind: ParamKind, value: f64) {
        if kind == ParamKind::FracDev {
            self.frac_dev = if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                Self::default_frac_dev()
            };
        } else if !set_position_flux(&mut self.pos, &mut self.flux, kind, value)
            && !self.shape.set(kind, value)
        {
            missing_param(self.family(), kind)
        }
    }

    fn mixture(&self, psf: &Mixture) -> Mixture {
        let exp = profile_mixture(&EXP_PROFILE, &self.shape, self.pos).scaled(1.0 - self.frac_dev);
        let dev = profile_mixture(&DEV_PROFILE, &self.shape, self.pos).scaled(self.frac_dev);
        let mut both = exp;
        both.components.extend(dev.components);
        both.convolve(psf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn psf() -> Mixture {
        Mixture::new(vec![Gaussian2::circular(1.0, [0.0, 0.0], 1.0)])
    }

    #[test]
    fn mixtures_have_unit_flux() {
        let pos = PixPos::new(3.0, 4.0);
        let shape = GalaxyShape::new(2.0, 0.7, 10.0);
        let flux = Fluxes::uniform(1.0, 1);
        let mixtures = [
            CompactGalaxy::new(pos, flux.clone()).mixture(&psf()),
            ExpGalaxy::new(pos, flux.clone(), shape).mixture(&psf()),
            DevGalaxy::new(pos, flux.clone(), shape).mixture(&psf()),
            CompositeGalaxy::new(pos, flux, 0.3, shape).mixture(&psf()),
        ];
        for m in mixtures {
            assert_abs_diff_eq!(m.total_amp(), 1.0, epsilon = 1e-12);
            assert!(m.components.iter().all(|g| g.mean == [3.0, 4.0]));
        }
    }

    #[test]
    fn frac_dev_is_clamped() {
        let mut galaxy = CompositeGalaxy::new(
            PixPos::new(0.0, 0.0),
            Fluxes::uniform(1.0, 1),
            2.0,
            GalaxyShape::new(1.0, 1.0, 0.0),
        );
        assert_eq!(galaxy.frac_dev, 1.0);
        galaxy.set_param(ParamKind::FracDev, -0.5);
        assert_eq!(galaxy.frac_dev, 0.0);
    }

    #[test]
    fn compact_galaxy_shape_is_fixed() {
        let galaxy = CompactGalaxy::new(PixPos::new(0.0, 0.0), Fluxes::uniform(1.0, 1));
        assert_eq!(galaxy.shape().map(|s| s.re), Some(COMPACT_GALAXY_RE));
        assert!(!galaxy.all_params().contains(&ParamKind::Re));
    }

    #[test]
    fn docs_are_not_empty() {
        for doc in [
            CompactGalaxy::doc(),
            ExpGalaxy::doc(),
            DevGalaxy::doc(),
            CompositeGalaxy::doc(),
        ] {
            assert!(doc.contains("Parameters"));
        }
    }
}
