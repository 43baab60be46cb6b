use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Smallest effective radius, pixels
pub const MIN_RE: f64 = 1e-3;
/// Smallest axis ratio
pub const MIN_AB: f64 = 1e-2;

/// Identifies a single scalar parameter of a source model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ParamKind {
    X,
    Y,
    /// Flux in the band with the given index
    Flux(usize),
    FracDev,
    Re,
    Ab,
    Phi,
}

impl ParamKind {
    /// Finite-difference step for a parameter currently equal to `value`
    pub fn derivative_step(self, value: f64) -> f64 {
        match self {
            Self::X | Self::Y => 1e-3,
            Self::Flux(_) => f64::max(value.abs() * 1e-4, 1e-6),
            Self::Re => f64::max(value.abs() * 1e-4, 1e-6),
            Self::Ab | Self::FracDev => 1e-4,
            Self::Phi => 1e-2,
        }
    }
}

/// Pixel position in the cutout frame, `x` is the column and `y` is the row
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PixPos {
    pub x: f64,
    pub y: f64,
}

impl PixPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Flux per band, in the band order of the fitted images
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Fluxes(Vec<f64>);

impl Fluxes {
    pub fn new(fluxes: Vec<f64>) -> Self {
        Self(fluxes)
    }

    /// The same flux in each of `n_bands` bands
    pub fn uniform(flux: f64, n_bands: usize) -> Self {
        Self(vec![flux; n_bands])
    }

    pub fn get(&self, band_index: usize) -> f64 {
        self.0[band_index]
    }

    pub fn set(&mut self, band_index: usize, value: f64) {
        self.0[band_index] = value;
    }

    /// Flux of the first band, zero if there are no bands
    pub fn first(&self) -> f64 {
        self.0.first().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Elliptical shape: effective radius (pixels), axis ratio and position angle (degrees,
/// counter-clockwise from the x axis)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GalaxyShape {
    pub re: f64,
    pub ab: f64,
    pub phi: f64,
}

impl GalaxyShape {
    pub fn new(re: f64, ab: f64, phi: f64) -> Self {
        let mut shape = Self { re, ab, phi };
        shape.normalize();
        shape
    }

    fn normalize(&mut self) {
        self.re = self.re.max(MIN_RE);
        self.ab = if self.ab.is_finite() {
            self.ab.clamp(MIN_AB, 1.0)
        } else {
            1.0
        };
        self.phi = if self.phi.is_finite() {
            self.phi.rem_euclid(180.0)
        } else {
            0.0
        };
    }

    pub const PARAMS: [ParamKind; 3] = [ParamKind::Re, ParamKind::Ab, ParamKind::Phi];

    pub fn get(&self, kind: ParamKind) -> Option<f64> {
        match kind {
            ParamKind::Re => Some(self.re),
            ParamKind::Ab => Some(self.ab),
            ParamKind::Phi => Some(self.phi),
            _ => None,
        }
    }

    pub fn set(&mut self, kind: ParamKind, value: f64) -> bool {
        match kind {
            ParamKind::Re => self.re = value,
            ParamKind::Ab => self.ab = value,
            ParamKind::Phi => self.phi = value,
            _ => return false,
        }
        self.normalize();
        true
    }

    /// Covariance `[xx, xy, yy]` of a profile component with variance `var` in units of `re^2`
    pub fn covariance(&self, var: f64) -> [f64; 3] {
        let a2 = self.re * self.re;
        let b2 = a2 * self.ab * self.ab;
        let (s, c) = self.phi.to_radians().sin_cos();
        [
            var * (a2 * c * c + b2 * s * s),
            var * (a2 - b2) * c * s,
            var * (a2 * s * s + b2 * c * c),
        ]
    }
}

/// Which parameter groups are held fixed by the optimizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParamFreeze {
    pub position: bool,
    pub shape: bool,
    pub frac_dev: bool,
}

impl ParamFreeze {
    pub fn all_but_flux() -> Self {
        Self {
            position: true,
            shape: true,
            frac_dev: true,
        }
    }

    pub fn is_frozen(&self, kind: ParamKind) -> bool {
        match kind {
            ParamKind::X | ParamKind::Y => self.position,
            ParamKind::Flux(_) => false,
            ParamKind::FracDev => self.frac_dev,
            ParamKind::Re | ParamKind::Ab | ParamKind::Phi => self.shape,
        }
    }
}
