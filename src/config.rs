use crate::error::ConfigError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-blob fitting configuration
///
/// Every field has a default, so a partial JSON document is a valid configuration:
///
/// ```
/// use blob_fit::FitConfig;
///
/// let config = FitConfig::from_json(r#"{"max_steps": 20, "exp_dev_thresh": 1.0}"#).unwrap();
/// assert_eq!(config.max_steps, 20);
/// assert_eq!(config.blob_buffer, FitConfig::default_blob_buffer());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FitConfig {
    /// Blob-map fraction above which a blob is rejected as degenerate
    pub sparse_thresh: f64,
    /// Minimum blob-map size (pixels) for the degenerate-blob rejection to apply
    pub sparse_size: usize,
    /// Padding around the blob bounding box, pixels
    pub blob_buffer: usize,
    /// Maximum number of optimizer steps per fit
    pub max_steps: usize,
    /// Stop optimizing once the log-likelihood improvement of a step is below this value
    pub convergence_threshold: f64,
    /// Chi-square difference below which exponential and de Vaucouleurs fits are a near-tie
    pub exp_dev_thresh: f64,
    /// Aperture radii, arcsec, converted to pixels with the brick pixel scale
    pub aperture_radii_arcsec: Vec<f64>,
    /// Residual detection threshold, in units of the pixel noise
    pub res_thresh: f64,
    /// Minimum residual source area, pixels
    pub res_minarea: usize,
    /// Number of deblending thresholds
    pub res_deblend_nthresh: usize,
    /// Minimum flux fraction of a deblended branch
    pub res_deblend_cont: f64,
    /// Bands the morphology is fitted on, the chi-square of the first one decides between
    /// families. Empty for all bands of the brick.
    pub modeling_bands: Vec<String>,
    /// Forced photometry bands, empty for all bands of the brick
    pub forced_bands: Vec<String>,
    /// Subtract the global background level before aperture photometry and residual detection
    pub sub_background: bool,
    pub run_aperture_photometry: bool,
    pub run_residual_detection: bool,
}

impl FitConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Names of `selected` bands or all of `available` when nothing is selected
    pub fn select_bands<'a>(selected: &'a [String], available: &[&'a str]) -> Vec<&'a str> {
        if selected.is_empty() {
            available.to_vec()
        } else {
            selected.iter().map(String::as_str).collect()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be positive"));
        }
        if !self.exp_dev_thresh.is_finite() || self.exp_dev_thresh < 0.0 {
            return Err(ConfigError::Invalid("exp_dev_thresh must be non-negative"));
        }
        if self.aperture_radii_arcsec.iter().any(|&r| !(r > 0.0)) {
            return Err(ConfigError::Invalid("aperture radii must be positive"));
        }
        if self.res_deblend_nthresh == 0 {
            return Err(ConfigError::Invalid("res_deblend_nthresh must be positive"));
        }
        Ok(())
    }

    #[inline]
    pub fn default_sparse_thresh() -> f64 {
        0.85
    }

    #[inline]
    pub fn default_sparse_size() -> usize {
        1000
    }

    #[inline]
    pub fn default_blob_buffer() -> usize {
        5
    }

    #[inline]
    pub fn default_max_steps() -> usize {
        100
    }

    #[inline]
    pub fn default_convergence_threshold() -> f64 {
        1e-3
    }

    #[inline]
    pub fn default_exp_dev_thresh() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_aperture_radii_arcsec() -> Vec<f64> {
        vec![1.0, 2.0, 3.0]
    }

    #[inline]
    pub fn default_res_thresh() -> f64 {
        5.0
    }

    #[inline]
    pub fn default_res_minarea() -> usize {
        5
    }

    #[inline]
    pub fn default_res_deblend_nthresh() -> usize {
        32
    }

    #[inline]
    pub fn default_res_deblend_cont() -> f64 {
        0.005
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            sparse_thresh: Self::default_sparse_thresh(),
            sparse_size: Self::default_sparse_size(),
            blob_buffer: Self::default_blob_buffer(),
            max_steps: Self::default_max_steps(),
            convergence_threshold: Self::default_convergence_threshold(),
            exp_dev_thresh: Self::default_exp_dev_thresh(),
            aperture_radii_arcsec: Self::default_aperture_radii_arcsec(),
            res_thresh: Self::default_res_thresh(),
            res_minarea: Self::default_res_minarea(),
            res_deblend_nthresh: Self::default_res_deblend_nthresh(),
            res_deblend_cont: Self::default_res_deblend_cont(),
            modeling_bands: vec![],
            forced_bands: vec![],
            sub_background: false,
            run_aperture_photometry: false,
            run_residual_detection: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = FitConfig::from_json(r#"{"sparse_size": 10}"#).unwrap();
        assert_eq!(config.sparse_size, 10);
        assert_eq!(
            config,
            FitConfig {
                sparse_size: 10,
                ..FitConfig::default()
            }
        );
    }

    #[test]
    fn serde_round_trip() {
        let config = FitConfig {
            aperture_radii_arcsec: vec![0.5],
            run_residual_detection: true,
            ..FitConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(FitConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn empty_band_selection_means_all() {
        let config = FitConfig {
            forced_bands: vec!["r".into()],
            ..FitConfig::default()
        };
        let available = ["g", "r", "i"];
        assert_eq!(
            FitConfig::select_bands(&config.modeling_bands, &available),
            available
        );
        assert_eq!(FitConfig::select_bands(&config.forced_bands, &available), ["r"]);
    }

    #[test]
    fn zero_steps_is_rejected() {
        let err = FitConfig::from_json(r#"{"max_steps": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            FitConfig::from_json("{max_steps"),
            Err(ConfigError::Json(_))
        ));
    }
}
