//! Post-fit measurements on the image, model and residual of a solved blob

mod aperture;
pub use aperture::{ApertureFlux, AperturePhotometry, ImageType, SUBPIXELS, aperture_sum};

mod residual;
pub use residual::{
    DetectionParams, ResidualDetection, ResidualSource, extract_sources, label_components,
};

use crate::config::FitConfig;
use crate::data::{Blob, BlobBand, is_weighted};
use crate::error::PhotometryError;
use crate::forced::ForcedSolution;
use crate::model::ModelTrait;
use crate::render::{self, FitImage};
use crate::types::Image;

use ndarray::Zip;

/// Forced models of `band` rendered on the cutout grid
pub fn model_image(
    blob: &Blob,
    forced: &ForcedSolution,
    band: &str,
) -> Result<Image, PhotometryError> {
    if forced.models.is_empty() {
        return Err(PhotometryError::NoSolution);
    }
    let blob_band = blob.band(band)?;
    let band_index = forced
        .bands
        .iter()
        .position(|name| name == band)
        .ok_or_else(|| PhotometryError::UnknownBand(band.to_owned()))?;
    let image = FitImage::new(
        Image::zeros(blob.dim()),
        &blob_band.weight,
        &blob_band.mask,
        &blob_band.psf,
        band_index,
        band,
        0.0,
    );
    Ok(render::model_image(&image, &forced.models))
}

fn residual_image(
    blob_band: &BlobBand,
    blob: &Blob,
    forced: &ForcedSolution,
) -> Result<Image, PhotometryError> {
    Ok(&blob_band.image - &model_image(blob, forced, &blob_band.name)?)
}

fn background_level(blob_band: &BlobBand) -> f64 {
    blob_band.background.map_or(0.0, |bg| bg.level)
}

/// Aperture fluxes of every source at the solved positions
///
/// Fails immediately for an `image_type` other than "image", "model" or "residual". Radii of
/// `config.aperture_radii_arcsec` are converted with the blob pixel scale. With
/// `sub_background` the global background level is subtracted from observed pixels first.
/// Apertures are not clipped to the blob, only bad pixels and pixels of zero weight are skipped.
/// Errors come from the weight map or, for an unweighted band, from the background rms.
/// Sources centred outside of the cutout get zero fluxes.
pub fn aperture_photometry(
    blob: &Blob,
    forced: &ForcedSolution,
    band: &str,
    image_type: &str,
    sub_background: bool,
    config: &FitConfig,
) -> Result<AperturePhotometry, PhotometryError> {
    let image_type: ImageType = image_type.parse()?;
    let blob_band = blob.band(band)?;
    let level = if sub_background {
        background_level(blob_band)
    } else {
        0.0
    };
    let image = match image_type {
        ImageType::Image => blob_band.image.mapv(|v| v - level),
        ImageType::Model => model_image(blob, forced, band)?,
        ImageType::Residual => residual_image(blob_band, blob, forced)? - level,
    };

    let unweighted_variance = match blob_band.background {
        Some(bg) if !is_weighted(&blob_band.weight) => Some(bg.rms * bg.rms),
        _ => None,
    };
    let mask = Zip::from(&blob_band.bad_pixels)
        .and(&blob_band.weight)
        .map_collect(|&masked, &w| masked || !(w > 0.0));
    let variance = blob_band
        .weight
        .mapv(|w| unweighted_variance.unwrap_or(if w > 0.0 { 1.0 / w } else { 0.0 }));

    let (nrows, ncols) = blob.dim();
    let inside = |x: f64, y: f64| {
        (0.0..=(ncols - 1) as f64).contains(&x) && (0.0..=(nrows - 1) as f64).contains(&y)
    };
    let sources = blob
        .sids()
        .zip(forced.models.iter())
        .map(|(sid, model)| {
            let pos = model.position();
            let fluxes = config
                .aperture_radii_arcsec
                .iter()
                .map(|&radius_arcsec| {
                    let (flux, flux_err) = if inside(pos.x, pos.y) {
                        aperture_sum(
                            &image,
                            &variance,
                            &mask,
                            (pos.x, pos.y),
                            radius_arcsec / blob.pixel_scale,
                        )
                    } else {
                        (0.0, 0.0)
                    };
                    ApertureFlux {
                        radius_arcsec,
                        flux,
                        flux_err,
                    }
                })
                .collect();
            (sid, fluxes)
        })
        .collect();
    log::debug!(
        "blob {}: aperture photometry of {band} {image_type}",
        blob.id
    );

    Ok(AperturePhotometry {
        band: band.to_owned(),
        image_type,
        sources,
    })
}

/// Sources left in the residual image of `band`
///
/// A pixel passes when its residual exceeds `config.res_thresh` times its noise: `1/√weight`
/// for weighted bands, the background rms otherwise (on top of the background level unless
/// `sub_background`). Masked pixels never pass.
pub fn detect_residual_sources(
    blob: &Blob,
    forced: &ForcedSolution,
    band: &str,
    sub_background: bool,
    config: &FitConfig,
) -> Result<ResidualDetection, PhotometryError> {
    let blob_band = blob.band(band)?;
    let residual = residual_image(blob_band, blob, forced)?;
    let level = background_level(blob_band);

    let significance = if is_weighted(&blob_band.weight) {
        Zip::from(&residual)
            .and(&blob_band.weight)
            .and(&blob_band.mask)
            .map_collect(|&r, &w, &masked| {
                if masked || !(w > 0.0) {
                    f64::NEG_INFINITY
                } else {
                    r * w.sqrt()
                }
            })
    } else {
        let rms = blob_band.background.map_or(1.0, |bg| bg.rms);
        Zip::from(&residual)
            .and(&blob_band.mask)
            .map_collect(|&r, &masked| {
                if masked {
                    f64::NEG_INFINITY
                } else {
                    (r - level) / rms
                }
            })
    };
    let flux = if sub_background {
        residual - level
    } else {
        residual
    };

    let params = DetectionParams::new(
        config.res_thresh,
        config.res_minarea,
        config.res_deblend_nthresh,
        config.res_deblend_cont,
    );
    let (sources, segmap) = extract_sources(&flux, &significance, &params);
    log::debug!(
        "blob {}: {} residual sources in {band}",
        blob.id,
        sources.len()
    );

    Ok(ResidualDetection {
        band: band.to_owned(),
        sources,
        segmap,
    })
}
