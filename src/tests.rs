pub use crate::config::FitConfig;
pub use crate::data::{BandImage, Brick, SourceRow};

pub use blob_fit_test_util::{STAR_FIELD, SyntheticField};

/// Arcsec per pixel of the synthetic bricks
pub const PIXEL_SCALE: f64 = 0.15;

/// Brick of a synthetic field with unit-radius round seeds at the true positions
pub fn brick_from_field(field: &SyntheticField) -> Brick {
    let bands = field
        .bands
        .iter()
        .zip(field.images.iter())
        .map(|(name, image)| {
            BandImage::new(name.clone(), image.clone()).with_weight(field.weight.clone())
        })
        .collect();
    let catalog = field
        .sources
        .iter()
        .map(|s| SourceRow::new(s.sid, s.x, s.y, s.flux[0], 1.0, 1.0, 0.0))
        .collect();
    Brick::new(
        bands,
        field.blobmap.clone(),
        field.segmap.clone(),
        catalog,
        PIXEL_SCALE,
    )
    .expect("synthetic field arrays should have the same shape")
}

/// Two-band brick with a blend of two stars in blob 1 and an isolated star in blob 2
pub fn star_brick() -> Brick {
    brick_from_field(&STAR_FIELD)
}
