//! Model staging: fresh model instances from catalog seeds

use crate::data::SourceSeed;
use crate::model::{Fluxes, GalaxyShape, ModelFamily, ModelTrait, PixPos, SourceModel};

/// Effective radius every galaxy model starts from, pixels
pub const SEED_RE: f64 = 1.0;

/// Seed shape of a galaxy model: axis ratio `b / a` and the catalog position angle
///
/// Catalog angles are radians, model angles are degrees.
pub fn seed_shape(seed: &SourceSeed) -> GalaxyShape {
    let ab = if seed.a > 0.0 && seed.b > 0.0 {
        seed.b / seed.a
    } else {
        1.0
    };
    GalaxyShape::new(SEED_RE, ab, seed.theta.to_degrees())
}

/// Whether positions are held at their first-trial value: every source is past the point-source
/// family
pub fn positions_frozen(families: &[ModelFamily]) -> bool {
    families
        .iter()
        .all(|&family| family != ModelFamily::PointSource)
}

/// One new model per source
///
/// Flux guesses are replicated over `n_bands`. When [positions_frozen] holds and `anchors` are
/// given, they replace the catalog positions and are frozen.
pub fn stage_models(
    families: &[ModelFamily],
    seeds: &[SourceSeed],
    n_bands: usize,
    anchors: Option<&[PixPos]>,
) -> Vec<SourceModel> {
    assert_eq!(
        families.len(),
        seeds.len(),
        "families and seeds should have the same length"
    );
    let anchors = anchors.filter(|_| positions_frozen(families));
    if let Some(anchors) = anchors {
        assert_eq!(anchors.len(), seeds.len(), "one anchor per source is required");
    }
    families
        .iter()
        .zip(seeds)
        .enumerate()
        .map(|(i, (&family, seed))| {
            let anchor = anchors.map(|anchors| anchors[i]);
            let pos = anchor.unwrap_or(PixPos::new(seed.x, seed.y));
            let mut model = SourceModel::new(
                family,
                pos,
                Fluxes::uniform(seed.flux, n_bands),
                seed_shape(seed),
            );
            if anchor.is_some() {
                model.freeze_position();
            }
            model
        })
        .collect()
}
