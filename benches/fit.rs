use blob_fit::model::{Fluxes, PixPos};
use blob_fit::ndarray::Array2;
use blob_fit::{
    BandImage, Brick, Catalog, FitConfig, FitEngine, FitImage, LmEngine, PsfDescriptor,
    SourceModel, SourceRow,
};
use blob_fit::{BlobFitter, render};
use blob_fit_test_util::{STAR_FIELD, SyntheticField};
use criterion::Criterion;
use std::hint::black_box;

fn brick(field: &SyntheticField) -> Brick {
    let bands = field
        .bands
        .iter()
        .zip(field.images.iter())
        .map(|(name, image)| {
            BandImage::new(name.clone(), image.clone()).with_weight(field.weight.clone())
        })
        .collect();
    let catalog: Catalog = field
        .sources
        .iter()
        .map(|s| SourceRow::new(s.sid, s.x, s.y, s.flux[0], 1.0, 1.0, 0.0))
        .collect();
    Brick::new(
        bands,
        field.blobmap.clone(),
        field.segmap.clone(),
        catalog,
        0.15,
    )
    .unwrap()
}

pub fn bench_lm_step(c: &mut Criterion) {
    let truth = SourceModel::point_source(PixPos::new(16.0, 16.0), Fluxes::new(vec![1000.0]));
    let mut image = FitImage::new(
        Array2::zeros((32, 32)),
        &Array2::ones((32, 32)),
        &Array2::from_elem((32, 32), false),
        &PsfDescriptor::Default,
        0,
        "r",
        0.0,
    );
    image.data = render::model_image(&image, &[truth]);
    let images = [image];
    let start = SourceModel::point_source(PixPos::new(16.4, 15.7), Fluxes::new(vec![700.0]));
    let engine = LmEngine::default();

    c.bench_function("LM step: point source on 32x32", |b| {
        b.iter(|| {
            let mut models = [start.clone()];
            engine.optimize_step(black_box(&images), &mut models).unwrap()
        });
    });
}

pub fn bench_fit_blob(c: &mut Criterion) {
    let brick = brick(&STAR_FIELD);
    let fitter = BlobFitter::new(LmEngine::default(), FitConfig::default());

    for blob_id in brick.blob_ids() {
        c.bench_function(&format!("Fit blob {blob_id} of the star field"), |b| {
            b.iter(|| fitter.fit_blob(black_box(&brick), blob_id).unwrap());
        });
    }
}
