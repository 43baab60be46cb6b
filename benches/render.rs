use blob_fit::model::{Fluxes, GalaxyShape, PixPos};
use blob_fit::ndarray::Array2;
use blob_fit::{ModelFamily, ModelTrait, PsfDescriptor, SourceModel};
use criterion::Criterion;
use std::hint::black_box;

pub fn bench_render_mixture(c: &mut Criterion) {
    let psf = PsfDescriptor::Default.mixture();
    let pos = PixPos::new(32.0, 32.0);
    let flux = Fluxes::uniform(1000.0, 1);
    let shape = GalaxyShape::new(3.0, 0.6, 30.0);

    for family in ModelFamily::ALL {
        let model = SourceModel::new(family, pos, flux.clone(), shape);
        c.bench_function(&format!("Render {family} on 64x64"), |b| {
            b.iter(|| {
                let mut image = Array2::zeros((64, 64));
                black_box(&model)
                    .mixture(&psf)
                    .render_add(1000.0, image.view_mut());
                image
            });
        });
    }
}
