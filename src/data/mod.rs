mod band;
pub use band::{BackgroundStats, BandImage, is_weighted};

mod blob;
pub use blob::{Blob, BlobBand, SourceSeed};

mod brick;
pub use brick::Brick;

mod catalog;
pub use catalog::{Catalog, SourceRow};
