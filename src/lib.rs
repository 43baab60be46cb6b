#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

pub mod cascade;
pub use cascade::{Cascade, CascadeSolution, DecisionLevel, SolvedSource, TrialCoord};

mod config;
pub use config::FitConfig;

pub mod data;
pub use data::{BackgroundStats, BandImage, Blob, Brick, Catalog, SourceRow, SourceSeed};

mod driver;
pub use driver::{DriverOutcome, OptimizationDriver, ParamVariance, Stage, source_chisq};

pub mod engine;
pub use engine::{FitEngine, LmEngine, OptimizeStep};

mod error;
pub use error::{
    BlobError, CatalogError, ConfigError, EngineError, FitError, PhotometryError, PipelineError,
};

mod forced;
pub use forced::{ForcedPhotometry, ForcedSolution};

pub mod model;
pub use model::{ModelFamily, ModelTrait, SourceModel};

pub mod photometry;
pub use photometry::{
    AperturePhotometry, ImageType, ResidualDetection, aperture_photometry, detect_residual_sources,
};

mod pipeline;
pub use pipeline::{BlobFitter, BlobReport, BrickSummary};

mod projection;
pub use projection::{BandMeasurement, FitRecord, ShapeMeasurement, project};

pub mod render;
pub use render::{FitImage, PsfDescriptor};

mod staging;
pub use staging::{positions_frozen, stage_models};

mod types;
pub use types::{BlobId, BlobMap, Image, Mask, SegMap, SourceId};

mod wcs;
pub use wcs::{SkyTransform, TanWcs};

pub use ndarray;
