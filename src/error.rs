use crate::driver::Stage;
use crate::types::{BlobId, SourceId};

/// Error returned from [crate::Blob::extract]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BlobError {
    #[error("blob {blob_id} has no pixels in the blob map")]
    EmptyBlob { blob_id: BlobId },

    #[error("blob {blob_id} contains no catalog source")]
    NoSources { blob_id: BlobId },

    #[error(
        "blob {blob_id} is rejected as degenerate: mask fraction {fraction:.3} over {size} pixels"
    )]
    DegenerateBlob {
        blob_id: BlobId,
        fraction: f64,
        size: usize,
    },

    #[error("segment {sid} of blob {blob_id} has no catalog row")]
    SegmentWithoutSource { blob_id: BlobId, sid: SourceId },

    #[error("array {name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        actual: (usize, usize),
        expected: (usize, usize),
    },
}

/// Error raised by a [crate::FitEngine] during a single optimization step
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum EngineError {
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("normal equations are singular")]
    SingularSystem,

    #[error("no free parameters to optimize")]
    NoFreeParameters,

    #[error("{0}")]
    Other(String),
}

/// Error returned from the optimization driver and the stages built on it
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum FitError {
    #[error("blob {blob_id}: optimizer failed at {stage}: {source}")]
    Optimizer {
        blob_id: BlobId,
        stage: Stage,
        source: EngineError,
    },

    #[error("blob {blob_id}: optimizer returned {actual} variances for {expected} free parameters")]
    VarianceMismatch {
        blob_id: BlobId,
        expected: usize,
        actual: usize,
    },

    #[error("blob {blob_id}: source {sid} is still unsolved after the last decision level")]
    Unresolved { blob_id: BlobId, sid: SourceId },
}

/// Error returned from the post-fit analyses
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum PhotometryError {
    #[error("image_type must be 'image', 'model' or 'residual', not {0:?}")]
    InvalidImageType(String),

    #[error("unknown band {0:?}")]
    UnknownBand(String),

    #[error("blob has no solved models yet")]
    NoSolution,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CatalogError {
    #[error("source {sid} of blob {blob_id} is missing from the parent catalog")]
    MissingSource { blob_id: BlobId, sid: SourceId },
}

/// Any failure of the per-blob pipeline
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Photometry(#[from] PhotometryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
