use ndarray::Array2;

/// Pixel array, indexed `[row, column]`
pub type Image = Array2<f64>;

/// Bad-pixel mask, `true` marks a pixel excluded from fitting
pub type Mask = Array2<bool>;

/// Segmentation map holding the owning source id of every pixel, zero is background
pub type SegMap = Array2<SourceId>;

/// Blob map holding the blob id of every pixel, zero is background
pub type BlobMap = Array2<BlobId>;

pub type SourceId = u64;
pub type BlobId = u32;
