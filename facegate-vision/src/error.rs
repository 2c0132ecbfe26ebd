use thiserror::Error;

/// Failures of the scoring and matching operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("no enrolled identities to match against")]
    EmptyEnrollmentSet,
    #[error("embedding contains NaN or infinite values")]
    NonFiniteEmbedding,
}

/// Failures of the fallback feature descriptor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("canonical size {canonical_size} is not divisible into a {grid}x{grid} grid")]
    InvalidGeometry { canonical_size: u32, grid: u32 },
    #[error("face region is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Failures while turning a captured image into an embedding.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The image was readable but contained no face. Expected during capture.
    #[error("no face detected in image")]
    NoFace,
    /// The input itself is unusable.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// The extractor or detector failed unexpectedly.
    #[error("internal failure: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<DescriptorError> for CaptureError {
    fn from(err: DescriptorError) -> Self {
        Self::MalformedInput(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        Self::MalformedInput(err.to_string())
    }
}
