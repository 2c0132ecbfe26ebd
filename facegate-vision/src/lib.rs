pub mod descriptor;
pub mod embedding;
pub mod enrollment;
pub mod error;
pub mod matcher;
#[cfg(feature = "onnx")]
pub mod model;
pub mod pipeline;
pub mod region;
pub mod similarity;
pub mod source;

// Re-export commonly used types
pub use descriptor::{extract_features, DescriptorConfig, FeatureDescriptor};
pub use embedding::{normalize, Embedding};
pub use enrollment::EnrollmentSet;
pub use error::{CaptureError, DescriptorError, MatchError};
pub use matcher::{authenticate_one, find_best_match, Decision, Verdict, DEFAULT_THRESHOLD};
pub use pipeline::Pipeline;
pub use region::{Detection, FaceLocator, FixedRegion, WholeFrame};
pub use similarity::similarity;
pub use source::{build_source, DescriptorSource, EmbeddingSource, ExtractorKind, ModelConfig};
