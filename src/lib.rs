pub mod config;
pub mod matcher;
pub mod storage;

// Re-export engine types for convenience
pub use facegate_vision::{
    descriptor, pipeline, region, Decision, Detection, Embedding, EnrollmentSet, Pipeline,
    Verdict,
};
