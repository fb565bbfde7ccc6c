mod encoder;
mod pipeline;

pub use encoder::{CategoryEncoder, CategoryIndex, UNKNOWN_CODE};
pub use pipeline::{FeaturePipeline, FeatureTable, FeatureValue};
