use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::descriptor::{DescriptorConfig, FeatureDescriptor};
use crate::embedding::Embedding;
use crate::error::CaptureError;

/// Anything that turns a cropped face into a raw embedding.
///
/// Chosen once when the pipeline is built; every embedding compared against
/// a given enrollment store must come from the same kind of source.
pub trait EmbeddingSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Length of the embeddings this source produces, if fixed up front.
    fn dimension(&self) -> Option<usize>;

    fn embed(&self, face: &DynamicImage) -> Result<Embedding, CaptureError>;
}

/// Fallback source backed by [`FeatureDescriptor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorSource {
    descriptor: FeatureDescriptor,
}

impl DescriptorSource {
    pub fn new(config: DescriptorConfig) -> Self {
        Self {
            descriptor: FeatureDescriptor::new(config),
        }
    }
}

impl EmbeddingSource for DescriptorSource {
    fn name(&self) -> &'static str {
        "descriptor"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.descriptor.config().descriptor_len())
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding, CaptureError> {
        Ok(self.descriptor.extract(face)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Learned model when one is configured and compiled in, descriptor otherwise.
    #[default]
    Auto,
    Descriptor,
    Onnx,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Learned model settings. Defaults suit a MobileNetV2 feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: Option<PathBuf>,
    pub input_size: u32,
    pub layout: TensorLayout,
    pub channel_order: ChannelOrder,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            input_size: 224,
            layout: TensorLayout::Nhwc,
            channel_order: ChannelOrder::Rgb,
        }
    }
}

/// Resolve the configured extractor into a concrete source.
pub fn build_source(
    kind: ExtractorKind,
    descriptor: DescriptorConfig,
    model: &ModelConfig,
) -> Result<Box<dyn EmbeddingSource>> {
    match kind {
        ExtractorKind::Descriptor => Ok(Box::new(DescriptorSource::new(descriptor))),
        ExtractorKind::Onnx => onnx_source(model),
        ExtractorKind::Auto => {
            if model.path.is_none() {
                log::debug!("no model configured, using fallback descriptor");
                return Ok(Box::new(DescriptorSource::new(descriptor)));
            }
            match onnx_source(model) {
                Ok(source) => Ok(source),
                Err(e) => {
                    log::warn!("learned model unavailable ({e:#}), using fallback descriptor");
                    Ok(Box::new(DescriptorSource::new(descriptor)))
                }
            }
        }
    }
}

#[cfg(feature = "onnx")]
fn onnx_source(model: &ModelConfig) -> Result<Box<dyn EmbeddingSource>> {
    Ok(Box::new(crate::model::OnnxSource::new(model)?))
}

#[cfg(not(feature = "onnx"))]
fn onnx_source(_model: &ModelConfig) -> Result<Box<dyn EmbeddingSource>> {
    anyhow::bail!("built without the `onnx` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_descriptor_source() {
        let source = DescriptorSource::default();
        assert_eq!(source.name(), "descriptor");
        assert_eq!(source.dimension(), Some(256));

        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([10])));
        assert_eq!(source.embed(&img).unwrap().len(), 256);
    }

    #[test]
    fn test_descriptor_source_maps_errors() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let err = DescriptorSource::default().embed(&img).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedInput(_)));
    }

    #[test]
    fn test_auto_without_model_falls_back() {
        let source =
            build_source(ExtractorKind::Auto, DescriptorConfig::default(), &ModelConfig::default())
                .unwrap();
        assert_eq!(source.name(), "descriptor");
    }

    #[test]
    fn test_auto_with_missing_model_falls_back() {
        let model = ModelConfig {
            path: Some(PathBuf::from("/nonexistent/model.onnx")),
            ..ModelConfig::default()
        };
        let source =
            build_source(ExtractorKind::Auto, DescriptorConfig::default(), &model).unwrap();
        assert_eq!(source.name(), "descriptor");
    }

    #[test]
    fn test_explicit_onnx_without_model_fails() {
        let result =
            build_source(ExtractorKind::Onnx, DescriptorConfig::default(), &ModelConfig::default());
        assert!(result.is_err());
    }
}
