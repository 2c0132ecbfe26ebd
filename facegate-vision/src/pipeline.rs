use image::DynamicImage;

use crate::embedding::{normalize, Embedding};
use crate::error::CaptureError;
use crate::region::{self, Detection, FaceLocator, WholeFrame};
use crate::source::{DescriptorSource, EmbeddingSource};

/// Padding in pixels added around a detected face before extraction.
pub const DEFAULT_PADDING: u32 = 20;

/// Full pipeline: locate face → crop → extract → normalize.
///
/// Built once and then only borrowed, so a single instance can serve many
/// concurrent requests.
pub struct Pipeline {
    locator: Box<dyn FaceLocator>,
    source: Box<dyn EmbeddingSource>,
    padding: u32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Box::new(WholeFrame), Box::new(DescriptorSource::default()))
    }
}

impl Pipeline {
    pub fn new(locator: Box<dyn FaceLocator>, source: Box<dyn EmbeddingSource>) -> Self {
        Self {
            locator,
            source,
            padding: DEFAULT_PADDING,
        }
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_locator(mut self, locator: Box<dyn FaceLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Process an image: pick the largest face and return it with its
    /// normalized embedding.
    pub fn process_image(
        &self,
        img: &DynamicImage,
    ) -> Result<(Detection, Embedding), CaptureError> {
        let detections = self.locator.locate(img)?;
        let best = region::select_largest(&detections).ok_or(CaptureError::NoFace)?;
        log::debug!(
            "{} face(s) located, using bbox {:?}",
            detections.len(),
            best.bbox
        );

        let face = region::crop_padded(img, best, self.padding)?;
        let raw = self.source.embed(&face)?;
        if let Some(expected) = self.source.dimension() {
            if raw.len() != expected {
                return Err(CaptureError::Internal(anyhow::anyhow!(
                    "{} produced {} values, expected {}",
                    self.source.name(),
                    raw.len(),
                    expected
                )));
            }
        }

        Ok((best.clone(), normalize(&raw)))
    }

    /// Process and return only the embedding.
    pub fn extract_embedding(&self, img: &DynamicImage) -> Result<Embedding, CaptureError> {
        let (_detection, embedding) = self.process_image(img)?;
        Ok(embedding)
    }

    /// Decode encoded image bytes and extract their embedding.
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<Embedding, CaptureError> {
        let img = image::load_from_memory(bytes)?;
        self.extract_embedding(&img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::FixedRegion;

    #[test]
    fn test_pipeline_creation() {
        let pipeline = Pipeline::default();
        assert_eq!(pipeline.source_name(), "descriptor");
    }

    struct NoFaces;

    impl FaceLocator for NoFaces {
        fn locate(&self, _img: &DynamicImage) -> Result<Vec<Detection>, CaptureError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_no_face_is_distinct() {
        let pipeline = Pipeline::default().with_locator(Box::new(NoFaces));
        let img = DynamicImage::new_rgb8(32, 32);
        assert!(matches!(
            pipeline.extract_embedding(&img),
            Err(CaptureError::NoFace)
        ));
    }

    #[test]
    fn test_region_outside_image_is_malformed() {
        let pipeline = Pipeline::default()
            .with_locator(Box::new(FixedRegion(Detection::new(500.0, 500.0, 10.0, 10.0))))
            .with_padding(0);
        let img = DynamicImage::new_rgb8(32, 32);
        assert!(matches!(
            pipeline.extract_embedding(&img),
            Err(CaptureError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_encoded_bytes_match_decoded_image() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_fn(40, 40, |x, y| {
            image::Luma([if (x / 5 + y / 5) % 2 == 0 { 30 } else { 220 }])
        }));
        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();

        let pipeline = Pipeline::default();
        assert_eq!(
            pipeline.extract_from_bytes(png.get_ref()).unwrap(),
            pipeline.extract_embedding(&img).unwrap()
        );
    }

    #[test]
    fn test_garbage_bytes_are_malformed() {
        let pipeline = Pipeline::default();
        assert!(matches!(
            pipeline.extract_from_bytes(b"definitely not an image"),
            Err(CaptureError::MalformedInput(_))
        ));
    }
}
