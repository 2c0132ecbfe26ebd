use image::{DynamicImage, GenericImageView};

use crate::error::CaptureError;

/// Face bounding box reported by an external detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

impl Detection {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            bbox: [x, y, w, h],
            score: 1.0,
        }
    }

    pub fn area(&self) -> f32 {
        self.bbox[2].max(0.0) * self.bbox[3].max(0.0)
    }
}

/// Seam for the external face detector.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, img: &DynamicImage) -> Result<Vec<Detection>, CaptureError>;
}

/// Treats the whole frame as the face region, for input that was already
/// cropped upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFrame;

impl FaceLocator for WholeFrame {
    fn locate(&self, img: &DynamicImage) -> Result<Vec<Detection>, CaptureError> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Ok(vec![]);
        }
        Ok(vec![Detection::new(0.0, 0.0, w as f32, h as f32)])
    }
}

/// A region fixed ahead of time, e.g. supplied on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedRegion(pub Detection);

impl FaceLocator for FixedRegion {
    fn locate(&self, _img: &DynamicImage) -> Result<Vec<Detection>, CaptureError> {
        Ok(vec![self.0.clone()])
    }
}

/// Pick the largest detection by box area. Earlier detections win ties.
pub fn select_largest(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best, d| match best {
        Some(b) if b.area() >= d.area() => Some(b),
        _ => Some(d),
    })
}

/// Crop the detection out of the image, grown by `padding` pixels on each
/// side and clipped to the image bounds.
pub fn crop_padded(
    img: &DynamicImage,
    detection: &Detection,
    padding: u32,
) -> Result<DynamicImage, CaptureError> {
    let (img_w, img_h) = img.dimensions();
    let [x, y, w, h] = detection.bbox;
    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0
    {
        return Err(CaptureError::MalformedInput(format!(
            "invalid face region {:?}",
            detection.bbox
        )));
    }

    let pad = padding as f32;
    let x1 = (x - pad).max(0.0).floor() as u32;
    let y1 = (y - pad).max(0.0).floor() as u32;
    let x2 = ((x + w + pad).min(img_w as f32).ceil() as u32).min(img_w);
    let y2 = ((y + h + pad).min(img_h as f32).ceil() as u32).min(img_h);

    if x2 <= x1 || y2 <= y1 {
        return Err(CaptureError::MalformedInput(format!(
            "face region {:?} lies outside the {}x{} image",
            detection.bbox, img_w, img_h
        )));
    }

    Ok(img.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn canvas(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(w, h))
    }

    #[test]
    fn test_select_largest() {
        let detections = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0),
            Detection::new(5.0, 5.0, 30.0, 20.0),
            Detection::new(50.0, 50.0, 20.0, 30.0),
        ];
        assert_eq!(select_largest(&detections), Some(&detections[1]));
        assert_eq!(select_largest(&[]), None);
    }

    #[test]
    fn test_crop_padded_clips_to_bounds() {
        let img = canvas(200, 100);
        let crop = crop_padded(&img, &Detection::new(10.0, 10.0, 50.0, 50.0), 20).unwrap();
        assert_eq!(crop.dimensions(), (80, 80));

        let crop = crop_padded(&img, &Detection::new(150.0, 40.0, 40.0, 40.0), 20).unwrap();
        assert_eq!(crop.dimensions(), (70, 80));
    }

    #[test]
    fn test_crop_outside_image() {
        let img = canvas(50, 50);
        let result = crop_padded(&img, &Detection::new(100.0, 100.0, 10.0, 10.0), 0);
        assert!(matches!(result, Err(CaptureError::MalformedInput(_))));
    }

    #[test]
    fn test_whole_frame() {
        let found = WholeFrame.locate(&canvas(64, 32)).unwrap();
        assert_eq!(found, vec![Detection::new(0.0, 0.0, 64.0, 32.0)]);
        assert!(WholeFrame.locate(&canvas(0, 0)).unwrap().is_empty());
    }
}
