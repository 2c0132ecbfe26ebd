use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, ArrayView4, Axis};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};
use parking_lot::Mutex;

use crate::embedding::Embedding;
use crate::error::CaptureError;
use crate::source::{ChannelOrder, EmbeddingSource, ModelConfig, TensorLayout};

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Learned embedding model run through ONNX Runtime.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex
/// and one `OnnxSource` can be shared by every request handler.
pub struct OnnxSource {
    session: Mutex<Session>,
    input_size: u32,
    layout: TensorLayout,
    channel_order: ChannelOrder,
}

impl OnnxSource {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let path = config
            .path
            .as_deref()
            .context("no model path configured")?;
        if config.input_size == 0 {
            anyhow::bail!("model input size must be positive");
        }
        let session = session_builder()?
            .commit_from_file(path)
            .with_context(|| format!("load embedding model {}", path.display()))?;
        log::info!("loaded embedding model {}", path.display());

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            layout: config.layout,
            channel_order: config.channel_order,
        })
    }

    fn run(&self, face: &DynamicImage) -> Result<Embedding> {
        let input = preprocess(face, self.input_size, self.layout, self.channel_order)?;
        let input_tensor = Value::from_array(input)?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        log::debug!("model output rank {} len {}", shape.len(), data.len());

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok(Embedding::new(pool_features(&dims, data, self.layout)?))
    }
}

impl EmbeddingSource for OnnxSource {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding, CaptureError> {
        self.run(face).map_err(CaptureError::Internal)
    }
}

/// Resize and scale pixels to [-1, 1] (MobileNetV2 preprocessing), laid out
/// as the model expects.
fn preprocess(
    face: &DynamicImage,
    size: u32,
    layout: TensorLayout,
    order: ChannelOrder,
) -> Result<Array4<f32>> {
    let rgb = face
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let side = size as usize;
    let channel_index = |c: usize| match order {
        ChannelOrder::Rgb => c,
        ChannelOrder::Bgr => 2 - c,
    };

    let shape = match layout {
        TensorLayout::Nhwc => (1, side, side, 3),
        TensorLayout::Nchw => (1, 3, side, side),
    };
    let mut input = Array4::<f32>::zeros(shape);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let v = f32::from(pixel[channel_index(c)]) / 127.5 - 1.0;
            match layout {
                TensorLayout::Nhwc => input[[0, y, x, c]] = v,
                TensorLayout::Nchw => input[[0, c, y, x]] = v,
            }
        }
    }
    Ok(input)
}

/// Global average pooling over the spatial axes of a rank-4 feature map laid
/// out like the model input. Other ranks are taken as already pooled.
fn pool_features(dims: &[usize], data: &[f32], layout: TensorLayout) -> Result<Vec<f32>> {
    let &[n, a, b, c] = dims else {
        return Ok(data.to_vec());
    };
    let maps = ArrayView4::from_shape((n, a, b, c), data).context("model output shape")?;
    let (h_axis, w_axis) = match layout {
        TensorLayout::Nhwc => (1, 2),
        TensorLayout::Nchw => (2, 3),
    };
    let pooled = maps
        .mean_axis(Axis(w_axis))
        .and_then(|m| m.mean_axis(Axis(h_axis)))
        .context("empty feature map")?;
    Ok(pooled.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_layouts() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 51])));

        let nhwc = preprocess(&img, 4, TensorLayout::Nhwc, ChannelOrder::Rgb).unwrap();
        assert_eq!(nhwc.shape(), &[1, 4, 4, 3]);
        assert_eq!(nhwc[[0, 2, 1, 0]], 1.0);
        assert_eq!(nhwc[[0, 2, 1, 1]], -1.0);

        let nchw = preprocess(&img, 4, TensorLayout::Nchw, ChannelOrder::Bgr).unwrap();
        assert_eq!(nchw.shape(), &[1, 3, 4, 4]);
        assert_eq!(nchw[[0, 2, 3, 3]], 1.0);
        assert_eq!(nchw[[0, 1, 0, 0]], -1.0);
    }

    #[test]
    fn test_pool_features() {
        // 1 x 2 x 2 x 3 NHWC map: channel c holds c + {0, 1, 2, 3}.
        let nhwc: Vec<f32> = (0..4)
            .flat_map(|p| (0..3).map(move |c| (c + p) as f32))
            .collect();
        let pooled = pool_features(&[1, 2, 2, 3], &nhwc, TensorLayout::Nhwc).unwrap();
        assert_eq!(pooled, vec![1.5, 2.5, 3.5]);

        // Same map as 1 x 3 x 2 x 2 NCHW.
        let nchw: Vec<f32> = (0..3)
            .flat_map(|c| (0..4).map(move |p| (c + p) as f32))
            .collect();
        let pooled = pool_features(&[1, 3, 2, 2], &nchw, TensorLayout::Nchw).unwrap();
        assert_eq!(pooled, vec![1.5, 2.5, 3.5]);

        let flat = pool_features(&[1, 4], &[1.0, 2.0, 3.0, 4.0], TensorLayout::Nhwc).unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(pool_features(&[1, 2, 2, 3], &[0.0; 5], TensorLayout::Nhwc).is_err());
    }

    #[test]
    fn test_missing_model_path() {
        assert!(OnnxSource::new(&ModelConfig::default()).is_err());
    }
}
