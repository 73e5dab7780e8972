use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::{Array4, CowArray};
use ort::Value;

use crate::common::config::RecognizerConfig;
use crate::common::Result;
use crate::core::detector::FaceBox;
use crate::core::onnx::OnnxModel;
use crate::core::types::Encoding;

/// Turns a detected face into an embedding vector.
pub struct FaceEncoder {
    model: OnnxModel,
    config: RecognizerConfig,
}

impl FaceEncoder {
    pub fn load(model_path: &Path, config: &RecognizerConfig, optimization_level: u32) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_encoder", model_path, optimization_level)?,
            config: config.clone(),
        })
    }

    pub fn encode(&self, image: &GrayImage, face: &FaceBox) -> Result<Encoding> {
        let size = self.config.input_size;
        let crop = crop_face(image, face);
        let resized = DynamicImage::ImageLuma8(crop)
            .resize_exact(size, size, FilterType::Triangle)
            .to_luma8();

        let input = preprocess(&resized, self.config.normalization_value);
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.model.session.allocator(), &cow_array)?;
        let outputs = self.model.session.run(vec![input_tensor])?;

        let Some(first) = outputs.first() else {
            return Err(anyhow::anyhow!("Encoder returned no outputs").into());
        };
        let embedding = first.try_extract::<f32>()?.view().iter().copied().collect();
        Ok(embedding)
    }
}

/// Face region clamped to the image bounds.
pub fn crop_face(image: &GrayImage, face: &FaceBox) -> GrayImage {
    let x = (face.x1.max(0.0) as u32).min(image.width().saturating_sub(1));
    let y = (face.y1.max(0.0) as u32).min(image.height().saturating_sub(1));
    let width = (face.width().max(1.0) as u32).min(image.width() - x).max(1);
    let height = (face.height().max(1.0) as u32).min(image.height() - y).max(1);
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}

/// Single-channel `(px - norm) / norm`, shape `[1, 1, size, size]`.
fn preprocess(gray: &GrayImage, norm: f32) -> Array4<f32> {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut array = Array4::<f32>::zeros((1, 1, height, width));
    for (x, y, pixel) in gray.enumerate_pixels() {
        array[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 - norm) / norm;
    }
    array
}
