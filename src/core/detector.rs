use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::{Array4, CowArray};
use ort::Value;

use crate::common::config::DetectorConfig;
use crate::common::Result;
use crate::core::onnx::OnnxModel;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// YOLO-style single-class face detector.
pub struct FaceDetector {
    model: OnnxModel,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn load(model_path: &Path, config: &DetectorConfig, optimization_level: u32) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_detector", model_path, optimization_level)?,
            config: config.clone(),
        })
    }

    /// Faces at or above `min_confidence`, strongest first, in the
    /// coordinates of `image`.
    pub fn detect(&self, image: &GrayImage, min_confidence: f32) -> Result<Vec<FaceBox>> {
        let (in_w, in_h) = (self.config.input_width, self.config.input_height);
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let input = if image.width() == in_w && image.height() == in_h {
            luma_to_array(image)
        } else {
            let resized = DynamicImage::ImageLuma8(image.clone())
                .resize_exact(in_w, in_h, FilterType::Nearest)
                .to_luma8();
            luma_to_array(&resized)
        };

        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.model.session.allocator(), &cow_array)?;
        let outputs = self.model.session.run(vec![input_tensor])?;

        let Some(first) = outputs.first() else {
            tracing::warn!("Detector returned no outputs");
            return Ok(Vec::new());
        };
        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();

        let candidates = parse_predictions(&data, &shape, in_w as f32, in_h as f32);
        let mut faces = apply_nms(candidates, self.config.nms_iou);
        faces.retain(|face| face.confidence >= min_confidence);
        faces.truncate(self.config.max_faces);

        let scale_x = orig_width / in_w as f32;
        let scale_y = orig_height / in_h as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }
        Ok(faces)
    }

    pub fn detection_confidence(&self) -> f32 {
        self.config.detection_confidence
    }

    pub fn presence_confidence(&self) -> f32 {
        self.config.presence_confidence
    }
}

/// Normalise to [0,1] and replicate the single channel three times.
fn luma_to_array(gray: &GrayImage) -> Array4<f32> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let raw = gray.as_raw();
    let mut array = Array4::<f32>::zeros((1, 3, height, width));

    let norm_factor = 1.0 / 255.0;
    for y in 0..height {
        let row_offset = y * width;
        for x in 0..width {
            let value = raw[row_offset + x] as f32 * norm_factor;
            array[[0, 0, y, x]] = value;
            array[[0, 1, y, x]] = value;
            array[[0, 2, y, x]] = value;
        }
    }
    array
}

/// Decode raw YOLO output, `[1, N, 5+]` or transposed `[1, 5+, N]`, each
/// prediction being `cx, cy, w, h, confidence`. The shorter axis is taken to
/// be the per-prediction one.
pub fn parse_predictions(data: &[f32], shape: &[usize], input_w: f32, input_h: f32) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, transposed) = match shape {
        [_, a, b] if a < b => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Vec::new();
        }
    };
    if prediction_length < 4 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if transposed {
            data[field * num_predictions + i]
        } else {
            data[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        if confidence <= 0.001 {
            continue;
        }

        // Normalised coordinates come as fractions of the input size.
        let scale = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 {
            1.0
        } else {
            input_w
        };
        let (cx, cy, w, h) = (cx * scale, cy * scale, w * scale, h * scale);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_w);
        let y2 = (cy + h / 2.0).min(input_h);

        if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
            faces.push(FaceBox {
                x1,
                y1,
                x2,
                y2,
                confidence,
            });
        }
    }
    faces
}

/// Greedy non-maximum suppression; output is sorted by confidence.
pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width() * a.height() + b.width() * b.height() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
