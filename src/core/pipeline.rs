//! Camera + models wired into frame verdicts and presence polls.

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::camera::Camera;
use crate::common::config::{CameraConfig, DetectorConfig, RecognizerConfig};
use crate::common::{Config, Result};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::encoder::FaceEncoder;
use crate::core::matcher::{DistanceMetric, Matcher, TemplateMatcher};
use crate::core::perception::{Perception, PresenceSensor, VerdictStream};
use crate::core::types::{Encoding, FrameVerdict, Presence, Template};

/// Detection and encoding, whatever backs them.
pub trait FaceModels {
    fn detect(&self, image: &GrayImage, min_confidence: f32) -> Result<Vec<FaceBox>>;
    fn encode(&self, image: &GrayImage, face: &FaceBox) -> Result<Encoding>;
    /// Confidence a face needs to count for matching.
    fn strict_confidence(&self) -> f32;
    /// Lower bar for "someone is there" fallbacks.
    fn relaxed_confidence(&self) -> f32;
}

pub struct OnnxFaceModels {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl FaceModels for OnnxFaceModels {
    fn detect(&self, image: &GrayImage, min_confidence: f32) -> Result<Vec<FaceBox>> {
        self.detector.detect(image, min_confidence)
    }

    fn encode(&self, image: &GrayImage, face: &FaceBox) -> Result<Encoding> {
        self.encoder.encode(image, face)
    }

    fn strict_confidence(&self) -> f32 {
        self.detector.detection_confidence()
    }

    fn relaxed_confidence(&self) -> f32 {
        self.detector.presence_confidence()
    }
}

/// Where the models live and how to build them.
#[derive(Debug, Clone)]
pub struct ModelSource {
    detector_path: PathBuf,
    encoder_path: PathBuf,
    detector: DetectorConfig,
    recognizer: RecognizerConfig,
    optimization_level: u32,
}

impl ModelSource {
    pub fn from_config(config: &Config, models_dir: &Path) -> Self {
        let (detector_path, encoder_path) = config.models.resolved(models_dir);
        Self {
            detector_path,
            encoder_path,
            detector: config.detector.clone(),
            recognizer: config.recognizer.clone(),
            optimization_level: config.performance.optimization_level,
        }
    }

    pub fn load(&self) -> Result<OnnxFaceModels> {
        Ok(OnnxFaceModels {
            detector: FaceDetector::load(&self.detector_path, &self.detector, self.optimization_level)?,
            encoder: FaceEncoder::load(&self.encoder_path, &self.recognizer, self.optimization_level)?,
        })
    }
}

/// Classify one frame for authentication and enrollment.
pub fn frame_verdict(models: &dyn FaceModels, image: &GrayImage) -> Result<FrameVerdict> {
    let faces = models.detect(image, models.strict_confidence())?;
    match faces.as_slice() {
        [] => Ok(FrameVerdict::NoFace),
        [face] => Ok(FrameVerdict::OneFace(models.encode(image, face)?)),
        _ => Ok(FrameVerdict::MultipleFaces),
    }
}

/// Presence cascade: a matching face, then any confident face, then a weak
/// detection (turned heads), then a weak detection on the mirrored frame.
pub fn classify_presence(
    models: &dyn FaceModels,
    image: &GrayImage,
    template: &Template,
    matcher: &dyn Matcher,
) -> Result<Presence> {
    let faces = models.detect(image, models.strict_confidence())?;
    for face in &faces {
        let encoding = models.encode(image, face)?;
        let outcome = matcher.compare(&encoding, &template.encodings);
        tracing::debug!("Presence match distance {:.3}", outcome.distance);
        if outcome.matched {
            return Ok(Presence::Authorized);
        }
    }
    if !faces.is_empty() {
        return Ok(Presence::PresentUnauthorized);
    }

    if !models.detect(image, models.relaxed_confidence())?.is_empty() {
        tracing::debug!("Weak face detection, someone is there");
        return Ok(Presence::PresentUnauthorized);
    }

    let mirrored = image::imageops::flip_horizontal(image);
    if !models.detect(&mirrored, models.relaxed_confidence())?.is_empty() {
        tracing::debug!("Face found on mirrored frame");
        return Ok(Presence::PresentUnauthorized);
    }

    Ok(Presence::Absent)
}

/// Real camera with ONNX models, loaded on first use.
pub struct CameraPerception {
    camera: CameraConfig,
    source: ModelSource,
    models: Option<OnnxFaceModels>,
}

impl CameraPerception {
    pub fn new(camera: CameraConfig, source: ModelSource) -> Self {
        Self {
            camera,
            source,
            models: None,
        }
    }
}

fn loaded<'m>(slot: &'m mut Option<OnnxFaceModels>, source: &ModelSource) -> Result<&'m OnnxFaceModels> {
    let models = match slot.take() {
        Some(models) => models,
        None => source.load()?,
    };
    Ok(slot.insert(models))
}

struct CameraVerdicts<'a> {
    camera: Camera,
    models: &'a OnnxFaceModels,
}

impl Perception for CameraPerception {
    fn open(&mut self) -> Result<Box<dyn VerdictStream + '_>> {
        let models = loaded(&mut self.models, &self.source)?;
        let camera = Camera::open(&self.camera)?;
        Ok(Box::new(CameraVerdicts { camera, models }))
    }
}

impl VerdictStream for CameraVerdicts<'_> {
    fn next_verdict(&mut self) -> Result<FrameVerdict> {
        let frame = self.camera.capture()?;
        frame_verdict(self.models, &frame)
    }

    fn grab(&mut self) -> Result<()> {
        self.camera.skip()
    }
}

/// Guardian poll: grab a settled frame, release the camera, then analyse.
pub struct CameraPresenceSensor {
    camera: CameraConfig,
    source: ModelSource,
    metric: DistanceMetric,
    models: Option<OnnxFaceModels>,
}

impl CameraPresenceSensor {
    pub fn new(camera: CameraConfig, source: ModelSource, metric: DistanceMetric) -> Self {
        Self {
            camera,
            source,
            metric,
            models: None,
        }
    }
}

/// The camera is closed again before this returns.
fn settled_frame(config: &CameraConfig) -> Result<GrayImage> {
    let mut camera = Camera::open(config)?;
    for _ in 0..config.warmup_frames {
        camera.skip()?;
    }
    camera.capture()
}

impl PresenceSensor for CameraPresenceSensor {
    fn check(&mut self, template: &Template, threshold: f32) -> Result<Presence> {
        let models = loaded(&mut self.models, &self.source)?;
        let frame = settled_frame(&self.camera)?;
        let matcher = TemplateMatcher::new(threshold, self.metric);
        classify_presence(models, &frame, template, &matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FaceUnlockError;
    use image::Luma;

    /// Sees a face wherever the left column is bright; faces on the right
    /// edge are only "visible" once mirrored.
    struct FakeModels {
        strict_faces: usize,
        weak_left: bool,
        weak_right: bool,
        encoding: Encoding,
    }

    fn fake() -> FakeModels {
        FakeModels {
            strict_faces: 0,
            weak_left: false,
            weak_right: false,
            encoding: vec![0.0, 0.0],
        }
    }

    fn a_box() -> FaceBox {
        FaceBox {
            x1: 0.0,
            y1: 0.0,
            x2: 50.0,
            y2: 50.0,
            confidence: 0.9,
        }
    }

    impl FaceModels for FakeModels {
        fn detect(&self, image: &GrayImage, min_confidence: f32) -> Result<Vec<FaceBox>> {
            if min_confidence >= self.strict_confidence() {
                return Ok(vec![a_box(); self.strict_faces]);
            }
            let left_bright = image.get_pixel(0, 0)[0] > 0;
            let weak = if left_bright { self.weak_left } else { self.weak_right };
            Ok(if weak { vec![a_box()] } else { Vec::new() })
        }

        fn encode(&self, _image: &GrayImage, _face: &FaceBox) -> Result<Encoding> {
            Ok(self.encoding.clone())
        }

        fn strict_confidence(&self) -> f32 {
            0.5
        }

        fn relaxed_confidence(&self) -> f32 {
            0.25
        }
    }

    struct Broken;

    impl FaceModels for Broken {
        fn detect(&self, _image: &GrayImage, _min: f32) -> Result<Vec<FaceBox>> {
            Err(FaceUnlockError::DependencyMissing("onnxruntime".into()))
        }
        fn encode(&self, _image: &GrayImage, _face: &FaceBox) -> Result<Encoding> {
            unreachable!()
        }
        fn strict_confidence(&self) -> f32 {
            0.5
        }
        fn relaxed_confidence(&self) -> f32 {
            0.25
        }
    }

    /// Bright pixel in the top-left corner only.
    fn frame() -> GrayImage {
        let mut image = GrayImage::new(4, 4);
        image.put_pixel(0, 0, Luma([255]));
        image
    }

    fn template() -> Template {
        Template::new(vec![vec![0.0, 0.0]])
    }

    fn matcher() -> TemplateMatcher {
        TemplateMatcher::new(0.55, DistanceMetric::Euclidean)
    }

    #[test]
    fn test_verdict_counts_faces() {
        let mut models = fake();
        assert_eq!(frame_verdict(&models, &frame()).unwrap(), FrameVerdict::NoFace);
        models.strict_faces = 1;
        assert_eq!(
            frame_verdict(&models, &frame()).unwrap(),
            FrameVerdict::OneFace(vec![0.0, 0.0])
        );
        models.strict_faces = 2;
        assert_eq!(frame_verdict(&models, &frame()).unwrap(), FrameVerdict::MultipleFaces);
    }

    #[test]
    fn test_matching_face_is_authorized() {
        let mut models = fake();
        models.strict_faces = 1;
        let presence = classify_presence(&models, &frame(), &template(), &matcher()).unwrap();
        assert_eq!(presence, Presence::Authorized);
    }

    #[test]
    fn test_stranger_is_present_but_unauthorized() {
        let mut models = fake();
        models.strict_faces = 1;
        models.encoding = vec![1.0, 1.0];
        let presence = classify_presence(&models, &frame(), &template(), &matcher()).unwrap();
        assert_eq!(presence, Presence::PresentUnauthorized);
    }

    #[test]
    fn test_weak_and_mirrored_fallbacks() {
        let mut models = fake();
        models.weak_left = true;
        assert_eq!(
            classify_presence(&models, &frame(), &template(), &matcher()).unwrap(),
            Presence::PresentUnauthorized
        );

        let mut models = fake();
        models.weak_right = true;
        assert_eq!(
            classify_presence(&models, &frame(), &template(), &matcher()).unwrap(),
            Presence::PresentUnauthorized
        );

        assert_eq!(
            classify_presence(&fake(), &frame(), &template(), &matcher()).unwrap(),
            Presence::Absent
        );
    }

    #[test]
    fn test_backend_failure_propagates() {
        let err = classify_presence(&Broken, &frame(), &template(), &matcher()).unwrap_err();
        assert!(err.is_soft_sensor_failure());
    }
}
