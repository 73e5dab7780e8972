use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceUnlockError {
    /// Camera busy, missing, or failed mid-capture.
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("No face template enrolled for user: {0}")]
    NoTemplate(String),

    #[error("No usable face seen before the deadline")]
    NoFaceTimeout,

    #[error("Face did not match the enrolled template")]
    NotMatched,

    /// Recognition backend (ONNX runtime or model files) is absent.
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceUnlockError {
    /// Errors that come from the capture device or the recognition backend.
    ///
    /// The guardian fails open on these; an authentication attempt denies.
    pub fn is_soft_sensor_failure(&self) -> bool {
        matches!(
            self,
            FaceUnlockError::SensorUnavailable(_)
                | FaceUnlockError::DependencyMissing(_)
                | FaceUnlockError::Ort(_)
                | FaceUnlockError::Image(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FaceUnlockError>;
