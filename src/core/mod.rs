pub mod aggregator;
pub mod detector;
pub mod encoder;
pub mod enroll;
pub mod guardian;
pub mod matcher;
pub mod observer;
pub mod onnx;
pub mod perception;
pub mod pipeline;
pub mod session;
pub mod types;

pub use aggregator::SampleAggregator;
pub use enroll::capture_template;
pub use guardian::{Guardian, GuardianParts, GuardianTiming, Phase, Tick, TickAction};
pub use matcher::{DistanceMetric, Matcher, TemplateMatcher};
pub use observer::{AuthEvent, AuthObserver, LoggingObserver, NullObserver, RecordingObserver};
pub use perception::{Perception, PresenceSensor, VerdictStream};
pub use pipeline::{CameraPerception, CameraPresenceSensor, ModelSource};
pub use session::{AuthSession, CancelToken, SessionOutcome, SessionSettings, SessionState};
pub use types::{AuthResult, Encoding, FrameVerdict, MatchOutcome, Presence, Template};
