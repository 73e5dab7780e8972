use std::time::Duration;

/// Advisory progress of an authentication attempt. Observers never influence
/// the outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    Scanning,
    NoFace { elapsed: Duration },
    NoMatch { distance: f32 },
    Success { confidence: f32 },
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::Scanning => "scanning",
            AuthEvent::NoFace { .. } => "no_face",
            AuthEvent::NoMatch { .. } => "no_match",
            AuthEvent::Success { .. } => "success",
        }
    }
}

pub trait AuthObserver {
    fn on_event(&mut self, event: &AuthEvent);
}

pub struct NullObserver;

impl AuthObserver for NullObserver {
    fn on_event(&mut self, _event: &AuthEvent) {}
}

/// Writes progress lines through `tracing`.
pub struct LoggingObserver;

impl AuthObserver for LoggingObserver {
    fn on_event(&mut self, event: &AuthEvent) {
        match event {
            AuthEvent::Scanning => tracing::info!("Scanning for face..."),
            AuthEvent::NoFace { elapsed } => {
                tracing::debug!("Looking... ({:.1}s)", elapsed.as_secs_f32())
            }
            AuthEvent::NoMatch { distance } => {
                tracing::info!("Face not matched (distance={:.3})", distance)
            }
            AuthEvent::Success { confidence } => {
                tracing::info!("Face matched ({:.1}% confidence)", confidence * 100.0)
            }
        }
    }
}

/// Keeps every event, for tests and for summarising an attempt.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<AuthEvent>,
}

impl AuthObserver for RecordingObserver {
    fn on_event(&mut self, event: &AuthEvent) {
        self.events.push(event.clone());
    }
}

impl RecordingObserver {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(AuthEvent::name).collect()
    }
}
