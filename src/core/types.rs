use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Encoding = Vec<f32>;

/// Enrolled reference encodings for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub encodings: Vec<Encoding>,
}

impl Template {
    pub fn new(encodings: Vec<Encoding>) -> Self {
        Self { encodings }
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }
}

/// Per-tick classification of one capture frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameVerdict {
    NoFace,
    MultipleFaces,
    OneFace(Encoding),
}

impl FrameVerdict {
    pub fn from_encodings(mut encodings: Vec<Encoding>) -> Self {
        match encodings.len() {
            0 => FrameVerdict::NoFace,
            1 => FrameVerdict::OneFace(encodings.remove(0)),
            _ => FrameVerdict::MultipleFaces,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Minimum distance over all reference encodings.
    pub distance: f32,
}

impl MatchOutcome {
    pub fn confidence(&self) -> f32 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }
}

/// Result of a single guardian presence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Authorized,
    PresentUnauthorized,
    Absent,
}

/// Terminal outcome of an authentication attempt. Only `Match` grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthResult {
    Match,
    NoMatch,
    NoFace,
    CameraError,
    NoEncodings,
    Timeout,
    Aborted,
}

impl AuthResult {
    pub fn grants_access(self) -> bool {
        self == AuthResult::Match
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthResult::Match => "match",
            AuthResult::NoMatch => "no_match",
            AuthResult::NoFace => "no_face",
            AuthResult::CameraError => "camera_error",
            AuthResult::NoEncodings => "no_encodings",
            AuthResult::Timeout => "timeout",
            AuthResult::Aborted => "aborted",
        }
    }

    /// Process exit code of the authentication boundary.
    pub fn exit_code(self) -> i32 {
        if self.grants_access() { 0 } else { 1 }
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "match" => AuthResult::Match,
            "no_match" => AuthResult::NoMatch,
            "no_face" => AuthResult::NoFace,
            "camera_error" => AuthResult::CameraError,
            "no_encodings" => AuthResult::NoEncodings,
            "timeout" => AuthResult::Timeout,
            "aborted" => AuthResult::Aborted,
            other => return Err(format!("unknown auth result: {}", other)),
        })
    }
}
