pub mod boundary;
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod process;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use boundary::{AuthReport, IsolatedAuthenticator};
pub use common::{Config, FaceUnlockError, Paths, Result, RuntimeConfig};
pub use core::{AuthResult, AuthSession, Guardian, Presence, Template};
pub use storage::{TemplateSource, TemplateStore};
