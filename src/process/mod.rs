pub mod command;
pub mod feedback;
pub mod lock;
pub mod manager;
pub mod session_env;

pub use command::{run_bounded, CommandOutput};
pub use feedback::{Feedback, FeedbackSink, NullFeedback, UiFeedback};
pub use lock::{DesktopLocker, SessionLock};
pub use manager::{ProcessHandle, ProcessKind, ProcessManager, SpawnError};
pub use session_env::{SessionEnv, SessionEnvResolver};
