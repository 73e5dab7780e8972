pub mod clock;
pub mod config;
pub mod error;
pub mod paths;
pub mod runtime;
pub mod users;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{FaceUnlockError, Result};
pub use paths::Paths;
pub use runtime::{
    ConfigProvider, FileConfigProvider, RuntimeConfig, StaticConfigProvider, MAX_TIMEOUT_SECS,
};
pub use users::{current_uid, current_username, is_root, lookup_user, validate_username, UserIds};
