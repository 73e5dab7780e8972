use std::fs;
use std::path::PathBuf;

use crate::common::error::Result;

pub enum RunMode {
    Development(PathBuf), // Base directory for dev mode
    System,
}

pub struct Paths {
    mode: RunMode,
}

impl Paths {
    pub fn new(dev: bool) -> Result<Self> {
        if dev {
            Self::development(PathBuf::from("./dev_data"))
        } else {
            Ok(Self { mode: RunMode::System })
        }
    }

    pub fn development(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(base_dir.join("encodings"))?;
        tracing::debug!("Development mode - using local directory: {}", base_dir.display());
        Ok(Self {
            mode: RunMode::Development(base_dir),
        })
    }

    /// Install-time TOML settings.
    pub fn config_file(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("face-unlock.toml"),
            RunMode::System => PathBuf::from("/etc/face-unlock/face-unlock.toml"),
        }
    }

    /// Flat key/value settings written by the settings panel.
    pub fn runtime_config_file(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("config.conf"),
            RunMode::System => PathBuf::from("/etc/face-unlock/config.conf"),
        }
    }

    pub fn templates_dir(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(base) => base.join("encodings"),
            RunMode::System => PathBuf::from("/etc/face-unlock/encodings"),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(_) => PathBuf::from("./models"),
            RunMode::System => PathBuf::from("/usr/share/face-unlock/models"),
        }
    }

    pub fn ui_program(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(_) => PathBuf::from("./ui/face-unlock-ui"),
            RunMode::System => PathBuf::from("/usr/local/bin/face-unlock-ui"),
        }
    }

    /// The authentication boundary binary, for the isolated runner.
    pub fn auth_program(&self) -> PathBuf {
        match &self.mode {
            RunMode::Development(_) => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("face-unlock-auth")))
                .unwrap_or_else(|| PathBuf::from("face-unlock-auth")),
            RunMode::System => PathBuf::from("/usr/local/bin/face-unlock-auth"),
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.mode, RunMode::Development(_))
    }
}
