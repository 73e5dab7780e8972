//! Wiring shared by the binaries: logging, configuration and the concrete
//! camera, lock and feedback implementations behind the core traits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::common::{
    current_uid, lookup_user, Config, ConfigProvider, FileConfigProvider, Paths, Result,
    RuntimeConfig, SystemClock,
};
use crate::core::{
    AuthObserver, AuthSession, CameraPerception, CameraPresenceSensor, CancelToken, Guardian,
    GuardianParts, GuardianTiming, ModelSource, SessionOutcome, SessionSettings, TemplateMatcher,
};
use crate::process::{DesktopLocker, FeedbackSink, NullFeedback, SessionEnvResolver, UiFeedback};
use crate::storage::{TemplateSource, TemplateStore};

/// Raised by SIGTERM/SIGINT once [`install_signal_handlers`] has run.
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    }
}

/// A cancel token that fires when [`SHUTDOWN`] is raised.
pub fn signal_cancel_token() -> CancelToken {
    let token = CancelToken::new();
    let watched = token.clone();
    std::thread::spawn(move || {
        while !SHUTDOWN.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }
        watched.cancel();
    });
    token
}

/// Logs go to stderr; stdout is reserved for results.
pub fn init_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}

/// Resolved paths plus the static configuration.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
}

impl Context {
    pub fn load(dev: bool) -> Result<Self> {
        let paths = Paths::new(dev)?;
        let config = Config::load_from_path(&paths.config_file())?;
        Ok(Self { paths, config })
    }

    pub fn store(&self) -> TemplateStore {
        TemplateStore::new(self.paths.templates_dir())
    }

    pub fn runtime(&self) -> RuntimeConfig {
        self.config_provider().refresh()
    }

    pub fn config_provider(&self) -> FileConfigProvider {
        FileConfigProvider::new(self.paths.runtime_config_file())
    }

    pub fn model_source(&self) -> ModelSource {
        ModelSource::from_config(&self.config, &self.paths.models_dir())
    }

    pub fn perception(&self) -> CameraPerception {
        CameraPerception::new(self.config.camera.clone(), self.model_source())
    }

    pub fn ui_program(&self) -> PathBuf {
        self.config
            .feedback
            .ui_program
            .clone()
            .unwrap_or_else(|| self.paths.ui_program())
    }

    /// One in-process authentication attempt against the stored template.
    pub fn attempt(
        &self,
        username: &str,
        cancel: CancelToken,
        observer: &mut dyn AuthObserver,
    ) -> SessionOutcome {
        let runtime = self.runtime();
        let template = self.store().load_or_empty(username);
        let matcher = TemplateMatcher::new(runtime.threshold, self.config.auth.metric);
        let settings = SessionSettings::from_config(&self.config.auth, &runtime);
        let mut perception = self.perception();

        tracing::info!(
            "Authenticating {} ({} reference encodings, timeout {:?})",
            username,
            template.len(),
            settings.timeout
        );
        AuthSession::new(settings, &matcher, SystemClock)
            .with_cancel(cancel)
            .run(&mut perception, &template, observer)
    }

    pub fn feedback_for(&self, username: &str, uid: u32) -> Box<dyn FeedbackSink> {
        if self.config.feedback.disabled {
            return Box::new(NullFeedback);
        }
        Box::new(
            UiFeedback::new(self.ui_program(), SessionEnvResolver::system(), uid)
                .with_env("SUDO_USER", username),
        )
    }

    pub fn guardian(&self, username: &str) -> Guardian<SystemClock> {
        let uid = lookup_user(username).map(|ids| ids.uid).unwrap_or_else(current_uid);
        let parts = GuardianParts {
            config: Box::new(self.config_provider()),
            templates: Box::new(self.store()),
            sensor: Box::new(CameraPresenceSensor::new(
                self.config.camera.clone(),
                self.model_source(),
                self.config.auth.metric,
            )),
            lock: Box::new(DesktopLocker::new(username, uid, SessionEnvResolver::system())),
            feedback: self.feedback_for(username, uid),
        };
        Guardian::new(
            username,
            GuardianTiming::from_config(&self.config.guardian),
            parts,
            SystemClock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_program_override() {
        let mut context = Context {
            paths: Paths::new(false).unwrap(),
            config: Config::default(),
        };
        assert_eq!(context.ui_program(), context.paths.ui_program());

        context.config.feedback.ui_program = Some(PathBuf::from("/opt/ui"));
        assert_eq!(context.ui_program(), PathBuf::from("/opt/ui"));
    }
}
