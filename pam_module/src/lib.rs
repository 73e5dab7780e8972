#[macro_use]
extern crate pamsm;

use std::time::Duration;

use pamsm::{Pam, PamError, PamFlags, PamLibExt, PamServiceModule};

use face_unlock::boundary::IsolatedAuthenticator;
use face_unlock::common::{
    lookup_user, validate_username, Config, ConfigProvider, FileConfigProvider, Paths, MAX_TIMEOUT_SECS,
};
use face_unlock::core::AuthResult;
use face_unlock::process::{Feedback, FeedbackSink, SessionEnvResolver, UiFeedback};
use face_unlock::storage::TemplateStore;

pub struct FaceUnlockPam;

impl PamServiceModule for FaceUnlockPam {
    fn authenticate(pamh: Pam, _flags: PamFlags, args: Vec<String>) -> PamError {
        let username = match pamh.get_cached_user() {
            Ok(Some(user)) => match user.to_str() {
                Ok(user) => user.to_string(),
                Err(_) => return PamError::USER_UNKNOWN,
            },
            _ => return PamError::USER_UNKNOWN,
        };
        if validate_username(&username).is_err() {
            return PamError::USER_UNKNOWN;
        }

        let paths = match Paths::new(false) {
            Ok(paths) => paths,
            Err(_) => return PamError::SERVICE_ERR,
        };

        // Not enrolled: let the next module (password) handle it.
        if !TemplateStore::new(paths.templates_dir()).exists(&username) {
            return PamError::IGNORE;
        }

        let config = Config::load_from_path(&paths.config_file()).unwrap_or_default();
        let runtime = FileConfigProvider::new(paths.runtime_config_file()).refresh();
        let timeout = timeout_arg(&args).unwrap_or(runtime.timeout);

        let mut feedback = feedback_for(&config, &paths, &username);
        let scanning = feedback.as_mut().and_then(|sink| {
            sink.show(Feedback::Scanning {
                timeout: timeout.as_secs(),
            })
        });

        let runner = IsolatedAuthenticator::new(paths.auth_program(), timeout, config.auth.grace());
        let result = runner.run(&username);

        if let Some(sink) = feedback.as_mut() {
            if let Some(handle) = scanning {
                sink.dismiss(handle);
            }
            sink.show(if result.grants_access() {
                Feedback::Success
            } else {
                Feedback::Failed
            });
            // The result display outlives this call; the host must not
            // inherit it as a zombie.
            sink.detach();
        }

        pam_code(result)
    }
}

/// `timeout=N` from the module arguments, in seconds.
fn timeout_arg(args: &[String]) -> Option<Duration> {
    args.iter()
        .find_map(|arg| arg.strip_prefix("timeout=")?.parse::<u64>().ok())
        .filter(|secs| *secs > 0 && *secs <= MAX_TIMEOUT_SECS)
        .map(Duration::from_secs)
}

fn feedback_for(config: &Config, paths: &Paths, username: &str) -> Option<UiFeedback> {
    if config.feedback.disabled {
        return None;
    }
    let uid = lookup_user(username)?.uid;
    let program = config
        .feedback
        .ui_program
        .clone()
        .unwrap_or_else(|| paths.ui_program());
    Some(UiFeedback::new(program, SessionEnvResolver::system(), uid).with_env("SUDO_USER", username))
}

fn pam_code(result: AuthResult) -> PamError {
    match result {
        AuthResult::Match => PamError::SUCCESS,
        AuthResult::NoEncodings => PamError::IGNORE,
        AuthResult::CameraError => PamError::AUTHINFO_UNAVAIL,
        _ => PamError::AUTH_ERR,
    }
}

pam_module!(FaceUnlockPam);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_argument() {
        let args = vec!["debug".to_string(), "timeout=12".to_string()];
        assert_eq!(timeout_arg(&args), Some(Duration::from_secs(12)));
        assert_eq!(timeout_arg(&["timeout=zero".to_string()]), None);
        assert_eq!(timeout_arg(&["timeout=0".to_string()]), None);
        assert_eq!(timeout_arg(&["timeout=300".to_string()]), Some(Duration::from_secs(300)));
        assert_eq!(timeout_arg(&["timeout=301".to_string()]), None);
        assert_eq!(timeout_arg(&["timeout=18446744073709551615".to_string()]), None);
        assert_eq!(timeout_arg(&[]), None);
    }

    #[test]
    fn test_only_match_succeeds() {
        assert!(matches!(pam_code(AuthResult::Match), PamError::SUCCESS));
        assert!(matches!(pam_code(AuthResult::NoMatch), PamError::AUTH_ERR));
        assert!(matches!(pam_code(AuthResult::Timeout), PamError::AUTH_ERR));
        assert!(matches!(pam_code(AuthResult::Aborted), PamError::AUTH_ERR));
        assert!(matches!(pam_code(AuthResult::CameraError), PamError::AUTHINFO_UNAVAIL));
    }
}
