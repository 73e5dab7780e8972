//! Works out the graphical session variables a helper needs to reach the
//! user's desktop when launched from a service or PAM context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SESSION_KEYS: &[&str] = &[
    "XDG_RUNTIME_DIR",
    "WAYLAND_DISPLAY",
    "DISPLAY",
    "XAUTHORITY",
    "DBUS_SESSION_BUS_ADDRESS",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    vars: Vec<(String, String)>,
}

impl SessionEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key.to_string(), value)),
        }
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }
}

pub struct SessionEnvResolver {
    runtime_root: PathBuf,
    x11_socket_dir: PathBuf,
    inherited: HashMap<String, String>,
}

impl SessionEnvResolver {
    pub fn new(runtime_root: PathBuf, x11_socket_dir: PathBuf, inherited: HashMap<String, String>) -> Self {
        Self {
            runtime_root,
            x11_socket_dir,
            inherited,
        }
    }

    /// Resolver looking at the live system and this process's environment.
    pub fn system() -> Self {
        let inherited = std::env::vars()
            .filter(|(k, _)| SESSION_KEYS.contains(&k.as_str()))
            .collect();
        Self::new(PathBuf::from("/run/user"), PathBuf::from("/tmp/.X11-unix"), inherited)
    }

    fn runtime_dir(&self, uid: u32) -> PathBuf {
        self.runtime_root.join(uid.to_string())
    }

    fn inherited(&self, key: &str) -> Option<String> {
        self.inherited.get(key).filter(|v| !v.is_empty()).cloned()
    }

    /// Session variables for `uid`, or `None` when there is no evidence of a
    /// graphical session to reach.
    pub fn resolve(&self, uid: u32) -> Option<SessionEnv> {
        let runtime_dir = self.runtime_dir(uid);
        let has_runtime_dir = runtime_dir.is_dir();
        let has_inherited_display =
            self.inherited("DISPLAY").is_some() || self.inherited("WAYLAND_DISPLAY").is_some();

        if !has_runtime_dir && !has_inherited_display {
            tracing::debug!("No session found for uid {}", uid);
            return None;
        }

        let mut env = SessionEnv::default();

        if has_runtime_dir {
            env.set("XDG_RUNTIME_DIR", runtime_dir.display().to_string());
        } else if let Some(dir) = self.inherited("XDG_RUNTIME_DIR") {
            env.set("XDG_RUNTIME_DIR", dir);
        }

        let wayland = ["wayland-1", "wayland-0"]
            .into_iter()
            .find(|name| has_runtime_dir && runtime_dir.join(name).exists())
            .map(str::to_string)
            .or_else(|| self.inherited("WAYLAND_DISPLAY"));
        if let Some(display) = wayland {
            env.set("WAYLAND_DISPLAY", display);
        }

        let display = [("X1", ":1"), ("X0", ":0")]
            .into_iter()
            .find(|(socket, _)| self.x11_socket_dir.join(socket).exists())
            .map(|(_, display)| display.to_string())
            .or_else(|| self.inherited("DISPLAY"))
            .unwrap_or_else(|| ":0".to_string());
        env.set("DISPLAY", display);

        let xauthority = self.inherited("XAUTHORITY").or_else(|| {
            let candidate = runtime_dir.join("gdm").join("Xauthority");
            candidate.exists().then(|| candidate.display().to_string())
        });
        if let Some(xauthority) = xauthority {
            env.set("XAUTHORITY", xauthority);
        }

        env.set("DBUS_SESSION_BUS_ADDRESS", self.bus_address(&runtime_dir));

        Some(env)
    }

    /// Best-effort variables even when nothing could be detected.
    pub fn fallback(&self, uid: u32) -> SessionEnv {
        if let Some(env) = self.resolve(uid) {
            return env;
        }
        let runtime_dir = self.runtime_dir(uid);
        let mut env = SessionEnv::default();
        env.set(
            "XDG_RUNTIME_DIR",
            self.inherited("XDG_RUNTIME_DIR")
                .unwrap_or_else(|| runtime_dir.display().to_string()),
        );
        env.set("DISPLAY", self.inherited("DISPLAY").unwrap_or_else(|| ":0".to_string()));
        env.set("DBUS_SESSION_BUS_ADDRESS", self.bus_address(&runtime_dir));
        env
    }

    fn bus_address(&self, runtime_dir: &Path) -> String {
        self.inherited("DBUS_SESSION_BUS_ADDRESS")
            .unwrap_or_else(|| format!("unix:path={}", runtime_dir.join("bus").display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        runtime_root: PathBuf,
        x11: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let runtime_root = root.path().join("run-user");
        let x11 = root.path().join("x11");
        fs::create_dir_all(&runtime_root).unwrap();
        fs::create_dir_all(&x11).unwrap();
        Fixture {
            _root: root,
            runtime_root,
            x11,
        }
    }

    fn resolver(f: &Fixture, inherited: &[(&str, &str)]) -> SessionEnvResolver {
        SessionEnvResolver::new(
            f.runtime_root.clone(),
            f.x11.clone(),
            inherited
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_no_session_resolves_to_none() {
        let f = fixture();
        assert!(resolver(&f, &[]).resolve(1000).is_none());
    }

    #[test]
    fn test_prefers_wayland_1_and_x1() {
        let f = fixture();
        let runtime = f.runtime_root.join("1000");
        fs::create_dir_all(&runtime).unwrap();
        fs::write(runtime.join("wayland-0"), b"").unwrap();
        fs::write(runtime.join("wayland-1"), b"").unwrap();
        fs::write(f.x11.join("X0"), b"").unwrap();
        fs::write(f.x11.join("X1"), b"").unwrap();

        let env = resolver(&f, &[]).resolve(1000).unwrap();
        assert_eq!(env.get("WAYLAND_DISPLAY"), Some("wayland-1"));
        assert_eq!(env.get("DISPLAY"), Some(":1"));
        assert_eq!(env.get("XDG_RUNTIME_DIR"), Some(runtime.display().to_string().as_str()));
        assert_eq!(
            env.get("DBUS_SESSION_BUS_ADDRESS"),
            Some(format!("unix:path={}", runtime.join("bus").display()).as_str())
        );
    }

    #[test]
    fn test_falls_back_to_inherited_display() {
        let f = fixture();
        let env = resolver(&f, &[("DISPLAY", ":7"), ("XAUTHORITY", "/tmp/xauth")])
            .resolve(1000)
            .unwrap();
        assert_eq!(env.get("DISPLAY"), Some(":7"));
        assert_eq!(env.get("XAUTHORITY"), Some("/tmp/xauth"));
        assert_eq!(env.get("WAYLAND_DISPLAY"), None);
    }

    #[test]
    fn test_runtime_dir_without_sockets_defaults_display() {
        let f = fixture();
        fs::create_dir_all(f.runtime_root.join("1000")).unwrap();
        let env = resolver(&f, &[]).resolve(1000).unwrap();
        assert_eq!(env.get("DISPLAY"), Some(":0"));
    }

    #[test]
    fn test_fallback_always_produces_variables() {
        let f = fixture();
        let env = resolver(&f, &[]).fallback(1000);
        assert_eq!(
            env.get("XDG_RUNTIME_DIR"),
            Some(f.runtime_root.join("1000").display().to_string().as_str())
        );
        assert_eq!(env.get("DISPLAY"), Some(":0"));
    }
}
