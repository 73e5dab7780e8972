use std::ffi::{CStr, CString};
use std::mem;

use crate::common::error::{FaceUnlockError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIds {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

pub fn is_root() -> bool {
    current_uid() == 0
}

/// Passwd entry for `username`, if the account exists.
pub fn lookup_user(username: &str) -> Option<UserIds> {
    let name = CString::new(username).ok()?;
    unsafe {
        let mut pwd: libc::passwd = mem::zeroed();
        let mut buf = vec![0u8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let ret = libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        );
        if ret != 0 || result.is_null() {
            return None;
        }

        Some(UserIds {
            name: username.to_string(),
            uid: (*result).pw_uid,
            gid: (*result).pw_gid,
        })
    }
}

/// Login name of the account this process runs as.
pub fn current_username() -> Result<String> {
    let uid = current_uid();
    unsafe {
        let mut pwd: libc::passwd = mem::zeroed();
        let mut buf = vec![0u8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let ret = libc::getpwuid_r(
            uid as libc::uid_t,
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        );
        if ret != 0 || result.is_null() {
            return Err(anyhow::anyhow!("User not found for UID {}", uid).into());
        }

        let username = CStr::from_ptr((*result).pw_name)
            .to_str()
            .map_err(|_| anyhow::anyhow!("Invalid username encoding"))?
            .to_string();
        Ok(username)
    }
}

/// Reject names that could escape the template directory.
pub fn validate_username(username: &str) -> Result<()> {
    let bad = username.is_empty()
        || username.starts_with('.')
        || username.starts_with('-')
        || username.len() > 64
        || username
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_whitespace() || c.is_control());
    if bad {
        return Err(FaceUnlockError::Storage(format!("Invalid username: {:?}", username)));
    }
    Ok(())
}
