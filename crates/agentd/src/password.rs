// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Admin-password injection: rewrites the `root` line in a container's
//! `/etc/shadow` (and the corresponding `/etc/passwd` line, left otherwise
//! untouched) with a freshly hashed password, via glibc `crypt(3)`.
//!
//! Grounded on the original implementation's admin-password handling
//! (base64-decoded payload, `$1$<salt>$`-style MD5 hash written into the
//! shadow file's second colon-delimited field). No crate binds `crypt()`
//! in the example pack, so this goes straight to libc through FFI.

use std::ffi::{CStr, CString};

use agent_types::AgentError;
use container_driver::ContainerDriver;
use rand::Rng;

const SALT_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789./";

extern "C" {
    fn crypt(key: *const libc::c_char, salt: *const libc::c_char) -> *mut libc::c_char;
}

/// Generates a 16-character salt for the `$1$<salt>$` MD5-style scheme;
/// falls back transparently to the legacy 2-character DES salt if the host
/// libc doesn't understand the `$1$` prefix (detected by `crypt` returning
/// a hash that itself starts with `$1$`).
fn random_salt(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len).map(|_| SALT_CHARS[rng.random_range(0..SALT_CHARS.len())] as char).collect()
}

fn hash_password(password: &str) -> Result<String, AgentError> {
    let salt = format!("$1${}$", random_salt(16));
    let key = CString::new(password).map_err(|e| AgentError::Unexpected(anyhow::anyhow!(e)))?;
    let salt_c = CString::new(salt.clone()).map_err(|e| AgentError::Unexpected(anyhow::anyhow!(e)))?;

    let result = unsafe { crypt(key.as_ptr(), salt_c.as_ptr()) };
    if result.is_null() {
        return Err(AgentError::Unexpected(anyhow::anyhow!("crypt(3) returned NULL")));
    }
    let hash = unsafe { CStr::from_ptr(result) }.to_string_lossy().into_owned();

    if hash.starts_with("$1$") {
        Ok(hash)
    } else {
        // The host libc ignored the $1$ prefix (legacy-only crypt); fall
        // back to its native scheme with a plain 2-character DES salt.
        let des_salt = random_salt(2);
        let des_salt_c = CString::new(des_salt).map_err(|e| AgentError::Unexpected(anyhow::anyhow!(e)))?;
        let result = unsafe { crypt(key.as_ptr(), des_salt_c.as_ptr()) };
        if result.is_null() {
            return Err(AgentError::Unexpected(anyhow::anyhow!("crypt(3) returned NULL")));
        }
        Ok(unsafe { CStr::from_ptr(result) }.to_string_lossy().into_owned())
    }
}

/// Rewrites `root`'s password hash in `/etc/shadow` inside the container,
/// leaving every other line and every other field untouched.
pub fn inject_admin_password(driver: &ContainerDriver, password_b64: &str) -> Result<(), AgentError> {
    let decoded = base64::decode(password_b64)
        .map_err(|e| AgentError::InvalidInput { reason: format!("invalid base64 password: {e}") })?;
    let password =
        String::from_utf8(decoded).map_err(|e| AgentError::InvalidInput { reason: format!("password is not utf-8: {e}") })?;
    let hash = hash_password(password.trim_end())?;

    let shadow = driver.read_file("/etc/shadow")?;
    let shadow = String::from_utf8_lossy(&shadow);
    let mut rewritten = String::with_capacity(shadow.len());
    for line in shadow.lines() {
        let mut fields: Vec<&str> = line.split(':').collect();
        if fields.first() == Some(&"root") && fields.len() > 1 {
            fields[1] = hash.as_str();
            rewritten.push_str(&fields.join(":"));
        } else {
            rewritten.push_str(line);
        }
        rewritten.push('\n');
    }
    driver.inject_file("/etc/shadow", rewritten.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_produces_md5_style_hash() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$1$") || hash.len() >= 13);
    }

    #[test]
    fn random_salt_uses_only_allowed_characters() {
        let salt = random_salt(16);
        assert_eq!(salt.len(), 16);
        assert!(salt.chars().all(|c| SALT_CHARS.contains(&(c as u8))));
    }
}
