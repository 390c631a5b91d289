//! HTTP Basic authentication for the admin service.
//!
//! Credential checking is a [`CredentialVerifier`] so the admin router can
//! be driven with any source of truth. [`StaticCredentials`] holds one
//! username/password pair and compares both in constant time: each side is
//! turned into an HMAC-SHA256 tag under a random per-process key and the
//! tags are compared with [`Mac::verify_slice`].

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::AdminConfig;

type HmacSha256 = Hmac<Sha256>;

pub const REALM: &str = "docrag admin";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin123";

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// The authenticated administrator, inserted into request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub String);

pub struct StaticCredentials {
    key: [u8; 32],
    username_tag: Vec<u8>,
    password_tag: Vec<u8>,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        key[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        let username_tag = tag(&key, username);
        let password_tag = tag(&key, password);
        Self {
            key,
            username_tag,
            password_tag,
        }
    }

    /// `ADMIN_USERNAME` / `ADMIN_PASSWORD`, then `[admin]`, then the
    /// built-in defaults (with a warning).
    pub fn from_env_or_config(config: &AdminConfig) -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .or_else(|| config.username.clone());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .or_else(|| config.password.clone());

        if username.is_none() || password.is_none() {
            tracing::warn!(
                "admin credentials not configured, using defaults; set ADMIN_USERNAME and ADMIN_PASSWORD"
            );
        }

        Self::new(
            username.as_deref().unwrap_or(DEFAULT_USERNAME),
            password.as_deref().unwrap_or(DEFAULT_PASSWORD),
        )
    }

    fn matches(&self, expected: &[u8], provided: &str) -> bool {
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(provided.as_bytes());
        mac.verify_slice(expected).is_ok()
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.matches(&self.username_tag, username);
        let pass_ok = self.matches(&self.password_tag, password);
        user_ok & pass_ok
    }
}

fn tag(key: &[u8], value: &str) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(value.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Extracts `(username, password)` from an `Authorization: Basic …` header.
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// 401 with a Basic challenge; browsers prompt again and drop cached
/// credentials.
pub fn unauthorized(message: &str) -> Response {
    let challenge = format!("Basic realm=\"{}\"", REALM);
    let mut response = (StatusCode::UNAUTHORIZED, message.to_string()).into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}
