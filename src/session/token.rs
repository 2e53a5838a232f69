//! Signed session tokens.
//!
//! A cookie carries `base64url(issued|id) "." base64url(mac)`, where the MAC
//! is HMAC-SHA256 over the cookie name and the encoded payload. Both backends
//! use the same codec, so a token is never trusted unless this process (or
//! one sharing its secret) issued it.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::hmac;

use crate::session::SessionError;

/// Issues and verifies session tokens with a fixed secret.
pub struct TokenCodec {
    key: hmac::Key,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Sign `id` for the cookie `name`, stamped with the current time.
    pub fn encode(&self, name: &str, id: &str) -> String {
        self.encode_at(name, id, unix_now())
    }

    fn encode_at(&self, name: &str, id: &str, issued: u64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!("{}|{}", issued, id));
        let tag = hmac::sign(&self.key, signed_message(name, &payload).as_bytes());
        format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    /// Verify a token and return the session id it carries.
    ///
    /// Tokens older than `max_age` seconds are rejected when `max_age > 0`.
    pub fn decode(&self, name: &str, token: &str, max_age: i64) -> Result<String, SessionError> {
        self.decode_at(name, token, max_age, unix_now())
    }

    fn decode_at(&self, name: &str, token: &str, max_age: i64, now: u64) -> Result<String, SessionError> {
        let (payload, tag) = token.split_once('.').ok_or(SessionError::Invalid)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| SessionError::Invalid)?;

        hmac::verify(&self.key, signed_message(name, payload).as_bytes(), &tag)
            .map_err(|_| SessionError::Invalid)?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SessionError::Invalid)?;
        let payload = String::from_utf8(payload).map_err(|_| SessionError::Invalid)?;
        let (issued, id) = payload.split_once('|').ok_or(SessionError::Invalid)?;
        let issued: u64 = issued.parse().map_err(|_| SessionError::Invalid)?;

        if id.is_empty() {
            return Err(SessionError::Invalid);
        }
        if max_age > 0 && issued.saturating_add(max_age as u64) < now {
            return Err(SessionError::Invalid);
        }

        Ok(id.to_string())
    }
}

fn signed_message(name: &str, payload: &str) -> String {
    format!("{}|{}", name, payload)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
