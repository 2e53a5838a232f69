//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use ddns::session::{KeyValueStore, SessionError};

/// In-process stand-in for Redis with server-side expiry.
///
/// `second` sets how long one TTL second lasts, so expiry can be observed
/// without waiting in real seconds.
pub struct TtlKv {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    second: Duration,
    offline: Mutex<bool>,
}

impl TtlKv {
    pub fn new() -> Self {
        Self::with_second(Duration::from_secs(1))
    }

    pub fn with_second(second: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            second,
            offline: Mutex::new(false),
        }
    }

    /// Make every subsequent call fail as if the server were unreachable.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    fn check_online(&self) -> Result<(), SessionError> {
        if *self.offline.lock().unwrap() {
            return Err(SessionError::BackendUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for TtlKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        self.check_online()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), SessionError> {
        self.check_online()?;
        let expires = Instant::now() + self.second * ttl_secs as u32;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), SessionError> {
        self.check_online()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// `name=value` of the first `Set-Cookie` in a response.
pub fn cookie_pair(response: &HeaderMap) -> String {
    let set_cookie = response[SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().trim().to_string()
}

/// The next request's headers, carrying the cookie the response set.
pub fn follow(response: &HeaderMap) -> HeaderMap {
    let mut request = HeaderMap::new();
    request.insert(COOKIE, HeaderValue::from_str(&cookie_pair(response)).unwrap());
    request
}
