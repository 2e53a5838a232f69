//! Reading the session cookie from requests and emitting `Set-Cookie`.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

use crate::session::{SessionError, SessionOptions};

/// Value of the cookie `name` in the request's `Cookie` headers, if present.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Append a `Set-Cookie` header for `name=value` with `options` applied.
///
/// A negative `max_age` is written as `Max-Age=0` so the client drops the cookie.
pub fn write_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    options: &SessionOptions,
) -> Result<(), SessionError> {
    let mut cookie = format!("{}={}", name, value);
    if !options.path.is_empty() {
        cookie.push_str("; Path=");
        cookie.push_str(&options.path);
    }
    if !options.domain.is_empty() {
        cookie.push_str("; Domain=");
        cookie.push_str(&options.domain);
    }
    if options.max_age > 0 {
        cookie.push_str(&format!("; Max-Age={}", options.max_age));
    } else if options.max_age < 0 {
        cookie.push_str("; Max-Age=0");
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }

    let value = HeaderValue::from_str(&cookie).map_err(|e| SessionError::Cookie(e.to_string()))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}
