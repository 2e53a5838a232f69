//! Authenticated-session operations over a pluggable backend.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::observability::metrics;
use crate::session::backend::server_ttl;
use crate::session::cookie::{read_cookie, write_cookie};
use crate::session::token::TokenCodec;
use crate::session::types::USER_ID_KEY;
use crate::session::{
    Session, SessionBackend, SessionBackendKind, SessionError, SessionOptions, COOKIE_NAME,
    SECRET_KEY,
};

/// Session store shared by all request handlers.
///
/// The backend is chosen once at startup; every operation behaves the same
/// whichever backend it is.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    codec: TokenCodec,
    cookie_name: String,
    options: SessionOptions,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, options: SessionOptions) -> Self {
        Self {
            backend,
            codec: TokenCodec::new(SECRET_KEY),
            cookie_name: COOKIE_NAME.to_string(),
            options,
        }
    }

    /// Replace the signing secret. Instances sharing a backend must share it.
    pub fn with_secret(mut self, secret: &[u8]) -> Self {
        self.codec = TokenCodec::new(secret);
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn backend_kind(&self) -> SessionBackendKind {
        self.backend.kind()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn fresh(&self) -> Session {
        Session::new(&self.cookie_name, self.options.clone())
    }

    /// The session carried by the request, or a new one.
    ///
    /// A missing, forged or expired cookie, an unknown id and a backend
    /// failure all yield a new session (`is_new() == true`).
    pub async fn get(&self, request: &HeaderMap) -> Session {
        let Some(token) = read_cookie(request, &self.cookie_name) else {
            return self.fresh();
        };

        let id = match self.codec.decode(&self.cookie_name, token, self.options.max_age) {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!(cookie = %self.cookie_name, "Rejected session cookie");
                return self.fresh();
            }
        };

        match self.backend.load(&id).await {
            Ok(Some(record)) => {
                Session::restored(&self.cookie_name, id, record, self.options.clone())
            }
            Ok(None) => self.fresh(),
            Err(e) => {
                tracing::warn!(backend = %self.backend.kind(), error = %e, "Failed to load session");
                metrics::record_session("load", self.backend.kind(), "error");
                self.fresh()
            }
        }
    }

    /// Persist `session` and append the matching `Set-Cookie` to `response`.
    ///
    /// A negative `max_age` deletes the server-side record and expires the cookie.
    pub async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<(), SessionError> {
        if session.options.max_age < 0 {
            if !session.id().is_empty() {
                self.backend.delete(session.id()).await?;
            }
            return write_cookie(response, session.name(), "", &session.options);
        }

        if session.id().is_empty() {
            session.assign_id(self.backend.issue_id());
        }

        self.backend
            .save(session.id(), &session.to_record(), server_ttl(session.options.max_age))
            .await?;

        let token = self.codec.encode(session.name(), session.id());
        write_cookie(response, session.name(), &token, &session.options)
    }

    /// Mark the request's session as authenticated for `user_id`.
    pub async fn login(
        &self,
        response: &mut HeaderMap,
        request: &HeaderMap,
        user_id: i64,
    ) -> Result<(), SessionError> {
        let mut session = self.get(request).await;
        session.insert(USER_ID_KEY, user_id);

        match self.save(response, &mut session).await {
            Ok(()) => {
                tracing::info!(user_id, backend = %self.backend.kind(), "User logged in");
                metrics::record_session("login", self.backend.kind(), "ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Login failed to persist session");
                metrics::record_session("login", self.backend.kind(), "error");
                Err(e)
            }
        }
    }

    pub async fn is_login(&self, request: &HeaderMap) -> bool {
        !self.get(request).await.is_new()
    }

    /// End the request's session. A request without a session is left alone.
    pub async fn logout(&self, response: &mut HeaderMap, request: &HeaderMap) -> Result<(), SessionError> {
        let mut session = self.get(request).await;
        if session.is_new() {
            return Ok(());
        }

        session.options.max_age = -1;
        match self.save(response, &mut session).await {
            Ok(()) => {
                metrics::record_session("logout", self.backend.kind(), "ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Logout failed to remove session");
                metrics::record_session("logout", self.backend.kind(), "error");
                Err(e)
            }
        }
    }

    /// The authenticated user id, or [`SessionError::Invalid`].
    pub async fn user_id(&self, request: &HeaderMap) -> Result<i64, SessionError> {
        self.get(request).await.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryBackend;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::HeaderValue;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryBackend::new()), SessionOptions::with_max_age(3600))
    }

    /// Turn the first `Set-Cookie` of a response into the next request's `Cookie`.
    fn follow(response: &HeaderMap) -> HeaderMap {
        let set_cookie = response[SET_COOKIE].to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();
        let mut request = HeaderMap::new();
        request.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        request
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let store = store();
        let mut response = HeaderMap::new();
        store.login(&mut response, &HeaderMap::new(), 42).await.unwrap();

        let request = follow(&response);
        assert!(store.is_login(&request).await);
        assert_eq!(store.user_id(&request).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_no_cookie_is_new_session() {
        let store = store();
        let session = store.get(&HeaderMap::new()).await;
        assert!(session.is_new());
        assert!(session.id().is_empty());
        assert!(matches!(
            store.user_id(&HeaderMap::new()).await,
            Err(SessionError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_forged_cookie_is_new_session() {
        let store = store();
        let mut request = HeaderMap::new();
        request.insert(COOKIE, HeaderValue::from_static("ddns_sid=forged.token"));
        assert!(!store.is_login(&request).await);
    }

    #[tokio::test]
    async fn test_logout_invalidates() {
        let store = store();
        let mut response = HeaderMap::new();
        store.login(&mut response, &HeaderMap::new(), 7).await.unwrap();
        let request = follow(&response);

        let mut response = HeaderMap::new();
        store.logout(&mut response, &request).await.unwrap();
        assert!(response[SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

        // The old cookie no longer authenticates.
        assert!(!store.is_login(&request).await);
        assert!(matches!(store.user_id(&request).await, Err(SessionError::Invalid)));
    }

    #[tokio::test]
    async fn test_logout_without_session_is_noop() {
        let store = store();
        let mut response = HeaderMap::new();
        store.logout(&mut response, &HeaderMap::new()).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_relogin_keeps_session_id() {
        let store = store();
        let mut response = HeaderMap::new();
        store.login(&mut response, &HeaderMap::new(), 1).await.unwrap();
        let request = follow(&response);
        let first_id = store.get(&request).await.id().to_string();

        let mut response = HeaderMap::new();
        store.login(&mut response, &request, 2).await.unwrap();
        let request = follow(&response);

        assert_eq!(store.get(&request).await.id(), first_id);
        assert_eq!(store.user_id(&request).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_secret_must_match() {
        let backend = Arc::new(MemoryBackend::new());
        let issuer = SessionStore::new(backend.clone(), SessionOptions::with_max_age(3600));
        let other = SessionStore::new(backend, SessionOptions::with_max_age(3600))
            .with_secret(b"another-secret");

        let mut response = HeaderMap::new();
        issuer.login(&mut response, &HeaderMap::new(), 5).await.unwrap();
        let request = follow(&response);

        assert!(issuer.is_login(&request).await);
        assert!(!other.is_login(&request).await);
    }
}
