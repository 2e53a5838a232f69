//! Session data model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::SessionError;

/// Key under which the authenticated user id is stored.
pub const USER_ID_KEY: &str = "userid";

/// A typed value held in a session.
///
/// The variant survives persistence, so an integer stored by one instance is
/// read back as an integer by another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SessionValue {
    Int(i64),
    Str(String),
    Bool(bool),
    Float(f64),
}

impl SessionValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Str(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Str(v.to_string())
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

/// Cookie attributes, applied the same way whatever the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub path: String,
    pub domain: String,
    /// Lifetime in seconds. Zero means a browser-session cookie; negative expires now.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl SessionOptions {
    pub fn with_max_age(max_age: i64) -> Self {
        Self {
            max_age,
            ..Self::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: String::new(),
            max_age: 86400 * 30,
            secure: false,
            http_only: false,
        }
    }
}

/// The durable part of a session, as stored by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub values: HashMap<String, SessionValue>,
}

/// Session state for one request cycle.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    name: String,
    is_new: bool,
    pub values: HashMap<String, SessionValue>,
    pub options: SessionOptions,
}

impl Session {
    pub(crate) fn new(name: &str, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            is_new: true,
            values: HashMap::new(),
            options,
        }
    }

    pub(crate) fn restored(name: &str, id: String, record: SessionRecord, options: SessionOptions) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_new: false,
            values: record.values,
            options,
        }
    }

    /// Backend-issued id; empty until the session is first saved.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    /// Cookie name this session travels under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when no valid stored session matched the request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// The authenticated user id.
    ///
    /// A new session, a missing `userid` and a non-integer `userid` are all
    /// reported as [`SessionError::Invalid`].
    pub fn user_id(&self) -> Result<i64, SessionError> {
        if self.is_new {
            return Err(SessionError::Invalid);
        }
        self.get(USER_ID_KEY)
            .and_then(SessionValue::as_int)
            .ok_or(SessionError::Invalid)
    }

    pub(crate) fn to_record(&self) -> SessionRecord {
        SessionRecord {
            values: self.values.clone(),
        }
    }
}
