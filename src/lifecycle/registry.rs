//! Shared registry for handing resources between subsystems.
//!
//! Start hooks publish what they build (a session store, a server handle)
//! under a typed [`Key`], and later hooks look it up. Reads and writes are
//! safe from any task once subsystems are running.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// A registry key that fixes the type stored under it.
///
/// Declared as constants next to the subsystem that provides the value:
///
/// ```
/// use ddns::lifecycle::Key;
///
/// struct Database;
/// const DB: Key<Database> = Key::new("db");
/// assert_eq!(DB.name(), "db");
/// ```
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

/// Registry lookup and publication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry key not found: {0}")]
    NotFound(String),

    #[error("registry key already set: {0}")]
    AlreadySet(String),

    /// Two `Key`s with the same name but different types.
    #[error("registry key {key} holds a value of a different type than {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

type Shared = Arc<dyn Any + Send + Sync>;

/// Concurrent key/value store of shared subsystem handles.
#[derive(Default)]
pub struct Registry {
    entries: DashMap<String, Shared>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `key`. Keys are unique for the life of the registry.
    pub fn set<T>(&self, key: &Key<T>, value: T) -> Result<Arc<T>, RegistryError>
    where
        T: Send + Sync + 'static,
    {
        let value = Arc::new(value);
        match self.entries.entry(key.name().to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadySet(key.name().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(value.clone() as Shared);
                tracing::debug!(key = key.name(), "Registry entry published");
                Ok(value)
            }
        }
    }

    /// Look up the value stored under `key`.
    ///
    /// An absent key is `NotFound`; a stored `None` (for `Key<Option<_>>`) is
    /// returned as a value.
    pub fn get<T>(&self, key: &Key<T>) -> Result<Arc<T>, RegistryError>
    where
        T: Send + Sync + 'static,
    {
        let entry = self
            .entries
            .get(key.name())
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotFound(key.name().to_string()))?;

        entry
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                key: key.name().to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Whether anything is stored under `name`, regardless of type.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        f.debug_struct("Registry").field("keys", &keys).finish()
    }
}
