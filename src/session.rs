use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Result, SessionOptions, SessionType, Value};

/// Key under which flash messages are stored unless another key is given.
pub const FLASH_KEY: &str = "_flash";

/// Status of the Session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Indicates that the session values or options have changed since the
    /// session was resolved or last saved.
    Changed,

    /// Indicates that the session is unchanged.
    Unchanged,
}

struct SessionInner {
    id: String,
    name: String,
    values: BTreeMap<String, Value>,
    options: SessionOptions,
    is_new: bool,
    status: SessionStatus,
}

/// Session
///
/// Cloning a session returns another handle to the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionInner>>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Session")
            .field("name", &inner.name)
            .field("is_new", &inner.is_new)
            .field("status", &inner.status)
            .field("values", &inner.values)
            .field("options", &inner.options)
            .finish()
    }
}

impl Session {
    pub(crate) fn fresh(id: String, name: &str, options: SessionOptions) -> Self {
        Self::with_state(id, name, BTreeMap::new(), options, true)
    }

    pub(crate) fn loaded(
        id: String,
        name: &str,
        values: BTreeMap<String, Value>,
        options: SessionOptions,
    ) -> Self {
        Self::with_state(id, name, values, options, false)
    }

    fn with_state(
        id: String,
        name: &str,
        values: BTreeMap<String, Value>,
        options: SessionOptions,
        is_new: bool,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                id,
                name: name.to_string(),
                values,
                options,
                is_new,
                status: SessionStatus::Unchanged,
            })),
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    /// Returns the name of the session cookie.
    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Returns `true` if this session has never been saved.
    pub fn is_new(&self) -> bool {
        self.inner.read().is_new
    }

    /// Returns the status of this session.
    pub fn status(&self) -> SessionStatus {
        self.inner.read().status
    }

    /// Returns the cookie attributes of this session.
    pub fn options(&self) -> SessionOptions {
        self.inner.read().options.clone()
    }

    /// Replaces the cookie attributes of this session.
    pub fn set_options(&self, options: SessionOptions) {
        let mut inner = self.inner.write();
        inner.options = options;
        inner.status = SessionStatus::Changed;
    }

    /// Sets the lifetime of this session in seconds.
    ///
    /// A negative value deletes the session on the next save.
    pub fn set_max_age(&self, max_age: i64) {
        let mut inner = self.inner.write();
        inner.options.max_age = max_age;
        inner.status = SessionStatus::Changed;
    }

    /// Get a value from the session, converting it structurally.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let inner = self.inner.read();
        inner
            .values
            .get(name)
            .and_then(|value| value.to_deserialize().ok())
    }

    /// Get a custom value, only if it was stored as a `T`.
    pub fn get_typed<T: SessionType>(&self, name: &str) -> Option<T> {
        let inner = self.inner.read();
        inner.values.get(name).and_then(Value::to_custom)
    }

    /// Get the raw value from the session.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.inner.read().values.get(name).cloned()
    }

    /// Sets a key-value pair into the session.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) {
        let mut inner = self.inner.write();
        inner.values.insert(name.into(), value.into());
        inner.status = SessionStatus::Changed;
    }

    /// Sets a serializable value into the session.
    pub fn set<T: Serialize + ?Sized>(&self, name: impl Into<String>, value: &T) -> Result<()> {
        let value = Value::from_serialize(value)?;
        self.insert(name, value);
        Ok(())
    }

    /// Sets a custom value into the session, tagged with its type.
    pub fn set_typed<T: SessionType>(&self, name: impl Into<String>, value: &T) -> Result<()> {
        let value = Value::custom(value)?;
        self.insert(name, value);
        Ok(())
    }

    /// Remove value from the session.
    pub fn remove(&self, name: &str) -> Option<Value> {
        let mut inner = self.inner.write();
        let value = inner.values.remove(name);
        if value.is_some() {
            inner.status = SessionStatus::Changed;
        }
        value
    }

    /// Returns `true` is this session does not contain any values, otherwise it
    /// returns `false`.
    pub fn is_empty(&self) -> bool {
        self.inner.read().values.is_empty()
    }

    /// Get all values from the session.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.inner.read().values.clone()
    }

    /// Clear the session.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.values.clear();
        inner.status = SessionStatus::Changed;
    }

    /// Appends a flash message under [`FLASH_KEY`].
    pub fn add_flash(&self, value: impl Into<Value>) {
        self.add_flash_to(FLASH_KEY, value);
    }

    /// Appends a flash message under `key`.
    pub fn add_flash_to(&self, key: &str, value: impl Into<Value>) {
        let mut inner = self.inner.write();
        let flashes = inner
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        match flashes {
            Value::List(items) => items.push(value.into()),
            other => *other = Value::List(vec![value.into()]),
        }
        inner.status = SessionStatus::Changed;
    }

    /// Takes the flash messages stored under [`FLASH_KEY`].
    pub fn flashes(&self) -> Vec<Value> {
        self.flashes_from(FLASH_KEY)
    }

    /// Takes the flash messages stored under `key`. They are removed from
    /// the session.
    pub fn flashes_from(&self, key: &str) -> Vec<Value> {
        let mut inner = self.inner.write();
        match inner.values.remove(key) {
            Some(Value::List(items)) => {
                inner.status = SessionStatus::Changed;
                items
            }
            Some(other) => {
                inner.status = SessionStatus::Changed;
                vec![other]
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn mark_saved(&self) {
        let mut inner = self.inner.write();
        inner.is_new = false;
        inner.status = SessionStatus::Unchanged;
    }

    /// Detaches the handle from its deleted record. Without an identifier it
    /// can never be written back.
    pub(crate) fn mark_deleted(&self) {
        let mut inner = self.inner.write();
        inner.id.clear();
        inner.values.clear();
        inner.status = SessionStatus::Unchanged;
    }
}
