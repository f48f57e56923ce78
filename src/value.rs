use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Formatter},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Number;

use crate::{Error, Result};

/// A value stored in a session.
///
/// Numbers keep their kind: a value set as `u64` is read back as `u64` even
/// above `i64::MAX`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer larger than `i64::MAX`.
    UInt(u64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Value>),
    /// A value of a type registered in a [`TypeRegistry`].
    Custom {
        /// The [`SessionType::TYPE_NAME`] of the value.
        type_name: String,
        /// The structural representation of the value.
        value: Box<Value>,
    },
}

/// A custom type that can be stored in a session and read back as itself.
///
/// Every such type must be registered in the [`TypeRegistry`] given to the
/// session store.
///
/// ```
/// use poem_dynamosession::SessionType;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct FlashMessage {
///     kind: i32,
///     message: String,
/// }
///
/// impl SessionType for FlashMessage {
///     const TYPE_NAME: &'static str = "FlashMessage";
/// }
/// ```
pub trait SessionType: Serialize + DeserializeOwned + 'static {
    /// Unique tag written next to every stored value of this type.
    const TYPE_NAME: &'static str;
}

impl Value {
    /// Converts any serializable value into its structural representation.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Value::from)
            .map_err(|err| Error::Serialize(err.to_string()))
    }

    /// Converts this value into `T` structurally.
    ///
    /// The type tag of a [`Value::Custom`] is ignored.
    pub fn to_deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::from(self.clone()))
            .map_err(|err| Error::Deserialize(err.to_string()))
    }

    /// Wraps a registered custom type.
    pub fn custom<T: SessionType>(value: &T) -> Result<Self> {
        Ok(Value::Custom {
            type_name: T::TYPE_NAME.to_string(),
            value: Box::new(Value::from_serialize(value)?),
        })
    }

    /// Reads back a custom type, only if the stored tag names `T`.
    pub fn to_custom<T: SessionType>(&self) -> Option<T> {
        match self {
            Value::Custom { type_name, value } if type_name == T::TYPE_NAME => {
                value.to_deserialize().ok()
            }
            _ => None,
        }
    }

    /// Returns the string if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the integer if this is a non-negative [`Value::Int`] or a
    /// [`Value::UInt`].
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(n) => u64::try_from(*n).ok(),
            Value::UInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns `true` if this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value.into())
            }
        }
        )*
    };
}

impl_from!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    BTreeMap<String, Value> => Map
);

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::UInt(value),
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(n), _) => Value::Int(n),
                (None, Some(n)) => Value::UInt(n),
                (None, None) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::UInt(n) => serde_json::Value::Number(n.into()),
            Value::Float(n) => Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .into_iter()
                    .map(|b| serde_json::Value::Number(b.into()))
                    .collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
            Value::Custom { value, .. } => (*value).into(),
        }
    }
}

type CheckFn = fn(&Value) -> bool;

/// The set of custom types that may be stored in sessions.
///
/// Build it before creating the [`SessionStore`](crate::SessionStore); the
/// store takes ownership, so no type can be registered after the first
/// session is read or written.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, CheckFn>,
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.types.keys()).finish()
    }
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `T`.
    #[must_use]
    pub fn register<T: SessionType>(mut self) -> Self {
        self.types
            .insert(T::TYPE_NAME, |value: &Value| value.to_deserialize::<T>().is_ok());
        self
    }

    /// Returns `true` if a type with this tag is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Checks that `value` is a well-formed instance of the registered type
    /// `type_name`.
    pub(crate) fn check(&self, type_name: &str, value: &Value) -> Result<(), String> {
        match self.types.get(type_name) {
            Some(check) if check(value) => Ok(()),
            Some(_) => Err(format!("value does not match type `{type_name}`")),
            None => Err(format!("type `{type_name}` is not registered")),
        }
    }
}
