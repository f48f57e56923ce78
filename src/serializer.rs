//! Binary encoding of session values.
//!
//! ```text
//! payload := MAGIC VERSION msgpack(map<string, Value>)
//! ```
//!
//! The body is MessagePack with named fields and variants, so it stays
//! self-describing. Custom values carry their type name, so a payload can
//! only be decoded by a store that registered the same types.

use std::{collections::BTreeMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{value::TypeRegistry, Error, Result, Value};

const MAGIC: &[u8; 3] = b"PSV";
const VERSION: u8 = 2;
const MAX_DEPTH: usize = 64;

/// Encodes and decodes session values, resolving custom types through a
/// [`TypeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ValueSerializer {
    registry: Arc<TypeRegistry>,
}

impl ValueSerializer {
    /// Create a serializer for the given custom types.
    pub fn new(registry: impl Into<Arc<TypeRegistry>>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    /// Returns the registry of custom types.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Encodes session values.
    ///
    /// Fails without producing any output if a custom value is of an
    /// unregistered type.
    pub fn encode(&self, values: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
        for value in values.values() {
            self.validate(value, 0).map_err(Error::Serialize)?;
        }

        let body =
            rmp_serde::to_vec_named(values).map_err(|err| Error::Serialize(err.to_string()))?;
        let mut buf = Vec::with_capacity(MAGIC.len() + 1 + body.len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decodes session values produced by [`ValueSerializer::encode`].
    pub fn decode(&self, data: &[u8]) -> Result<BTreeMap<String, Value>> {
        let mut body = match data.strip_prefix(MAGIC.as_slice()) {
            Some([version, body @ ..]) if *version == VERSION => body,
            Some([version, ..]) => {
                return Err(Error::Deserialize(format!(
                    "unsupported version `{version}`"
                )))
            }
            _ => return Err(Error::Deserialize("bad header".to_string())),
        };

        let values: BTreeMap<String, Value> = rmp_serde::from_read(&mut body)
            .map_err(|err| Error::Deserialize(err.to_string()))?;
        if !body.is_empty() {
            return Err(Error::Deserialize(format!(
                "{} trailing bytes",
                body.len()
            )));
        }

        for value in values.values() {
            self.validate(value, 0).map_err(Error::Deserialize)?;
        }
        Ok(values)
    }

    /// [`ValueSerializer::encode`] followed by standard base64.
    pub fn encode_base64(&self, values: &BTreeMap<String, Value>) -> Result<String> {
        Ok(STANDARD.encode(self.encode(values)?))
    }

    /// Standard base64 decoding followed by [`ValueSerializer::decode`].
    pub fn decode_base64(&self, data: &str) -> Result<BTreeMap<String, Value>> {
        let data = STANDARD
            .decode(data)
            .map_err(|err| Error::Deserialize(err.to_string()))?;
        self.decode(&data)
    }

    /// Bounds the nesting depth and checks every custom value against the
    /// registry.
    fn validate(&self, value: &Value, depth: usize) -> Result<(), String> {
        if depth > MAX_DEPTH {
            return Err("value nested too deeply".to_string());
        }

        match value {
            Value::List(items) => items
                .iter()
                .try_for_each(|item| self.validate(item, depth + 1)),
            Value::Map(map) => map
                .values()
                .try_for_each(|item| self.validate(item, depth + 1)),
            Value::Custom { type_name, value } => {
                self.registry.check(type_name, value)?;
                self.validate(value, depth + 1)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::SessionType;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct FlashMessage {
        kind: i32,
        message: String,
    }

    impl SessionType for FlashMessage {
        const TYPE_NAME: &'static str = "FlashMessage";
    }

    fn sample() -> BTreeMap<String, Value> {
        let mut nested = BTreeMap::new();
        nested.insert("x".to_string(), Value::Float(-0.25));
        nested.insert("y".to_string(), Value::Null);

        let mut values = BTreeMap::new();
        values.insert("a".to_string(), "foo".into());
        values.insert("b".to_string(), "bar".into());
        values.insert("n".to_string(), Value::Int(i64::MIN));
        values.insert("u".to_string(), Value::UInt(u64::MAX));
        values.insert("t".to_string(), true.into());
        values.insert("raw".to_string(), vec![0u8, 1, 255].into());
        values.insert(
            "list".to_string(),
            Value::List(vec![1.into(), "two".into(), Value::Map(nested.clone())]),
        );
        values.insert("map".to_string(), Value::Map(nested));
        values.insert("".to_string(), "empty key".into());
        values
    }

    #[test]
    fn round_trip() {
        let serializer = ValueSerializer::default();
        let values = sample();
        let data = serializer.encode(&values).unwrap();
        assert_eq!(serializer.decode(&data).unwrap(), values);

        let text = serializer.encode_base64(&values).unwrap();
        assert_eq!(serializer.decode_base64(&text).unwrap(), values);

        let empty = BTreeMap::new();
        let data = serializer.encode(&empty).unwrap();
        assert_eq!(serializer.decode(&data).unwrap(), empty);
    }

    #[test]
    fn custom_types_need_registration() {
        let flash = FlashMessage {
            kind: 42,
            message: "foo".to_string(),
        };
        let mut values = BTreeMap::new();
        values.insert("flash".to_string(), Value::custom(&flash).unwrap());

        let plain = ValueSerializer::default();
        assert!(matches!(plain.encode(&values), Err(Error::Serialize(_))));

        let registered =
            ValueSerializer::new(TypeRegistry::new().register::<FlashMessage>());
        let data = registered.encode(&values).unwrap();
        let decoded = registered.decode(&data).unwrap();
        assert_eq!(decoded["flash"].to_custom::<FlashMessage>(), Some(flash));

        // a store that does not know the type cannot read it back
        assert!(matches!(plain.decode(&data), Err(Error::Deserialize(_))));
    }

    #[test]
    fn custom_value_shape_is_checked() {
        let mut values = BTreeMap::new();
        values.insert(
            "flash".to_string(),
            Value::Custom {
                type_name: FlashMessage::TYPE_NAME.to_string(),
                value: Box::new(Value::Int(1)),
            },
        );
        let serializer =
            ValueSerializer::new(TypeRegistry::new().register::<FlashMessage>());
        assert!(matches!(serializer.encode(&values), Err(Error::Serialize(_))));
    }

    #[test]
    fn corrupt_input() {
        let serializer = ValueSerializer::default();
        let data = serializer.encode(&sample()).unwrap();

        for len in 0..data.len() {
            assert!(
                matches!(serializer.decode(&data[..len]), Err(Error::Deserialize(_))),
                "truncated at {len}"
            );
        }

        let mut trailing = data.clone();
        trailing.push(0);
        assert!(serializer.decode(&trailing).is_err());

        let mut bad_version = data.clone();
        bad_version[3] = 99;
        assert!(serializer.decode(&bad_version).is_err());

        assert!(serializer.decode(b"garbage").is_err());
        assert!(serializer.decode_base64("not base64!").is_err());
    }

    #[test]
    fn unknown_variant() {
        #[derive(Serialize)]
        enum Unknown {
            Decimal(String),
        }

        let mut values = BTreeMap::new();
        values.insert("k", Unknown::Decimal("1.5".to_string()));
        let mut data = MAGIC.to_vec();
        data.push(VERSION);
        data.extend(rmp_serde::to_vec_named(&values).unwrap());

        assert!(matches!(
            ValueSerializer::default().decode(&data),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn large_unsigned_integers() {
        let mut values = BTreeMap::new();
        values.insert("max".to_string(), Value::from(u64::MAX));
        values.insert("half".to_string(), Value::from(1u64 << 63));

        let serializer = ValueSerializer::default();
        let decoded = serializer
            .decode(&serializer.encode(&values).unwrap())
            .unwrap();
        assert_eq!(decoded, values);
        assert_eq!(decoded["max"].to_deserialize::<u64>().unwrap(), u64::MAX);
        assert_eq!(decoded["half"].to_deserialize::<u64>().unwrap(), 1 << 63);
    }

    #[test]
    fn nesting_limit() {
        let mut value = Value::Null;
        for _ in 0..=MAX_DEPTH + 1 {
            value = Value::List(vec![value]);
        }
        let mut values = BTreeMap::new();
        values.insert("deep".to_string(), value);
        let serializer = ValueSerializer::default();
        assert!(serializer.encode(&values).is_err());

        let mut data = MAGIC.to_vec();
        data.push(VERSION);
        data.extend(rmp_serde::to_vec_named(&values).unwrap());
        assert!(matches!(
            serializer.decode(&data),
            Err(Error::Deserialize(_))
        ));
    }
}
