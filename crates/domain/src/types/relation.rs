//! Many-to-one references and the backend's `false`-for-empty convention.
//!
//! The backend encodes a reference as `[id, "display name"]` and any empty
//! field, reference or scalar, as `false`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reference to another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Many2One {
    pub id: i64,
    pub name: String,
}

impl Many2One {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

impl Serialize for Many2One {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.id, &self.name).serialize(serializer)
    }
}

/// `#[serde(with = "many2one")]` for `Option<Many2One>` fields.
pub mod many2one {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Many2One>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(reference) => reference.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Many2One>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(false) | Value::Null => Ok(None),
            Value::Array(items) => match items.as_slice() {
                [Value::Number(id), Value::String(name)] => id
                    .as_i64()
                    .map(|id| Some(Many2One::new(id, name.as_str())))
                    .ok_or_else(|| D::Error::custom(format!("many2one id {id} is not an integer"))),
                [Value::Number(id)] => id
                    .as_i64()
                    .map(|id| Some(Many2One::new(id, String::new())))
                    .ok_or_else(|| D::Error::custom(format!("many2one id {id} is not an integer"))),
                _ => Err(D::Error::custom("expected many2one as [id, name]")),
            },
            Value::Number(id) => id
                .as_i64()
                .map(|id| Some(Many2One::new(id, String::new())))
                .ok_or_else(|| D::Error::custom(format!("many2one id {id} is not an integer"))),
            other => Err(D::Error::custom(format!("expected [id, name] or false, found {other}"))),
        }
    }
}

/// `#[serde(with = "falsy")]` for optional scalars sent as `false` when empty.
pub mod falsy {
    use serde::de::DeserializeOwned;

    use super::*;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Bool(false) | Value::Null => Ok(None),
            other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
        }
    }
}
