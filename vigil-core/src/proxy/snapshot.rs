//! Snapshots and serde Interop
//!
//! Converting a value graph to and from JSON. Snapshots read through raw
//! objects and unwrap refs without tracking, so taking one inside an effect
//! subscribes it to nothing.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Error as _, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number, Value as Json};

use super::value::{PropKey, Value};
use crate::error::{ReactivityError, Result};
use crate::reactive::{untracked, ObservableKind};

/// Largest magnitude below which integral numbers are written as integers.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// A JSON snapshot of this value.
    ///
    /// Maps become arrays of `[key, value]` pairs, sets arrays of members,
    /// weak collections empty arrays; `Undefined` becomes `null`; symbol
    /// keys are skipped.
    ///
    /// # Errors
    ///
    /// [`ReactivityError::CyclicValue`] if an object contains itself, and
    /// [`ReactivityError::NonFiniteNumber`] for NaN or infinite numbers.
    pub fn to_json(&self) -> Result<Json> {
        let mut visiting = Vec::new();
        untracked(|| snapshot(self, &mut visiting))
    }

    /// Serialise a snapshot to a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }

    /// Build a fresh raw graph from a JSON string.
    pub fn from_json_str(input: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(input)?;
        Ok(Value::from(json))
    }
}

fn snapshot(value: &Value, visiting: &mut Vec<usize>) -> Result<Json> {
    let raw = match value {
        Value::Undefined | Value::Null => return Ok(Json::Null),
        Value::Bool(b) => return Ok(Json::Bool(*b)),
        Value::Number(n) => return number(*n),
        Value::String(s) => return Ok(Json::String(s.to_string())),
        Value::Ref(r) => return snapshot(&r.value(), visiting),
        Value::Raw(raw) => raw,
        Value::Proxy(proxy) => proxy.raw(),
    };

    let addr = raw.addr();
    if visiting.contains(&addr) {
        return Err(ReactivityError::CyclicValue);
    }
    visiting.push(addr);

    let json = match raw.kind() {
        ObservableKind::Object => {
            let mut object = JsonMap::new();
            for key in raw.own_keys() {
                if matches!(key, PropKey::Symbol(_)) {
                    continue;
                }
                object.insert(key.to_string(), snapshot(&raw.get(&key), visiting)?);
            }
            Json::Object(object)
        }
        ObservableKind::Array => Json::Array(
            raw.own_keys()
                .iter()
                .map(|key| snapshot(&raw.get(key), visiting))
                .collect::<Result<_>>()?,
        ),
        ObservableKind::Map => Json::Array(
            raw.entries()
                .iter()
                .map(|(key, value)| -> Result<Json> {
                    Ok(Json::Array(vec![
                        snapshot(key, visiting)?,
                        snapshot(value, visiting)?,
                    ]))
                })
                .collect::<Result<_>>()?,
        ),
        ObservableKind::Set => Json::Array(
            raw.entries()
                .iter()
                .map(|(member, _)| snapshot(member, visiting))
                .collect::<Result<_>>()?,
        ),
        ObservableKind::WeakMap | ObservableKind::WeakSet => Json::Array(Vec::new()),
    };

    visiting.pop();
    Ok(json)
}

fn number(n: f64) -> Result<Json> {
    if !n.is_finite() {
        return Err(ReactivityError::NonFiniteNumber(n));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Json::from(n as i64));
    }
    Number::from_f64(n)
        .map(Json::Number)
        .ok_or(ReactivityError::NonFiniteNumber(n))
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::new_array(items.into_iter().map(Value::from)),
            Json::Object(object) => {
                Value::new_object(object.into_iter().map(|(key, value)| (key, Value::from(value))))
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Json::deserialize(deserializer).map(Value::from)
    }
}
