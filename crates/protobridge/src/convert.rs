//! Host <-> native value conversion
//!
//! Host-to-native conversion is strict: a value is accepted only when it
//! converts to the declared kind without loss, sign change or re-encoding.

use prost_reflect::bytes::Bytes;
use prost_reflect::{EnumDescriptor, MapKey, Value as NativeValue};

use crate::dispatch::{NumericKind, Strategy, TextKind};
use crate::error::{BridgeError, BridgeResult};
use crate::gate;
use crate::message::MessageProxy;
use crate::value::Value;

/// Largest integer magnitude an f64 represents exactly
const F64_EXACT_INT: i128 = 1 << 53;

/// Largest integer magnitude an f32 represents exactly
const F32_EXACT_INT: i128 = 1 << 24;

/// Convert a host value for storage under `strategy`
pub(crate) fn to_native(strategy: &Strategy, value: &Value, path: &str) -> BridgeResult<NativeValue> {
    match strategy {
        Strategy::Numeric(kind) => numeric(*kind, value, path),
        Strategy::Text(TextKind::Str) => match value {
            Value::Str(s) => Ok(NativeValue::String(s.clone())),
            other => Err(BridgeError::mismatch(path, "str", other.type_name())),
        },
        Strategy::Text(TextKind::Bytes) => match value {
            Value::Bytes(b) => Ok(NativeValue::Bytes(Bytes::from(b.clone()))),
            other => Err(BridgeError::mismatch(path, "bytes", other.type_name())),
        },
        Strategy::Enum(desc) => enum_number(desc, value, path, false).map(NativeValue::EnumNumber),
        Strategy::Message(desc) => gate::coerce_message(value, desc, path).map(NativeValue::Message),
        Strategy::Repeated(inner) => {
            let items = match value {
                Value::List(items) => items.clone(),
                Value::RepeatedScalar(r) => r.to_vec()?,
                Value::RepeatedMessage(r) => r.to_vec()?.into_iter().map(Value::Message).collect(),
                other => {
                    return Err(BridgeError::mismatch(
                        path,
                        strategy.type_name(),
                        other.type_name(),
                    ))
                }
            };
            items
                .iter()
                .map(|item| to_native(inner, item, path))
                .collect::<BridgeResult<Vec<_>>>()
                .map(NativeValue::List)
        }
        Strategy::Map { .. } => Err(BridgeError::not_assignable(
            path,
            "map fields are updated in place",
        )),
    }
}

fn numeric(kind: NumericKind, value: &Value, path: &str) -> BridgeResult<NativeValue> {
    let mismatch = || BridgeError::mismatch(path, kind.name(), value.type_name());
    match (kind, value) {
        (NumericKind::Bool, Value::Bool(b)) => Ok(NativeValue::Bool(*b)),
        (NumericKind::F32, Value::Float(f)) => Ok(NativeValue::F32(*f as f32)),
        (NumericKind::F64, Value::Float(f)) => Ok(NativeValue::F64(*f)),
        (NumericKind::F32 | NumericKind::F64, Value::Int(i)) => {
            let exact = if kind == NumericKind::F32 {
                F32_EXACT_INT
            } else {
                F64_EXACT_INT
            };
            if i.unsigned_abs() > exact as u128 {
                return Err(BridgeError::mismatch(
                    path,
                    kind.name(),
                    format!("int {} (not exactly representable)", i),
                ));
            }
            Ok(match kind {
                NumericKind::F32 => NativeValue::F32(*i as f32),
                _ => NativeValue::F64(*i as f64),
            })
        }
        (_, Value::Int(i)) => {
            let Some((lo, hi)) = kind.int_range() else {
                return Err(mismatch());
            };
            if *i < lo || *i > hi {
                return Err(BridgeError::mismatch(
                    path,
                    kind.name(),
                    format!("int {} (out of range)", i),
                ));
            }
            Ok(match kind {
                NumericKind::I32 => NativeValue::I32(*i as i32),
                NumericKind::I64 => NativeValue::I64(*i as i64),
                NumericKind::U32 => NativeValue::U32(*i as u32),
                _ => NativeValue::U64(*i as u64),
            })
        }
        _ => Err(mismatch()),
    }
}

/// Resolve an enum value given by number or by name.
///
/// With `strict`, raw integers are refused outright.
pub fn enum_number(desc: &EnumDescriptor, value: &Value, path: &str, strict: bool) -> BridgeResult<i32> {
    let invalid = |rendered: String| BridgeError::InvalidEnumValue {
        path: path.to_string(),
        value: rendered,
        enum_name: desc.full_name().to_string(),
    };
    match value {
        Value::Int(n) if strict => Err(BridgeError::mismatch(
            path,
            desc.full_name(),
            format!("int {}", n),
        )),
        Value::Int(n) => i32::try_from(*n)
            .ok()
            .filter(|n| desc.get_value(*n).is_some())
            .ok_or_else(|| invalid(n.to_string())),
        Value::Str(name) => desc
            .get_value_by_name(name)
            .map(|v| v.number())
            .ok_or_else(|| invalid(name.clone())),
        other => Err(BridgeError::mismatch(
            path,
            desc.full_name(),
            other.type_name(),
        )),
    }
}

/// Convert a host value into a map key of kind `strategy`
pub(crate) fn to_map_key(strategy: &Strategy, value: &Value, path: &str) -> BridgeResult<MapKey> {
    to_native(strategy, value, path)?
        .into_map_key()
        .ok_or_else(|| BridgeError::mismatch(path, strategy.type_name(), value.type_name()))
}

pub(crate) fn map_key_to_host(key: &MapKey) -> Value {
    match key {
        MapKey::Bool(b) => Value::Bool(*b),
        MapKey::I32(i) => Value::Int(*i as i128),
        MapKey::I64(i) => Value::Int(*i as i128),
        MapKey::U32(u) => Value::Int(*u as i128),
        MapKey::U64(u) => Value::Int(*u as i128),
        MapKey::String(s) => Value::Str(s.clone()),
    }
}

/// Convert a stored value to a host copy. Messages become detached proxies.
pub(crate) fn to_host(value: &NativeValue) -> Value {
    match value {
        NativeValue::Bool(b) => Value::Bool(*b),
        NativeValue::I32(i) => Value::Int(*i as i128),
        NativeValue::I64(i) => Value::Int(*i as i128),
        NativeValue::U32(u) => Value::Int(*u as i128),
        NativeValue::U64(u) => Value::Int(*u as i128),
        NativeValue::F32(f) => Value::Float(*f as f64),
        NativeValue::F64(f) => Value::Float(*f),
        NativeValue::String(s) => Value::Str(s.clone()),
        NativeValue::Bytes(b) => Value::Bytes(b.to_vec()),
        NativeValue::EnumNumber(n) => Value::Int(*n as i128),
        NativeValue::Message(m) => Value::Message(MessageProxy::from_dynamic(m.clone())),
        NativeValue::List(items) => Value::List(items.iter().map(to_host).collect()),
        NativeValue::Map(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Dict(
                pairs
                    .into_iter()
                    .map(|(k, v)| (map_key_to_host(k), to_host(v)))
                    .collect(),
            )
        }
    }
}
