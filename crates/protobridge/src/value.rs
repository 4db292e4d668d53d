//! Host-side values
//!
//! [`Value`] is what the dynamic host hands to the bridge and gets back from
//! it. Scalars are plain copies; messages and containers are live proxies
//! into native storage.

use std::fmt;
use std::sync::Arc;

use crate::containers::{MapProxy, RepeatedMessage, RepeatedScalar};
use crate::message::MessageProxy;

/// Capability interface for message-like objects the bridge does not own.
///
/// A foreign object is accepted wherever a message is expected when it
/// reports a resolvable type name and can serialize itself. Returning `None`
/// from either method means the capability is absent.
pub trait ForeignMessage: fmt::Debug + Send + Sync {
    /// Full protobuf type name of the object
    fn type_name(&self) -> Option<String>;

    /// Wire-format bytes of the object
    fn serialize(&self) -> Option<Vec<u8>>;

    /// Encoded size, when known without serializing
    fn byte_size(&self) -> Option<usize> {
        None
    }
}

/// A value in the dynamic host
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Ordered key/value pairs (keyword arguments, mapping literals)
    Dict(Vec<(Value, Value)>),
    Message(MessageProxy),
    RepeatedScalar(RepeatedScalar),
    RepeatedMessage(RepeatedMessage),
    Map(MapProxy),
    Foreign(Arc<dyn ForeignMessage>),
}

impl Value {
    /// Build a list value
    pub fn list<I, V>(items: I) -> Value
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a dict value
    pub fn dict<I, K, V>(items: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap a foreign message object
    pub fn foreign(message: impl ForeignMessage + 'static) -> Value {
        Value::Foreign(Arc::new(message))
    }

    /// Host-level type name, used in mismatch diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Message(m) => m.full_name().to_string(),
            Value::RepeatedScalar(_) => "RepeatedScalarContainer".to_string(),
            Value::RepeatedMessage(_) => "RepeatedCompositeContainer".to_string(),
            Value::Map(_) => "MessageMap".to_string(),
            Value::Foreign(f) => f.type_name().unwrap_or_else(|| "object".to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageProxy> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<MessageProxy> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_repeated_scalar(self) -> Option<RepeatedScalar> {
        match self {
            Value::RepeatedScalar(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_repeated_message(self) -> Option<RepeatedMessage> {
        match self {
            Value::RepeatedMessage(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<MapProxy> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    fn is_container(&self) -> bool {
        matches!(
            self,
            Value::RepeatedScalar(_) | Value::RepeatedMessage(_) | Value::Map(_)
        )
    }

    /// Snapshot a live container as a plain list or dict
    fn materialize(&self) -> Option<Value> {
        match self {
            Value::RepeatedScalar(r) => r.to_vec().ok().map(Value::List),
            Value::RepeatedMessage(r) => r
                .to_vec()
                .ok()
                .map(|items| Value::List(items.into_iter().map(Value::Message).collect())),
            Value::Map(m) => m.to_pairs().ok().map(Value::Dict),
            _ => None,
        }
    }
}

fn dict_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(ka, va)| b.iter().any(|(kb, vb)| ka == kb && va == vb))
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => dict_eq(a, b),
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::Foreign(a), Value::Foreign(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ if self.is_container() || other.is_container() => {
                match (
                    self.materialize().unwrap_or_else(|| self.clone()),
                    other.materialize().unwrap_or_else(|| other.clone()),
                ) {
                    (a, b) if a.is_container() || b.is_container() => false,
                    (a, b) => a == b,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "b'{}'", b.escape_ascii()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(items) => {
                write!(f, "{{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Message(m) => match m.to_text_compact() {
                Ok(text) => write!(f, "{}", text),
                Err(_) => write!(f, "<{}>", m.full_name()),
            },
            Value::RepeatedScalar(r) => write!(f, "{}", r),
            Value::RepeatedMessage(r) => write!(f, "{}", r),
            Value::Map(m) => write!(f, "{}", m),
            Value::Foreign(obj) => write!(
                f,
                "<foreign {}>",
                obj.type_name().unwrap_or_else(|| "object".to_string())
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Message(m) => write!(f, "{:?}", m),
            Value::Foreign(obj) => write!(f, "Foreign({:?})", obj),
            other => write!(f, "{}", other),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(v as i128)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64, isize, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<MessageProxy> for Value {
    fn from(v: MessageProxy) -> Self {
        Value::Message(v)
    }
}

impl From<RepeatedScalar> for Value {
    fn from(v: RepeatedScalar) -> Self {
        Value::RepeatedScalar(v)
    }
}

impl From<RepeatedMessage> for Value {
    fn from(v: RepeatedMessage) -> Self {
        Value::RepeatedMessage(v)
    }
}

impl From<MapProxy> for Value {
    fn from(v: MapProxy) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::None,
        }
    }
}
