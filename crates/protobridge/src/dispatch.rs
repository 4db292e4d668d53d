//! Field accessor dispatch
//!
//! Each message type gets an [`AccessorTable`] built once from its
//! descriptor. Looking a field up by name yields a [`FieldAccessor`] whose
//! [`Strategy`] was fixed at build time, so field access never inspects the
//! descriptor kind again.

use std::fmt;
use std::sync::Arc;

use prost_reflect::{
    EnumDescriptor, ExtensionDescriptor, FieldDescriptor, Kind, MessageDescriptor,
    OneofDescriptor,
};
use rustc_hash::FxHashMap;

/// Numeric storage kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
}

impl NumericKind {
    pub fn name(&self) -> &'static str {
        match self {
            NumericKind::Bool => "bool",
            NumericKind::I32 => "int32",
            NumericKind::I64 => "int64",
            NumericKind::U32 => "uint32",
            NumericKind::U64 => "uint64",
            NumericKind::F32 => "float",
            NumericKind::F64 => "double",
        }
    }

    /// Inclusive integer range, `None` for bool and floating kinds
    pub fn int_range(&self) -> Option<(i128, i128)> {
        match self {
            NumericKind::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            NumericKind::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            NumericKind::U32 => Some((0, u32::MAX as i128)),
            NumericKind::U64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

/// Text storage kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Str,
    Bytes,
}

/// Conversion strategy for one field, chosen when the table is built
#[derive(Clone, PartialEq)]
pub enum Strategy {
    Numeric(NumericKind),
    Text(TextKind),
    Enum(EnumDescriptor),
    Message(MessageDescriptor),
    Repeated(Box<Strategy>),
    Map { key: Box<Strategy>, value: Box<Strategy> },
}

impl Strategy {
    /// Strategy for a single value of `kind`
    pub fn for_kind(kind: &Kind) -> Strategy {
        match kind {
            Kind::Bool => Strategy::Numeric(NumericKind::Bool),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Strategy::Numeric(NumericKind::I32),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Strategy::Numeric(NumericKind::I64),
            Kind::Uint32 | Kind::Fixed32 => Strategy::Numeric(NumericKind::U32),
            Kind::Uint64 | Kind::Fixed64 => Strategy::Numeric(NumericKind::U64),
            Kind::Float => Strategy::Numeric(NumericKind::F32),
            Kind::Double => Strategy::Numeric(NumericKind::F64),
            Kind::String => Strategy::Text(TextKind::Str),
            Kind::Bytes => Strategy::Text(TextKind::Bytes),
            Kind::Enum(e) => Strategy::Enum(e.clone()),
            Kind::Message(m) => Strategy::Message(m.clone()),
        }
    }

    pub fn for_field(field: &FieldDescriptor) -> Strategy {
        let kind = field.kind();
        if field.is_map() {
            if let Some(entry) = kind.as_message() {
                return Strategy::Map {
                    key: Box::new(Strategy::for_kind(&entry.map_entry_key_field().kind())),
                    value: Box::new(Strategy::for_kind(&entry.map_entry_value_field().kind())),
                };
            }
        }
        let single = Strategy::for_kind(&kind);
        if field.is_list() {
            Strategy::Repeated(Box::new(single))
        } else {
            single
        }
    }

    pub fn for_extension(ext: &ExtensionDescriptor) -> Strategy {
        let single = Strategy::for_kind(&ext.kind());
        if ext.is_list() {
            Strategy::Repeated(Box::new(single))
        } else {
            single
        }
    }

    /// Whether values are replaced by assignment (as opposed to mutated in place)
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Strategy::Numeric(_) | Strategy::Text(_) | Strategy::Enum(_)
        )
    }

    /// Type name used in mismatch diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Strategy::Numeric(n) => n.name().to_string(),
            Strategy::Text(TextKind::Str) => "str".to_string(),
            Strategy::Text(TextKind::Bytes) => "bytes".to_string(),
            Strategy::Enum(e) => e.full_name().to_string(),
            Strategy::Message(m) => m.full_name().to_string(),
            Strategy::Repeated(inner) => format!("repeated {}", inner.type_name()),
            Strategy::Map { key, value } => {
                format!("map<{}, {}>", key.type_name(), value.type_name())
            }
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy({})", self.type_name())
    }
}

/// One field's descriptor bound to its strategy
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    pub field: FieldDescriptor,
    pub strategy: Strategy,
}

impl FieldAccessor {
    pub fn new(field: FieldDescriptor) -> Self {
        let strategy = Strategy::for_field(&field);
        Self { field, strategy }
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    /// Whether this field lives in a repeated-message container
    pub fn is_repeated_message(&self) -> bool {
        matches!(&self.strategy, Strategy::Repeated(inner) if matches!(**inner, Strategy::Message(_)))
    }
}

/// Name-indexed accessors for one message type
#[derive(Debug)]
pub struct AccessorTable {
    descriptor: MessageDescriptor,
    by_name: FxHashMap<String, Arc<FieldAccessor>>,
    oneofs: FxHashMap<String, OneofDescriptor>,
}

impl AccessorTable {
    pub fn build(descriptor: &MessageDescriptor) -> Self {
        let by_name = descriptor
            .fields()
            .map(|field| (field.name().to_string(), Arc::new(FieldAccessor::new(field))))
            .collect();
        let oneofs = descriptor
            .oneofs()
            .map(|oneof| (oneof.name().to_string(), oneof))
            .collect();
        Self {
            descriptor: descriptor.clone(),
            by_name,
            oneofs,
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FieldAccessor>> {
        self.by_name.get(name)
    }

    pub fn oneof(&self, name: &str) -> Option<&OneofDescriptor> {
        self.oneofs.get(name)
    }

    /// Accessors ordered by field number
    pub fn accessors(&self) -> Vec<Arc<FieldAccessor>> {
        let mut all: Vec<_> = self.by_name.values().cloned().collect();
        all.sort_by_key(|a| a.field.number());
        all
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
