//! Message proxy
//!
//! A [`MessageProxy`] is the host's handle on one native message, either a
//! root or a message nested somewhere inside one. Field access goes through
//! the type's accessor table; composite fields come back as live proxies
//! that keep the native root alive.

use std::fmt;
use std::sync::Arc;

use prost::Message as _;
use prost_reflect::{DynamicMessage, FieldDescriptor, MessageDescriptor, ReflectMessage};
use serde::{Deserialize, Serialize};

use crate::broker::{DependentId, Lease, OwnerId, OwnershipBroker};
use crate::codec;
use crate::config::BridgeConfig;
use crate::containers::{MapProxy, RepeatedMessage, RepeatedScalar};
use crate::convert;
use crate::dispatch::{AccessorTable, FieldAccessor, Strategy};
use crate::error::{BridgeError, BridgeResult};
use crate::extension::{self, Binding, ExtensionKey};
use crate::gate;
use crate::resolver::DescriptorResolver;
use crate::storage::{self, PathStep, StaticMessage};
use crate::text;
use crate::value::Value;

/// Serialized form of a message for pickling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickled {
    pub type_name: String,
    pub payload: Vec<u8>,
}

impl Pickled {
    pub fn to_json(&self) -> BridgeResult<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::Decode {
            type_name: self.type_name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::Decode {
            type_name: "Pickled".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Storage a structural mutation is about to drop or reorder, relative to
/// the message it runs on
#[derive(Debug, Clone, Copy)]
pub(crate) enum Removal<'a> {
    /// Elements of a repeated message field from an index on
    Elements(&'a FieldDescriptor, usize),
    /// One singular field, extension or map value and everything below it
    Subtree(&'a PathStep),
    /// Every value of a message-valued map
    MapEntries(&'a FieldDescriptor),
    /// The whole message
    All,
}

/// Host-side handle on a native message
#[derive(Clone)]
pub struct MessageProxy {
    lease: Lease,
    descriptor: MessageDescriptor,
    table: Arc<AccessorTable>,
    read_only: bool,
}

impl MessageProxy {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// New empty message of `descriptor`'s type
    pub fn new(descriptor: &MessageDescriptor) -> Self {
        Self::from_dynamic(DynamicMessage::new(descriptor.clone()))
    }

    /// New message of a type resolved by name, through its concrete
    /// factory when one is registered
    pub fn create(type_name: &str) -> BridgeResult<Self> {
        DescriptorResolver::global()
            .new_message(type_name)
            .map(Self::from_dynamic)
    }

    /// New message initialized from keyword fields.
    ///
    /// Message fields accept a dict of their own fields or a message;
    /// repeated fields accept a list; map fields accept a dict.
    pub fn with_fields<I, K, V>(descriptor: &MessageDescriptor, fields: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let message = Self::new(descriptor);
        message.update_fields(fields)?;
        Ok(message)
    }

    /// Take exclusive ownership of a native message
    pub fn from_dynamic(message: DynamicMessage) -> Self {
        let descriptor = message.descriptor();
        let lease = OwnershipBroker::global().adopt(message);
        Self::bind(lease, descriptor, false)
    }

    /// Wrap a native message the bridge does not own
    pub fn from_static(message: &'static StaticMessage) -> Self {
        let lease = OwnershipBroker::global().wrap_static(message);
        let descriptor = lease.root().descriptor();
        Self::bind(lease, descriptor, false)
    }

    /// Copy a generated message into a new proxy
    pub fn from_generated<T: ReflectMessage>(message: &T) -> Self {
        Self::from_dynamic(message.transcode_to_dynamic())
    }

    /// Copy this message into a generated type
    pub fn to_generated<T: ReflectMessage + Default>(&self) -> BridgeResult<T> {
        self.snapshot()?
            .transcode_to::<T>()
            .map_err(|e| BridgeError::Decode {
                type_name: self.full_name().to_string(),
                reason: e.to_string(),
            })
    }

    fn bind(lease: Lease, descriptor: MessageDescriptor, read_only: bool) -> Self {
        let table = DescriptorResolver::global().table_for(&descriptor);
        Self {
            lease,
            descriptor,
            table,
            read_only,
        }
    }

    pub(crate) fn child(&self, step: PathStep, descriptor: MessageDescriptor) -> MessageProxy {
        Self::bind(self.lease.child(step), descriptor, self.read_only)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Native root this proxy reaches into
    pub fn owner(&self) -> OwnerId {
        self.lease.owner()
    }

    /// Identity of this proxy; clones get a fresh one
    pub fn identity(&self) -> DependentId {
        self.lease.dependent()
    }

    /// Dotted path from the root message, empty for roots
    pub fn path(&self) -> String {
        storage::dotted(self.lease.path(), None)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read-only alias of this message
    pub fn const_view(&self) -> MessageProxy {
        Self::bind(self.lease.clone(), self.descriptor.clone(), true)
    }

    /// Independent copy with its own native storage
    pub fn deep_copy(&self) -> BridgeResult<MessageProxy> {
        self.snapshot().map(Self::from_dynamic)
    }

    /// Copy of the current native contents
    pub fn snapshot(&self) -> BridgeResult<DynamicMessage> {
        self.read(DynamicMessage::clone)
    }

    // ------------------------------------------------------------------
    // Storage access
    // ------------------------------------------------------------------

    pub(crate) fn field_path(&self, leaf: &str) -> String {
        storage::dotted(self.lease.path(), Some(leaf))
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&DynamicMessage) -> R) -> BridgeResult<R> {
        let guard = self.lease.root().lock();
        storage::read_at(&guard, self.lease.path(), f)
    }

    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut DynamicMessage) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        if self.read_only {
            return Err(BridgeError::ReadOnly { path: self.path() });
        }
        let mut guard = self.lease.root().lock();
        storage::write_at(&mut guard, self.lease.path(), f)
    }

    fn accessor(&self, name: &str) -> BridgeResult<Arc<FieldAccessor>> {
        self.table
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::NoSuchField {
                path: self.field_path(name),
            })
    }

    /// Fail if a live proxy reaches through a repeated element that
    /// `removal` would shift or drop.
    pub(crate) fn ensure_no_live_elements(&self, removal: Removal<'_>) -> BridgeResult<()> {
        let own = self.lease.path();
        for path in OwnershipBroker::global().live_paths(self.owner()) {
            if path.len() <= own.len() || path[..own.len()] != *own {
                continue;
            }
            let below = &path[own.len()..];
            let through_element = below.iter().any(|step| matches!(step, PathStep::Element(..)));
            let blocked = match removal {
                Removal::Elements(fd, from) => matches!(
                    &below[0],
                    PathStep::Element(f, index) if f == fd && *index >= from
                ),
                Removal::Subtree(step) => below[0] == *step && through_element,
                Removal::MapEntries(fd) => {
                    matches!(&below[0], PathStep::MapValue(f, _) if f == fd) && through_element
                }
                Removal::All => through_element,
            };
            if blocked {
                return Err(BridgeError::unsupported(
                    storage::dotted(&path, None),
                    "a live proxy refers to an element that would be removed or shifted",
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Read a field. Scalars are copied; composites come back as live proxies.
    pub fn get_field(&self, name: &str) -> BridgeResult<Value> {
        let accessor = self.accessor(name)?;
        match &accessor.strategy {
            Strategy::Message(desc) => Ok(Value::Message(
                self.child(PathStep::Field(accessor.field.clone()), desc.clone()),
            )),
            Strategy::Repeated(inner) => match **inner {
                Strategy::Message(_) => Ok(Value::RepeatedMessage(RepeatedMessage::bind(
                    self.clone(),
                    accessor,
                ))),
                _ => Ok(Value::RepeatedScalar(RepeatedScalar::bind(
                    self.clone(),
                    accessor,
                ))),
            },
            Strategy::Map { .. } => Ok(Value::Map(MapProxy::bind(self.clone(), accessor))),
            _ => self.read(|m| convert::to_host(&m.get_field(&accessor.field))),
        }
    }

    /// Assign a scalar, enum or oneof-member field
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> BridgeResult<()> {
        let value = value.into();
        let accessor = self.accessor(name)?;
        let path = self.field_path(name);
        if !accessor.strategy.is_assignable() {
            return Err(BridgeError::not_assignable(
                path,
                format!(
                    "{} fields are mutated in place, not replaced",
                    accessor.strategy.type_name()
                ),
            ));
        }
        let native = convert::to_native(&accessor.strategy, &value, &path)?;
        // setting a oneof member drops whichever sibling was set
        if let Some(oneof) = accessor.field.containing_oneof() {
            for sibling in oneof.fields().filter(|fd| *fd != accessor.field) {
                let step = PathStep::Field(sibling);
                self.ensure_no_live_elements(Removal::Subtree(&step))?;
            }
        }
        self.write(|m| {
            m.try_set_field(&accessor.field, native)
                .map_err(|_| BridgeError::mismatch(&path, accessor.strategy.type_name(), value.type_name()))
        })
    }

    /// Explicit presence of a singular field
    pub fn has_field(&self, name: &str) -> BridgeResult<bool> {
        let accessor = self.accessor(name)?;
        if accessor.field.is_list() || accessor.field.is_map() {
            return Err(BridgeError::unsupported(
                self.field_path(name),
                "presence is only tracked for singular fields",
            ));
        }
        if !accessor.field.supports_presence() {
            return Err(BridgeError::unsupported(
                self.field_path(name),
                "field does not track presence",
            ));
        }
        self.read(|m| m.has_field(&accessor.field))
    }

    pub fn clear_field(&self, name: &str) -> BridgeResult<()> {
        let accessor = self.accessor(name)?;
        match &accessor.strategy {
            Strategy::Message(_) => {
                let step = PathStep::Field(accessor.field.clone());
                self.ensure_no_live_elements(Removal::Subtree(&step))?;
            }
            Strategy::Map { .. } => {
                self.ensure_no_live_elements(Removal::MapEntries(&accessor.field))?;
            }
            _ if accessor.is_repeated_message() => {
                self.ensure_no_live_elements(Removal::Elements(&accessor.field, 0))?;
            }
            _ => {}
        }
        self.write(|m| {
            m.clear_field(&accessor.field);
            Ok(())
        })
    }

    /// Name of the set member of a oneof group
    pub fn which_oneof(&self, group: &str) -> BridgeResult<Option<String>> {
        let oneof = self
            .table
            .oneof(group)
            .cloned()
            .ok_or_else(|| BridgeError::NoSuchOneof {
                path: self.field_path(group),
            })?;
        self.read(|m| {
            oneof
                .fields()
                .find(|fd| m.has_field(fd))
                .map(|fd| fd.name().to_string())
        })
    }

    /// Names of fields currently set, in number order
    pub fn list_fields(&self) -> BridgeResult<Vec<String>> {
        self.read(|m| {
            let mut set: Vec<_> = m.fields().map(|(fd, _)| fd).collect();
            set.sort_by_key(FieldDescriptor::number);
            set.iter().map(|fd| fd.name().to_string()).collect()
        })
    }

    /// Clear every field
    pub fn clear(&self) -> BridgeResult<()> {
        self.ensure_no_live_elements(Removal::All)?;
        self.write(|m| {
            m.clear();
            Ok(())
        })
    }

    /// Singular message field as a live proxy
    pub fn message(&self, name: &str) -> BridgeResult<MessageProxy> {
        let value = self.get_field(name)?;
        let got = value.type_name();
        value
            .into_message()
            .ok_or_else(|| BridgeError::mismatch(self.field_path(name), "message field", got))
    }

    pub fn repeated_scalar(&self, name: &str) -> BridgeResult<RepeatedScalar> {
        let value = self.get_field(name)?;
        let got = value.type_name();
        value
            .into_repeated_scalar()
            .ok_or_else(|| BridgeError::mismatch(self.field_path(name), "repeated scalar field", got))
    }

    pub fn repeated_message(&self, name: &str) -> BridgeResult<RepeatedMessage> {
        let value = self.get_field(name)?;
        let got = value.type_name();
        value
            .into_repeated_message()
            .ok_or_else(|| BridgeError::mismatch(self.field_path(name), "repeated message field", got))
    }

    pub fn map_field(&self, name: &str) -> BridgeResult<MapProxy> {
        let value = self.get_field(name)?;
        let got = value.type_name();
        value
            .into_map()
            .ok_or_else(|| BridgeError::mismatch(self.field_path(name), "map field", got))
    }

    /// Apply keyword-style initialization
    pub fn update_fields<I, K, V>(&self, fields: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in fields {
            let name = name.as_ref();
            let value = value.into();
            let accessor = self.accessor(name)?;
            match (&accessor.strategy, value) {
                (Strategy::Message(_), Value::None) => {}
                (Strategy::Message(_), Value::Dict(items)) => {
                    let kwargs = kwargs_from_dict(items, &self.field_path(name))?;
                    self.message(name)?.update_fields(kwargs)?;
                }
                (Strategy::Message(_), other) => self.message(name)?.copy_from(&other)?,
                (Strategy::Repeated(_), items) if accessor.is_repeated_message() => {
                    let container = self.repeated_message(name)?;
                    for item in list_items(items, &self.field_path(name))? {
                        match item {
                            Value::Dict(entries) => {
                                let kwargs = kwargs_from_dict(entries, &self.field_path(name))?;
                                container.add(kwargs)?;
                            }
                            other => container.append(other)?,
                        }
                    }
                }
                (Strategy::Repeated(_), items) => {
                    let items = list_items(items, &self.field_path(name))?;
                    self.repeated_scalar(name)?.extend(items)?;
                }
                (Strategy::Map { .. }, Value::Dict(items)) => self.map_field(name)?.update(items)?,
                (_, other) => self.set_field(name, other)?,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Whole-message operations
    // ------------------------------------------------------------------

    /// Replace the contents with those of `other`
    pub fn copy_from(&self, other: &Value) -> BridgeResult<()> {
        let replacement = gate::coerce_message(other, &self.descriptor, &self.path())?;
        self.ensure_no_live_elements(Removal::All)?;
        self.write(|m| {
            *m = replacement;
            Ok(())
        })
    }

    /// Merge the set fields of `other` into this message
    pub fn merge_from(&self, other: &Value) -> BridgeResult<()> {
        let source = gate::coerce_message(other, &self.descriptor, &self.path())?;
        let bytes = source.encode_to_vec();
        let type_name = self.full_name().to_string();
        self.write(|m| {
            m.merge(bytes.as_slice()).map_err(|e| BridgeError::Decode {
                type_name,
                reason: e.to_string(),
            })
        })
    }

    pub fn serialize(&self, deterministic: bool) -> BridgeResult<Vec<u8>> {
        self.read(|m| codec::encode(m, deterministic))
    }

    /// Serialize with the configured default determinism
    pub fn serialize_default(&self) -> BridgeResult<Vec<u8>> {
        self.serialize(BridgeConfig::global().deterministic_by_default)
    }

    pub fn byte_size(&self) -> BridgeResult<usize> {
        self.read(codec::byte_size)
    }

    /// Decode a new message of `descriptor`'s type
    pub fn parse(descriptor: &MessageDescriptor, bytes: &[u8]) -> BridgeResult<Self> {
        codec::decode_checked(descriptor, bytes).map(Self::from_dynamic)
    }

    /// Replace the contents with decoded `bytes`
    pub fn parse_from_bytes(&self, bytes: &[u8]) -> BridgeResult<()> {
        let decoded = codec::decode_checked(&self.descriptor, bytes)?;
        self.ensure_no_live_elements(Removal::All)?;
        self.write(|m| {
            *m = decoded;
            Ok(())
        })
    }

    /// Merge decoded `bytes` into the contents
    pub fn merge_from_bytes(&self, bytes: &[u8]) -> BridgeResult<()> {
        self.write(|m| codec::merge_checked(m, bytes))
    }

    pub fn to_text(&self) -> BridgeResult<String> {
        self.read(text::to_text)
    }

    pub fn to_text_compact(&self) -> BridgeResult<String> {
        self.read(text::to_text_compact)
    }

    /// Parse the text form into a new message
    pub fn parse_text(descriptor: &MessageDescriptor, input: &str) -> BridgeResult<Self> {
        parse_text_message(descriptor, input).map(Self::from_dynamic)
    }

    /// Merge the text form into the contents
    pub fn merge_text(&self, input: &str) -> BridgeResult<()> {
        let parsed = parse_text_message(&self.descriptor, input)?;
        let bytes = parsed.encode_to_vec();
        let type_name = self.full_name().to_string();
        self.write(|m| {
            m.merge(bytes.as_slice()).map_err(|e| BridgeError::Decode {
                type_name,
                reason: e.to_string(),
            })
        })
    }

    pub fn to_pickle(&self) -> BridgeResult<Pickled> {
        Ok(Pickled {
            type_name: self.full_name().to_string(),
            payload: self.serialize(true)?,
        })
    }

    /// Rebuild a pickled message; its type must be known to the global resolver
    pub fn from_pickle(pickled: &Pickled) -> BridgeResult<Self> {
        let descriptor = DescriptorResolver::global().resolve(&pickled.type_name)?;
        Self::parse(&descriptor, &pickled.payload)
    }

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    pub fn get_extension(&self, key: &ExtensionKey) -> BridgeResult<Value> {
        match extension::bind(key, &self.descriptor)? {
            Binding::Linked(ext) => match Strategy::for_extension(&ext) {
                Strategy::Message(desc) => {
                    Ok(Value::Message(self.child(PathStep::Extension(ext), desc)))
                }
                _ => self.read(|m| convert::to_host(&m.get_extension(&ext))),
            },
            Binding::Unlinked(ext) => {
                let view = self.read(|m| extension::unlinked_view(m, &ext))??;
                Ok(convert::to_host(&view.get_extension(&ext)))
            }
        }
    }

    /// Set an extension. Message-typed extensions are copied from `value`.
    pub fn set_extension(&self, key: &ExtensionKey, value: impl Into<Value>) -> BridgeResult<()> {
        let value = value.into();
        let path = format!("[{}]", key.full_name());
        let (ext, linked) = match extension::bind(key, &self.descriptor)? {
            Binding::Linked(ext) => (ext, true),
            Binding::Unlinked(ext) => (ext, false),
        };
        let native = convert::to_native(&Strategy::for_extension(&ext), &value, &path)?;
        if !native.is_valid_for_extension(&ext) {
            return Err(BridgeError::mismatch(
                path,
                Strategy::for_extension(&ext).type_name(),
                value.type_name(),
            ));
        }
        if linked {
            let step = PathStep::Extension(ext.clone());
            self.ensure_no_live_elements(Removal::Subtree(&step))?;
        }
        self.write(|m| {
            if linked {
                m.set_extension(&ext, native);
                Ok(())
            } else {
                extension::unlinked_set(m, &ext, native)
            }
        })
    }

    pub fn has_extension(&self, key: &ExtensionKey) -> BridgeResult<bool> {
        match extension::bind(key, &self.descriptor)? {
            Binding::Linked(ext) => self.read(|m| m.has_extension(&ext)),
            Binding::Unlinked(ext) => self.read(|m| extension::unlinked_has(m, ext.number())),
        }
    }

    pub fn clear_extension(&self, key: &ExtensionKey) -> BridgeResult<()> {
        match extension::bind(key, &self.descriptor)? {
            Binding::Linked(ext) => {
                let step = PathStep::Extension(ext.clone());
                self.ensure_no_live_elements(Removal::Subtree(&step))?;
                self.write(|m| {
                    m.clear_extension(&ext);
                    Ok(())
                })
            }
            Binding::Unlinked(ext) => self.write(|m| extension::unlinked_clear(m, ext.number())),
        }
    }

    /// Keys of the linked extensions currently set
    pub fn list_extensions(&self) -> BridgeResult<Vec<ExtensionKey>> {
        self.read(|m| m.extensions().map(|(ext, _)| ExtensionKey::new(ext)).collect())
    }
}

fn parse_text_message(descriptor: &MessageDescriptor, input: &str) -> BridgeResult<DynamicMessage> {
    DynamicMessage::parse_text_format(descriptor.clone(), input).map_err(|e| BridgeError::TextParse {
        type_name: descriptor.full_name().to_string(),
        reason: e.to_string(),
    })
}

fn kwargs_from_dict(items: Vec<(Value, Value)>, path: &str) -> BridgeResult<Vec<(String, Value)>> {
    items
        .into_iter()
        .map(|(k, v)| match k {
            Value::Str(name) => Ok((name, v)),
            other => Err(BridgeError::mismatch(path, "str field name", other.type_name())),
        })
        .collect()
}

fn list_items(value: Value, path: &str) -> BridgeResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::RepeatedScalar(r) => r.to_vec(),
        Value::RepeatedMessage(r) => Ok(r.to_vec()?.into_iter().map(Value::Message).collect()),
        other => Err(BridgeError::mismatch(path, "list", other.type_name())),
    }
}

impl PartialEq for MessageProxy {
    fn eq(&self, other: &MessageProxy) -> bool {
        if self.full_name() != other.full_name() {
            return false;
        }
        match (self.serialize(true), other.serialize(true)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq<DynamicMessage> for MessageProxy {
    fn eq(&self, other: &DynamicMessage) -> bool {
        self.full_name() == other.descriptor().full_name()
            && self
                .serialize(true)
                .map_or(false, |bytes| bytes == codec::encode(other, true))
    }
}

impl fmt::Display for MessageProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "<{}>", self.full_name()),
        }
    }
}

impl fmt::Debug for MessageProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProxy")
            .field("type", &self.full_name())
            .field("owner", &self.owner())
            .field("path", &self.path())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing;

    #[test]
    fn test_scalar_round_trip() {
        let message = MessageProxy::new(&testing::outer());
        message.set_field("label", "hello").unwrap();
        assert_eq!(message.get_field("label").unwrap(), Value::from("hello"));
        assert!(message.has_field("label").unwrap());
        message.clear_field("label").unwrap();
        assert!(!message.has_field("label").unwrap());
    }

    #[test]
    fn test_unknown_names() {
        let message = MessageProxy::new(&testing::outer());
        let err = message.get_field("bogus").unwrap_err();
        assert_eq!(err, BridgeError::NoSuchField { path: "bogus".to_string() });
        assert_eq!(message.which_oneof("bogus").unwrap_err().kind(), ErrorKind::NoSuchOneof);
    }

    #[test]
    fn test_nested_paths_in_errors() {
        let message = MessageProxy::new(&testing::outer());
        let leaf = message.message("leaf").unwrap();
        let err = leaf.set_field("value", "text").unwrap_err();
        assert_eq!(err.path(), Some("leaf.value"));
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_const_view_rejects_writes() {
        let message = MessageProxy::new(&testing::outer());
        message.set_field("label", "x").unwrap();
        let view = message.const_view();
        assert_eq!(view.get_field("label").unwrap(), Value::from("x"));
        assert_eq!(view.set_field("label", "y").unwrap_err().kind(), ErrorKind::ReadOnly);
        assert_eq!(
            view.message("leaf").unwrap().set_field("value", 1).unwrap_err().kind(),
            ErrorKind::ReadOnly
        );
    }

    #[test]
    fn test_pickle_json() {
        let pickled = Pickled {
            type_name: "unit.Outer".to_string(),
            payload: vec![1, 2, 3],
        };
        let json = pickled.to_json().unwrap();
        assert_eq!(Pickled::from_json(&json).unwrap(), pickled);
    }
}
