//! Native message storage and path resolution
//!
//! A [`NativeRoot`] is one top-level native message. Proxies never hold a
//! pointer into its interior; they hold a path of [`PathStep`]s from the root
//! and re-resolve it on every access, so the storage can be reorganised
//! underneath them without leaving dangling views.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use prost_reflect::{
    DynamicMessage, ExtensionDescriptor, FieldDescriptor, MapKey, MessageDescriptor,
    ReflectMessage, Value,
};

use crate::broker::{OwnerId, OwnershipBroker};
use crate::error::{BridgeError, BridgeResult};

/// A native message owned by code outside the bridge.
///
/// The bridge wraps it without ever taking ownership; typically it lives in
/// a `static` or is leaked for the lifetime of the process.
pub struct StaticMessage {
    message: Mutex<DynamicMessage>,
}

impl StaticMessage {
    pub fn new(message: DynamicMessage) -> Self {
        Self {
            message: Mutex::new(message),
        }
    }

    /// Move a message into process-lifetime storage
    pub fn leak(message: DynamicMessage) -> &'static StaticMessage {
        Box::leak(Box::new(Self::new(message)))
    }

    /// Run `f` against the native message, as native code would
    pub fn with<R>(&self, f: impl FnOnce(&mut DynamicMessage) -> R) -> R {
        f(&mut self.message.lock())
    }

    pub(crate) fn address(&'static self) -> usize {
        self as *const StaticMessage as usize
    }
}

impl fmt::Debug for StaticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMessage").finish_non_exhaustive()
    }
}

pub(crate) enum Backing {
    /// Memory created by the bridge and freed with the root
    Owned(Mutex<DynamicMessage>),
    /// Memory owned elsewhere; never freed here
    Unowned(&'static StaticMessage),
}

/// A top-level native message tracked by the ownership broker
pub struct NativeRoot {
    owner: OwnerId,
    backing: Backing,
}

impl NativeRoot {
    pub(crate) fn new(owner: OwnerId, backing: Backing) -> Self {
        Self { owner, backing }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn descriptor(&self) -> MessageDescriptor {
        self.lock().descriptor()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DynamicMessage> {
        match &self.backing {
            Backing::Owned(m) => m.lock(),
            Backing::Unowned(s) => s.message.lock(),
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self.backing, Backing::Owned(_))
    }
}

impl Drop for NativeRoot {
    fn drop(&mut self) {
        let address = match &self.backing {
            Backing::Owned(_) => None,
            Backing::Unowned(s) => Some(s.address()),
        };
        OwnershipBroker::global().retire(self.owner, address);
    }
}

impl fmt::Debug for NativeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRoot")
            .field("owner", &self.owner)
            .field("owned", &self.is_owned())
            .finish()
    }
}

/// One hop from a message to a nested message
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Singular message field
    Field(FieldDescriptor),
    /// Message-typed extension linked into the root's pool
    Extension(ExtensionDescriptor),
    /// Element of a repeated message field
    Element(FieldDescriptor, usize),
    /// Value of a message-valued map entry
    MapValue(FieldDescriptor, MapKey),
}

impl PathStep {
    /// Name used in dotted error paths
    pub fn label(&self) -> String {
        match self {
            PathStep::Field(fd) | PathStep::Element(fd, _) | PathStep::MapValue(fd, _) => {
                fd.name().to_string()
            }
            PathStep::Extension(ext) => format!("[{}]", ext.full_name()),
        }
    }
}

/// Join step labels and an optional leaf name into a dotted path
pub(crate) fn dotted(steps: &[PathStep], leaf: Option<&str>) -> String {
    let mut parts: Vec<String> = steps.iter().map(PathStep::label).collect();
    if let Some(leaf) = leaf {
        parts.push(leaf.to_string());
    }
    parts.join(".")
}

/// Resolve `steps` from `root` for reading.
///
/// Unset message fields and absent map entries read as default messages;
/// nothing is inserted.
pub(crate) fn read_at<R>(
    message: &DynamicMessage,
    steps: &[PathStep],
    f: impl FnOnce(&DynamicMessage) -> R,
) -> BridgeResult<R> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(f(message));
    };
    match step {
        PathStep::Field(fd) => {
            let value = message.get_field(fd);
            match value.as_ref() {
                Value::Message(m) => read_at(m, rest, f),
                other => Err(not_a_message(fd.name(), other)),
            }
        }
        PathStep::Extension(ext) => {
            let value = message.get_extension(ext);
            match value.as_ref() {
                Value::Message(m) => read_at(m, rest, f),
                other => Err(not_a_message(ext.full_name(), other)),
            }
        }
        PathStep::Element(fd, index) => {
            let value = message.get_field(fd);
            let items = value.as_ref().as_list().unwrap_or(&[]);
            match items.get(*index) {
                Some(Value::Message(m)) => read_at(m, rest, f),
                Some(other) => Err(not_a_message(fd.name(), other)),
                None => Err(BridgeError::IndexOutOfRange {
                    path: fd.name().to_string(),
                    index: *index as isize,
                    len: items.len(),
                }),
            }
        }
        PathStep::MapValue(fd, key) => {
            let value = message.get_field(fd);
            match value.as_ref().as_map().and_then(|map| map.get(key)) {
                Some(Value::Message(m)) => read_at(m, rest, f),
                Some(other) => Err(not_a_message(fd.name(), other)),
                None => {
                    let empty = DynamicMessage::new(map_value_descriptor(fd)?);
                    read_at(&empty, rest, f)
                }
            }
        }
    }
}

/// Resolve `steps` from `root` for writing, inserting defaults on the way.
pub(crate) fn write_at<R>(
    message: &mut DynamicMessage,
    steps: &[PathStep],
    f: impl FnOnce(&mut DynamicMessage) -> BridgeResult<R>,
) -> BridgeResult<R> {
    let Some((step, rest)) = steps.split_first() else {
        return f(message);
    };
    match step {
        PathStep::Field(fd) => match message.get_field_mut(fd) {
            Value::Message(m) => write_at(m, rest, f),
            other => Err(not_a_message(fd.name(), other)),
        },
        PathStep::Extension(ext) => match message.get_extension_mut(ext) {
            Value::Message(m) => write_at(m, rest, f),
            other => Err(not_a_message(ext.full_name(), other)),
        },
        PathStep::Element(fd, index) => {
            let value = message.get_field_mut(fd);
            let items = value
                .as_list_mut()
                .ok_or_else(|| BridgeError::mismatch(fd.name(), "repeated field", "scalar"))?;
            let len = items.len();
            match items.get_mut(*index) {
                Some(Value::Message(m)) => write_at(m, rest, f),
                Some(other) => Err(not_a_message(fd.name(), other)),
                None => Err(BridgeError::IndexOutOfRange {
                    path: fd.name().to_string(),
                    index: *index as isize,
                    len,
                }),
            }
        }
        PathStep::MapValue(fd, key) => {
            let value_desc = map_value_descriptor(fd)?;
            let map = message
                .get_field_mut(fd)
                .as_map_mut()
                .ok_or_else(|| BridgeError::mismatch(fd.name(), "map field", "scalar"))?;
            match map
                .entry(key.clone())
                .or_insert_with(|| Value::Message(DynamicMessage::new(value_desc)))
            {
                Value::Message(m) => write_at(m, rest, f),
                other => Err(not_a_message(fd.name(), other)),
            }
        }
    }
}

fn map_value_descriptor(fd: &FieldDescriptor) -> BridgeResult<MessageDescriptor> {
    fd.kind()
        .as_message()
        .map(|entry| entry.map_entry_value_field().kind())
        .and_then(|kind| kind.as_message().cloned())
        .ok_or_else(|| BridgeError::mismatch(fd.name(), "message-valued map", "scalar map"))
}

fn not_a_message(name: &str, value: &Value) -> BridgeError {
    let got = match value {
        Value::List(_) => "list",
        Value::Map(_) => "map",
        _ => "scalar",
    };
    BridgeError::mismatch(name, "message", got)
}
