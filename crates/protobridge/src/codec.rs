//! Wire-format encode/decode
//!
//! Non-deterministic encoding is whatever the storage engine emits. The
//! deterministic writer orders known fields and extensions by number and map
//! entries by key, recursively, so equal messages always produce equal bytes
//! regardless of insertion order.

use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;
use prost_reflect::{
    DynamicMessage, ExtensionDescriptor, FieldDescriptor, MessageDescriptor, ReflectMessage,
    Value,
};

use crate::error::{BridgeError, BridgeResult};
use crate::extension;

/// Serialize `message`
pub fn encode(message: &DynamicMessage, deterministic: bool) -> Vec<u8> {
    if deterministic {
        let mut buf = Vec::with_capacity(message.encoded_len());
        write_canonical(message, &mut buf);
        buf
    } else {
        message.encode_to_vec()
    }
}

/// Decode `bytes` as `descriptor`, rejecting unresolved extension fields
pub fn decode_checked(descriptor: &MessageDescriptor, bytes: &[u8]) -> BridgeResult<DynamicMessage> {
    let message = DynamicMessage::decode(descriptor.clone(), bytes).map_err(|e| BridgeError::Decode {
        type_name: descriptor.full_name().to_string(),
        reason: e.to_string(),
    })?;
    extension::check_unknown_fields(&message)?;
    Ok(message)
}

/// Merge `bytes` into `message` after validating them on a scratch copy
pub fn merge_checked(message: &mut DynamicMessage, bytes: &[u8]) -> BridgeResult<()> {
    let descriptor = message.descriptor();
    decode_checked(&descriptor, bytes)?;
    message.merge(bytes).map_err(|e| BridgeError::Decode {
        type_name: descriptor.full_name().to_string(),
        reason: e.to_string(),
    })
}

pub fn byte_size(message: &DynamicMessage) -> usize {
    message.encoded_len()
}

enum Slot {
    Field(FieldDescriptor),
    Extension(ExtensionDescriptor),
}

impl Slot {
    fn number(&self) -> u32 {
        match self {
            Slot::Field(fd) => fd.number(),
            Slot::Extension(ext) => ext.number(),
        }
    }

    fn is_group(&self) -> bool {
        match self {
            Slot::Field(fd) => fd.is_group(),
            Slot::Extension(ext) => ext.is_group(),
        }
    }

    fn is_map(&self) -> bool {
        match self {
            Slot::Field(fd) => fd.is_map(),
            Slot::Extension(ext) => ext.is_map(),
        }
    }

    /// Encode a non-message value through a scratch message holding only it
    fn encode_plain(&self, message: &DynamicMessage, value: &Value, buf: &mut Vec<u8>) {
        let mut scratch = DynamicMessage::new(message.descriptor());
        match self {
            Slot::Field(fd) => {
                if scratch.try_set_field(fd, value.clone()).is_err() {
                    return;
                }
            }
            Slot::Extension(ext) => scratch.set_extension(ext, value.clone()),
        }
        buf.extend_from_slice(&scratch.encode_to_vec());
    }
}

fn write_canonical(message: &DynamicMessage, buf: &mut Vec<u8>) {
    let mut slots: Vec<(Slot, &Value)> = message
        .fields()
        .map(|(fd, v)| (Slot::Field(fd), v))
        .chain(message.extensions().map(|(ext, v)| (Slot::Extension(ext), v)))
        .collect();
    slots.sort_by_key(|(slot, _)| slot.number());

    for (slot, value) in &slots {
        match value {
            Value::Message(m) => write_nested(slot.number(), slot.is_group(), m, buf),
            Value::List(items) if matches!(items.first(), Some(Value::Message(_))) => {
                for item in items {
                    if let Value::Message(m) = item {
                        write_nested(slot.number(), slot.is_group(), m, buf);
                    }
                }
            }
            Value::Map(map) if slot.is_map() => {
                if let Slot::Field(fd) = slot {
                    write_map(fd, map, buf);
                }
            }
            plain => slot.encode_plain(message, plain, buf),
        }
    }
    for unknown in message.unknown_fields() {
        unknown.encode(buf);
    }
}

fn write_nested(number: u32, group: bool, message: &DynamicMessage, buf: &mut Vec<u8>) {
    if group {
        encode_key(number, WireType::StartGroup, buf);
        write_canonical(message, buf);
        encode_key(number, WireType::EndGroup, buf);
    } else {
        let mut body = Vec::new();
        write_canonical(message, &mut body);
        encode_key(number, WireType::LengthDelimited, buf);
        encode_varint(body.len() as u64, buf);
        buf.extend_from_slice(&body);
    }
}

fn write_map(
    fd: &FieldDescriptor,
    map: &std::collections::HashMap<prost_reflect::MapKey, Value>,
    buf: &mut Vec<u8>,
) {
    let Some(entry_desc) = fd.kind().as_message().cloned() else {
        return;
    };
    let key_fd = entry_desc.map_entry_key_field();
    let value_fd = entry_desc.map_entry_value_field();

    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in entries {
        let mut entry = DynamicMessage::new(entry_desc.clone());
        if entry.try_set_field(&key_fd, Value::from(key.clone())).is_err()
            || entry.try_set_field(&value_fd, value.clone()).is_err()
        {
            continue;
        }
        write_nested(fd.number(), false, &entry, buf);
    }
}
