//! Extension registry bridge
//!
//! Extensions are identified by (extendee, number), so the same extension
//! loaded through two different descriptor pools is one key. A key whose
//! extendee pool does not link the definition is still usable: its value
//! lives in the message's unknown fields and is decoded through the key's
//! own pool on access.
//!
//! Decoding rejects unknown fields that fall inside a message's extension
//! ranges unless the `top:path` location was allow-listed.

use std::fmt;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prost::Message as _;
use prost_reflect::{DynamicMessage, ExtensionDescriptor, MessageDescriptor, ReflectMessage, Value};
use rustc_hash::FxHashSet;

use crate::error::{BridgeError, BridgeResult};
use crate::resolver::DescriptorResolver;

static ALLOW_LIST: Lazy<RwLock<FxHashSet<String>>> = Lazy::new(|| RwLock::new(FxHashSet::default()));

/// Suppress the unknown-extension check for one location.
///
/// `top_message` is the full name of the decoded root type; `parent_path`
/// the dotted field path of the message holding the unknown field (empty
/// for the root itself). Suppressed fields are kept as unknown bytes.
pub fn allow_unknown_fields_for(top_message: &str, parent_path: &str) {
    let key = allow_key(top_message, parent_path);
    tracing::warn!(location = %key, "unknown extension fields allowed");
    ALLOW_LIST.write().insert(key);
}

fn allow_key(top_message: &str, parent_path: &str) -> String {
    format!("{}:{}", top_message.trim_start_matches('.'), parent_path)
}

fn is_allowed(top_message: &str, parent_path: &str) -> bool {
    ALLOW_LIST.read().contains(&allow_key(top_message, parent_path))
}

/// Handle on an extension field, independent of the pool it came from
#[derive(Clone)]
pub struct ExtensionKey {
    descriptor: ExtensionDescriptor,
    extendee: String,
    module: String,
}

impl ExtensionKey {
    pub fn new(descriptor: ExtensionDescriptor) -> Self {
        let extendee = descriptor.containing_message().full_name().to_string();
        let module = descriptor.parent_file().name().to_string();
        Self {
            descriptor,
            extendee,
            module,
        }
    }

    /// Look up an extension by full name in the registered pools
    pub fn find(full_name: &str) -> BridgeResult<Self> {
        DescriptorResolver::global()
            .find_extension_by_name(full_name)
            .map(Self::new)
            .ok_or_else(|| BridgeError::NoSuchField {
                path: format!("[{}]", full_name.trim_start_matches('.')),
            })
    }

    /// Look up the extension of `extendee` numbered `number`
    pub fn lookup(extendee: &str, number: u32) -> BridgeResult<Self> {
        DescriptorResolver::global()
            .find_extension(extendee, number)
            .map(Self::new)
            .ok_or_else(|| BridgeError::NoSuchField {
                path: format!("{}.{}", extendee.trim_start_matches('.'), number),
            })
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Full name of the extended message type
    pub fn extendee(&self) -> &str {
        &self.extendee
    }

    pub fn number(&self) -> u32 {
        self.descriptor.number()
    }

    /// File that declares the extension
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl PartialEq for ExtensionKey {
    fn eq(&self, other: &Self) -> bool {
        self.extendee == other.extendee && self.number() == other.number()
    }
}

impl Eq for ExtensionKey {}

impl Hash for ExtensionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.extendee.hash(state);
        self.number().hash(state);
    }
}

impl fmt::Debug for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionKey")
            .field("name", &self.full_name())
            .field("extendee", &self.extendee)
            .field("number", &self.number())
            .finish()
    }
}

/// How a key applies to a particular message type
pub(crate) enum Binding {
    /// The message's own pool defines the extension
    Linked(ExtensionDescriptor),
    /// Only the key's pool defines it; the value travels as unknown bytes
    Unlinked(ExtensionDescriptor),
}

pub(crate) fn bind(key: &ExtensionKey, target: &MessageDescriptor) -> BridgeResult<Binding> {
    if key.extendee() != target.full_name() {
        return Err(BridgeError::mismatch(
            format!("[{}]", key.full_name()),
            key.extendee(),
            target.full_name(),
        ));
    }
    match target.get_extension(key.number()) {
        Some(ext) => Ok(Binding::Linked(ext)),
        None => Ok(Binding::Unlinked(key.descriptor.clone())),
    }
}

/// Re-read `message` in the extension's pool so the extension decodes
pub(crate) fn unlinked_view(
    message: &DynamicMessage,
    ext: &ExtensionDescriptor,
) -> BridgeResult<DynamicMessage> {
    let extendee = ext.containing_message();
    DynamicMessage::decode(extendee.clone(), message.encode_to_vec().as_slice()).map_err(|e| {
        BridgeError::Decode {
            type_name: extendee.full_name().to_string(),
            reason: e.to_string(),
        }
    })
}

pub(crate) fn unlinked_has(message: &DynamicMessage, number: u32) -> bool {
    message.unknown_fields().any(|field| field.number() == number)
}

pub(crate) fn unlinked_clear(message: &mut DynamicMessage, number: u32) -> BridgeResult<()> {
    let kept: Vec<_> = message
        .take_unknown_fields()
        .filter(|field| field.number() != number)
        .collect();
    let mut buf = Vec::new();
    for field in &kept {
        field.encode(&mut buf);
    }
    merge_raw(message, &buf)
}

pub(crate) fn unlinked_set(
    message: &mut DynamicMessage,
    ext: &ExtensionDescriptor,
    value: Value,
) -> BridgeResult<()> {
    let mut carrier = DynamicMessage::new(ext.containing_message());
    carrier.set_extension(ext, value);
    let bytes = carrier.encode_to_vec();
    unlinked_clear(message, ext.number())?;
    merge_raw(message, &bytes)
}

fn merge_raw(message: &mut DynamicMessage, bytes: &[u8]) -> BridgeResult<()> {
    message.merge(bytes).map_err(|e| BridgeError::Decode {
        type_name: message.descriptor().full_name().to_string(),
        reason: e.to_string(),
    })
}

struct Finding {
    parent: MessageDescriptor,
    parent_path: String,
    number: u32,
}

/// Reject unknown fields numbered inside an extension range anywhere in
/// `message`, unless their location is allow-listed
pub(crate) fn check_unknown_fields(message: &DynamicMessage) -> BridgeResult<()> {
    let top = message.descriptor();
    let mut parts = Vec::new();
    match find_unknown(top.full_name(), message, &mut parts) {
        None => Ok(()),
        Some(finding) => Err(unknown_field_error(&top, finding)),
    }
}

fn find_unknown(top: &str, message: &DynamicMessage, parts: &mut Vec<String>) -> Option<Finding> {
    let descriptor = message.descriptor();
    let ranges: Vec<_> = descriptor.extension_ranges().collect();
    if !ranges.is_empty() {
        let parent_path = parts.join(".");
        for field in message.unknown_fields() {
            let number = field.number();
            if !ranges.iter().any(|range| range.contains(&number)) {
                continue;
            }
            if is_allowed(top, &parent_path) {
                tracing::warn!(
                    top = top,
                    path = %parent_path,
                    number = number,
                    "keeping unknown extension field on an allow-listed location"
                );
                continue;
            }
            return Some(Finding {
                parent: descriptor.clone(),
                parent_path,
                number,
            });
        }
    }

    let nested = message
        .fields()
        .map(|(fd, v)| (fd.name().to_string(), v))
        .chain(message.extensions().map(|(ext, v)| (ext.name().to_string(), v)));
    for (name, value) in nested {
        parts.push(name);
        let found = find_in_value(top, value, parts);
        parts.pop();
        if found.is_some() {
            return found;
        }
    }
    None
}

fn find_in_value(top: &str, value: &Value, parts: &mut Vec<String>) -> Option<Finding> {
    match value {
        Value::Message(m) => find_unknown(top, m, parts),
        Value::List(items) => items.iter().find_map(|item| find_in_value(top, item, parts)),
        Value::Map(map) => map.values().find_map(|item| find_in_value(top, item, parts)),
        _ => None,
    }
}

fn unknown_field_error(top: &MessageDescriptor, finding: Finding) -> BridgeError {
    let path = if finding.parent_path.is_empty() {
        finding.number.to_string()
    } else {
        format!("{}.{}", finding.parent_path, finding.number)
    };
    let top_file = top.parent_file().name().to_string();
    let (parent_clause, files) = if finding.parent == *top {
        (String::new(), top_file)
    } else {
        (
            format!(" with parent of type {}", finding.parent.full_name()),
            format!("{}, {}", top_file, finding.parent.parent_file().name()),
        )
    };
    let message = format!(
        "Proto Message of type {top} has an Unknown Field{parent_clause}: {path} ({files}). \
         Please add the required definitions to the descriptor pool. \
         Only if there is no alternative to suppressing this error, use \
         `allow_unknown_fields_for(\"{top}\", \"{parent_path}\")` \
         (Warning: suppressions may mask critical bugs.)",
        top = top.full_name(),
        parent_path = finding.parent_path,
    );
    BridgeError::UnknownExtensionField {
        path,
        number: finding.number,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_allow_key_trims_leading_dot() {
        assert_eq!(allow_key(".pkg.Top", "a.b"), "pkg.Top:a.b");
        allow_unknown_fields_for("unit.Test", "nested");
        assert!(is_allowed("unit.Test", "nested"));
        assert!(!is_allowed("unit.Test", ""));
    }

    #[test]
    fn test_fields_outside_extension_ranges_pass() {
        let outer = testing::outer();
        // field 99 is not declared and Outer has no extension ranges
        let bytes = [0x98, 0x06, 0x01];
        let message = DynamicMessage::decode(outer, bytes.as_slice()).unwrap();
        assert_eq!(message.unknown_fields().count(), 1);
        assert!(check_unknown_fields(&message).is_ok());
    }
}
