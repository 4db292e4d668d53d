//! Argument cast gate
//!
//! Decides how a host value passed where native code expects a message is
//! handed over: by reference, as an abstract message, as a converted copy,
//! or as null. Conversion re-serializes the value and parses it into the
//! expected type, so it is refused for parameters that forbid implicit
//! copies and for payloads over the configured size limit.

use prost_reflect::{DynamicMessage, EnumDescriptor, MessageDescriptor};

use crate::codec;
use crate::config::BridgeConfig;
use crate::convert;
use crate::error::{BridgeError, BridgeResult};
use crate::message::MessageProxy;
use crate::resolver::DescriptorResolver;
use crate::value::Value;

/// Message type a parameter accepts
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTarget {
    Exact(MessageDescriptor),
    /// Any message type
    AnyMessage,
}

/// What a native parameter accepts
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub target: ParamTarget,
    pub nullable: bool,
    pub no_implicit_copy: bool,
    /// The callee mutates the argument
    pub mutable: bool,
}

impl ParamSpec {
    pub fn exact(descriptor: &MessageDescriptor) -> Self {
        Self::with_target(ParamTarget::Exact(descriptor.clone()))
    }

    pub fn any_message() -> Self {
        Self::with_target(ParamTarget::AnyMessage)
    }

    fn with_target(target: ParamTarget) -> Self {
        Self {
            target,
            nullable: false,
            no_implicit_copy: false,
            mutable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn no_implicit_copy(mut self) -> Self {
        self.no_implicit_copy = true;
        self
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    fn target_name(&self) -> &str {
        match &self.target {
            ParamTarget::Exact(desc) => desc.full_name(),
            ParamTarget::AnyMessage => "message",
        }
    }
}

/// How an argument relates to a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    /// A proxy of exactly the expected type
    Exact,
    /// A proxy passed where any message is accepted
    Abstract,
    /// Same type name from a different pool or foreign implementation
    ForeignCompatible,
    Null,
    Other,
}

/// Argument as handed to native code
#[derive(Debug, Clone)]
pub enum MessageArg {
    /// The caller's own message; mutations are visible to the caller
    ByRef(MessageProxy),
    /// The caller's own message, typed only as "a message"
    Abstract(MessageProxy),
    /// A private copy; mutations are not visible to the caller
    Converted(MessageProxy),
    Null,
}

impl MessageArg {
    pub fn proxy(&self) -> Option<&MessageProxy> {
        match self {
            MessageArg::ByRef(p) | MessageArg::Abstract(p) | MessageArg::Converted(p) => Some(p),
            MessageArg::Null => None,
        }
    }

    pub fn into_proxy(self) -> Option<MessageProxy> {
        match self {
            MessageArg::ByRef(p) | MessageArg::Abstract(p) | MessageArg::Converted(p) => Some(p),
            MessageArg::Null => None,
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, MessageArg::Converted(_))
    }
}

/// Applies the cast rules under one configuration
#[derive(Debug, Clone)]
pub struct CastGate {
    config: BridgeConfig,
}

impl Default for CastGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CastGate {
    /// Gate using the process-wide config
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::global().clone())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn classify(&self, value: &Value, spec: &ParamSpec) -> ArgClass {
        match (value, &spec.target) {
            (Value::None, _) => ArgClass::Null,
            (Value::Message(_), ParamTarget::AnyMessage) => ArgClass::Abstract,
            (Value::Message(p), ParamTarget::Exact(desc)) => {
                if p.descriptor() == desc {
                    ArgClass::Exact
                } else if p.full_name() == desc.full_name() {
                    ArgClass::ForeignCompatible
                } else {
                    ArgClass::Other
                }
            }
            (Value::Foreign(f), target) => match (f.type_name(), target) {
                (Some(name), ParamTarget::Exact(desc)) if name == desc.full_name() => {
                    ArgClass::ForeignCompatible
                }
                (Some(name), ParamTarget::AnyMessage)
                    if DescriptorResolver::global().resolve(&name).is_ok() =>
                {
                    ArgClass::ForeignCompatible
                }
                _ => ArgClass::Other,
            },
            _ => ArgClass::Other,
        }
    }

    pub fn cast(&self, value: &Value, spec: &ParamSpec) -> BridgeResult<MessageArg> {
        match (self.classify(value, spec), value) {
            (ArgClass::Exact, Value::Message(p)) => self.by_reference(p, spec, MessageArg::ByRef),
            (ArgClass::Abstract, Value::Message(p)) => {
                self.by_reference(p, spec, MessageArg::Abstract)
            }
            (ArgClass::ForeignCompatible, _) => {
                if spec.no_implicit_copy {
                    return Err(BridgeError::mismatch(
                        "",
                        format!("{} (implicit copy disallowed)", spec.target_name()),
                        value.type_name(),
                    ));
                }
                let target = match &spec.target {
                    ParamTarget::Exact(desc) => desc.clone(),
                    ParamTarget::AnyMessage => DescriptorResolver::global().resolve(&value.type_name())?,
                };
                self.convert(value, &target, "")
                    .map(|m| MessageArg::Converted(MessageProxy::from_dynamic(m)))
            }
            (ArgClass::Null, _) if spec.nullable => Ok(MessageArg::Null),
            _ => Err(BridgeError::mismatch("", spec.target_name(), value.type_name())),
        }
    }

    /// Share the proxy, unless a read-only proxy meets a mutable parameter,
    /// which takes a copy
    fn by_reference(
        &self,
        proxy: &MessageProxy,
        spec: &ParamSpec,
        shared: fn(MessageProxy) -> MessageArg,
    ) -> BridgeResult<MessageArg> {
        if !(spec.mutable && proxy.is_read_only()) {
            return Ok(shared(proxy.clone()));
        }
        if spec.no_implicit_copy {
            return Err(BridgeError::mismatch(
                "",
                format!("mutable {}", spec.target_name()),
                format!("const {}", proxy.full_name()),
            ));
        }
        proxy.deep_copy().map(MessageArg::Converted)
    }

    /// Re-serialize `value` and parse the bytes as `target`
    pub(crate) fn convert(
        &self,
        value: &Value,
        target: &MessageDescriptor,
        path: &str,
    ) -> BridgeResult<DynamicMessage> {
        let bytes = match value {
            Value::Message(p) => {
                self.check_size(target, p.byte_size()?)?;
                p.serialize(false)?
            }
            Value::Foreign(f) => {
                if let Some(size) = f.byte_size() {
                    self.check_size(target, size)?;
                }
                let bytes = f.serialize().ok_or_else(|| {
                    BridgeError::mismatch(path, target.full_name(), "object that cannot serialize")
                })?;
                self.check_size(target, bytes.len())?;
                bytes
            }
            other => {
                return Err(BridgeError::mismatch(path, target.full_name(), other.type_name()))
            }
        };
        tracing::debug!(
            target_type = target.full_name(),
            bytes = bytes.len(),
            "converting message argument by re-serialization"
        );
        codec::decode_checked(target, &bytes)
    }

    fn check_size(&self, target: &MessageDescriptor, size: usize) -> BridgeResult<()> {
        if size > self.config.max_conversion_bytes {
            return Err(BridgeError::ConversionOverflow {
                type_name: target.full_name().to_string(),
                size,
                limit: self.config.max_conversion_bytes,
            });
        }
        Ok(())
    }

    /// Enum argument by number or name; `strict` overrides the config
    pub fn cast_enum_arg(&self, value: &Value, desc: &EnumDescriptor, strict: Option<bool>) -> BridgeResult<i32> {
        convert::enum_number(desc, value, "", strict.unwrap_or(self.config.strict_enums))
    }
}

/// Native copy of `value` as a message of type `target`
pub(crate) fn coerce_message(
    value: &Value,
    target: &MessageDescriptor,
    path: &str,
) -> BridgeResult<DynamicMessage> {
    match value {
        Value::Message(p) if p.descriptor() == target => p.snapshot(),
        Value::Message(p) if p.full_name() == target.full_name() => {
            CastGate::new().convert(value, target, path)
        }
        Value::Foreign(f) if f.type_name().as_deref() == Some(target.full_name()) => {
            CastGate::new().convert(value, target, path)
        }
        other => Err(BridgeError::mismatch(path, target.full_name(), other.type_name())),
    }
}
