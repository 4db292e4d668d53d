//! Protobridge
//!
//! Exposes natively stored protobuf messages to a dynamically typed host
//! through live proxies. A proxy never copies the message it reads; it keeps
//! the native root alive and re-resolves its field path on every access, so
//! nested messages and containers always reflect the current contents.
//!
//! # Example
//!
//! ```ignore
//! use protobridge::{DescriptorResolver, MessageProxy};
//!
//! let desc = DescriptorResolver::global().resolve("pkg.TestMessage")?;
//! let message = MessageProxy::new(&desc);
//! message.message("int_message")?.set_field("value", 5)?;
//! assert_eq!(message.to_text()?, "int_message {\n  value: 5\n}\n");
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod containers;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod gate;
pub mod message;
pub mod resolver;
pub mod storage;
pub mod text;
pub mod value;

#[cfg(test)]
mod testing;

pub use broker::{DependentId, Lease, OwnerId, OwnershipBroker, OwnershipKind};
pub use config::{configure, BridgeConfig, WIRE_SIZE_LIMIT};
pub use containers::{MapProxy, MapView, RepeatedMessage, RepeatedScalar, SliceSpec};
pub use dispatch::{AccessorTable, FieldAccessor, NumericKind, Strategy, TextKind};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use extension::{allow_unknown_fields_for, ExtensionKey};
pub use gate::{ArgClass, CastGate, MessageArg, ParamSpec, ParamTarget};
pub use message::{MessageProxy, Pickled};
pub use resolver::{DescriptorResolver, MessageFactory};
pub use storage::{NativeRoot, PathStep, StaticMessage};
pub use value::{ForeignMessage, Value};
