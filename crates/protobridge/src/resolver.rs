//! Descriptor resolver
//!
//! Maps full type names to message descriptors across every registered
//! [`DescriptorPool`]. The first successful lookup of a name is cached for
//! the life of the process; nothing is ever evicted.
//!
//! A type is *concrete* when a factory for it has been registered (usually a
//! generated Rust type); every other resolvable type is reachable only
//! through its descriptor and is built as a plain [`DynamicMessage`].

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prost_reflect::{
    DescriptorPool, DynamicMessage, ExtensionDescriptor, FieldDescriptor, MessageDescriptor,
    ReflectMessage,
};
use prost_types::FileDescriptorProto;

use crate::dispatch::AccessorTable;
use crate::error::{BridgeError, BridgeResult};

static RESOLVER: Lazy<DescriptorResolver> = Lazy::new(DescriptorResolver::new);

/// Builds a new native instance of a concrete type
pub type MessageFactory = Arc<dyn Fn() -> DynamicMessage + Send + Sync>;

/// Registry of descriptor pools, concrete factories and accessor tables
pub struct DescriptorResolver {
    pools: RwLock<Vec<DescriptorPool>>,
    resolved: DashMap<String, MessageDescriptor>,
    factories: DashMap<String, MessageFactory>,
    tables: DashMap<String, Vec<Arc<AccessorTable>>>,
}

impl DescriptorResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(Vec::new()),
            resolved: DashMap::new(),
            factories: DashMap::new(),
            tables: DashMap::new(),
        }
    }

    /// The process-wide resolver
    pub fn global() -> &'static DescriptorResolver {
        &RESOLVER
    }

    /// Register a pool. Adding the same pool twice is a no-op.
    pub fn add_pool(&self, pool: &DescriptorPool) {
        let mut pools = self.pools.write();
        if pools.iter().any(|p| p == pool) {
            return;
        }
        tracing::debug!(
            files = pool.files().len(),
            messages = pool.all_messages().len(),
            "registered descriptor pool"
        );
        pools.push(pool.clone());
    }

    /// Build a pool from file descriptors and register it
    pub fn add_files(
        &self,
        files: impl IntoIterator<Item = FileDescriptorProto>,
    ) -> BridgeResult<DescriptorPool> {
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_protos(files)
            .map_err(|e| BridgeError::InvalidSchema(e.to_string()))?;
        self.add_pool(&pool);
        Ok(pool)
    }

    /// Registered pools, oldest first
    pub fn pools(&self) -> Vec<DescriptorPool> {
        self.pools.read().clone()
    }

    /// Resolve a full type name (a leading `.` is accepted)
    pub fn resolve(&self, name: &str) -> BridgeResult<MessageDescriptor> {
        let name = name.trim_start_matches('.');
        if let Some(desc) = self.resolved.get(name) {
            return Ok(desc.clone());
        }
        let found = self
            .pools
            .read()
            .iter()
            .find_map(|pool| pool.get_message_by_name(name))
            .or_else(|| DescriptorPool::global().get_message_by_name(name));
        match found {
            Some(desc) => {
                tracing::debug!(name, file = desc.parent_file().name(), "resolved message type");
                self.resolved.insert(name.to_string(), desc.clone());
                Ok(desc)
            }
            None => Err(BridgeError::TypeNotFound(name.to_string())),
        }
    }

    /// Ordered field metadata of a type
    pub fn fields_of(&self, descriptor: &MessageDescriptor) -> Vec<FieldDescriptor> {
        let mut fields: Vec<_> = descriptor.fields().collect();
        fields.sort_by_key(FieldDescriptor::number);
        fields
    }

    /// Register a factory making `descriptor` a concrete type
    pub fn register_concrete(&self, descriptor: &MessageDescriptor, factory: MessageFactory) {
        tracing::debug!(name = descriptor.full_name(), "registered concrete message type");
        self.resolved
            .insert(descriptor.full_name().to_string(), descriptor.clone());
        self.factories
            .insert(descriptor.full_name().to_string(), factory);
    }

    /// Register a generated Rust message type
    pub fn register_generated<T>(&self)
    where
        T: ReflectMessage + Default + 'static,
    {
        let descriptor = T::default().descriptor();
        self.add_pool(descriptor.parent_pool());
        self.register_concrete(
            &descriptor,
            Arc::new(|| T::default().transcode_to_dynamic()),
        );
    }

    /// Whether a concrete factory exists for `name`
    pub fn is_registered_concrete(&self, name: &str) -> bool {
        self.factories.contains_key(name.trim_start_matches('.'))
    }

    /// New native instance of `name`, through its factory when concrete
    pub fn new_message(&self, name: &str) -> BridgeResult<DynamicMessage> {
        let name = name.trim_start_matches('.');
        let factory = self.factories.get(name).map(|f| f.value().clone());
        match factory {
            Some(factory) => Ok(factory()),
            None => Ok(DynamicMessage::new(self.resolve(name)?)),
        }
    }

    /// Find an extension of `extendee` numbered `number` in any registered pool
    pub fn find_extension(&self, extendee: &str, number: u32) -> Option<ExtensionDescriptor> {
        let extendee = extendee.trim_start_matches('.');
        self.pools.read().iter().find_map(|pool| {
            pool.get_message_by_name(extendee)
                .and_then(|message| message.get_extension(number))
        })
    }

    /// Find an extension by its full name in any registered pool
    pub fn find_extension_by_name(&self, name: &str) -> Option<ExtensionDescriptor> {
        let name = name.trim_start_matches('.');
        self.pools
            .read()
            .iter()
            .find_map(|pool| pool.get_extension_by_name(name))
            .or_else(|| DescriptorPool::global().get_extension_by_name(name))
    }

    /// Accessor table for `descriptor`, built on first use
    pub fn table_for(&self, descriptor: &MessageDescriptor) -> Arc<AccessorTable> {
        if let Some(tables) = self.tables.get(descriptor.full_name()) {
            if let Some(table) = tables.iter().find(|t| t.descriptor() == descriptor) {
                return table.clone();
            }
        }
        let table = Arc::new(AccessorTable::build(descriptor));
        tracing::trace!(
            name = descriptor.full_name(),
            fields = table.len(),
            "built accessor table"
        );
        let mut tables = self
            .tables
            .entry(descriptor.full_name().to_string())
            .or_default();
        match tables.iter().find(|t| t.descriptor() == descriptor) {
            Some(existing) => existing.clone(),
            None => {
                tables.push(table.clone());
                table
            }
        }
    }
}

impl Default for DescriptorResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DescriptorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorResolver")
            .field("pools", &self.pools.read().len())
            .field("resolved", &self.resolved.len())
            .field("concrete", &self.factories.len())
            .finish()
    }
}
