use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost_reflect::{DynamicMessage, FieldDescriptor, MapKey, Value as NativeValue};

use crate::convert;
use crate::dispatch::{FieldAccessor, Strategy};
use crate::error::{BridgeError, BridgeResult};
use crate::message::{MessageProxy, Removal};
use crate::storage::PathStep;
use crate::value::Value;

/// Live mapping view over a map field
///
/// Message-valued maps hand out live proxies bound to their key; reading a
/// missing key through [`MapProxy::get`] creates the entry.
#[derive(Clone)]
pub struct MapProxy {
    parent: MessageProxy,
    accessor: Arc<FieldAccessor>,
    key: Strategy,
    value: Strategy,
}

impl MapProxy {
    pub(crate) fn bind(parent: MessageProxy, accessor: Arc<FieldAccessor>) -> Self {
        let (key, value) = match &accessor.strategy {
            Strategy::Map { key, value } => ((**key).clone(), (**value).clone()),
            other => (other.clone(), other.clone()),
        };
        Self {
            parent,
            accessor,
            key,
            value,
        }
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.accessor.field
    }

    fn path(&self) -> String {
        self.parent.field_path(self.accessor.name())
    }

    fn key_of(&self, key: &Value) -> BridgeResult<MapKey> {
        convert::to_map_key(&self.key, key, &self.path())
    }

    fn read_map<R>(
        &self,
        f: impl FnOnce(&HashMap<MapKey, NativeValue>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let field = self.field();
        self.parent.read(|m| {
            let value = m.get_field(field);
            match value.as_map() {
                Some(map) => f(map),
                None => f(&HashMap::new()),
            }
        })?
    }

    fn write_map<R>(
        &self,
        f: impl FnOnce(&mut HashMap<MapKey, NativeValue>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let field = self.field();
        let path = self.path();
        self.parent.write(|m| match m.get_field_mut(field).as_map_mut() {
            Some(map) => f(map),
            None => Err(BridgeError::mismatch(path, "map field", "non-map field")),
        })
    }

    fn missing(&self, key: &MapKey) -> BridgeError {
        BridgeError::KeyNotFound {
            path: self.path(),
            key: convert::map_key_to_host(key).to_string(),
        }
    }

    fn value_proxy(&self, key: MapKey) -> Option<MessageProxy> {
        match &self.value {
            Strategy::Message(desc) => Some(
                self.parent
                    .child(PathStep::MapValue(self.field().clone(), key), desc.clone()),
            ),
            _ => None,
        }
    }

    /// Value stored under an already-converted key
    fn value_at(&self, key: &MapKey) -> BridgeResult<Value> {
        if matches!(self.value, Strategy::Message(_)) {
            if !self.read_map(|map| Ok(map.contains_key(key)))? {
                return Err(self.missing(key));
            }
            return self
                .value_proxy(key.clone())
                .map(Value::Message)
                .ok_or_else(|| self.missing(key));
        }
        self.read_map(|map| map.get(key).map(convert::to_host).ok_or_else(|| self.missing(key)))
    }

    pub fn len(&self) -> BridgeResult<usize> {
        self.read_map(|map| Ok(map.len()))
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn contains(&self, key: impl Into<Value>) -> BridgeResult<bool> {
        let key = self.key_of(&key.into())?;
        self.read_map(|map| Ok(map.contains_key(&key)))
    }

    /// Value under `key`. For message-valued maps a missing entry is
    /// created and a live proxy returned; for scalar maps a missing key is
    /// an error.
    pub fn get(&self, key: impl Into<Value>) -> BridgeResult<Value> {
        let key = self.key_of(&key.into())?;
        if let Strategy::Message(desc) = &self.value {
            if !self.parent.is_read_only() {
                let desc = desc.clone();
                let entry_key = key.clone();
                self.write_map(|map| {
                    map.entry(entry_key)
                        .or_insert_with(|| NativeValue::Message(DynamicMessage::new(desc)));
                    Ok(())
                })?;
            }
        }
        self.value_at(&key)
    }

    /// Value under `key`, or `default` when absent. Never inserts.
    pub fn get_or(&self, key: impl Into<Value>, default: impl Into<Value>) -> BridgeResult<Value> {
        let key = self.key_of(&key.into())?;
        match self.value_at(&key) {
            Err(BridgeError::KeyNotFound { .. }) => Ok(default.into()),
            other => other,
        }
    }

    /// Assign a scalar value. Message values are mutated in place.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> BridgeResult<()> {
        let key = self.key_of(&key.into())?;
        let native = self.value_of(&value.into(), &key)?;
        self.write_map(|map| {
            map.insert(key, native);
            Ok(())
        })
    }

    fn value_of(&self, value: &Value, key: &MapKey) -> BridgeResult<NativeValue> {
        let path = format!("{}[{}]", self.path(), convert::map_key_to_host(key));
        match &self.value {
            Strategy::Message(desc) => {
                let same_type = match value {
                    Value::Message(p) => p.full_name() == desc.full_name(),
                    Value::Foreign(f) => f.type_name().as_deref() == Some(desc.full_name()),
                    _ => false,
                };
                if same_type {
                    Err(BridgeError::not_assignable(
                        path,
                        "message values cannot be assigned; mutate the entry or use copy_from",
                    ))
                } else {
                    Err(BridgeError::mismatch(path, desc.full_name(), value.type_name()))
                }
            }
            strategy => convert::to_native(strategy, value, &path),
        }
    }

    pub fn delete(&self, key: impl Into<Value>) -> BridgeResult<()> {
        let key = self.key_of(&key.into())?;
        if matches!(self.value, Strategy::Message(_)) {
            let step = PathStep::MapValue(self.field().clone(), key.clone());
            self.parent.ensure_no_live_elements(Removal::Subtree(&step))?;
        }
        let missing = self.missing(&key);
        self.write_map(|map| map.remove(&key).map(|_| ()).ok_or(missing))
    }

    /// Assign every pair; nothing changes if any pair fails to convert
    pub fn update<I, K, V>(&self, entries: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let converted = entries
            .into_iter()
            .map(|(k, v)| {
                let key = self.key_of(&k.into())?;
                let value = self.value_of(&v.into(), &key)?;
                Ok((key, value))
            })
            .collect::<BridgeResult<Vec<_>>>()?;
        self.write_map(|map| {
            map.extend(converted);
            Ok(())
        })
    }

    pub fn clear(&self) -> BridgeResult<()> {
        if matches!(self.value, Strategy::Message(_)) {
            self.parent
                .ensure_no_live_elements(Removal::MapEntries(self.field()))?;
        }
        self.write_map(|map| {
            map.clear();
            Ok(())
        })
    }

    fn sorted_keys(&self) -> BridgeResult<Vec<MapKey>> {
        self.read_map(|map| {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            Ok(keys)
        })
    }

    /// Key-ordered `(key, value)` pairs; message values are live proxies
    pub fn to_pairs(&self) -> BridgeResult<Vec<(Value, Value)>> {
        self.items().to_vec()
    }

    pub fn keys(&self) -> MapView<Value> {
        MapView::new(self.clone(), |_, key| Ok(convert::map_key_to_host(key)))
    }

    pub fn values(&self) -> MapView<Value> {
        MapView::new(self.clone(), |map, key| map.value_at(key))
    }

    pub fn items(&self) -> MapView<(Value, Value)> {
        MapView::new(self.clone(), |map, key| {
            Ok((convert::map_key_to_host(key), map.value_at(key)?))
        })
    }
}

impl fmt::Display for MapProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_pairs() {
            Ok(pairs) => write!(f, "{}", Value::Dict(pairs)),
            Err(_) => write!(f, "<{}>", self.path()),
        }
    }
}

impl fmt::Debug for MapProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapProxy")
            .field("path", &self.path())
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

/// Dynamic keys/values/items view; each iteration reads the map afresh
#[derive(Clone)]
pub struct MapView<T> {
    map: MapProxy,
    project: fn(&MapProxy, &MapKey) -> BridgeResult<T>,
}

impl<T> MapView<T> {
    fn new(map: MapProxy, project: fn(&MapProxy, &MapKey) -> BridgeResult<T>) -> Self {
        Self { map, project }
    }

    pub fn len(&self) -> BridgeResult<usize> {
        self.map.len()
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        self.map.is_empty()
    }

    pub fn to_vec(&self) -> BridgeResult<Vec<T>> {
        self.map
            .sorted_keys()?
            .iter()
            .map(|key| (self.project)(&self.map, key))
            .collect()
    }

    pub fn iter(&self) -> BridgeResult<std::vec::IntoIter<T>> {
        self.to_vec().map(Vec::into_iter)
    }
}
