use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use prost_reflect::{FieldDescriptor, MessageDescriptor, Value as NativeValue};

use super::{insertion_point, normalize_index};
use crate::convert;
use crate::dispatch::{FieldAccessor, Strategy};
use crate::error::{BridgeError, BridgeResult};
use crate::gate;
use crate::message::{MessageProxy, Removal};
use crate::storage::PathStep;
use crate::value::Value;

/// Slice bounds with sequence-slicing semantics: negative positions count
/// from the end, out-of-range bounds clamp, and a negative step walks
/// backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl SliceSpec {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Self { start, stop, step }
    }

    /// `[:]`
    pub fn full() -> Self {
        Self::default()
    }

    /// `[start:stop]`
    pub fn range(start: isize, stop: isize) -> Self {
        Self::new(Some(start), Some(stop), None)
    }

    fn is_contiguous(&self) -> bool {
        matches!(self.step, None | Some(1))
    }

    /// Clamped `(start, stop, step)` for a sequence of `len`
    fn resolve(&self, len: usize, path: &str) -> BridgeResult<(isize, isize, isize)> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(BridgeError::unsupported(path, "slice step cannot be zero"));
        }
        let len = len as isize;
        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
        let adjust = |bound: Option<isize>, default: isize| match bound {
            None => default,
            Some(i) if i < 0 => (i + len).max(lower),
            Some(i) => i.min(upper),
        };
        let start = adjust(self.start, if step < 0 { upper } else { lower });
        let stop = adjust(self.stop, if step < 0 { lower } else { upper });
        Ok((start, stop, step))
    }

    /// Indices selected from a sequence of `len`, in slice order
    pub fn indices(&self, len: usize, path: &str) -> BridgeResult<Vec<usize>> {
        let (start, stop, step) = self.resolve(len, path)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }
}

fn element_strategy(accessor: &FieldAccessor) -> Strategy {
    match &accessor.strategy {
        Strategy::Repeated(inner) => (**inner).clone(),
        other => other.clone(),
    }
}

/// Remove `indices` (any order, no duplicates) from `list`
fn remove_all<T>(list: &mut Vec<T>, mut indices: Vec<usize>) {
    indices.sort_unstable_by(|a, b| b.cmp(a));
    for i in indices {
        list.remove(i);
    }
}

fn native_cmp(a: &NativeValue, b: &NativeValue) -> Ordering {
    match (a, b) {
        (NativeValue::Bool(x), NativeValue::Bool(y)) => x.cmp(y),
        (NativeValue::I32(x), NativeValue::I32(y)) => x.cmp(y),
        (NativeValue::I64(x), NativeValue::I64(y)) => x.cmp(y),
        (NativeValue::U32(x), NativeValue::U32(y)) => x.cmp(y),
        (NativeValue::U64(x), NativeValue::U64(y)) => x.cmp(y),
        (NativeValue::F32(x), NativeValue::F32(y)) => x.total_cmp(y),
        (NativeValue::F64(x), NativeValue::F64(y)) => x.total_cmp(y),
        (NativeValue::String(x), NativeValue::String(y)) => x.cmp(y),
        (NativeValue::Bytes(x), NativeValue::Bytes(y)) => x.cmp(y),
        (NativeValue::EnumNumber(x), NativeValue::EnumNumber(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

// ----------------------------------------------------------------------
// Repeated scalars
// ----------------------------------------------------------------------

/// Live sequence view over a repeated scalar, string, bytes or enum field
#[derive(Clone)]
pub struct RepeatedScalar {
    parent: MessageProxy,
    accessor: Arc<FieldAccessor>,
    element: Strategy,
}

impl RepeatedScalar {
    pub(crate) fn bind(parent: MessageProxy, accessor: Arc<FieldAccessor>) -> Self {
        let element = element_strategy(&accessor);
        Self {
            parent,
            accessor,
            element,
        }
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.accessor.field
    }

    fn path(&self) -> String {
        self.parent.field_path(self.accessor.name())
    }

    fn read_list<R>(&self, f: impl FnOnce(&[NativeValue]) -> BridgeResult<R>) -> BridgeResult<R> {
        let field = self.field();
        self.parent.read(|m| {
            let value = m.get_field(field);
            f(value.as_list().unwrap_or(&[]))
        })?
    }

    fn write_list<R>(&self, f: impl FnOnce(&mut Vec<NativeValue>) -> BridgeResult<R>) -> BridgeResult<R> {
        let field = self.field();
        let path = self.path();
        self.parent.write(|m| match m.get_field_mut(field).as_list_mut() {
            Some(list) => f(list),
            None => Err(BridgeError::mismatch(path, "repeated field", "singular field")),
        })
    }

    fn to_native(&self, value: &Value) -> BridgeResult<NativeValue> {
        convert::to_native(&self.element, value, &self.path())
    }

    fn to_natives<I, V>(&self, values: I) -> BridgeResult<Vec<NativeValue>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .map(|v| self.to_native(&v.into()))
            .collect()
    }

    pub fn len(&self) -> BridgeResult<usize> {
        self.read_list(|list| Ok(list.len()))
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn get(&self, index: isize) -> BridgeResult<Value> {
        let path = self.path();
        self.read_list(|list| {
            let i = normalize_index(index, list.len(), &path)?;
            Ok(convert::to_host(&list[i]))
        })
    }

    pub fn set(&self, index: isize, value: impl Into<Value>) -> BridgeResult<()> {
        let native = self.to_native(&value.into())?;
        let path = self.path();
        self.write_list(|list| {
            let i = normalize_index(index, list.len(), &path)?;
            list[i] = native;
            Ok(())
        })
    }

    pub fn slice(&self, spec: SliceSpec) -> BridgeResult<Vec<Value>> {
        let path = self.path();
        self.read_list(|list| {
            Ok(spec
                .indices(list.len(), &path)?
                .into_iter()
                .map(|i| convert::to_host(&list[i]))
                .collect())
        })
    }

    /// Replace a slice. Contiguous slices may change length; stepped
    /// slices need exactly as many values as they select.
    pub fn set_slice<I, V>(&self, spec: SliceSpec, values: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let natives = self.to_natives(values)?;
        let path = self.path();
        self.write_list(|list| {
            if spec.is_contiguous() {
                let (start, stop, _) = spec.resolve(list.len(), &path)?;
                let start = start as usize;
                let stop = (stop as usize).max(start);
                list.splice(start..stop, natives);
                return Ok(());
            }
            let indices = spec.indices(list.len(), &path)?;
            if indices.len() != natives.len() {
                return Err(BridgeError::mismatch(
                    path,
                    format!("sequence of size {}", indices.len()),
                    format!("sequence of size {}", natives.len()),
                ));
            }
            for (i, native) in indices.into_iter().zip(natives) {
                list[i] = native;
            }
            Ok(())
        })
    }

    pub fn delete(&self, index: isize) -> BridgeResult<()> {
        let path = self.path();
        self.write_list(|list| {
            let i = normalize_index(index, list.len(), &path)?;
            list.remove(i);
            Ok(())
        })
    }

    pub fn delete_slice(&self, spec: SliceSpec) -> BridgeResult<()> {
        let path = self.path();
        self.write_list(|list| {
            let indices = spec.indices(list.len(), &path)?;
            remove_all(list, indices);
            Ok(())
        })
    }

    pub fn append(&self, value: impl Into<Value>) -> BridgeResult<()> {
        let native = self.to_native(&value.into())?;
        self.write_list(|list| {
            list.push(native);
            Ok(())
        })
    }

    /// Insert before `index`; out-of-range positions clamp to the ends
    pub fn insert(&self, index: isize, value: impl Into<Value>) -> BridgeResult<()> {
        let native = self.to_native(&value.into())?;
        self.write_list(|list| {
            let at = insertion_point(index, list.len());
            list.insert(at, native);
            Ok(())
        })
    }

    /// Append every value; nothing is appended if any fails to convert
    pub fn extend<I, V>(&self, values: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let natives = self.to_natives(values)?;
        self.write_list(|list| {
            list.extend(natives);
            Ok(())
        })
    }

    pub fn clear(&self) -> BridgeResult<()> {
        self.write_list(|list| {
            list.clear();
            Ok(())
        })
    }

    /// Remove and return the element at `index` (the last one by default)
    pub fn pop(&self, index: Option<isize>) -> BridgeResult<Value> {
        let path = self.path();
        self.write_list(|list| {
            let i = normalize_index(index.unwrap_or(-1), list.len(), &path)?;
            Ok(convert::to_host(&list.remove(i)))
        })
    }

    /// Remove the first element equal to `value`
    pub fn remove(&self, value: impl Into<Value>) -> BridgeResult<()> {
        let value = value.into();
        let path = self.path();
        self.write_list(|list| {
            let position = list
                .iter()
                .position(|item| convert::to_host(item) == value)
                .ok_or_else(|| BridgeError::KeyNotFound {
                    path,
                    key: value.to_string(),
                })?;
            list.remove(position);
            Ok(())
        })
    }

    pub fn contains(&self, value: impl Into<Value>) -> BridgeResult<bool> {
        let value = value.into();
        self.read_list(|list| Ok(list.iter().any(|item| convert::to_host(item) == value)))
    }

    /// Position of the first element equal to `value`
    pub fn index(&self, value: impl Into<Value>) -> BridgeResult<usize> {
        let value = value.into();
        let path = self.path();
        self.read_list(|list| {
            list.iter()
                .position(|item| convert::to_host(item) == value)
                .ok_or_else(|| BridgeError::KeyNotFound {
                    path,
                    key: value.to_string(),
                })
        })
    }

    pub fn count(&self, value: impl Into<Value>) -> BridgeResult<usize> {
        let value = value.into();
        self.read_list(|list| Ok(list.iter().filter(|item| convert::to_host(item) == value).count()))
    }

    /// Sort ascending, or descending with `reverse`
    pub fn sort(&self, reverse: bool) -> BridgeResult<()> {
        self.write_list(|list| {
            list.sort_by(native_cmp);
            if reverse {
                list.reverse();
            }
            Ok(())
        })
    }

    pub fn to_vec(&self) -> BridgeResult<Vec<Value>> {
        self.read_list(|list| Ok(list.iter().map(convert::to_host).collect()))
    }

    /// Iterate over a snapshot of the current elements
    pub fn iter(&self) -> BridgeResult<std::vec::IntoIter<Value>> {
        self.to_vec().map(Vec::into_iter)
    }
}

impl fmt::Display for RepeatedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(items) => write!(f, "{}", Value::List(items)),
            Err(_) => write!(f, "<{}>", self.path()),
        }
    }
}

impl fmt::Debug for RepeatedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedScalar")
            .field("path", &self.path())
            .field("element", &self.element)
            .finish()
    }
}

// ----------------------------------------------------------------------
// Repeated messages
// ----------------------------------------------------------------------

/// Live sequence view over a repeated message field
///
/// Elements come back as proxies addressed by index. Operations that would
/// shift or drop an element some live proxy refers to are refused.
#[derive(Clone)]
pub struct RepeatedMessage {
    parent: MessageProxy,
    accessor: Arc<FieldAccessor>,
    element: MessageDescriptor,
}

impl RepeatedMessage {
    pub(crate) fn bind(parent: MessageProxy, accessor: Arc<FieldAccessor>) -> Self {
        let element = match element_strategy(&accessor) {
            Strategy::Message(desc) => desc,
            _ => parent.descriptor().clone(),
        };
        Self {
            parent,
            accessor,
            element,
        }
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.accessor.field
    }

    /// Element message type
    pub fn element_descriptor(&self) -> &MessageDescriptor {
        &self.element
    }

    fn path(&self) -> String {
        self.parent.field_path(self.accessor.name())
    }

    fn read_list<R>(&self, f: impl FnOnce(&[NativeValue]) -> BridgeResult<R>) -> BridgeResult<R> {
        let field = self.field();
        self.parent.read(|m| {
            let value = m.get_field(field);
            f(value.as_list().unwrap_or(&[]))
        })?
    }

    fn write_list<R>(&self, f: impl FnOnce(&mut Vec<NativeValue>) -> BridgeResult<R>) -> BridgeResult<R> {
        let field = self.field();
        let path = self.path();
        self.parent.write(|m| match m.get_field_mut(field).as_list_mut() {
            Some(list) => f(list),
            None => Err(BridgeError::mismatch(path, "repeated field", "singular field")),
        })
    }

    fn element_at(&self, index: usize) -> MessageProxy {
        self.parent.child(
            PathStep::Element(self.field().clone(), index),
            self.element.clone(),
        )
    }

    fn guard_from(&self, index: usize) -> BridgeResult<()> {
        self.parent
            .ensure_no_live_elements(Removal::Elements(self.field(), index))
    }

    pub fn len(&self) -> BridgeResult<usize> {
        self.read_list(|list| Ok(list.len()))
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Live proxy for the element at `index`
    pub fn get(&self, index: isize) -> BridgeResult<MessageProxy> {
        let i = normalize_index(index, self.len()?, &self.path())?;
        Ok(self.element_at(i))
    }

    /// Elements are mutated in place, never replaced
    pub fn set(&self, index: isize, value: impl Into<Value>) -> BridgeResult<()> {
        let _ = value.into();
        Err(BridgeError::not_assignable(
            format!("{}[{}]", self.path(), index),
            "message elements cannot be replaced; mutate the element or use copy_from",
        ))
    }

    pub fn slice(&self, spec: SliceSpec) -> BridgeResult<Vec<MessageProxy>> {
        let indices = spec.indices(self.len()?, &self.path())?;
        Ok(indices.into_iter().map(|i| self.element_at(i)).collect())
    }

    pub fn delete(&self, index: isize) -> BridgeResult<()> {
        let path = self.path();
        let i = normalize_index(index, self.len()?, &path)?;
        self.guard_from(i)?;
        self.write_list(|list| {
            if i >= list.len() {
                return Err(BridgeError::IndexOutOfRange {
                    path,
                    index,
                    len: list.len(),
                });
            }
            list.remove(i);
            Ok(())
        })
    }

    pub fn delete_slice(&self, spec: SliceSpec) -> BridgeResult<()> {
        let indices = spec.indices(self.len()?, &self.path())?;
        let Some(&first) = indices.iter().min() else {
            return Ok(());
        };
        self.guard_from(first)?;
        self.write_list(|list| {
            let indices: Vec<_> = indices.into_iter().filter(|&i| i < list.len()).collect();
            remove_all(list, indices);
            Ok(())
        })
    }

    /// Append a new element initialized from keyword fields and return it.
    ///
    /// The fields are validated on a detached message first, so a bad
    /// field name or value leaves the sequence untouched.
    pub fn add<I, K, V>(&self, fields: I) -> BridgeResult<MessageProxy>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let staged = MessageProxy::with_fields(&self.element, fields)?.snapshot()?;
        let index = self.write_list(|list| {
            list.push(NativeValue::Message(staged));
            Ok(list.len() - 1)
        })?;
        Ok(self.element_at(index))
    }

    /// Append a new default element and return it
    pub fn add_default(&self) -> BridgeResult<MessageProxy> {
        self.add(std::iter::empty::<(&str, Value)>())
    }

    /// Append a copy of `value`
    pub fn append(&self, value: impl Into<Value>) -> BridgeResult<()> {
        let message = gate::coerce_message(&value.into(), &self.element, &self.path())?;
        self.write_list(|list| {
            list.push(NativeValue::Message(message));
            Ok(())
        })
    }

    /// Insert a copy of `value` before `index`
    pub fn insert(&self, index: isize, value: impl Into<Value>) -> BridgeResult<()> {
        let message = gate::coerce_message(&value.into(), &self.element, &self.path())?;
        let at = insertion_point(index, self.len()?);
        self.guard_from(at)?;
        self.write_list(|list| {
            let at = at.min(list.len());
            list.insert(at, NativeValue::Message(message));
            Ok(())
        })
    }

    /// Append copies of every value; nothing is appended if any fails
    pub fn extend<I, V>(&self, values: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let path = self.path();
        let messages = values
            .into_iter()
            .map(|v| gate::coerce_message(&v.into(), &self.element, &path).map(NativeValue::Message))
            .collect::<BridgeResult<Vec<_>>>()?;
        self.write_list(|list| {
            list.extend(messages);
            Ok(())
        })
    }

    pub fn clear(&self) -> BridgeResult<()> {
        self.guard_from(0)?;
        self.write_list(|list| {
            list.clear();
            Ok(())
        })
    }

    /// Remove the element at `index` (the last one by default) and return it
    /// as a detached message
    pub fn pop(&self, index: Option<isize>) -> BridgeResult<MessageProxy> {
        let index = index.unwrap_or(-1);
        let path = self.path();
        let i = normalize_index(index, self.len()?, &path)?;
        self.guard_from(i)?;
        let removed = self.write_list(|list| {
            if i >= list.len() {
                return Err(BridgeError::IndexOutOfRange {
                    path,
                    index,
                    len: list.len(),
                });
            }
            Ok(list.remove(i))
        })?;
        match removed {
            NativeValue::Message(m) => Ok(MessageProxy::from_dynamic(m)),
            other => Err(BridgeError::mismatch(
                self.path(),
                self.element.full_name(),
                convert::to_host(&other).type_name(),
            )),
        }
    }

    /// Live proxies for every current element
    pub fn to_vec(&self) -> BridgeResult<Vec<MessageProxy>> {
        let len = self.len()?;
        Ok((0..len).map(|i| self.element_at(i)).collect())
    }

    pub fn iter(&self) -> BridgeResult<std::vec::IntoIter<MessageProxy>> {
        self.to_vec().map(Vec::into_iter)
    }
}

impl fmt::Display for RepeatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(items) = self.to_vec() else {
            return write!(f, "<{}>", self.path());
        };
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match item.to_text_compact() {
                Ok(text) => write!(f, "{}", text)?,
                Err(_) => write!(f, "<{}>", item.full_name())?,
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for RepeatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedMessage")
            .field("path", &self.path())
            .field("element", &self.element.full_name())
            .finish()
    }
}
