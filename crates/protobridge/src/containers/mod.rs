//! Live proxies over repeated and map fields
//!
//! A container proxy holds its parent message proxy and the field's
//! accessor; every operation re-reads the field, so it always reflects the
//! current native contents.

mod map;
mod repeated;

pub use map::{MapProxy, MapView};
pub use repeated::{RepeatedMessage, RepeatedScalar, SliceSpec};

use crate::error::{BridgeError, BridgeResult};

/// Resolve a possibly negative index against `len`
pub(crate) fn normalize_index(index: isize, len: usize, path: &str) -> BridgeResult<usize> {
    let resolved = if index < 0 { index + len as isize } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(BridgeError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        });
    }
    Ok(resolved as usize)
}

/// Insertion point for `index`, clamped to `0..=len`
pub(crate) fn insertion_point(index: isize, len: usize) -> usize {
    let resolved = if index < 0 { index + len as isize } else { index };
    resolved.clamp(0, len as isize) as usize
}
