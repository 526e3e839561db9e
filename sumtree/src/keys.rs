//! Storage key layout of tree nodes
//!
//! Every node lives under [NODE_PREFIX], followed by the level as a 2 byte big endian integer and
//! the minimum key of the node. Since the level has a fixed width, the byte order of storage keys
//! is the same as the tuple order of `(level, key)`. Iterating one level of the tree, or finding the
//! highest level (the root), is therefore just ordered iteration over the store.
//!
//! [NODE_PREFIX]: constant.NODE_PREFIX.html
use crate::error::Error;
use std::convert::TryInto;

/// namespace of all tree nodes
pub const NODE_PREFIX: &[u8] = b"node/";

/// width of the encoded level
pub const LEVEL_BYTES: usize = 2;

/// Level of a node. Leaves are at level 0, branches at 1 and above.
pub type Level = u16;

/// storage key for the node at `level` with minimum key `key`
pub fn encode(level: Level, key: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(NODE_PREFIX.len() + LEVEL_BYTES + key.len());
    res.extend_from_slice(NODE_PREFIX);
    res.extend_from_slice(&level.to_be_bytes());
    res.extend_from_slice(key);
    res
}

/// inverse of [encode]
///
/// [encode]: fn.encode.html
pub fn decode(storage_key: &[u8]) -> Result<(Level, &[u8]), Error> {
    let rest = storage_key
        .strip_prefix(NODE_PREFIX)
        .ok_or_else(|| Error::MalformedKey(display_key(storage_key)))?;
    if rest.len() < LEVEL_BYTES {
        return Err(Error::MalformedKey(display_key(storage_key)));
    }
    let (level, key) = rest.split_at(LEVEL_BYTES);
    // cannot fail, the slice has exactly LEVEL_BYTES
    let level = Level::from_be_bytes(level.try_into().unwrap_or_default());
    Ok((level, key))
}

/// Smallest key that is greater than all keys starting with `prefix`.
///
/// Returns None if there is no such key, i.e. the prefix consists only of `0xff` bytes.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// half open range of storage keys covering the whole node namespace
pub fn namespace_range() -> (Vec<u8>, Option<Vec<u8>>) {
    (NODE_PREFIX.to_vec(), prefix_end(NODE_PREFIX))
}

/// half open range of storage keys covering a single level
pub fn level_range(level: Level) -> (Vec<u8>, Option<Vec<u8>>) {
    let start = encode(level, &[]);
    let end = prefix_end(&start);
    (start, end)
}

/// printable form of a key, used for logging and error messages. Non printable keys are hex encoded.
pub fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => text.to_owned(),
        _ => key.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}
