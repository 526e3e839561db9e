use super::{KeyValue, KvStore, ReadOnlyStore};
use crate::util::{BoxedIter, IterExt};
use parking_lot::Mutex;
use std::{collections::BTreeMap, iter::FromIterator, ops::Bound, sync::Arc};

type Entries = BTreeMap<Box<[u8]>, Box<[u8]>>;

/// A MemStore is a pure in memory ordered store. Mostly useful for testing.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemStore(Arc<Mutex<Entries>>);

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of entries in the store
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// a copy of all entries, in key order
    pub fn entries(&self) -> Vec<KeyValue> {
        self.0
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, rev: bool) -> Cursor {
        // BTreeMap::range panics for inverted ranges
        let done = matches!((start, end), (Some(start), Some(end)) if start >= end);
        Cursor {
            entries: self.0.clone(),
            lower: start.map(|k| Bound::Included(k.into())).unwrap_or(Bound::Unbounded),
            upper: end.map(|k| Bound::Excluded(k.into())).unwrap_or(Bound::Unbounded),
            rev,
            done,
        }
    }
}

/// Iterates a range of a [MemStore] without copying it.
///
/// The lock is only held while looking up the next entry, so the store may be modified while
/// the cursor is alive. Each step continues after the last key that was returned.
///
/// [MemStore]: struct.MemStore.html
struct Cursor {
    entries: Arc<Mutex<Entries>>,
    lower: Bound<Box<[u8]>>,
    upper: Bound<Box<[u8]>>,
    rev: bool,
    done: bool,
}

fn as_ref(bound: &Bound<Box<[u8]>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_ref()),
        Bound::Excluded(key) => Bound::Excluded(key.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl Iterator for Cursor {
    type Item = KeyValue;

    fn next(&mut self) -> Option<KeyValue> {
        if self.done {
            return None;
        }
        let next = {
            let entries = self.entries.lock();
            let mut range = entries.range::<[u8], _>((as_ref(&self.lower), as_ref(&self.upper)));
            let item = if self.rev {
                range.next_back()
            } else {
                range.next()
            };
            item.map(|(k, v)| (k.clone(), v.clone()))
        };
        match next {
            Some((key, value)) => {
                if self.rev {
                    self.upper = Bound::Excluded(key.clone());
                } else {
                    self.lower = Bound::Excluded(key.clone());
                }
                Some((key, value))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl FromIterator<KeyValue> for MemStore {
    fn from_iter<T: IntoIterator<Item = KeyValue>>(iter: T) -> Self {
        Self(Arc::new(Mutex::new(iter.into_iter().collect())))
    }
}

impl ReadOnlyStore for MemStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Box<[u8]>>> {
        Ok(self.0.lock().get(key).cloned())
    }

    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> anyhow::Result<BoxedIter<'_, KeyValue>> {
        Ok(self.range(start, end, false).boxed())
    }

    fn rev_iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> anyhow::Result<BoxedIter<'_, KeyValue>> {
        Ok(self.range(start, end, true).boxed())
    }
}

impl KvStore for MemStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        self.0.lock().insert(key.into(), value.into());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        self.0.lock().remove(key);
        Ok(())
    }
}
