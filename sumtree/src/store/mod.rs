//! interface to an ordered key value store
use crate::{
    keys::prefix_end,
    util::{BoxedIter, IterExt},
};
use anyhow::Result;
use std::sync::Arc;
mod mem_store;

pub use mem_store::MemStore;

/// A key value pair as returned by store iteration
pub type KeyValue = (Box<[u8]>, Box<[u8]>);

pub trait ReadOnlyStore {
    /// value for `key`, None if there is none
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>>;

    /// all pairs with `start <= key < end` in ascending key order.
    ///
    /// A bound of None means unbounded.
    fn iter(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<BoxedIter<'_, KeyValue>>;

    /// all pairs with `start <= key < end` in descending key order.
    fn rev_iter(&self, start: Option<&[u8]>, end: Option<&[u8]>)
        -> Result<BoxedIter<'_, KeyValue>>;
}

pub trait KvStore: ReadOnlyStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;
}

pub type ArcKvStore = Arc<dyn KvStore + Send + Sync + 'static>;

impl<S: ReadOnlyStore + ?Sized> ReadOnlyStore for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>> {
        self.as_ref().get(key)
    }

    fn iter(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<BoxedIter<'_, KeyValue>> {
        self.as_ref().iter(start, end)
    }

    fn rev_iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<BoxedIter<'_, KeyValue>> {
        self.as_ref().rev_iter(start, end)
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.as_ref().set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.as_ref().delete(key)
    }
}

/// A view of an inner store where every key is transparently placed under a fixed prefix.
///
/// This is used to keep multiple independent trees in a single store.
#[derive(Debug, Clone)]
pub struct PrefixStore<S> {
    inner: S,
    prefix: Vec<u8>,
}

impl<S> PrefixStore<S> {
    pub fn new(inner: S, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut res = Vec::with_capacity(self.prefix.len() + key.len());
        res.extend_from_slice(&self.prefix);
        res.extend_from_slice(key);
        res
    }

    /// translate a range of the view into a range of the inner store
    fn bounds(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> (Vec<u8>, Option<Vec<u8>>) {
        let start = self.key(start.unwrap_or_default());
        let end = match end {
            Some(end) => Some(self.key(end)),
            None => prefix_end(&self.prefix),
        };
        (start, end)
    }
}

impl<S: ReadOnlyStore> ReadOnlyStore for PrefixStore<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>> {
        self.inner.get(&self.key(key))
    }

    fn iter(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<BoxedIter<'_, KeyValue>> {
        let (start, end) = self.bounds(start, end);
        let n = self.prefix.len();
        Ok(self
            .inner
            .iter(Some(start.as_slice()), end.as_deref())?
            .map(move |(key, value)| (Box::<[u8]>::from(&key[n..]), value))
            .boxed())
    }

    fn rev_iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<BoxedIter<'_, KeyValue>> {
        let (start, end) = self.bounds(start, end);
        let n = self.prefix.len();
        Ok(self
            .inner
            .rev_iter(Some(start.as_slice()), end.as_deref())?
            .map(move |(key, value)| (Box::<[u8]>::from(&key[n..]), value))
            .boxed())
    }
}

impl<S: KvStore> KvStore for PrefixStore<S> {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.inner.set(&self.key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(&self.key(key))
    }
}
