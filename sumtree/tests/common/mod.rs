#![allow(dead_code)]
//! helper methods for the tests
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use sumtree::{
    store::{KeyValue, KvStore, MemStore, ReadOnlyStore},
    BoxedIter, Config, SplitAcc, Tree, Weight,
};

pub fn w(x: u64) -> Weight {
    Weight::from(x)
}

/// log output for the tests, controlled by RUST_LOG
pub fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn mem_tree(config: Config) -> anyhow::Result<Tree<MemStore>> {
    Tree::new(MemStore::default(), config)
}

/// The obvious implementation of a sum tree, to compare against
#[derive(Debug, Default, Clone)]
pub struct Reference(pub BTreeMap<Vec<u8>, Weight>);

impl Reference {
    pub fn set(&mut self, key: &[u8], weight: Weight) -> Option<Weight> {
        self.0.insert(key.to_vec(), weight)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Weight> {
        self.0.remove(key)
    }

    pub fn split_acc(&self, key: &[u8]) -> SplitAcc {
        let mut res = SplitAcc::default();
        for (k, v) in &self.0 {
            if k.as_slice() < key {
                res.left += v;
            } else if k.as_slice() == key {
                res.exact = v.clone();
            } else {
                res.right += v;
            }
        }
        res
    }

    pub fn total(&self) -> Weight {
        self.0.values().sum()
    }
}

/// Checks that `tree` has exactly the content of `reference`, and that it is well formed
pub fn check_tree<S: KvStore>(tree: &Tree<S>, reference: &Reference) -> anyhow::Result<()> {
    let violations = tree.check_invariants()?;
    anyhow::ensure!(violations.is_empty(), "invariants violated: {:?}", violations);
    let content = tree.iter()?.collect::<anyhow::Result<Vec<_>>>()?;
    let expected = reference
        .0
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    anyhow::ensure!(content == expected, "content differs");
    anyhow::ensure!(tree.total()? == reference.total(), "total differs");
    for key in reference.0.keys() {
        anyhow::ensure!(
            tree.split_acc(key)? == reference.split_acc(key),
            "split_acc differs for {:?}",
            key
        );
    }
    Ok(())
}

/// A store wrapper that counts the operations on the inner store, and the entries yielded by
/// its scans
#[derive(Debug, Clone, Default)]
pub struct OpsCountingStore {
    inner: MemStore,
    reads: Arc<AtomicU64>,
    scans: Arc<AtomicU64>,
    scanned: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl OpsCountingStore {
    pub fn new(inner: MemStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    /// number of entries pulled from scans
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ReadOnlyStore for OpsCountingStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Box<[u8]>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> anyhow::Result<BoxedIter<'_, KeyValue>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.counted(self.inner.iter(start, end)?)
    }

    fn rev_iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> anyhow::Result<BoxedIter<'_, KeyValue>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.counted(self.inner.rev_iter(start, end)?)
    }
}

impl OpsCountingStore {
    fn counted<'a>(
        &self,
        iter: BoxedIter<'a, KeyValue>,
    ) -> anyhow::Result<BoxedIter<'a, KeyValue>> {
        let scanned = self.scanned.clone();
        Ok(Box::new(iter.inspect(move |_| {
            scanned.fetch_add(1, Ordering::SeqCst);
        })))
    }
}

impl KvStore for OpsCountingStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }
}
