//! One-shot conversion of a tree from the legacy json node format to the binary format
//!
//! The migration walks the tree from the root, parent before children, and rewrites every
//! reachable node in place under the same storage key. Nodes that are not reachable from the root
//! are left alone.
//!
//! All nodes are converted in memory before anything is written. If any node can not be decoded,
//! the migration fails and the store is left exactly as it was.
use crate::{
    error::Error,
    keys::{self, Level},
    legacy,
    store::KvStore,
    tree::find_root,
};
use anyhow::Result;
use tracing::{debug, info};

/// What a migration did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// level and key of the root, None if there was no tree
    pub root: Option<(Level, Vec<u8>)>,
    pub branches: usize,
    pub leaves: usize,
}

/// Migrates the tree in `store` from the legacy json encoding to the binary encoding.
pub fn migrate<S: KvStore + ?Sized>(store: &S) -> Result<MigrationSummary> {
    let root = match find_root(store)? {
        Some(root) => root,
        None => {
            info!("no tree to migrate");
            return Ok(MigrationSummary::default());
        }
    };
    let mut summary = MigrationSummary {
        root: Some(root.clone()),
        ..Default::default()
    };
    let mut converted = Vec::new();
    // pre-order traversal, so children are pushed in reverse
    let mut stack = vec![root];
    while let Some((level, key)) = stack.pop() {
        let storage_key = keys::encode(level, &key);
        let bytes = store.get(&storage_key)?.ok_or_else(|| {
            Error::invariant(format!(
                "missing node level={} key={}",
                level,
                keys::display_key(&key)
            ))
        })?;
        if level == 0 {
            let leaf = legacy::decode_leaf(&key, &bytes)?;
            converted.push((storage_key, leaf.encode()?));
            summary.leaves += 1;
        } else {
            let branch = legacy::decode_branch(&storage_key, &bytes)?;
            converted.push((storage_key, branch.encode()?));
            summary.branches += 1;
            for child in branch.children.into_iter().rev() {
                stack.push((level - 1, child.index));
            }
        }
    }
    debug!("converted {} nodes, writing", converted.len());
    for (storage_key, bytes) in converted {
        store.set(&storage_key, bytes)?;
    }
    info!(
        "migrated tree branches={} leaves={}",
        summary.branches, summary.leaves
    );
    Ok(summary)
}
