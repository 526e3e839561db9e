//! creation, mutation and traversal of sum trees
//!
//! A tree is a B-tree like structure stored in an ordered key value store. All leaves are at level
//! `0`, every root to leaf path has the same length. Each branch is stored under its own level and
//! its minimum key, and holds for every child the minimum key and the total weight of the child
//! subtree. This allows computing prefix sums over the keys while reading only one node per level.
//!
//! There is no separate pointer to the root. The root is simply the single node at the highest
//! level, which is the last entry of the node namespace.
use crate::{
    config::Config,
    error::Error,
    keys::{self, Level},
    node::{Branch, Child, Leaf, Node, Weight},
    store::{KvStore, ReadOnlyStore},
    util::is_strictly_sorted,
};
use anyhow::Result;
use std::{fmt, io};
use tracing::{debug, trace};

/// Result of [Tree::split_acc]
///
/// [Tree::split_acc]: struct.Tree.html#method.split_acc
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitAcc {
    /// total weight of all keys strictly smaller than the probe
    pub left: Weight,
    /// weight of the probe itself, zero if it is not in the tree
    pub exact: Weight,
    /// total weight of all keys strictly greater than the probe
    pub right: Weight,
}

impl SplitAcc {
    pub fn total(&self) -> Weight {
        &(&self.left + &self.exact) + &self.right
    }
}

impl fmt::Display for SplitAcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.left, self.exact, self.right)
    }
}

/// Find the root of the tree in `store`, as (level, minimum key).
///
/// Since the level is the most significant part of the storage key, the last entry of the node
/// namespace is at the highest level. None means the tree is empty.
pub fn find_root<S: ReadOnlyStore + ?Sized>(store: &S) -> Result<Option<(Level, Vec<u8>)>> {
    let (start, end) = keys::namespace_range();
    let mut iter = store.rev_iter(Some(start.as_slice()), end.as_deref())?;
    Ok(match iter.next() {
        Some((storage_key, _)) => {
            let (level, key) = keys::decode(&storage_key)?;
            Some((level, key.to_vec()))
        }
        None => None,
    })
}

/// A branch on the path from the root to a leaf, with the position of the child we descended into
struct Frame {
    level: Level,
    /// the key the branch is currently stored under
    key: Vec<u8>,
    branch: Branch,
    pos: usize,
}

/// A sum tree on top of a key value store
#[derive(Debug, Clone)]
pub struct Tree<S> {
    store: S,
    config: Config,
}

impl<S: KvStore> Tree<S> {
    pub fn new(store: S, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// level and minimum key of the root node, None for an empty tree
    pub fn root(&self) -> Result<Option<(Level, Vec<u8>)>> {
        find_root(&self.store)
    }

    /// true for an empty tree
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root()?.is_none())
    }

    /// sum of all weights in the tree
    pub fn total(&self) -> Result<Weight> {
        Ok(match self.root_branch()? {
            Some((level, key)) => self.load_branch(level, &key)?.accumulation(),
            None => Weight::zero(),
        })
    }

    /// weight of `key`, None if the key is not in the tree
    pub fn get(&self, key: &[u8]) -> Result<Option<Weight>> {
        Ok(self.load_leaf(key)?.map(|leaf| leaf.weight))
    }

    /// Sets the weight of `key`, inserting it if necessary. Returns the previous weight.
    pub fn set(&self, key: &[u8], weight: Weight) -> Result<Option<Weight>> {
        let mut path = match self.path(key)? {
            Some(path) => path,
            None => {
                debug!("creating tree with key {}", keys::display_key(key));
                self.write_leaf(key, &weight)?;
                let root = Branch::new(vec![Child::new(key, weight)]);
                self.replace_branches(1, &[], &[&root])?;
                return Ok(None);
            }
        };
        let bottom = path
            .last_mut()
            .ok_or_else(|| Error::invariant("empty path"))?;
        let previous = match bottom.branch.find(key) {
            Ok(i) => {
                bottom.pos = i;
                let child = &mut bottom.branch.children[i];
                Some(std::mem::replace(&mut child.accumulation, weight.clone()))
            }
            Err(i) => {
                bottom.pos = i;
                bottom
                    .branch
                    .children
                    .insert(i, Child::new(key, weight.clone()));
                None
            }
        };
        self.write_leaf(key, &weight)?;
        self.propagate_insert(path)?;
        Ok(previous)
    }

    /// Removes `key` from the tree. Returns the removed weight, None if the key was not there.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Weight>> {
        let mut path = match self.path(key)? {
            Some(path) => path,
            None => return Ok(None),
        };
        let bottom = path
            .last_mut()
            .ok_or_else(|| Error::invariant("empty path"))?;
        let i = match bottom.branch.find(key) {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        bottom.pos = i;
        let removed = bottom.branch.children.remove(i).accumulation;
        self.store.delete(&keys::encode(0, key))?;
        trace!("deleted leaf {}", keys::display_key(key));
        self.propagate_remove(path)?;
        Ok(Some(removed))
    }

    /// Total weight before, at and after `key`.
    ///
    /// This reads exactly one branch per level of the tree.
    pub fn split_acc(&self, key: &[u8]) -> Result<SplitAcc> {
        let (mut level, mut node_key) = match self.root_branch()? {
            Some(root) => root,
            None => return Ok(SplitAcc::default()),
        };
        let mut total = None;
        let mut left = Weight::zero();
        let mut exact = Weight::zero();
        loop {
            let branch = self.load_branch(level, &node_key)?;
            if total.is_none() {
                total = Some(branch.accumulation());
            }
            let pos = match branch.position(key) {
                Some(pos) => pos,
                // key is before everything in this subtree
                None => break,
            };
            for child in &branch.children[..pos] {
                left += &child.accumulation;
            }
            let child = &branch.children[pos];
            if level == 1 {
                if child.index == key {
                    exact = child.accumulation.clone();
                } else {
                    left += &child.accumulation;
                }
                break;
            }
            node_key = child.index.clone();
            level -= 1;
        }
        let total = total.unwrap_or_default();
        let right = total
            .checked_sub(&left)
            .and_then(|rest| rest.checked_sub(&exact))
            .ok_or_else(|| {
                Error::invariant(format!(
                    "split of {} exceeds total {}",
                    keys::display_key(key),
                    total
                ))
            })?;
        Ok(SplitAcc { left, exact, right })
    }

    /// The key owning `point` in cumulative weight space, together with its weight.
    ///
    /// This is the key `k` with `left(k) <= point < left(k) + weight(k)`, so keys with zero
    /// weight never own a point. None if `point` is not smaller than the total weight.
    pub fn select(&self, point: &Weight) -> Result<Option<(Vec<u8>, Weight)>> {
        let (root_level, root_key) = match self.root_branch()? {
            Some(root) => root,
            None => return Ok(None),
        };
        let mut level = root_level;
        let mut node_key = root_key;
        let mut remaining = point.clone();
        loop {
            let branch = self.load_branch(level, &node_key)?;
            let mut found = None;
            for child in &branch.children {
                if remaining < child.accumulation {
                    found = Some(child);
                    break;
                }
                remaining = remaining
                    .checked_sub(&child.accumulation)
                    .ok_or_else(|| Error::invariant("negative remainder"))?;
            }
            let child = match found {
                Some(child) => child,
                None if level == root_level => return Ok(None),
                None => {
                    return Err(Error::invariant(format!(
                        "accumulation of branch {} at level {} is smaller than in its parent",
                        keys::display_key(&node_key),
                        level
                    ))
                    .into())
                }
            };
            if level == 1 {
                return Ok(Some((child.index.clone(), child.accumulation.clone())));
            }
            node_key = child.index.clone();
            level -= 1;
        }
    }

    /// All keys and weights in ascending key order
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<(Vec<u8>, Weight)>> + '_> {
        let (start, end) = keys::level_range(0);
        let iter = self.store.iter(Some(start.as_slice()), end.as_deref())?;
        Ok(iter.map(|(storage_key, value)| -> Result<(Vec<u8>, Weight)> {
            let (_, key) = keys::decode(&storage_key)?;
            let leaf = Leaf::decode(key, &value)?;
            Ok((leaf.key, leaf.weight))
        }))
    }

    /// Visits all nodes reachable from the root in pre-order
    pub fn visit(&self, mut f: impl FnMut(Level, &Node)) -> Result<()> {
        if let Some((level, key)) = self.root_branch()? {
            self.visit0(level, &key, &mut f)?;
        }
        Ok(())
    }

    fn visit0(&self, level: Level, key: &[u8], f: &mut impl FnMut(Level, &Node)) -> Result<()> {
        if level == 0 {
            let leaf = self.load_leaf(key)?.ok_or_else(|| {
                Error::invariant(format!("missing leaf {}", keys::display_key(key)))
            })?;
            f(level, &Node::Leaf(leaf));
        } else {
            let node = Node::Branch(self.load_branch(level, key)?);
            f(level, &node);
            if let Node::Branch(branch) = &node {
                for child in &branch.children {
                    self.visit0(level - 1, &child.index, f)?;
                }
            }
        }
        Ok(())
    }

    /// dumps the tree structure
    pub fn dump(&self, mut out: impl io::Write) -> Result<()> {
        let root_level = match self.root_branch()? {
            Some((level, _)) => level,
            None => return Ok(()),
        };
        let mut lines = Vec::new();
        self.visit(|level, node| {
            let prefix = "  ".repeat((root_level - level) as usize);
            lines.push(match node {
                Node::Leaf(leaf) => {
                    format!("{}Leaf({}={})", prefix, keys::display_key(&leaf.key), leaf.weight)
                }
                Node::Branch(branch) => format!(
                    "{}Branch(level={}, acc={}, children={})",
                    prefix,
                    level,
                    branch.accumulation(),
                    branch
                        .children
                        .iter()
                        .map(|child| child.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        })?;
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Checks all structural invariants of the tree, returning a description of each violation.
    ///
    /// Only fails if the store itself fails or contains undecodable data.
    pub fn check_invariants(&self) -> Result<Vec<String>> {
        let mut msgs = Vec::new();
        if let Some((level, key)) = self.root()? {
            if level == 0 {
                msgs.push(format!("leaf {} at the root", keys::display_key(&key)));
                return Ok(msgs);
            }
            let mut reachable = 0usize;
            self.check_branch(level, &key, true, &mut reachable, &mut msgs)?;
            let (start, end) = keys::namespace_range();
            let stored = self
                .store
                .iter(Some(start.as_slice()), end.as_deref())?
                .count();
            if stored != reachable {
                msgs.push(format!(
                    "{} nodes stored, but {} reachable from the root",
                    stored, reachable
                ));
            }
        }
        Ok(msgs)
    }

    /// checks a branch and its subtree, returning the actual weight of the subtree
    fn check_branch(
        &self,
        level: Level,
        key: &[u8],
        is_root: bool,
        reachable: &mut usize,
        msgs: &mut Vec<String>,
    ) -> Result<Weight> {
        macro_rules! check {
            ($expression:expr) => {
                if !$expression {
                    msgs.push(format!(
                        "level {} key {}: {}",
                        level,
                        keys::display_key(key),
                        stringify!($expression)
                    ));
                }
            };
        }
        let branch = match self.try_load_branch(level, key)? {
            Some(branch) => branch,
            None => {
                msgs.push(format!(
                    "missing branch level {} key {}",
                    level,
                    keys::display_key(key)
                ));
                return Ok(Weight::zero());
            }
        };
        *reachable += 1;
        let n = branch.children.len();
        check!(branch.min_key() == Some(key));
        check!(is_strictly_sorted(
            &branch
                .children
                .iter()
                .map(|child| &child.index)
                .collect::<Vec<_>>()
        ));
        check!(n <= self.config.max_children);
        if is_root {
            check!(n >= 1);
            check!(level == 1 || n >= 2);
        } else {
            check!(n >= self.config.min_children());
        }
        let mut total = Weight::zero();
        for child in &branch.children {
            let actual = if level == 1 {
                match self.load_leaf(&child.index)? {
                    Some(leaf) => {
                        *reachable += 1;
                        leaf.weight
                    }
                    None => {
                        msgs.push(format!(
                            "missing leaf {}",
                            keys::display_key(&child.index)
                        ));
                        Weight::zero()
                    }
                }
            } else {
                self.check_branch(level - 1, &child.index, false, reachable, msgs)?
            };
            if actual != child.accumulation {
                msgs.push(format!(
                    "level {} child {}: accumulation {} but subtree weight {}",
                    level,
                    keys::display_key(&child.index),
                    child.accumulation,
                    actual
                ));
            }
            total += &child.accumulation;
        }
        Ok(total)
    }

    /// root of a non-empty tree, which must be a branch
    fn root_branch(&self) -> Result<Option<(Level, Vec<u8>)>> {
        match self.root()? {
            Some((0, key)) => Err(Error::invariant(format!(
                "leaf {} at the root",
                keys::display_key(&key)
            ))
            .into()),
            root => Ok(root),
        }
    }

    /// the branches from the root down to level 1 that own `key`
    ///
    /// If `key` is smaller than all keys in the tree, this is the leftmost path.
    fn path(&self, key: &[u8]) -> Result<Option<Vec<Frame>>> {
        let (mut level, mut node_key) = match self.root_branch()? {
            Some(root) => root,
            None => return Ok(None),
        };
        let mut path = Vec::with_capacity(level as usize);
        loop {
            let branch = self.load_branch(level, &node_key)?;
            let pos = branch.position(key).unwrap_or(0);
            let next = branch.children[pos].index.clone();
            path.push(Frame {
                level,
                key: node_key,
                branch,
                pos,
            });
            if level == 1 {
                break;
            }
            level -= 1;
            node_key = next;
        }
        Ok(Some(path))
    }

    /// writes the modified branches of an insertion path bottom up, splitting overfull branches
    fn propagate_insert(&self, mut path: Vec<Frame>) -> Result<()> {
        while let Some(frame) = path.pop() {
            let Frame {
                level,
                key,
                mut branch,
                ..
            } = frame;
            if branch.children.len() > self.config.max_children {
                let right = Branch::new(branch.children.split_off(branch.children.len() / 2));
                let left = branch;
                debug!(
                    "splitting branch level={} into {} and {} children",
                    level,
                    left.children.len(),
                    right.children.len()
                );
                self.replace_branches(level, &[key.as_slice()], &[&left, &right])?;
                let left_child = child_ref(&left)?;
                let right_child = child_ref(&right)?;
                match path.last_mut() {
                    Some(parent) => {
                        parent.branch.children[parent.pos] = left_child;
                        parent.branch.children.insert(parent.pos + 1, right_child);
                    }
                    None => {
                        let level = level
                            .checked_add(1)
                            .ok_or_else(|| Error::invariant("maximum tree height exceeded"))?;
                        debug!("growing tree to level {}", level);
                        let root = Branch::new(vec![left_child, right_child]);
                        self.replace_branches(level, &[], &[&root])?;
                    }
                }
            } else {
                self.replace_branches(level, &[key.as_slice()], &[&branch])?;
                if let Some(parent) = path.last_mut() {
                    parent.branch.children[parent.pos] = child_ref(&branch)?;
                }
            }
        }
        Ok(())
    }

    /// writes the modified branches of a removal path bottom up, fixing underfull branches
    fn propagate_remove(&self, mut path: Vec<Frame>) -> Result<()> {
        while let Some(frame) = path.pop() {
            match path.last_mut() {
                Some(parent) => {
                    if frame.branch.children.len() >= self.config.min_children() {
                        self.replace_branches(frame.level, &[frame.key.as_slice()], &[&frame.branch])?;
                        parent.branch.children[parent.pos] = child_ref(&frame.branch)?;
                    } else {
                        self.rebalance(frame, parent)?;
                    }
                }
                None => self.shrink_root(frame)?,
            }
        }
        Ok(())
    }

    /// fixes an underfull branch by borrowing a child from a sibling or merging with it
    fn rebalance(&self, frame: Frame, parent: &mut Frame) -> Result<()> {
        let Frame {
            level,
            key,
            mut branch,
            ..
        } = frame;
        let pos = parent.pos;
        let sibling_pos = if pos + 1 < parent.branch.children.len() {
            pos + 1
        } else if pos > 0 {
            pos - 1
        } else {
            // only child, nobody to share with
            if branch.children.is_empty() {
                debug!("removing empty branch level={}", level);
                self.replace_branches(level, &[key.as_slice()], &[])?;
                parent.branch.children.remove(pos);
            } else {
                self.replace_branches(level, &[key.as_slice()], &[&branch])?;
                parent.branch.children[pos] = child_ref(&branch)?;
            }
            return Ok(());
        };
        let sibling_key = parent.branch.children[sibling_pos].index.clone();
        let mut sibling = self.load_branch(level, &sibling_key)?;
        if sibling.children.len() > self.config.min_children() {
            debug!("borrowing child from sibling level={}", level);
            if sibling_pos > pos {
                let child = sibling.children.remove(0);
                branch.children.push(child);
            } else {
                let child = sibling
                    .children
                    .pop()
                    .ok_or_else(|| Error::invariant("empty sibling"))?;
                branch.children.insert(0, child);
            }
            self.replace_branches(level, &[key.as_slice(), sibling_key.as_slice()], &[&branch, &sibling])?;
            parent.branch.children[pos] = child_ref(&branch)?;
            parent.branch.children[sibling_pos] = child_ref(&sibling)?;
        } else {
            debug!("merging with sibling level={}", level);
            let (left_pos, mut left, right) = if sibling_pos > pos {
                (pos, branch, sibling)
            } else {
                (sibling_pos, sibling, branch)
            };
            left.children.extend(right.children);
            self.replace_branches(level, &[key.as_slice(), sibling_key.as_slice()], &[&left])?;
            parent.branch.children[left_pos] = child_ref(&left)?;
            parent.branch.children.remove(left_pos + 1);
        }
        Ok(())
    }

    /// writes the root after a removal, collapsing it while it has a single branch child
    fn shrink_root(&self, frame: Frame) -> Result<()> {
        let Frame {
            mut level,
            mut key,
            mut branch,
            ..
        } = frame;
        if branch.children.is_empty() {
            debug!("tree is empty");
            return self.replace_branches(level, &[key.as_slice()], &[]);
        }
        let mut stale = true;
        // level 1 is the floor, a root over a single leaf stays a branch
        while level > 1 && branch.children.len() == 1 {
            self.replace_branches(level, &[key.as_slice()], &[])?;
            key = branch.children[0].index.clone();
            level -= 1;
            debug!("shrinking tree to level {}", level);
            // children below the root are already written
            branch = self.load_branch(level, &key)?;
            stale = false;
        }
        if stale {
            self.replace_branches(level, &[key.as_slice()], &[&branch])?;
        }
        Ok(())
    }

    /// Replaces the branches stored at `level` under the keys `old` with the branches `new`.
    ///
    /// All deletions happen before all writes, so a new branch may take over the key of an old
    /// one.
    fn replace_branches(&self, level: Level, old: &[&[u8]], new: &[&Branch]) -> Result<()> {
        let new_keys = new
            .iter()
            .map(|branch| {
                branch
                    .min_key()
                    .ok_or_else(|| Error::invariant(format!("empty branch at level {}", level)))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        for key in old {
            if !new_keys.contains(key) {
                self.store.delete(&keys::encode(level, key))?;
                trace!("deleted branch level={} key={}", level, keys::display_key(key));
            }
        }
        for (key, branch) in new_keys.iter().zip(new) {
            self.store.set(&keys::encode(level, key), branch.encode()?)?;
            trace!(
                "wrote branch level={} key={} children={}",
                level,
                keys::display_key(key),
                branch.children.len()
            );
        }
        Ok(())
    }

    fn write_leaf(&self, key: &[u8], weight: &Weight) -> Result<()> {
        let leaf = Leaf::new(key, weight.clone());
        self.store.set(&keys::encode(0, key), leaf.encode()?)?;
        trace!("wrote leaf {}={}", keys::display_key(key), weight);
        Ok(())
    }

    fn load_leaf(&self, key: &[u8]) -> Result<Option<Leaf>> {
        Ok(match self.store.get(&keys::encode(0, key))? {
            Some(bytes) => Some(Leaf::decode(key, &bytes)?),
            None => None,
        })
    }

    fn try_load_branch(&self, level: Level, key: &[u8]) -> Result<Option<Branch>> {
        let storage_key = keys::encode(level, key);
        Ok(match self.store.get(&storage_key)? {
            Some(bytes) => Some(Branch::decode(&storage_key, &bytes)?),
            None => None,
        })
    }

    fn load_branch(&self, level: Level, key: &[u8]) -> Result<Branch> {
        self.try_load_branch(level, key)?.ok_or_else(|| {
            Error::invariant(format!(
                "missing branch level={} key={}",
                level,
                keys::display_key(key)
            ))
            .into()
        })
    }
}

/// the reference to a branch as stored in its parent
fn child_ref(branch: &Branch) -> Result<Child, Error> {
    let index = branch
        .min_key()
        .ok_or_else(|| Error::invariant("empty branch"))?;
    Ok(Child::new(index, branch.accumulation()))
}
