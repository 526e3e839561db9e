use common::{check_tree, mem_tree, setup_logging, w, Reference};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::collections::BTreeMap;
use sumtree::{
    keys,
    store::{KvStore, ReadOnlyStore},
    Config, Error, SplitAcc, Weight,
};

mod common;

fn split(left: u64, exact: u64, right: u64) -> SplitAcc {
    SplitAcc {
        left: w(left),
        exact: w(exact),
        right: w(right),
    }
}

#[test]
fn single_key() -> anyhow::Result<()> {
    setup_logging();
    let tree = mem_tree(Config::default())?;
    assert!(tree.is_empty()?);
    assert_eq!(tree.set(b"hello", w(100))?, None);
    assert_eq!(tree.split_acc(b"hello")?, split(0, 100, 0));
    // a single key gives a level 1 root over one leaf
    assert_eq!(tree.root()?, Some((1, b"hello".to_vec())));
    assert_eq!(tree.store().len(), 2);
    Ok(())
}

#[test]
fn two_keys() -> anyhow::Result<()> {
    let tree = mem_tree(Config::default())?;
    tree.set(b"bar", w(100))?;
    tree.set(b"foo", w(100))?;
    assert_eq!(tree.split_acc(b"bar")?, split(0, 100, 100));
    assert_eq!(tree.split_acc(b"foo")?, split(100, 100, 0));
    assert_eq!(tree.total()?, w(200));
    Ok(())
}

#[test]
fn two_keys_then_remove() -> anyhow::Result<()> {
    let tree = mem_tree(Config::default())?;
    tree.set(b"bar", w(100))?;
    tree.set(b"foo", w(100))?;
    assert_eq!(tree.remove(b"bar")?, Some(w(100)));
    assert_eq!(tree.split_acc(b"foo")?, split(0, 100, 0));
    assert_eq!(tree.get(b"bar")?, None);
    // the root moved to the new minimum key
    assert_eq!(tree.root()?, Some((1, b"foo".to_vec())));
    assert!(tree.check_invariants()?.is_empty());
    Ok(())
}

#[test]
fn remove_last_key_empties_the_store() -> anyhow::Result<()> {
    let tree = mem_tree(Config::debug())?;
    for i in 0u8..20 {
        tree.set(&[i], w(i as u64))?;
    }
    for i in 0u8..20 {
        tree.remove(&[i])?;
    }
    assert!(tree.is_empty()?);
    assert!(tree.store().is_empty());
    assert_eq!(tree.split_acc(b"x")?, SplitAcc::default());
    assert_eq!(tree.remove(b"x")?, None);
    Ok(())
}

#[test]
fn zero_weight_is_not_absent() -> anyhow::Result<()> {
    let tree = mem_tree(Config::default())?;
    tree.set(b"a", w(5))?;
    tree.set(b"b", Weight::zero())?;
    tree.set(b"c", w(7))?;
    assert_eq!(tree.get(b"b")?, Some(Weight::zero()));
    assert_eq!(tree.split_acc(b"b")?, split(5, 0, 7));
    // zero weight keys never own a point
    assert_eq!(tree.select(&w(5))?, Some((b"c".to_vec(), w(7))));
    Ok(())
}

#[test]
fn empty_key_is_a_valid_key() -> anyhow::Result<()> {
    let tree = mem_tree(Config::debug())?;
    tree.set(b"", w(3))?;
    tree.set(b"a", w(4))?;
    assert_eq!(tree.split_acc(b"")?, split(0, 3, 4));
    assert_eq!(tree.split_acc(b"a")?, split(3, 4, 0));
    assert_eq!(tree.root()?, Some((1, Vec::new())));
    Ok(())
}

#[test]
fn huge_weights() -> anyhow::Result<()> {
    let tree = mem_tree(Config::debug())?;
    let big = "340282366920938463463374607431768211456".parse::<Weight>()?;
    tree.set(b"a", big.clone())?;
    tree.set(b"b", big.clone())?;
    tree.set(b"c", w(1))?;
    assert_eq!(tree.total()?, &(&big + &big) + &w(1));
    assert_eq!(
        tree.split_acc(b"b")?,
        SplitAcc {
            left: big.clone(),
            exact: big,
            right: w(1)
        }
    );
    Ok(())
}

#[test]
fn negative_weights_are_rejected() {
    use std::convert::TryFrom;
    let err = Weight::try_from(-1i64).unwrap_err();
    assert!(matches!(err, Error::NegativeWeight(_)));
    assert!("-1".parse::<Weight>().is_err());
}

#[test]
fn malformed_node_is_fatal() -> anyhow::Result<()> {
    let tree = mem_tree(Config::default())?;
    tree.set(b"a", w(1))?;
    tree.store().set(&keys::encode(0, b"a"), b"garbage".to_vec())?;
    let err = tree.get(b"a").unwrap_err();
    let err = err.downcast_ref::<Error>().unwrap();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::MalformedEncoding { .. }));
    Ok(())
}

#[test]
fn deep_tree_shape() -> anyhow::Result<()> {
    let tree = mem_tree(Config::debug())?;
    let mut reference = Reference::default();
    for i in 0u64..200 {
        let key = format!("{:05}", i * 7 % 200);
        tree.set(key.as_bytes(), w(i))?;
        reference.set(key.as_bytes(), w(i));
    }
    let (level, _) = tree.root()?.unwrap();
    // at least 2 and at most 3 children per branch
    assert!((5..=8).contains(&level), "level {}", level);
    check_tree(&tree, &reference)?;
    // every level of the store is a contiguous range of storage keys
    let (start, end) = keys::level_range(level);
    let roots = tree
        .store()
        .iter(Some(start.as_slice()), end.as_deref())?
        .count();
    assert_eq!(roots, 1);
    Ok(())
}

#[test]
fn dump_is_indented_by_depth() -> anyhow::Result<()> {
    let tree = mem_tree(Config::new(2))?;
    tree.set(b"a", w(1))?;
    tree.set(b"b", w(2))?;
    tree.set(b"c", w(3))?;
    let mut out = Vec::new();
    tree.dump(&mut out)?;
    let text = String::from_utf8(out)?;
    let lines = text.lines().collect::<Vec<_>>();
    assert!(lines[0].starts_with("Branch(level=2, acc=6"));
    assert!(lines.iter().any(|line| line.starts_with("    Leaf(")));
    assert_eq!(lines.len(), 3 + 3);
    Ok(())
}

#[test]
fn select_matches_linear_scan() -> anyhow::Result<()> {
    let tree = mem_tree(Config::debug())?;
    let weights = vec![3u64, 0, 1, 4, 0, 2];
    for (i, weight) in weights.iter().enumerate() {
        tree.set(&[i as u8], w(*weight))?;
    }
    let mut point = 0;
    for (i, weight) in weights.iter().enumerate() {
        for _ in 0..*weight {
            assert_eq!(tree.select(&w(point))?, Some((vec![i as u8], w(*weight))));
            point += 1;
        }
    }
    assert_eq!(tree.select(&w(point))?, None);
    Ok(())
}

#[quickcheck]
fn set_then_get(entries: BTreeMap<Vec<u8>, u64>, key: Vec<u8>, weight: u64) -> anyhow::Result<bool> {
    let tree = mem_tree(Config::debug())?;
    for (k, v) in &entries {
        tree.set(k, w(*v))?;
    }
    tree.set(&key, w(weight))?;
    Ok(tree.get(&key)? == Some(w(weight)))
}

#[quickcheck]
fn remove_then_get(entries: BTreeMap<Vec<u8>, u64>, key: Vec<u8>) -> anyhow::Result<bool> {
    let tree = mem_tree(Config::debug())?;
    for (k, v) in &entries {
        tree.set(k, w(*v))?;
    }
    let removed = tree.remove(&key)?;
    Ok(removed == entries.get(&key).map(|v| w(*v))
        && tree.get(&key)?.is_none()
        && tree.check_invariants()?.is_empty())
}

#[quickcheck]
fn sum_conservation(entries: BTreeMap<Vec<u8>, u64>, probes: Vec<Vec<u8>>) -> anyhow::Result<bool> {
    let tree = mem_tree(Config::debug())?;
    for (k, v) in &entries {
        tree.set(k, w(*v))?;
    }
    let total = tree.total()?;
    let mut exact_sum = Weight::zero();
    for key in entries.keys() {
        exact_sum += &tree.split_acc(key)?.exact;
    }
    if exact_sum != total {
        return Ok(false);
    }
    for probe in entries.keys().chain(probes.iter()) {
        if tree.split_acc(probe)?.total() != total {
            return Ok(false);
        }
    }
    Ok(true)
}

#[quickcheck]
fn ordering_consistency(entries: BTreeMap<Vec<u8>, u64>) -> anyhow::Result<bool> {
    let tree = mem_tree(Config::debug())?;
    for (k, v) in &entries {
        tree.set(k, w(*v))?;
    }
    let lefts = entries
        .keys()
        .map(|k| Ok(tree.split_acc(k)?.left))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(lefts.windows(2).all(|w| w[0] <= w[1]))
}

#[quickcheck]
fn probe_between_keys(entries: BTreeMap<Vec<u8>, u64>) -> anyhow::Result<TestResult> {
    if entries.is_empty() {
        return Ok(TestResult::discard());
    }
    let tree = mem_tree(Config::debug())?;
    let mut reference = Reference::default();
    for (k, v) in &entries {
        tree.set(k, w(*v))?;
        reference.set(k, w(*v));
    }
    for key in entries.keys() {
        // the smallest key that is greater than key, which is never stored unless it is the next key
        let mut probe = key.clone();
        probe.push(0);
        if entries.contains_key(&probe) {
            continue;
        }
        let res = tree.split_acc(&probe)?;
        if res.exact != Weight::zero() || res != reference.split_acc(&probe) {
            return Ok(TestResult::failed());
        }
    }
    Ok(TestResult::passed())
}
