//! The node data structures for the tree and their binary encoding
//!
//! There are two kinds of nodes.
//!
//! ## Leaves
//!
//! Leaves are at level `0` and hold the weight of exactly one key. The key itself is not part of
//! the encoded leaf, it is the key part of the storage key.
//!
//! ## Branches
//!
//! Branches are at level `1` and above. They contain a sequence of [Child] entries, one per child
//! node, with the minimum key of the child subtree and the accumulated weight of the child subtree.
//!
//! ### Invariants
//!
//! A branch has at least one child, and the children are strictly ordered by index.
//!
//! # Encoding
//!
//! Nodes are encoded as dag-cbor. A leaf is a list `[accumulation]`, a branch is a list of
//! `[index, accumulation]` pairs. Weights are encoded as the big endian bytes of the magnitude,
//! without leading zeros, so zero is the empty byte string. Decoding is strict: anything that would
//! not re-encode to exactly the same bytes is rejected, so the encoding is canonical.
//!
//! [Child]: struct.Child.html
use crate::error::Error;
use derive_more::{Display, From, Into};
use libipld::{cbor::DagCborCodec, codec::Codec, Ipld};
use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use std::{
    convert::TryFrom,
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
    str::FromStr,
};

/// A non-negative, arbitrary precision weight.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
pub struct Weight(BigUint);

impl Weight {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    /// `self - rhs`, or None if the result would be negative
    pub fn checked_sub(&self, rhs: &Weight) -> Option<Weight> {
        if self.0 >= rhs.0 {
            Some(Self(&self.0 - &rhs.0))
        } else {
            None
        }
    }

    /// canonical big endian bytes, empty for zero
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    /// inverse of [to_bytes]. Rejects non-canonical input with leading zero bytes.
    ///
    /// [to_bytes]: #method.to_bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.first() == Some(&0) {
            None
        } else {
            Some(Self(BigUint::from_bytes_be(bytes)))
        }
    }
}

impl From<u64> for Weight {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u128> for Weight {
    fn from(value: u128) -> Self {
        Self(BigUint::from(value))
    }
}

impl TryFrom<BigInt> for Weight {
    type Error = Error;

    fn try_from(value: BigInt) -> Result<Self, Error> {
        value
            .to_biguint()
            .map(Self)
            .ok_or(Error::NegativeWeight(value))
    }
}

impl TryFrom<i64> for Weight {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Error> {
        Self::try_from(BigInt::from(value))
    }
}

impl FromStr for Weight {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        let value = text
            .trim()
            .parse::<BigInt>()
            .map_err(|_| Error::InvalidWeight(text.to_owned()))?;
        Self::try_from(value)
    }
}

impl<'a> Add<&'a Weight> for &'a Weight {
    type Output = Weight;

    fn add(self, rhs: &'a Weight) -> Weight {
        Weight(&self.0 + &rhs.0)
    }
}

impl Add for Weight {
    type Output = Weight;

    fn add(self, rhs: Weight) -> Weight {
        Weight(self.0 + rhs.0)
    }
}

impl<'a> AddAssign<&'a Weight> for Weight {
    fn add_assign(&mut self, rhs: &'a Weight) {
        self.0 += &rhs.0;
    }
}

impl<'a> Sum<&'a Weight> for Weight {
    fn sum<I: Iterator<Item = &'a Weight>>(iter: I) -> Self {
        iter.fold(Weight::zero(), |mut acc, x| {
            acc += x;
            acc
        })
    }
}

impl Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Self {
        iter.fold(Weight::zero(), |acc, x| acc + x)
    }
}

/// Reference from a branch to one of its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    /// minimum key of the child subtree
    pub index: Vec<u8>,
    /// total weight of the child subtree
    pub accumulation: Weight,
}

impl Child {
    pub fn new(index: impl Into<Vec<u8>>, accumulation: Weight) -> Self {
        Self {
            index: index.into(),
            accumulation,
        }
    }
}

/// A leaf, holding the weight of a single key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub key: Vec<u8>,
    pub weight: Weight,
}

impl Leaf {
    pub fn new(key: impl Into<Vec<u8>>, weight: Weight) -> Self {
        Self {
            key: key.into(),
            weight,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let ipld = Ipld::List(vec![Ipld::Bytes(self.weight.to_bytes())]);
        Ok(DagCborCodec.encode(&ipld)?)
    }

    /// decode a leaf stored under `key`
    pub fn decode(key: &[u8], bytes: &[u8]) -> Result<Self, Error> {
        let ipld = decode_ipld(key, bytes)?;
        let weight = match &ipld {
            Ipld::List(items) if items.len() == 1 => weight_from_ipld(key, &items[0])?,
            _ => return Err(Error::malformed(key, "expected leaf")),
        };
        let leaf = Self::new(key, weight);
        ensure_canonical(key, bytes, &leaf.encode()?)?;
        Ok(leaf)
    }
}

/// A branch, holding references to its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub children: Vec<Child>,
}

impl Branch {
    pub fn new(children: Vec<Child>) -> Self {
        Self { children }
    }

    /// total weight of the branch
    pub fn accumulation(&self) -> Weight {
        self.children.iter().map(|child| &child.accumulation).sum()
    }

    /// minimum key of the branch, None for an empty branch
    pub fn min_key(&self) -> Option<&[u8]> {
        self.children.first().map(|child| child.index.as_slice())
    }

    /// position of the child whose range contains `key`, i.e. the child with the greatest index
    /// that is `<= key`. None if the key is smaller than all indices.
    pub fn position(&self, key: &[u8]) -> Option<usize> {
        let after = self
            .children
            .partition_point(|child| child.index.as_slice() <= key);
        after.checked_sub(1)
    }

    /// binary search for a child with exactly the given index
    pub fn find(&self, key: &[u8]) -> Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.index.as_slice().cmp(key))
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.children.windows(2).all(|w| w[0].index < w[1].index)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let ipld = Ipld::List(
            self.children
                .iter()
                .map(|child| {
                    Ipld::List(vec![
                        Ipld::Bytes(child.index.clone()),
                        Ipld::Bytes(child.accumulation.to_bytes()),
                    ])
                })
                .collect(),
        );
        Ok(DagCborCodec.encode(&ipld)?)
    }

    /// decode a branch stored under the storage key `key`
    pub fn decode(key: &[u8], bytes: &[u8]) -> Result<Self, Error> {
        let items = match decode_ipld(key, bytes)? {
            Ipld::List(items) => items,
            _ => return Err(Error::malformed(key, "expected branch")),
        };
        let children = items
            .iter()
            .map(|item| match item {
                Ipld::List(pair) if pair.len() == 2 => match &pair[0] {
                    Ipld::Bytes(index) => {
                        Ok(Child::new(index.clone(), weight_from_ipld(key, &pair[1])?))
                    }
                    _ => Err(Error::malformed(key, "expected index bytes")),
                },
                _ => Err(Error::malformed(key, "expected child")),
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let branch = Self::new(children);
        if branch.children.is_empty() {
            return Err(Error::malformed(key, "branch without children"));
        }
        if !branch.is_sorted() {
            return Err(Error::malformed(key, "branch children not sorted"));
        }
        ensure_canonical(key, bytes, &branch.encode()?)?;
        Ok(branch)
    }
}

/// a decoded node of either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

impl Node {
    pub fn accumulation(&self) -> Weight {
        match self {
            Node::Leaf(leaf) => leaf.weight.clone(),
            Node::Branch(branch) => branch.accumulation(),
        }
    }
}

impl fmt::Display for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}",
            crate::keys::display_key(&self.index),
            self.accumulation
        )
    }
}

fn decode_ipld(key: &[u8], bytes: &[u8]) -> Result<Ipld, Error> {
    DagCborCodec
        .decode::<Ipld>(bytes)
        .map_err(|e| Error::malformed(key, e))
}

fn weight_from_ipld(key: &[u8], ipld: &Ipld) -> Result<Weight, Error> {
    match ipld {
        Ipld::Bytes(bytes) => {
            Weight::from_bytes(bytes).ok_or_else(|| Error::malformed(key, "non canonical weight"))
        }
        _ => Err(Error::malformed(key, "expected weight bytes")),
    }
}

fn ensure_canonical(key: &[u8], bytes: &[u8], reencoded: &[u8]) -> Result<(), Error> {
    if bytes == reencoded {
        Ok(())
    } else {
        Err(Error::malformed(key, "non canonical encoding"))
    }
}
