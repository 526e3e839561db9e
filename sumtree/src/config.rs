use crate::error::Error;

/// Shape parameters of a tree.
///
/// These are not persisted. All replicas working on the same store must use the same config,
/// otherwise they will produce different node layouts for the same operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// maximum number of children of a branch. A branch that grows beyond this is split.
    pub max_children: usize,
}

impl Config {
    pub fn new(max_children: usize) -> Self {
        Self { max_children }
    }

    /// config that will produce deep tree structures with few keys
    pub fn debug() -> Self {
        Self { max_children: 3 }
    }

    /// minimum number of children of a non-root branch
    pub fn min_children(&self) -> usize {
        (self.max_children + 1) / 2
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_children >= 2,
            Error::InvalidConfig("max_children must be at least 2")
        );
        anyhow::ensure!(
            self.max_children <= u16::MAX as usize,
            Error::InvalidConfig("max_children too large")
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { max_children: 10 }
    }
}
