use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::models::likelihood::MarginalLikelihood;
use crate::utils::NoPrettyPrint;

/// Identifier of a block slot. Id `0` is the permanent null block.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

impl BlockId {
    /// The always-empty placeholder standing for "open a new block".
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-empty set of items and the cached marginal likelihood of exactly
/// that set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    members: BTreeSet<usize>,
    ln_m: f64,
}

impl Block {
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub const fn ln_m(&self) -> f64 {
        self.ln_m
    }

    /// Item indices in ascending order.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, item: usize) -> bool {
        self.members.contains(&item)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Slot {
    Null,
    Open(Block),
    Closed,
}

/// A mutable partition of `N` items into blocks, with the total log marginal
/// likelihood maintained incrementally.
///
/// Block ids live in an arena of `N + 1` slots: slot 0 is the null block and
/// slots `1..=N` are handed out smallest-first from a free list and returned
/// to it as soon as their block empties.
#[derive(Clone)]
pub struct PartitionStore<X, L> {
    data: Vec<X>,
    likelihood: L,
    slots: Vec<Slot>,
    free: BTreeSet<usize>,
    assignments: Vec<Option<BlockId>>,
    n_assigned: usize,
    n_open: usize,
    total_ln_m: f64,
}

impl<X, L> fmt::Debug for PartitionStore<X, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assignments: Vec<_> = self
            .assignments
            .iter()
            .map(|a| a.map_or_else(|| String::from("-"), |b| b.to_string()))
            .map(NoPrettyPrint::new)
            .collect();
        let sizes: Vec<(usize, usize)> = self
            .blocks()
            .map(|(id, block)| (id.0, block.len()))
            .collect();

        f.debug_struct("PartitionStore")
            .field("assignments", &NoPrettyPrint::new(assignments))
            .field("block_sizes", &NoPrettyPrint::new(sizes))
            .field("n_assigned", &self.n_assigned)
            .field("total_ln_m", &self.total_ln_m)
            .finish_non_exhaustive()
    }
}

impl<X, L> PartitionStore<X, L>
where
    L: MarginalLikelihood<X>,
{
    /// Create a store with every item unassigned and only the null block open.
    pub fn new(data: impl Into<Vec<X>>, likelihood: L) -> Self {
        let data = data.into();
        let n = data.len();
        let slots = std::iter::once(Slot::Null)
            .chain((0..n).map(|_| Slot::Closed))
            .collect();

        Self {
            assignments: vec![None; n],
            data,
            likelihood,
            slots,
            free: (1..=n).collect(),
            n_assigned: 0,
            n_open: 0,
            total_ln_m: 0.0,
        }
    }

    /// Take `item` out of its block.
    ///
    /// Returns `Ok(false)` without touching anything when the item has no
    /// current assignment. A block left empty is closed and its id returned to
    /// the pool.
    ///
    /// # Errors
    /// [`Error::NonFiniteLikelihood`] if the shrunken block has a non-finite
    /// marginal likelihood; the store is left unchanged.
    pub fn remove(&mut self, item: usize) -> Result<bool> {
        let Some(block_id) = self.assignments.get(item).copied().flatten() else {
            return Ok(false);
        };
        let Slot::Open(block) = &self.slots[block_id.0] else {
            unreachable!("assigned items always sit in an open block");
        };

        let old_ln_m = block.ln_m;
        let new_ln_m = if block.len() == 1 {
            None
        } else {
            let rest = block.members().filter(|&m| m != item);
            Some(self.checked_ln_m(block_id, rest, None)?)
        };

        self.total_ln_m -= old_ln_m;
        self.assignments[item] = None;
        self.n_assigned -= 1;

        match new_ln_m {
            None => {
                self.slots[block_id.0] = Slot::Closed;
                self.free.insert(block_id.0);
                self.n_open -= 1;
            }
            Some(ln_m) => {
                if let Slot::Open(block) = &mut self.slots[block_id.0] {
                    block.members.remove(&item);
                    block.ln_m = ln_m;
                }
                self.total_ln_m += ln_m;
            }
        }

        Ok(true)
    }

    /// Put an unassigned `item` into block `block_id`.
    ///
    /// Adding to [`BlockId::NULL`] opens a fresh block with the smallest free
    /// id; the null block itself stays empty. Returns the id of the block the
    /// item landed in.
    ///
    /// # Errors
    /// - [`Error::InvalidReference`] if `block_id` is not open and not null.
    /// - [`Error::ItemOutOfRange`] / [`Error::AlreadyAssigned`] for a bad item.
    /// - [`Error::NonFiniteLikelihood`] if the enlarged block has a
    ///   non-finite marginal likelihood; the store is left unchanged.
    pub fn add(&mut self, item: usize, block_id: BlockId) -> Result<BlockId> {
        match self.assignments.get(item) {
            None => {
                return Err(Error::ItemOutOfRange {
                    item,
                    n_items: self.data.len(),
                });
            }
            Some(Some(block)) => {
                return Err(Error::AlreadyAssigned {
                    item,
                    block: *block,
                });
            }
            Some(None) => (),
        }

        let (target, old_ln_m, new_ln_m) = match self.slots.get(block_id.0) {
            Some(Slot::Null) => {
                let target = self.free.first().copied().ok_or(Error::BlockPoolExhausted)?;
                let target = BlockId(target);
                let ln_m = self.checked_ln_m(target, std::iter::once(item), None)?;
                (target, 0.0, ln_m)
            }
            Some(Slot::Open(block)) => {
                let ln_m = self.checked_ln_m(block_id, block.members(), Some(item))?;
                (block_id, block.ln_m, ln_m)
            }
            Some(Slot::Closed) | None => {
                return Err(Error::InvalidReference { block: block_id });
            }
        };

        if block_id.is_null() {
            self.free.remove(&target.0);
            self.slots[target.0] = Slot::Open(Block::default());
            self.n_open += 1;
        }

        self.total_ln_m -= old_ln_m;
        if let Slot::Open(block) = &mut self.slots[target.0] {
            block.members.insert(item);
            block.ln_m = new_ln_m;
        }
        self.total_ln_m += new_ln_m;
        self.assignments[item] = Some(target);
        self.n_assigned += 1;

        Ok(target)
    }

    /// Log marginal likelihood of block `block_id` with `item` added, without
    /// changing the store. The null block counts as empty.
    ///
    /// # Errors
    /// [`Error::InvalidReference`] if `block_id` is neither open nor null,
    /// [`Error::ItemOutOfRange`] for a bad item.
    pub fn ln_m_with_item(&self, block_id: BlockId, item: usize) -> Result<f64> {
        if item >= self.data.len() {
            return Err(Error::ItemOutOfRange {
                item,
                n_items: self.data.len(),
            });
        }
        match self.slots.get(block_id.0) {
            Some(Slot::Null) => Ok(self.ln_m_of(std::iter::once(item), None)),
            Some(Slot::Open(block)) => Ok(self.ln_m_of(block.members(), Some(item))),
            Some(Slot::Closed) | None => Err(Error::InvalidReference { block: block_id }),
        }
    }

    /// Log marginal likelihood of block `block_id` together with an outside
    /// value `x`. The null block counts as empty.
    ///
    /// # Errors
    /// [`Error::InvalidReference`] if `block_id` is neither open nor null.
    pub fn ln_m_with_value(&self, block_id: BlockId, x: &X) -> Result<f64> {
        let members: Vec<&X> = match self.slots.get(block_id.0) {
            Some(Slot::Null) => Vec::new(),
            Some(Slot::Open(block)) => block.members().map(|m| &self.data[m]).collect(),
            Some(Slot::Closed) | None => return Err(Error::InvalidReference { block: block_id }),
        };
        let xs: Vec<&X> = members.into_iter().chain(std::iter::once(x)).collect();
        Ok(self.likelihood.ln_m(&xs))
    }

    /// Sum of the marginal likelihood of every open block, evaluated from
    /// scratch rather than from the caches.
    pub fn recompute_total_ln_m(&self) -> f64 {
        self.blocks()
            .map(|(_, block)| self.ln_m_of(block.members(), None))
            .sum()
    }

    fn ln_m_of(&self, members: impl Iterator<Item = usize>, extra: Option<usize>) -> f64 {
        let xs: Vec<&X> = members.chain(extra).map(|m| &self.data[m]).collect();
        self.likelihood.ln_m(&xs)
    }

    fn checked_ln_m(
        &self,
        block: BlockId,
        members: impl Iterator<Item = usize>,
        extra: Option<usize>,
    ) -> Result<f64> {
        let value = self.ln_m_of(members, extra);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::NonFiniteLikelihood { block, value })
        }
    }
}

impl<X, L> PartitionStore<X, L> {
    /// Candidate blocks for a Gibbs move: the null block first, then every
    /// open block in ascending id order.
    pub fn open_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::once(BlockId::NULL).chain(self.blocks().map(|(id, _)| id))
    }

    /// Open, non-null blocks in ascending id order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Open(block) => Some((BlockId(i), block)),
                Slot::Null | Slot::Closed => None,
            })
    }

    /// The open block `block_id`, if any. The null block has no contents.
    #[must_use]
    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        match self.slots.get(block_id.0) {
            Some(Slot::Open(block)) => Some(block),
            _ => None,
        }
    }

    /// Size of a candidate block; zero for the null block.
    #[must_use]
    pub fn block_size(&self, block_id: BlockId) -> usize {
        self.block(block_id).map_or(0, Block::len)
    }

    #[must_use]
    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks().map(|(_, block)| block.len()).collect()
    }

    /// Number of open blocks, excluding the null block.
    #[must_use]
    pub const fn cluster_count(&self) -> usize {
        self.n_open
    }

    #[must_use]
    pub const fn total_ln_m(&self) -> f64 {
        self.total_ln_m
    }

    /// Number of items currently assigned to a block.
    #[must_use]
    pub const fn working_count(&self) -> usize {
        self.n_assigned
    }

    #[must_use]
    pub fn assignment(&self, item: usize) -> Option<BlockId> {
        self.assignments.get(item).copied().flatten()
    }

    #[must_use]
    pub fn assignments(&self) -> &[Option<BlockId>] {
        &self.assignments
    }

    #[must_use]
    pub fn data(&self) -> &[X] {
        &self.data
    }

    #[must_use]
    pub const fn likelihood(&self) -> &L {
        &self.likelihood
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Assignments relabelled `0..k` by order of first appearance, with block
    /// sizes. `None` while any item is unassigned.
    #[must_use]
    pub fn to_partition(&self) -> Option<rv::data::Partition> {
        let mut labels: Vec<Option<usize>> = vec![None; self.slots.len()];
        let mut counts: Vec<usize> = Vec::new();
        let z = self
            .assignments
            .iter()
            .copied()
            .map(|assignment| {
                let slot = assignment?.0;
                let label = *labels[slot].get_or_insert_with(|| {
                    counts.push(0);
                    counts.len() - 1
                });
                counts[label] += 1;
                Some(label)
            })
            .collect::<Option<Vec<usize>>>()?;

        Some(rv::data::Partition::new_unchecked(z, counts))
    }
}
