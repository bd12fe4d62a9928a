//! # Dirty Sets
//!
//! Per-pass sets of brushes that need recomputation, by order index.
//!
//! - **direct**: the brush itself changed (flags, new brush, polytope
//!   generation or availability, forced rebuild)
//! - **indirect**: the brush is unchanged but touched, or now touches, a
//!   direct or removed brush
//! - **evaluate**: brushes whose surfaces are rebuilt; direct and indirect
//!   brushes plus those whose routing table changed

/// Insertion-ordered set of order indices with O(1) membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    flags: Vec<bool>,
    members: Vec<u32>,
}

impl DirtySet {
    /// Empty set over `len` orders.
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
            members: Vec::new(),
        }
    }

    /// Adds an order. Returns `false` if it was already present or out of range.
    pub fn insert(&mut self, order: u32) -> bool {
        match self.flags.get_mut(order as usize) {
            Some(flag) if !*flag => {
                *flag = true;
                self.members.push(order);
                true
            }
            _ => false,
        }
    }

    /// Membership test.
    pub fn contains(&self, order: u32) -> bool {
        self.flags.get(order as usize).copied().unwrap_or(false)
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    /// Members in ascending order.
    pub fn sorted(&self) -> Vec<u32> {
        let mut sorted = self.members.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The three dirty sets of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySets {
    /// Brushes that changed themselves.
    pub direct: DirtySet,
    /// Brushes affected through touching.
    pub indirect: DirtySet,
    /// Brushes whose surfaces are re-evaluated.
    pub evaluate: DirtySet,
}

impl DirtySets {
    /// Empty sets over `len` orders.
    pub fn new(len: usize) -> Self {
        Self {
            direct: DirtySet::new(len),
            indirect: DirtySet::new(len),
            evaluate: DirtySet::new(len),
        }
    }

    /// Marks a brush directly dirty.
    pub fn mark_direct(&mut self, order: u32) -> bool {
        self.evaluate.insert(order);
        self.direct.insert(order)
    }

    /// Marks a brush indirectly dirty unless it is already direct.
    pub fn mark_indirect(&mut self, order: u32) -> bool {
        if self.direct.contains(order) {
            return false;
        }
        self.evaluate.insert(order);
        self.indirect.insert(order)
    }

    /// True when the brush is direct or indirect.
    pub fn is_dirty(&self, order: u32) -> bool {
        self.direct.contains(order) || self.indirect.contains(order)
    }

    /// Direct and indirect brushes in ascending order.
    pub fn dirty_sorted(&self) -> Vec<u32> {
        let mut all: Vec<u32> = self
            .direct
            .members()
            .iter()
            .chain(self.indirect.members())
            .copied()
            .collect();
        all.sort_unstable();
        all
    }
}
