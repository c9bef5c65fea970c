//! 带代号的 `slab` 竞技场。
//!
//! 每次插入分配一个新代号并记入槽位，[`ItemId`] 同时携带下标与代号；
//! 槽位被新条目复用后，旧句柄的代号不再匹配，查找一律落空。

use std::ops::{Index, IndexMut};

use slab::Slab;

use crate::ItemId;

#[derive(Debug)]
struct Slot<N> {
    generation: u64,
    node: N,
}

#[derive(Debug)]
pub(crate) struct Arena<N> {
    slots: Slab<Slot<N>>,
    generation: u64,
}

impl<N> Arena<N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::new(),
            generation: 0,
        }
    }

    pub(crate) fn insert(&mut self, node: N) -> usize {
        self.generation = self.generation.wrapping_add(1);
        self.slots.insert(Slot {
            generation: self.generation,
            node,
        })
    }

    pub(crate) fn remove(&mut self, key: usize) -> N {
        self.slots.remove(key).node
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 当前占据 `key` 的条目的句柄。
    pub(crate) fn id(&self, key: usize) -> ItemId {
        ItemId {
            key,
            generation: self.slots[key].generation,
        }
    }

    /// 句柄仍指向插入时的条目则返回其下标。
    pub(crate) fn resolve(&self, id: ItemId) -> Option<usize> {
        self.slots
            .get(id.key)
            .filter(|slot| slot.generation == id.generation)
            .map(|_| id.key)
    }

    pub(crate) fn lookup(&self, id: ItemId) -> Option<&N> {
        let key = self.resolve(id)?;
        Some(&self.slots[key].node)
    }

    pub(crate) fn lookup_mut(&mut self, id: ItemId) -> Option<&mut N> {
        let key = self.resolve(id)?;
        Some(&mut self.slots[key].node)
    }
}

impl<N> Index<usize> for Arena<N> {
    type Output = N;

    fn index(&self, key: usize) -> &N {
        &self.slots[key].node
    }
}

impl<N> IndexMut<usize> for Arena<N> {
    fn index_mut(&mut self, key: usize) -> &mut N {
        &mut self.slots[key].node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slot_does_not_resolve_stale_handle() {
        let mut arena = Arena::new();
        let first = arena.insert("a");
        let stale = arena.id(first);
        assert_eq!(arena.remove(first), "a");

        let second = arena.insert("b");
        assert_eq!(second, first, "slab 复用空出的槽位");
        assert_eq!(arena.resolve(stale), None);
        assert_eq!(arena.lookup(stale), None);
        assert_eq!(arena.lookup(arena.id(second)), Some(&"b"));
    }
}
