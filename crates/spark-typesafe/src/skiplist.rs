//! # SkipList：单线程跳表
//!
//! ## 契约（What）
//! - 最大层数 [`MAX_DEPTH`]；前 [`EMBED`] 层链接内嵌在节点中，更高的节点把第 [`OVERFLOW`] 层起的
//!   链接放进单独分配的溢出数组，矮节点不为高层付出内存；
//! - 新节点层数 = 随机字尾随零个数 + 1（上限 `MAX_DEPTH`），期望每层节点数减半；
//! - 键唯一，比较相等视为同一条目。
//!
//! ## 风险（Trade-offs）
//! - 随机源可通过 [`SkipList::with_seed`] 固定，便于复现测试；生产使用 [`SkipList::new`] 以熵源播种。

use std::{cmp::Ordering, fmt};

use rand::{Rng, SeedableRng, rngs::StdRng};
use crate::{Added, ItemId, arena::Arena};

pub const MAX_DEPTH: usize = 16;
pub const EMBED: usize = 4;
pub const OVERFLOW: usize = EMBED - 1;

/// 节点各层的后继链接。
enum Levels {
    Inline {
        height: usize,
        next: [Option<usize>; EMBED],
    },
    Overflow {
        height: usize,
        next: [Option<usize>; OVERFLOW],
        overflow: Box<[Option<usize>; MAX_DEPTH - OVERFLOW]>,
    },
}

impl Levels {
    fn with_height(height: usize) -> Self {
        if height <= EMBED {
            Levels::Inline {
                height,
                next: [None; EMBED],
            }
        } else {
            Levels::Overflow {
                height,
                next: [None; OVERFLOW],
                overflow: Box::new([None; MAX_DEPTH - OVERFLOW]),
            }
        }
    }

    fn height(&self) -> usize {
        match self {
            Levels::Inline { height, .. } | Levels::Overflow { height, .. } => *height,
        }
    }

    fn get(&self, level: usize) -> Option<usize> {
        match self {
            Levels::Inline { next, .. } => next[level],
            Levels::Overflow { next, overflow, .. } => {
                if level < OVERFLOW {
                    next[level]
                } else {
                    overflow[level - OVERFLOW]
                }
            }
        }
    }

    fn set(&mut self, level: usize, value: Option<usize>) {
        match self {
            Levels::Inline { next, .. } => next[level] = value,
            Levels::Overflow { next, overflow, .. } => {
                if level < OVERFLOW {
                    next[level] = value;
                } else {
                    overflow[level - OVERFLOW] = value;
                }
            }
        }
    }
}

struct Node<T> {
    value: T,
    levels: Levels,
}

/// 单线程跳表，`F` 为三路比较器。
pub struct SkipList<T, F> {
    nodes: Arena<Node<T>>,
    head: [Option<usize>; MAX_DEPTH],
    cmp: F,
    rng: StdRng,
}

impl<T, F> SkipList<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(cmp: F) -> Self {
        Self::from_rng(cmp, StdRng::from_entropy())
    }

    /// 以固定种子创建，层数序列可复现。
    pub fn with_seed(cmp: F, seed: u64) -> Self {
        Self::from_rng(cmp, StdRng::seed_from_u64(seed))
    }

    fn from_rng(cmp: F, rng: StdRng) -> Self {
        Self {
            nodes: Arena::new(),
            head: [None; MAX_DEPTH],
            cmp,
            rng,
        }
    }

    /// `cursor` 为 `None` 时表示表头。
    fn next_of(&self, cursor: Option<usize>, level: usize) -> Option<usize> {
        match cursor {
            None => self.head[level],
            Some(key) => self.nodes[key].levels.get(level),
        }
    }

    fn set_next_of(&mut self, cursor: Option<usize>, level: usize, value: Option<usize>) {
        match cursor {
            None => self.head[level] = value,
            Some(key) => self.nodes[key].levels.set(level, value),
        }
    }

    fn random_height(&mut self) -> usize {
        let word: u32 = self.rng.r#gen();
        (word.trailing_zeros() as usize + 1).min(MAX_DEPTH)
    }

    /// 自顶向下记录每层最后一个小于 `target` 的节点，命中相等节点时提前返回它。
    fn search(&self, target: &T) -> Result<[Option<usize>; MAX_DEPTH], usize> {
        let mut update = [None; MAX_DEPTH];
        let mut cursor = None;
        for level in (0..MAX_DEPTH).rev() {
            while let Some(next) = self.next_of(cursor, level) {
                match (self.cmp)(&self.nodes[next].value, target) {
                    Ordering::Less => cursor = Some(next),
                    Ordering::Equal => return Err(next),
                    Ordering::Greater => break,
                }
            }
            update[level] = cursor;
        }
        Ok(update)
    }

    pub fn add(&mut self, value: T) -> Added<T> {
        let update = match self.search(&value) {
            Ok(update) => update,
            Err(existing) => {
                return Added::Existing {
                    id: self.nodes.id(existing),
                    rejected: value,
                };
            }
        };

        let height = self.random_height();
        let key = self.nodes.insert(Node {
            value,
            levels: Levels::with_height(height),
        });
        for (level, prev) in update.iter().enumerate().take(height) {
            let next = self.next_of(*prev, level);
            self.nodes[key].levels.set(level, next);
            self.set_next_of(*prev, level, Some(key));
        }
        Added::New(self.nodes.id(key))
    }

    pub fn find(&self, target: &T) -> Option<ItemId> {
        self.search(target).err().map(|key| self.nodes.id(key))
    }

    /// 第一个不小于 `target` 的条目。
    pub fn find_gteq(&self, target: &T) -> Option<ItemId> {
        match self.search(target) {
            Err(key) => Some(self.nodes.id(key)),
            Ok(update) => self.next_of(update[0], 0).map(|key| self.nodes.id(key)),
        }
    }

    /// 最后一个小于 `target` 的条目。
    pub fn find_lt(&self, target: &T) -> Option<ItemId> {
        let mut cursor = None;
        for level in (0..MAX_DEPTH).rev() {
            while let Some(next) = self.next_of(cursor, level) {
                if (self.cmp)(&self.nodes[next].value, target) == Ordering::Less {
                    cursor = Some(next);
                } else {
                    break;
                }
            }
        }
        cursor.map(|key| self.nodes.id(key))
    }

    pub fn del(&mut self, id: ItemId) -> Option<T> {
        let target = self.nodes.resolve(id)?;
        let height = self.nodes[target].levels.height();

        let mut preds = [None; MAX_DEPTH];
        let mut cursor = None;
        for level in (0..height).rev() {
            while let Some(next) = self.next_of(cursor, level) {
                if next == target {
                    break;
                }
                if (self.cmp)(&self.nodes[next].value, &self.nodes[target].value) != Ordering::Less
                {
                    // 该层链上没有目标节点：句柄已不在表中。
                    return None;
                }
                cursor = Some(next);
            }
            if self.next_of(cursor, level) != Some(target) {
                return None;
            }
            preds[level] = cursor;
        }

        for (level, pred) in preds.iter().enumerate().take(height) {
            let next = self.nodes[target].levels.get(level);
            self.set_next_of(*pred, level, next);
        }
        Some(self.nodes.remove(target).value)
    }

    pub fn pop(&mut self) -> Option<T> {
        let first = self.first()?;
        self.del(first)
    }

    pub fn first(&self) -> Option<ItemId> {
        self.head[0].map(|key| self.nodes.id(key))
    }

    pub fn next(&self, id: ItemId) -> Option<ItemId> {
        self.nodes.lookup(id)?.levels.get(0).map(|key| self.nodes.id(key))
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.nodes.lookup(id).map(|node| &node.value)
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &T)> + '_ {
        let mut cursor = self.head[0];
        std::iter::from_fn(move || {
            let key = cursor?;
            let node = &self.nodes[key];
            cursor = node.levels.get(0);
            Some((self.nodes.id(key), &node.value))
        })
    }
}

impl<T: fmt::Debug, F> fmt::Debug for SkipList<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipList")
            .field("count", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered(list: &SkipList<u32, impl Fn(&u32, &u32) -> Ordering>) -> Vec<u32> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn levels_spill_into_overflow_array() {
        let mut levels = Levels::with_height(MAX_DEPTH);
        levels.set(MAX_DEPTH - 1, Some(9));
        levels.set(1, Some(3));
        assert_eq!(levels.get(MAX_DEPTH - 1), Some(9));
        assert_eq!(levels.get(1), Some(3));
        assert!(matches!(levels, Levels::Overflow { .. }));
        assert!(matches!(Levels::with_height(EMBED), Levels::Inline { .. }));
    }

    #[test]
    fn add_find_delete_keep_sorted_order() {
        let mut list = SkipList::with_seed(|a: &u32, b: &u32| a.cmp(b), 7);
        let mut ids = Vec::new();
        for v in (0..500u32).rev() {
            ids.push(list.add(v * 2).id());
        }
        assert!(!list.add(10).is_new());
        assert_eq!(list.count(), 500);
        assert_eq!(ordered(&list), (0..500).map(|v| v * 2).collect::<Vec<_>>());

        let gteq = list.find_gteq(&11).and_then(|id| list.get(id)).copied();
        assert_eq!(gteq, Some(12));
        let lt = list.find_lt(&11).and_then(|id| list.get(id)).copied();
        assert_eq!(lt, Some(10));

        let ten = list.find(&10).expect("10 已插入");
        assert_eq!(list.del(ten), Some(10));
        assert_eq!(list.del(ten), None);
        assert!(list.find(&10).is_none());
        assert_eq!(list.pop(), Some(0));
        assert_eq!(list.count(), 498);
    }

    #[test]
    fn stale_handle_misses_reused_slot() {
        let mut list = SkipList::with_seed(|a: &u32, b: &u32| a.cmp(b), 3);
        let stale = list.add(1).id();
        assert_eq!(list.del(stale), Some(1));

        let fresh = list.add(2).id();
        assert_ne!(stale, fresh);
        assert_eq!(list.get(stale), None);
        assert_eq!(list.next(stale), None);
        assert_eq!(list.del(stale), None, "旧句柄不能删除复用槽位上的新条目");
        assert_eq!(list.get(fresh), Some(&2));
        assert_eq!(list.count(), 1);
    }
}
