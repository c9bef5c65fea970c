//! # THash：按哈希值排序拉链的单线程哈希表
//!
//! ## 意图（Why）
//! - 桶下标取 32 位哈希值的高位，桶内拉链按哈希值升序，整表遍历顺序因此只取决于哈希值，
//!   扩缩容时旧桶可以顺序拆分/合并而无需重新排序；
//!
//! ## 契约（What）
//! - 桶数恒为 2 的幂；插入后 `count >= 桶数` 时扩容，删除后 `count <= (桶数 - 1) / 2` 时缩容；
//! - 新桶数为严格大于 `count` 的最小 2 的幂，并受 `with_limits` 给出的上下限约束；
//! - 哈希值相同的条目再用比较器判等，相等即视为同一键。
//!
//! ## 风险（Trade-offs）
//! - 拉链式实现每个条目多一次竞技场间接访问，换取稳定的遍历顺序与简单的扩缩容。

use std::{cmp::Ordering, fmt};

use crate::{Added, ItemId, arena::Arena};

struct Node<T> {
    value: T,
    hashval: u32,
    next: Option<usize>,
}

/// 单线程哈希表，`H` 计算 32 位哈希值，`C` 在哈希值相同时判等。
pub struct THash<T, H, C> {
    nodes: Arena<Node<T>>,
    buckets: Vec<Option<usize>>,
    shift: u32,
    min_shift: u32,
    max_shift: u32,
    hash: H,
    cmp: C,
}

const MAX_SHIFT: u32 = 31;

impl<T, H, C> THash<T, H, C>
where
    H: Fn(&T) -> u32,
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(hash: H, cmp: C) -> Self {
        Self::with_limits(hash, cmp, 0, 0)
    }

    /// 指定桶数上下限（取不小于该值的 2 的幂），`0` 表示不限制。
    pub fn with_limits(hash: H, cmp: C, min_size: usize, max_size: usize) -> Self {
        let min_shift = shift_for(min_size);
        let max_shift = if max_size == 0 {
            MAX_SHIFT
        } else {
            shift_for(max_size).max(min_shift)
        };
        let mut table = Self {
            nodes: Arena::new(),
            buckets: Vec::new(),
            shift: 0,
            min_shift,
            max_shift,
            hash,
            cmp,
        };
        if min_size > 0 {
            table.resize(min_shift);
        }
        table
    }

    /// 当前桶数。
    pub fn tabsize(&self) -> usize {
        self.buckets.len()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn bucket_of(&self, hashval: u32) -> usize {
        if self.shift == 0 {
            0
        } else {
            (hashval >> (32 - self.shift)) as usize
        }
    }

    pub fn add(&mut self, value: T) -> Added<T> {
        if self.buckets.is_empty() {
            self.resize(self.min_shift);
        }

        let hashval = (self.hash)(&value);
        let bucket = self.bucket_of(hashval);

        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(key) = cursor {
            let node = &self.nodes[key];
            if node.hashval > hashval {
                break;
            }
            if node.hashval == hashval && (self.cmp)(&node.value, &value) == Ordering::Equal {
                return Added::Existing {
                    id: self.nodes.id(key),
                    rejected: value,
                };
            }
            prev = Some(key);
            cursor = node.next;
        }

        let key = self.nodes.insert(Node {
            value,
            hashval,
            next: cursor,
        });
        match prev {
            Some(prev) => self.nodes[prev].next = Some(key),
            None => self.buckets[bucket] = Some(key),
        }

        if self.count() >= self.tabsize() {
            self.grow();
        }
        Added::New(self.nodes.id(key))
    }

    pub fn find(&self, target: &T) -> Option<ItemId> {
        if self.buckets.is_empty() {
            return None;
        }
        let hashval = (self.hash)(target);
        let mut cursor = self.buckets[self.bucket_of(hashval)];
        while let Some(key) = cursor {
            let node = &self.nodes[key];
            if node.hashval > hashval {
                return None;
            }
            if node.hashval == hashval && (self.cmp)(&node.value, target) == Ordering::Equal {
                return Some(self.nodes.id(key));
            }
            cursor = node.next;
        }
        None
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.nodes.lookup(id).map(|node| &node.value)
    }

    pub fn del(&mut self, id: ItemId) -> Option<T> {
        let target = self.nodes.resolve(id)?;
        let hashval = self.nodes[target].hashval;
        let bucket = self.bucket_of(hashval);

        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(key) = cursor {
            if key == target {
                let node = self.nodes.remove(key);
                match prev {
                    Some(prev) => self.nodes[prev].next = node.next,
                    None => self.buckets[bucket] = node.next,
                }
                self.maybe_shrink();
                return Some(node.value);
            }
            prev = Some(key);
            cursor = self.nodes[key].next;
        }
        None
    }

    /// 按遍历顺序取出第一个条目。
    pub fn pop(&mut self) -> Option<T> {
        let id = self.first()?;
        self.del(id)
    }

    pub fn first(&self) -> Option<ItemId> {
        self.buckets.iter().find_map(|head| *head).map(|key| self.nodes.id(key))
    }

    pub fn next(&self, id: ItemId) -> Option<ItemId> {
        let node = self.nodes.lookup(id)?;
        if let Some(next) = node.next {
            return Some(self.nodes.id(next));
        }
        let bucket = self.bucket_of(node.hashval);
        self.buckets[bucket + 1..]
            .iter()
            .find_map(|head| *head)
            .map(|key| self.nodes.id(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &T)> + '_ {
        let mut cursor = self.first();
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.next(id);
            Some((id, &self.nodes[id.key].value))
        })
    }

    fn grow(&mut self) {
        let shift = shift_above(self.count()).min(self.max_shift);
        if shift != self.shift {
            self.resize(shift);
        }
    }

    fn maybe_shrink(&mut self) {
        let tabsize = self.tabsize();
        if tabsize == 0 || self.count() > (tabsize - 1) / 2 {
            return;
        }
        if self.is_empty() && self.min_shift == 0 {
            self.buckets = Vec::new();
            self.shift = 0;
            return;
        }
        let shift = shift_above(self.count()).max(self.min_shift);
        if shift != self.shift {
            self.resize(shift);
        }
    }

    /// 以新的桶位数重建表：按旧遍历顺序逐个追加到新桶尾部，桶内哈希值升序得以保持。
    fn resize(&mut self, shift: u32) {
        let order: Vec<usize> = self.iter().map(|(id, _)| id.key).collect();

        self.shift = shift;
        self.buckets = vec![None; 1 << shift];
        let mut tails: Vec<Option<usize>> = vec![None; 1 << shift];

        for key in order {
            let bucket = self.bucket_of(self.nodes[key].hashval);
            self.nodes[key].next = None;
            match tails[bucket] {
                Some(tail) => self.nodes[tail].next = Some(key),
                None => self.buckets[bucket] = Some(key),
            }
            tails[bucket] = Some(key);
        }
    }
}

/// 不小于 `size` 的 2 的幂对应的位数。
fn shift_for(size: usize) -> u32 {
    if size <= 1 {
        0
    } else {
        size.next_power_of_two().trailing_zeros().min(MAX_SHIFT)
    }
}

/// 严格大于 `count` 的最小 2 的幂对应的位数。
fn shift_above(count: usize) -> u32 {
    (usize::BITS - count.leading_zeros()).min(MAX_SHIFT)
}

impl<T: fmt::Debug, H, C> fmt::Debug for THash<T, H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("THash")
            .field("count", &self.nodes.len())
            .field("tabsize", &self.buckets.len())
            .finish()
    }
}
