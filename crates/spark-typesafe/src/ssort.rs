//! 单线程有序单链表，键唯一。

use std::{cmp::Ordering, fmt};

use crate::{Added, ItemId, arena::Arena};

struct Node<T> {
    value: T,
    next: Option<usize>,
}

/// 按比较器 `F` 升序维护的单链表。
///
/// - **契约 (What)**：`add/find/del` 为 O(n)，`pop/first` 为 O(1)；比较相等视为同一键；
/// - **风险 (Trade-offs)**：适合条目不多、需要稳定遍历顺序的场景，大规模数据请改用 [`SkipList`](crate::SkipList)。
pub struct SSort<T, F> {
    nodes: Arena<Node<T>>,
    first: Option<usize>,
    cmp: F,
}

impl<T, F> SSort<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(cmp: F) -> Self {
        Self {
            nodes: Arena::new(),
            first: None,
            cmp,
        }
    }

    pub fn add(&mut self, value: T) -> Added<T> {
        let mut prev: Option<usize> = None;
        let mut cursor = self.first;
        while let Some(key) = cursor {
            match (self.cmp)(&self.nodes[key].value, &value) {
                Ordering::Less => {
                    prev = Some(key);
                    cursor = self.nodes[key].next;
                }
                Ordering::Equal => {
                    return Added::Existing {
                        id: self.nodes.id(key),
                        rejected: value,
                    };
                }
                Ordering::Greater => break,
            }
        }

        let key = self.nodes.insert(Node {
            value,
            next: cursor,
        });
        match prev {
            Some(prev) => self.nodes[prev].next = Some(key),
            None => self.first = Some(key),
        }
        Added::New(self.nodes.id(key))
    }

    pub fn find(&self, target: &T) -> Option<ItemId> {
        self.find_gteq(target)
            .filter(|id| (self.cmp)(&self.nodes[id.key].value, target) == Ordering::Equal)
    }

    /// 第一个不小于 `target` 的条目。
    pub fn find_gteq(&self, target: &T) -> Option<ItemId> {
        self.iter()
            .find(|&(_, value)| (self.cmp)(value, target) != Ordering::Less)
            .map(|(id, _)| id)
    }

    /// 最后一个小于 `target` 的条目。
    pub fn find_lt(&self, target: &T) -> Option<ItemId> {
        self.iter()
            .take_while(|&(_, value)| (self.cmp)(value, target) == Ordering::Less)
            .last()
            .map(|(id, _)| id)
    }

    pub fn del(&mut self, id: ItemId) -> Option<T> {
        let target = self.nodes.resolve(id)?;

        let mut prev: Option<usize> = None;
        let mut cursor = self.first;
        while let Some(key) = cursor {
            if key == target {
                let node = self.nodes.remove(target);
                match prev {
                    Some(prev) => self.nodes[prev].next = node.next,
                    None => self.first = node.next,
                }
                return Some(node.value);
            }
            prev = Some(key);
            cursor = self.nodes[key].next;
        }
        None
    }

    pub fn pop(&mut self) -> Option<T> {
        let key = self.first?;
        let node = self.nodes.remove(key);
        self.first = node.next;
        Some(node.value)
    }

    pub fn first(&self) -> Option<ItemId> {
        self.first.map(|key| self.nodes.id(key))
    }

    pub fn next(&self, id: ItemId) -> Option<ItemId> {
        self.nodes.lookup(id)?.next.map(|key| self.nodes.id(key))
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
        let mut cursor = self.first;
        std::iter::from_fn(move || {
            let key = cursor?;
            let node = &self.nodes[key];
            cursor = node.next;
            Some((self.nodes.id(key), &node.value))
        })
    }

    /// 按升序逐个取出全部条目。
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.pop())
    }
}

impl<T: fmt::Debug, F> fmt::Debug for SSort<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cursor = self.first;
        while let Some(key) = cursor {
            list.entry(&self.nodes[key].value);
            cursor = self.nodes[key].next;
        }
        list.finish()
    }
}
