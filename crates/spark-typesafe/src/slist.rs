//! 单线程无序单链表。

use crate::{ItemId, arena::Arena};

#[derive(Debug)]
struct Node<T> {
    value: T,
    next: Option<usize>,
}

/// 单线程单链表，支持头插、尾插与指定位置之后插入。
///
/// # 教案式说明
/// - **意图 (Why)**：保留侵入式链表 O(1) 头尾插入的特性，同时由容器拥有条目；
/// - **契约 (What)**：`del` 需要线性查找前驱，复杂度 O(n)；`pop` 为 O(1)；
/// - **风险 (Trade-offs)**：删除后旧句柄失效，槽位被复用时也不会命中新条目。
#[derive(Debug)]
pub struct SList<T> {
    nodes: Arena<Node<T>>,
    first: Option<usize>,
    last: Option<usize>,
}

impl<T> SList<T> {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            first: None,
            last: None,
        }
    }

    pub fn add_head(&mut self, value: T) -> ItemId {
        let key = self.nodes.insert(Node {
            value,
            next: self.first,
        });
        if self.first.is_none() {
            self.last = Some(key);
        }
        self.first = Some(key);
        self.nodes.id(key)
    }

    pub fn add_tail(&mut self, value: T) -> ItemId {
        let key = self.nodes.insert(Node { value, next: None });
        match self.last {
            Some(last) => self.nodes[last].next = Some(key),
            None => self.first = Some(key),
        }
        self.last = Some(key);
        self.nodes.id(key)
    }

    /// 在 `after` 之后插入；`after` 为 `None` 时等价于头插。
    ///
    /// 句柄失效时返回 `Err`，把值交还给调用方。
    pub fn add_after(&mut self, after: Option<ItemId>, value: T) -> Result<ItemId, T> {
        let Some(after) = after else {
            return Ok(self.add_head(value));
        };
        let Some(prev) = self.nodes.resolve(after) else {
            return Err(value);
        };
        let next = self.nodes[prev].next;
        let key = self.nodes.insert(Node { value, next });
        self.nodes[prev].next = Some(key);
        if self.last == Some(prev) {
            self.last = Some(key);
        }
        Ok(self.nodes.id(key))
    }

    /// 删除条目并返回其值，句柄不在链表中时返回 `None`。
    pub fn del(&mut self, id: ItemId) -> Option<T> {
        let target = self.nodes.resolve(id)?;

        let mut prev: Option<usize> = None;
        let mut cursor = self.first;
        while let Some(key) = cursor {
            if key == target {
                break;
            }
            prev = Some(key);
            cursor = self.nodes[key].next;
        }
        cursor?;

        let node = self.nodes.remove(target);
        match prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.first = node.next,
        }
        if self.last == Some(target) {
            self.last = prev;
        }
        Some(node.value)
    }

    pub fn pop(&mut self) -> Option<T> {
        let key = self.first?;
        let node = self.nodes.remove(key);
        self.first = node.next;
        if self.first.is_none() {
            self.last = None;
        }
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

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut T> {
        self.nodes.lookup_mut(id).map(|node| &mut node.value)
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
}

impl<T> Default for SList<T> {
    fn default() -> Self {
        Self::new()
    }
}
