//! # AtomSort：无锁有序侵入式链表
//!
//! 与 [`AtomList`](crate::AtomList) 共用删除锁标记技术，插入时按三路比较器找到位置后 CAS 挂接。
//! 比较结果相等的条目不会重复插入，`add` 返回已存在的那一个。

use std::{cmp::Ordering as CmpOrdering, fmt, marker::PhantomData};

use crate::{
    atomptr::{self, AtomLinked, LOCK},
    sync::{AtomicUsize, Ordering},
};

/// 无锁有序链表，`F` 为三路比较器。
pub struct AtomSort<'a, T: AtomLinked, F> {
    id: usize,
    first: AtomicUsize,
    count: AtomicUsize,
    cmp: F,
    _items: PhantomData<&'a T>,
}

impl<'a, T, F> AtomSort<'a, T, F>
where
    T: AtomLinked,
    F: Fn(&T, &T) -> CmpOrdering,
{
    pub fn new(cmp: F) -> Self {
        Self {
            id: atomptr::next_list_id(),
            first: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            cmp,
            _items: PhantomData,
        }
    }

    /// 按序插入；存在比较相等的条目时不插入并返回它。
    ///
    /// # 教案式说明
    /// - **执行 (How)**：从链首走到第一个"大于 item"的位置，若前驱槽位已被锁定
    ///   （前驱正在删除）则整体重试，否则把 `item.next` 指向旧后继并 CAS 挂接；
    /// - **风险 (Trade-offs)**：比较相等的条目即使正在删除也会被返回，调用方需自行重试。
    ///
    /// # Panics
    /// 条目已绑定到另一条原子链表时 panic。
    pub fn add(&self, item: &'a T) -> Option<&'a T> {
        let link = item.atom_link();
        link.claim(self.id);
        let value = atomptr::addr_of(item);

        loop {
            let mut prev: &AtomicUsize = &self.first;
            let mut prevval;

            loop {
                prevval = prev.load(Ordering::Acquire);
                // SAFETY: 槽位中的地址均来自绑定到本链表的 `&'a T`。
                let Some(prev_item) = (unsafe { atomptr::deref::<'a, T>(prevval) }) else {
                    break;
                };
                match (self.cmp)(prev_item, item) {
                    CmpOrdering::Greater => break,
                    CmpOrdering::Equal => return Some(prev_item),
                    CmpOrdering::Less => prev = &prev_item.atom_link().next,
                }
            }

            if atomptr::is_locked(prevval) {
                continue;
            }

            link.next.store(prevval, Ordering::Relaxed);
            if prev
                .compare_exchange(prevval, value, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        self.count.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// 查找与 `target` 比较相等的条目。
    pub fn find(&self, target: &T) -> Option<&'a T> {
        self.iter()
            .take_while(|item| (self.cmp)(*item, target) != CmpOrdering::Greater)
            .find(|item| (self.cmp)(*item, target) == CmpOrdering::Equal)
    }

    /// 删除指定条目，调用方需对它拥有排他删除权。
    pub fn del(&self, item: &'a T) {
        let link = item.atom_link();
        debug_assert!(link.is_owned_by(self.id), "item belongs to another list");

        let next = link.next.fetch_or(LOCK, Ordering::Acquire);
        debug_assert!(!atomptr::is_locked(next), "concurrent delete of the same item");

        self.count.fetch_sub(1, Ordering::Relaxed);
        atomptr::del_core(&self.first, item, next);
    }

    /// 弹出最小的未被删除条目。
    pub fn pop(&self) -> Option<&'a T> {
        // SAFETY: `first` 是本链表的链首。
        let (item, next) = unsafe { atomptr::pop_core::<'a, T>(&self.first) }?;
        self.count.fetch_sub(1, Ordering::Relaxed);
        atomptr::del_core(&self.first, item, next);
        Some(item)
    }

    pub fn first(&self) -> Option<&'a T> {
        // SAFETY: 同 `pop`。
        unsafe { atomptr::deref::<'a, T>(self.first.load(Ordering::Acquire)) }
    }

    pub fn next(&self, item: &'a T) -> Option<&'a T> {
        let value = item.atom_link().next.load(Ordering::Acquire);
        // SAFETY: 同 `pop`。
        unsafe { atomptr::deref::<'a, T>(value) }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        let mut cursor = self.first();
        std::iter::from_fn(move || {
            let current = cursor?;
            cursor = self.next(current);
            Some(current)
        })
    }
}

impl<T: AtomLinked, F> fmt::Debug for AtomSort<'_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomSort")
            .field("id", &self.id)
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::atomptr::AtomLink;

    struct Route {
        link: AtomLink,
        metric: u32,
    }

    impl AtomLinked for Route {
        fn atom_link(&self) -> &AtomLink {
            &self.link
        }
    }

    fn route(metric: u32) -> Route {
        Route {
            link: AtomLink::new(),
            metric,
        }
    }

    #[test]
    fn keeps_items_sorted_and_rejects_duplicates() {
        let routes = [route(30), route(10), route(20), route(10)];
        let list = AtomSort::new(|a: &Route, b: &Route| a.metric.cmp(&b.metric));

        assert!(list.add(&routes[0]).is_none());
        assert!(list.add(&routes[1]).is_none());
        assert!(list.add(&routes[2]).is_none());
        let existing = list.add(&routes[3]).expect("重复条目应返回已存在者");
        assert!(std::ptr::eq(existing, &routes[1]));

        let metrics: Vec<u32> = list.iter().map(|r| r.metric).collect();
        assert_eq!(metrics, vec![10, 20, 30]);
        assert_eq!(list.count(), 3);
        assert!(list.find(&route(20)).is_some());
        assert!(list.find(&route(25)).is_none());
    }

    #[test]
    fn concurrent_adds_stay_sorted() {
        let routes: Vec<Route> = (0..256).map(route).collect();
        let list = AtomSort::new(|a: &Route, b: &Route| a.metric.cmp(&b.metric));

        std::thread::scope(|scope| {
            for chunk in routes.chunks(64) {
                let list = &list;
                scope.spawn(move || {
                    for r in chunk.iter().rev() {
                        list.add(r);
                    }
                });
            }
        });

        let metrics: Vec<u32> = list.iter().map(|r| r.metric).collect();
        assert_eq!(metrics, (0..256).collect::<Vec<_>>());

        assert_eq!(list.pop().map(|r| r.metric), Some(0));
        list.del(&routes[100]);
        assert_eq!(list.count(), 254);
        assert!(list.find(&route(100)).is_none());
    }
}
