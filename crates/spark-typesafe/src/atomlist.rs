//! # AtomList：无锁无序侵入式链表
//!
//! ## 意图（Why）
//! - 为多线程共享的工作队列、待处理事件等场景提供无需互斥锁的头插、尾插与弹出；
//! - 条目以 `&'a T` 借入，链表不拥有条目，已删除条目在 `'a` 内始终有效，
//!   并发读者即使停留在刚被摘除的条目上也不会悬垂。
//!
//! ## 契约（What）
//! - `add_head`：返回即完成，立即对其他线程可见；
//! - `add_tail`：返回不等于完成，只有当更早发起的尾插全部完成后它才挂到链尾；
//! - `del`：调用方必须对该条目拥有排他的删除权（例如刚 `first()` 得到且无人竞争删除）；
//! - `pop`：多个线程并发弹出时，每个条目至多被一个线程拿到。
//!
//! ## 风险（Trade-offs）
//! - lock-free 而非 wait-free；
//! - `first/next` 遍历可能看到正在删除的条目，`count` 只是近似值。

use std::{fmt, marker::PhantomData};

use crate::{
    atomptr::{self, AtomLinked, LOCK},
    sync::{AtomicUsize, Ordering},
};

/// 无锁无序链表。
pub struct AtomList<'a, T: AtomLinked> {
    id: usize,
    first: AtomicUsize,
    last: AtomicUsize,
    count: AtomicUsize,
    _items: PhantomData<&'a T>,
}

impl<'a, T: AtomLinked> AtomList<'a, T> {
    /// 创建空链表。
    pub fn new() -> Self {
        Self {
            id: atomptr::next_list_id(),
            first: AtomicUsize::new(0),
            last: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            _items: PhantomData,
        }
    }

    /// 头插条目。
    ///
    /// # Panics
    /// 条目已绑定到另一条原子链表时 panic。
    pub fn add_head(&self, item: &'a T) {
        let link = item.atom_link();
        link.claim(self.id);
        let value = atomptr::addr_of(item);

        self.count.fetch_add(1, Ordering::Relaxed);

        let mut expected = 0;
        link.next.store(0, Ordering::Relaxed);
        while let Err(actual) =
            self.first
                .compare_exchange_weak(expected, value, Ordering::Release, Ordering::Relaxed)
        {
            link.next.store(actual, Ordering::Relaxed);
            expected = actual;
        }
    }

    /// 尾插条目。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：`last` 只是提示，用一次 `swap` 把自己登记为新的链尾提示，
    ///   再从旧提示出发向后走到真正的链尾，以 CAS 挂接；
    /// - **执行 (How)**：若链尾条目正被删除（后继带锁标记），丢弃提示从链首重走；
    ///   CAS 失败时以新观察到的后继作为提示继续；
    /// - **风险 (Trade-offs)**：多个尾插并发时，后登记者需要等待先登记者挂接后才能走到它之后。
    ///
    /// # Panics
    /// 条目已绑定到另一条原子链表时 panic。
    pub fn add_tail(&self, item: &'a T) {
        let link = item.atom_link();
        link.claim(self.id);
        let value = atomptr::addr_of(item);

        link.next.store(0, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut hint = self.last.swap(value, Ordering::AcqRel);

        loop {
            // SAFETY: `last` 中的地址都来自绑定到本链表的 `&'a T`。
            let mut prev: &AtomicUsize = match unsafe { atomptr::deref::<'a, T>(hint) } {
                Some(hint_item) => &hint_item.atom_link().next,
                None => &self.first,
            };

            let mut prevval;
            loop {
                prevval = prev.load(Ordering::Acquire);
                // SAFETY: 同上。
                match unsafe { atomptr::deref::<'a, T>(prevval) } {
                    Some(prev_item) => prev = &prev_item.atom_link().next,
                    None => break,
                }
            }

            if atomptr::is_locked(prevval) {
                hint = 0;
                continue;
            }

            match prev.compare_exchange(prevval, value, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => hint = actual,
            }
        }
    }

    /// 删除指定条目。
    ///
    /// 调用方需保证条目当前在本链表中，且没有其他线程同时删除它。
    pub fn del(&self, item: &'a T) {
        let link = item.atom_link();
        debug_assert!(link.is_owned_by(self.id), "item belongs to another list");

        let next = link.next.fetch_or(LOCK, Ordering::Acquire);
        debug_assert!(!atomptr::is_locked(next), "concurrent delete of the same item");

        self.del_core(item, next);
    }

    /// 弹出链首第一个未被删除的条目。
    pub fn pop(&self) -> Option<&'a T> {
        // SAFETY: `first` 是本链表的链首，链上地址均来自绑定到本链表的 `&'a T`。
        let (item, next) = unsafe { atomptr::pop_core::<'a, T>(&self.first) }?;
        self.del_core(item, next);
        Some(item)
    }

    fn del_core(&self, item: &'a T, next: usize) {
        let _ = self.last.compare_exchange(
            atomptr::addr_of(item),
            0,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        self.count.fetch_sub(1, Ordering::Relaxed);
        atomptr::del_core(&self.first, item, next);
    }

    /// 链首条目，可能是正在删除中的条目。
    pub fn first(&self) -> Option<&'a T> {
        // SAFETY: 同 `pop`。
        unsafe { atomptr::deref::<'a, T>(self.first.load(Ordering::Acquire)) }
    }

    /// `item` 的后继条目。
    pub fn next(&self, item: &'a T) -> Option<&'a T> {
        let value = item.atom_link().next.load(Ordering::Acquire);
        // SAFETY: 同 `pop`。
        unsafe { atomptr::deref::<'a, T>(value) }
    }

    /// 近似条目数。
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.first.load(Ordering::Acquire) == 0
    }

    /// 从链首开始的只读遍历。
    pub fn iter(&self) -> AtomIter<'_, 'a, T> {
        AtomIter {
            list: self,
            cursor: self.first(),
        }
    }
}

impl<T: AtomLinked> Default for AtomList<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AtomLinked> fmt::Debug for AtomList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomList")
            .field("id", &self.id)
            .field("count", &self.count())
            .finish()
    }
}

/// [`AtomList::iter`] 返回的迭代器。
pub struct AtomIter<'l, 'a, T: AtomLinked> {
    list: &'l AtomList<'a, T>,
    cursor: Option<&'a T>,
}

impl<'a, T: AtomLinked> Iterator for AtomIter<'_, 'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = self.list.next(current);
        Some(current)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::atomptr::AtomLink;

    struct Job {
        link: AtomLink,
        id: u32,
    }

    impl Job {
        fn new(id: u32) -> Self {
            Self {
                link: AtomLink::new(),
                id,
            }
        }
    }

    impl AtomLinked for Job {
        fn atom_link(&self) -> &AtomLink {
            &self.link
        }
    }

    fn ids(list: &AtomList<'_, Job>) -> Vec<u32> {
        list.iter().map(|job| job.id).collect()
    }

    #[test]
    fn head_and_tail_insertions_keep_order() {
        let jobs: Vec<Job> = (0..4).map(Job::new).collect();
        let list = AtomList::new();
        list.add_tail(&jobs[1]);
        list.add_head(&jobs[0]);
        list.add_tail(&jobs[2]);
        list.add_tail(&jobs[3]);

        assert_eq!(ids(&list), vec![0, 1, 2, 3]);
        assert_eq!(list.count(), 4);
    }

    #[test]
    fn delete_in_the_middle_relinks_neighbours() {
        let jobs: Vec<Job> = (0..3).map(Job::new).collect();
        let list = AtomList::new();
        for job in &jobs {
            list.add_tail(job);
        }

        list.del(&jobs[1]);
        assert_eq!(ids(&list), vec![0, 2]);

        list.del(&jobs[2]);
        list.add_tail(&jobs[1]);
        assert_eq!(ids(&list), vec![0, 1], "删除链尾后尾插需要从链首重新定位");
    }

    #[test]
    fn pop_drains_in_list_order() {
        let jobs: Vec<Job> = (0..3).map(Job::new).collect();
        let list = AtomList::new();
        for job in jobs.iter().rev() {
            list.add_head(job);
        }

        let popped: Vec<u32> = std::iter::from_fn(|| list.pop()).map(|job| job.id).collect();
        assert_eq!(popped, vec![0, 1, 2]);
        assert!(list.is_empty());
        assert_eq!(list.count(), 0);
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn item_cannot_join_a_second_list() {
        let job = Job::new(7);
        let first = AtomList::new();
        let second = AtomList::new();
        first.add_head(&job);
        second.add_head(&job);
    }
}
