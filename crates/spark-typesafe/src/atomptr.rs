//! # atomptr：带删除锁标记的原子指针
//!
//! ## 意图（Why）
//! - `AtomList` 与 `AtomSort` 共用同一套"指针 + 低位删除标记"技术：后继指针的最低位一旦置位，
//!   表示该条目正在被删除，任何线程都不得再向这个槽位写入新的后继；
//! - 把打标、解引用与删除核心集中在此处，两类链表只负责各自的插入策略。
//!
//! ## 契约（What）
//! - 槽位中保存的是条目本身的地址（`*const T as usize`）。`T` 内嵌 [`AtomLink`]，
//!   对齐至少为 `usize` 的对齐，因此最低位恒为 0，可安全借用为 [`LOCK`] 标记；
//! - 条目通过 [`AtomLink::claim`] 永久绑定到首次插入的链表实例，禁止跨链表复用，
//!   从而保证槽位里出现的地址全部来自同一生命周期 `'a` 的借用。
//!
//! ## 风险（Trade-offs）
//! - 算法是 lock-free 而非 wait-free：竞争激烈时单个线程可能多次重试；
//! - 已删除条目仍可能被并发读者短暂观察到，调用方需容忍这一点。

use std::sync::atomic::AtomicUsize as IdCounter;

use crate::sync::{AtomicUsize, Ordering};

/// 删除锁标记位。
pub(crate) const LOCK: usize = 1;

static NEXT_LIST_ID: IdCounter = IdCounter::new(1);

/// 为新链表实例分配进程内唯一的标识，永不复用。
pub(crate) fn next_list_id() -> usize {
    NEXT_LIST_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

#[inline]
pub(crate) fn is_locked(value: usize) -> bool {
    value & LOCK != 0
}

#[inline]
pub(crate) fn untag(value: usize) -> usize {
    value & !LOCK
}

#[inline]
pub(crate) fn addr_of<T>(item: &T) -> usize {
    item as *const T as usize
}

/// 内嵌在条目中的链接字段。
///
/// # 教案式说明
/// - **意图 (Why)**：侵入式链表不为条目额外分配节点，链接信息随条目一起存放；
/// - **契约 (What)**：一个 `AtomLink` 同一时刻只能挂在一条链表上；首次插入后即与该链表绑定；
/// - **风险 (Trade-offs)**：绑定不可解除，条目从链表删除后只能重新插回同一条链表。
#[derive(Debug)]
pub struct AtomLink {
    pub(crate) next: AtomicUsize,
    owner: AtomicUsize,
}

impl AtomLink {
    /// 创建未挂接任何链表的链接字段。
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
            owner: AtomicUsize::new(0),
        }
    }

    /// 将链接绑定到 `list_id`；已绑定到其他链表时 panic。
    pub(crate) fn claim(&self, list_id: usize) {
        match self
            .owner
            .compare_exchange(0, list_id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(current) => assert!(
                current == list_id,
                "item is already bound to another atomic list"
            ),
        }
    }

    pub(crate) fn is_owned_by(&self, list_id: usize) -> bool {
        self.owner.load(Ordering::Acquire) == list_id
    }
}

impl Default for AtomLink {
    fn default() -> Self {
        Self::new()
    }
}

/// 可挂入原子链表的条目。
///
/// 实现者返回内嵌在 `self` 中的 [`AtomLink`]；同一个条目每次调用必须返回同一个字段。
pub trait AtomLinked {
    fn atom_link(&self) -> &AtomLink;
}

/// 将槽位中的地址还原为条目引用。
///
/// # Safety
/// `value` 去掉标记后要么为 0，要么是某个 `&'a T` 的地址。链表只会把经过
/// [`AtomLink::claim`] 绑定到自身的 `&'a T` 写入槽位，因此在 `'a` 内解引用有效。
#[inline]
pub(crate) unsafe fn deref<'a, T>(value: usize) -> Option<&'a T> {
    let ptr = untag(value) as *const T;
    // SAFETY: 见函数文档；非空地址均来源于存活期为 'a 的共享借用。
    unsafe { ptr.as_ref() }
}

/// 删除核心：把 `item`（其后继已被锁定为 `next`）从以 `first` 开头的链中摘除。
///
/// # 教案式说明
/// - **意图 (Why)**：在遍历中记录最后一个"未被锁定"的槽位 `upd`，以它为 CAS 目标，
///   一次性摘掉从 `upd` 开始的整段已锁定条目，顺带完成其他线程尚未收尾的删除；
/// - **执行 (How)**：
///   1. 自 `first` 逐个读取槽位，未锁定的槽位刷新 `upd/updval`；
///   2. 未再遇到 `item`：说明别的线程已经替我们完成删除，直接返回；
///   3. 否则以 `updval → next` 执行 CAS，失败说明期间有插入或删除，从头重试。
pub(crate) fn del_core<'a, T: AtomLinked>(first: &'a AtomicUsize, item: &'a T, next: usize) {
    let target = addr_of(item);

    loop {
        let mut prev: &'a AtomicUsize = first;
        let mut upd: Option<&'a AtomicUsize> = None;
        let mut updval = LOCK;
        let mut found = false;

        loop {
            let prevval = prev.load(Ordering::Acquire);
            if !is_locked(prevval) {
                updval = prevval;
                upd = Some(prev);
            }
            if untag(prevval) == target {
                found = true;
                break;
            }
            // SAFETY: 槽位中的地址都来自本链表绑定过的 `&'a T`。
            match unsafe { deref::<T>(prevval) } {
                Some(prev_item) => prev = &prev_item.atom_link().next,
                None => break,
            }
        }

        if !found {
            return;
        }

        let Some(slot) = upd else {
            continue;
        };
        if is_locked(updval) {
            continue;
        }
        if slot
            .compare_exchange(updval, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
    }
}

/// 锁定链首的第一个未被锁定的条目，返回它与锁定前的后继值。
///
/// # Safety
/// `first` 必须是某条 `'a` 链表的链首槽位，链上所有地址都来自绑定到该链表的 `&'a T`。
pub(crate) unsafe fn pop_core<'a, T: AtomLinked + 'a>(
    first: &AtomicUsize,
) -> Option<(&'a T, usize)> {
    let mut current = first.load(Ordering::Acquire);

    loop {
        // SAFETY: 由调用方保证，见函数文档。
        let item = unsafe { deref::<'a, T>(current) }?;
        let next = item
            .atom_link()
            .next
            .fetch_or(LOCK, Ordering::Acquire);
        if !is_locked(next) {
            return Some((item, next));
        }
        // 已被其他线程锁定，继续尝试下一个条目。
        current = next;
    }
}
