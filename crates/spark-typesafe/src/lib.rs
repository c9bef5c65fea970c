//! # spark-typesafe
//!
//! ## 定位与职责（Why）
//! - 为北向配置引擎及其宿主守护进程提供一组类型安全的容器：
//!   无锁的 [`AtomList`] / [`AtomSort`]，以及单线程的 [`SList`]、[`SSort`]、[`THash`]、[`SkipList`]；
//! - 无锁族以 `&'a T` 借入侵入式条目，链表本身从不分配；单线程族拥有条目，
//!   通过 [`ItemId`] 句柄在 `slab` 竞技场中定位，避免裸指针。
//!
//! ## 契约（What）
//! - 单线程容器的 `add` 在比较结果相等时不插入，返回 [`Added::Existing`] 并把被拒绝的值交还调用方；
//! - `ItemId` 携带插入时的代号，条目删除后旧句柄在 `get`/`del`/`next` 中一律落空，即使槽位已被新条目复用。
//!
//! ## 风险（Trade-offs）
//! - 无锁链表是 lock-free 而非 wait-free；
//! - `cfg(loom)` 构建会把原子原语替换为 Loom 实现，仅用于模型检查。

mod arena;
mod atomlist;
mod atomptr;
mod atomsort;
mod hash;
mod skiplist;
mod slist;
mod ssort;
mod sync;

pub use atomlist::{AtomIter, AtomList};
pub use atomptr::{AtomLink, AtomLinked};
pub use atomsort::AtomSort;
pub use hash::THash;
pub use skiplist::SkipList;
pub use slist::SList;
pub use ssort::SSort;

/// 单线程容器内条目的句柄：竞技场下标加插入代号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId {
    pub(crate) key: usize,
    pub(crate) generation: u64,
}

/// 有序/哈希容器 `add` 的结果。
#[derive(Debug, PartialEq, Eq)]
pub enum Added<T> {
    /// 新条目已插入。
    New(ItemId),
    /// 已存在比较相等的条目，`rejected` 为未插入的值。
    Existing { id: ItemId, rejected: T },
}

impl<T> Added<T> {
    /// 容器中承载该键的条目句柄，无论是否新插入。
    pub fn id(&self) -> ItemId {
        match self {
            Added::New(id) | Added::Existing { id, .. } => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Added::New(_))
    }
}
