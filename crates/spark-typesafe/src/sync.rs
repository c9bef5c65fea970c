//! 原子原语的统一入口：常规构建使用 `std`，`cfg(loom)` 下切换为 Loom 的可穷举实现。

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};
