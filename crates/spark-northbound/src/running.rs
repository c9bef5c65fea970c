//! 运行配置快照与事务互斥标志。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use arc_swap::ArcSwap;

use crate::{
    error::{NbError, NbResult},
    tree::DataTree,
};

/// 某一版本的已提交配置。
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    pub tree: DataTree,
    pub version: u64,
}

/// 运行配置：读者无锁加载，提交线程原子替换。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `load` 返回当前快照的 `Arc`，之后的替换不会影响已取得的快照；
///   - `replace` 只在持有 [`TransactionLock`] 时由引擎调用，版本号单调递增；
/// - **风险 (Trade-offs)**：旧快照在最后一个读者释放后才会回收。
#[derive(Debug)]
pub struct RunningConfig {
    current: ArcSwap<ConfigSnapshot>,
    busy: AtomicBool,
}

impl RunningConfig {
    pub fn new(tree: DataTree) -> Self {
        Self {
            current: ArcSwap::from_pointee(ConfigSnapshot { tree, version: 0 }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// 以新树替换运行配置并返回新版本号。
    pub(crate) fn replace(&self, tree: DataTree) -> u64 {
        let version = self.current.load().version + 1;
        self.current.store(Arc::new(ConfigSnapshot { tree, version }));
        version
    }

    /// 尝试声明事务进行中；已被占用时返回 `Locked`，不排队。
    pub fn try_lock(self: &Arc<Self>) -> NbResult<TransactionLock> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NbError::Locked)?;
        Ok(TransactionLock {
            owner: Arc::clone(self),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// 事务互斥的 RAII 守卫，析构即释放。
#[derive(Debug)]
pub struct TransactionLock {
    owner: Arc<RunningConfig>,
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        self.owner.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LeafSpec, LeafType, Schema};

    fn running() -> Arc<RunningConfig> {
        let schema = Schema::builder()
            .container("/t:top")
            .leaf("/t:top/name", LeafSpec::new(LeafType::String))
            .build()
            .expect("合法模式");
        Arc::new(RunningConfig::new(DataTree::new(Arc::new(schema))))
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let running = running();
        let guard = running.try_lock().expect("首次加锁成功");
        assert!(running.is_locked());
        assert_eq!(running.try_lock().expect_err("重复加锁失败"), NbError::Locked);
        drop(guard);
        assert!(!running.is_locked());
        running.try_lock().expect("释放后可再次加锁");
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let running = running();
        let before = running.load();
        let mut tree = before.tree.clone();
        tree.edit("/t:top/name", Some("r1")).expect("编辑成功");
        assert_eq!(running.replace(tree), 1);

        assert_eq!(before.version, 0);
        assert!(before.tree.get_value("/t:top/name").is_none());
        assert_eq!(running.load().tree.get_value("/t:top/name"), Some("r1"));
    }
}
