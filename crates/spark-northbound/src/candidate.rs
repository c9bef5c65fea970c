//! # CandidateManager：候选配置会话仓储
//!
//! ## 核心意图（Why）
//! - 远程前端（gRPC、NETCONF 代理）为每个会话维护独立的候选配置，
//!   以 `DashMap` 保存，多个前端线程可以并发创建、编辑与提交；
//! - 分阶段提交（validate/prepare/abort/apply）需要跨请求保存事务，事务挂在候选上。
//!
//! ## 行为契约（What）
//! - `create_candidate`：复制运行配置，编号单调递增且不复用，耗尽时返回 `ResourceExhausted`；
//! - `delete_candidate`：若挂有事务，先中止再删除；
//! - `edit_candidate`：在临时副本上执行全部编辑，任一失败则候选保持原样；
//! - `update_candidate`：运行配置已前进时，以最新运行配置为底合并候选内容。
//!
//! ## 风险提示（Trade-offs）
//! - 调用回调之前总是先释放 `DashMap` guard，回调中可以安全地访问本仓储；
//! - 编号不复用，长时间运行且频繁创建会话的进程最终会耗尽编号。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::{DashMap, mapref::one::Ref};
use tracing::debug;

use crate::{
    callbacks::{Client, YangData},
    engine::Northbound,
    error::{NbError, NbResult},
    transaction::{Transaction, TransactionId},
    tree::DataTree,
};

/// 候选会话编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 加载外部配置的方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadType {
    /// 整体替换候选内容。
    Replace,
    /// 合并进候选内容。
    Merge,
}

/// 分阶段提交的阶段选择。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitPhase {
    Validate,
    Prepare,
    Abort,
    Apply,
    All,
}

/// 单个候选会话。
#[derive(Debug)]
pub struct Candidate {
    config: DataTree,
    /// 候选所基于的运行配置版本。
    version: u64,
    transaction: Option<Transaction>,
}

impl Candidate {
    pub fn config(&self) -> &DataTree {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

/// `DashMap` 读锁的类型别名。
pub type CandidateRef<'a> = Ref<'a, CandidateId, Candidate>;

/// `CandidateManager` 集中管理候选会话。
///
/// # 教案式注释
/// - **意图 (Why)**：封装并发安全存储，避免前端直接操作 `DashMap` 与引擎的事务句柄；
/// - **契约 (What)**：全部方法以 [`CandidateId`] 索引，未知编号返回 `NotFound`；
/// - **风险 (Trade-offs)**：持有 [`CandidateRef`] 期间同分片写操作会被阻塞，调用方应尽快释放。
pub struct CandidateManager {
    engine: Arc<Northbound>,
    candidates: DashMap<CandidateId, Candidate>,
    /// 下一个候选编号；以 `u64` 计数，`u32::MAX` 本身仍可发放。
    next_id: AtomicU64,
}

impl CandidateManager {
    pub fn new(engine: Arc<Northbound>) -> Self {
        Self {
            engine,
            candidates: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<Northbound> {
        &self.engine
    }

    /// 复制运行配置，登记为新的候选。
    pub fn create_candidate(&self) -> NbResult<CandidateId> {
        let id = u32::try_from(self.next_id.fetch_add(1, Ordering::AcqRel))
            .map(CandidateId)
            .map_err(|_| NbError::resource("candidate identifiers exhausted"))?;
        let running = self.engine.running();
        self.candidates.insert(
            id,
            Candidate {
                config: running.tree.clone(),
                version: running.version,
                transaction: None,
            },
        );
        debug!(candidate = %id, version = running.version, "candidate created");
        Ok(id)
    }

    /// 删除候选；挂有事务时先中止。
    pub fn delete_candidate(&self, id: CandidateId) -> NbResult<()> {
        let (_, candidate) = self
            .candidates
            .remove(&id)
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))?;
        if let Some(transaction) = candidate.transaction {
            self.engine.commit_abort(transaction);
        }
        Ok(())
    }

    pub fn get(&self, id: CandidateId) -> Option<CandidateRef<'_>> {
        self.candidates.get(&id)
    }

    /// 候选配置的副本。
    pub fn get_candidate(&self, id: CandidateId) -> NbResult<DataTree> {
        self.candidates
            .get(&id)
            .map(|candidate| candidate.config.clone())
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))
    }

    /// 原子地执行一批更新与删除；删除不存在的节点不算错误。
    pub fn edit_candidate(&self, id: CandidateId, updates: &[YangData], deletions: &[String]) -> NbResult<()> {
        let mut candidate = self
            .candidates
            .get_mut(&id)
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))?;
        let mut scratch = candidate.config.clone();
        for update in updates {
            scratch.edit(&update.path, update.value.as_deref())?;
        }
        for path in deletions {
            match scratch.delete(path) {
                Ok(()) | Err(NbError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        candidate.config = scratch;
        Ok(())
    }

    /// 以最新运行配置为底重建候选；挂有事务时拒绝。
    pub fn update_candidate(&self, id: CandidateId) -> NbResult<()> {
        let mut candidate = self
            .candidates
            .get_mut(&id)
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))?;
        if candidate.transaction.is_some() {
            return Err(NbError::Locked);
        }
        let running = self.engine.running();
        if candidate.version == running.version {
            return Ok(());
        }
        let mut updated = running.tree.clone();
        updated.merge(&candidate.config);
        candidate.config = updated;
        candidate.version = running.version;
        Ok(())
    }

    pub fn load_to_candidate(&self, id: CandidateId, config: &DataTree, load: LoadType) -> NbResult<()> {
        let mut candidate = self
            .candidates
            .get_mut(&id)
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))?;
        match load {
            LoadType::Replace => candidate.config = config.clone(),
            LoadType::Merge => candidate.config.merge(config),
        }
        Ok(())
    }

    /// 按阶段提交候选。
    ///
    /// - Prepare 成功后事务挂在候选上，直到 Abort 或 Apply；
    /// - Abort/Apply 时候选上没有事务返回 `Generic`；
    /// - Apply 与 All 会写入回滚日志，返回其事务编号。
    pub fn commit_candidate(
        &self,
        id: CandidateId,
        phase: CommitPhase,
        client: Client,
        comment: &str,
    ) -> NbResult<Option<TransactionId>> {
        match phase {
            CommitPhase::Validate => {
                let config = self.get_candidate(id)?;
                self.engine.validate(&config)?;
                Ok(None)
            }
            CommitPhase::Prepare => {
                let config = self.get_candidate(id)?;
                let transaction = self.engine.commit_prepare(&config, client, comment)?;
                match self.candidates.get_mut(&id) {
                    Some(mut candidate) => {
                        candidate.transaction = Some(transaction);
                        Ok(None)
                    }
                    None => {
                        self.engine.commit_abort(transaction);
                        Err(NbError::not_found(format!("candidate {id}")))
                    }
                }
            }
            CommitPhase::Abort => {
                let transaction = self.take_transaction(id)?;
                self.engine.commit_abort(transaction);
                Ok(None)
            }
            CommitPhase::Apply => {
                let transaction = self.take_transaction(id)?;
                let applied = self.engine.commit_apply(transaction, true);
                self.mark_current(id);
                Ok(applied)
            }
            CommitPhase::All => {
                let config = self.get_candidate(id)?;
                let applied = self.engine.commit(&config, client, comment, true)?;
                self.mark_current(id);
                Ok(applied)
            }
        }
    }

    fn take_transaction(&self, id: CandidateId) -> NbResult<Transaction> {
        let mut candidate = self
            .candidates
            .get_mut(&id)
            .ok_or_else(|| NbError::not_found(format!("candidate {id}")))?;
        candidate
            .transaction
            .take()
            .ok_or_else(|| NbError::generic("no transaction in progress"))
    }

    fn mark_current(&self, id: CandidateId) {
        if let Some(mut candidate) = self.candidates.get_mut(&id) {
            candidate.version = self.engine.running().version;
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl fmt::Debug for CandidateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateManager")
            .field("candidates", &self.candidates.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NorthboundConfig,
        registry::NodeRegistry,
        schema::{Schema, SchemaProvider},
    };

    fn manager() -> CandidateManager {
        let schema: Arc<dyn SchemaProvider> = Arc::new(Schema::builder().container("/t:top").build().expect("合法模式"));
        let registry = NodeRegistry::build(schema.as_ref(), &["t"]).expect("构建成功");
        let engine = Northbound::new(schema, registry, NorthboundConfig::default()).expect("引擎创建成功");
        CandidateManager::new(Arc::new(engine))
    }

    #[test]
    fn identifiers_are_never_reused() {
        let manager = manager();
        let first = manager.create_candidate().expect("创建成功");
        manager.delete_candidate(first).expect("删除成功");
        let second = manager.create_candidate().expect("创建成功");
        assert!(second > first);
        assert!(matches!(manager.delete_candidate(first), Err(NbError::NotFound { .. })));
    }

    #[test]
    fn exhausted_identifiers_report_resource_error() {
        let manager = manager();
        manager.next_id.store(u64::from(u32::MAX), Ordering::Relaxed);
        let last = manager.create_candidate().expect("最后一个编号仍可发放");
        assert_eq!(last, CandidateId(u32::MAX));
        let err = manager.create_candidate().expect_err("编号耗尽");
        assert!(matches!(err, NbError::ResourceExhausted(_)));
        assert_eq!(manager.len(), 1, "耗尽时不登记候选");
    }

    #[test]
    fn abort_without_transaction_is_generic_error() {
        let manager = manager();
        let id = manager.create_candidate().expect("创建成功");
        let err = manager
            .commit_candidate(id, CommitPhase::Abort, Client::Grpc, "")
            .expect_err("没有事务");
        assert_eq!(err, NbError::generic("no transaction in progress"));
    }
}
