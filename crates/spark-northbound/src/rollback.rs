//! # rollback：已提交事务的回滚日志
//!
//! ## 意图（Why）
//! - 每次持久化提交保存一份完整配置，运维可以按事务编号回退；
//! - 以 [`RollbackLog`] trait 抽象存储，引擎只依赖 save/load/list 三个动作。
//!
//! ## 契约（What）
//! - 事务编号从 1 开始自增，不复用；
//! - 保留策略由日志自身执行：只保留最近 `max_transactions` 条，超出时淘汰最旧记录；
//! - 配置以 [`DataTree::to_json`] 的结果保存，回滚时按当前模式重新解析。

use std::{
    collections::VecDeque,
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    callbacks::Client,
    config::DEFAULT_MAX_TRANSACTIONS,
    error::{NbError, NbResult},
    transaction::{TransactionId, truncate_comment},
    tree::DataTree,
};

/// 回滚日志中的一条记录。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub id: TransactionId,
    pub client: Client,
    /// 自 UNIX 纪元起的秒数。
    pub timestamp: u64,
    pub comment: String,
    pub configuration: String,
}

/// 回滚日志存储。
pub trait RollbackLog: Send + Sync {
    /// 保存一次提交，返回分配的事务编号。
    fn save(&self, client: Client, comment: &str, config: &DataTree) -> NbResult<TransactionId>;

    /// 读取指定事务；不存在或已被淘汰时返回 `NotFound`。
    fn load(&self, id: TransactionId) -> NbResult<RollbackRecord>;

    /// 由新到旧列出全部保留的记录。
    fn list(&self) -> Vec<RollbackRecord>;

    fn set_max_transactions(&self, max: usize);
}

#[derive(Debug)]
struct Inner {
    records: VecDeque<RollbackRecord>,
    next_id: u32,
    max_transactions: usize,
}

/// 进程内回滚日志。
#[derive(Debug)]
pub struct MemoryRollbackLog {
    inner: Mutex<Inner>,
}

impl MemoryRollbackLog {
    pub fn new(max_transactions: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::new(),
                next_id: 1,
                max_transactions,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRollbackLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRANSACTIONS)
    }
}

fn evict(inner: &mut Inner) {
    while inner.records.len() > inner.max_transactions {
        inner.records.pop_front();
    }
}

impl RollbackLog for MemoryRollbackLog {
    fn save(&self, client: Client, comment: &str, config: &DataTree) -> NbResult<TransactionId> {
        let configuration = config.to_json()?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        let mut inner = self.inner.lock();
        let id = TransactionId(inner.next_id);
        inner.next_id = inner
            .next_id
            .checked_add(1)
            .ok_or_else(|| NbError::resource("rollback transaction ids exhausted"))?;
        inner.records.push_back(RollbackRecord {
            id,
            client,
            timestamp,
            comment: truncate_comment(comment),
            configuration,
        });
        evict(&mut inner);
        Ok(id)
    }

    fn load(&self, id: TransactionId) -> NbResult<RollbackRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or_else(|| NbError::not_found(format!("transaction {id}")))
    }

    fn list(&self) -> Vec<RollbackRecord> {
        self.inner.lock().records.iter().rev().cloned().collect()
    }

    fn set_max_transactions(&self, max: usize) {
        let mut inner = self.inner.lock();
        inner.max_transactions = max;
        evict(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{LeafSpec, LeafType, Schema};

    fn tree(name: &str) -> DataTree {
        let schema = Schema::builder()
            .container("/t:top")
            .leaf("/t:top/name", LeafSpec::new(LeafType::String))
            .build()
            .expect("合法模式");
        let mut tree = DataTree::new(Arc::new(schema));
        tree.edit("/t:top/name", Some(name)).expect("编辑成功");
        tree
    }

    #[test]
    fn ids_increase_and_old_records_are_evicted() {
        let log = MemoryRollbackLog::new(2);
        let first = log.save(Client::Cli, "one", &tree("a")).expect("保存成功");
        let second = log.save(Client::Grpc, "two", &tree("b")).expect("保存成功");
        let third = log.save(Client::Cli, "three", &tree("c")).expect("保存成功");
        assert_eq!((first, second, third), (TransactionId(1), TransactionId(2), TransactionId(3)));

        assert!(matches!(log.load(first), Err(NbError::NotFound { .. })));
        let ids: Vec<TransactionId> = log.list().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second]);

        log.set_max_transactions(1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn stored_configuration_round_trips() {
        let log = MemoryRollbackLog::default();
        let original = tree("r1");
        let id = log.save(Client::Sysrepo, &"x".repeat(200), &original).expect("保存成功");
        let record = log.load(id).expect("记录存在");
        assert_eq!(record.comment.len(), 80);
        let restored =
            DataTree::from_json(Arc::clone(original.schema()), &record.configuration).expect("解析成功");
        assert_eq!(restored, original);
    }
}
