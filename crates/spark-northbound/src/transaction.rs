//! # transaction：单个配置事务的状态机
//!
//! ## 意图（Why）
//! - 事务对象独占引擎的互斥守卫，持有候选树、变更集与各项资源槽；
//!   以所有权表达生命周期：`commit_abort`/`commit_apply` 消费事务，未完成即丢弃时自动中止。
//!
//! ## 契约（What）
//! - 状态：`Idle → Validating → Preparing → {Applying | Aborting} → Idle`；
//! - Prepare 按 `(优先级, 路径)` 升序执行，首个失败即停止，之前的变更标记 `prepare_ok`；
//! - Abort 只发给 `prepare_ok` 的变更，Abort/Apply 的错误只记录日志；
//! - Apply 完成全部逐项回调后，再对受影响的 `(描述符, 实例)` 各调用一次 `apply_finish`。

use std::{cmp::Ordering, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use spark_typesafe::SSort;
use tracing::{debug, error, warn};

use crate::{
    callbacks::{CallbackArgs, Client, Event, Operation, Resource},
    changeset::{ChangeKey, ChangeSet},
    config::COMMENT_MAX_LEN,
    error::{NbError, NbResult},
    registry::{NodeDescriptor, NodeRegistry},
    running::{ConfigSnapshot, TransactionLock},
    tree::{DataNode, DataPath, DataTree},
};

/// 回滚日志中的事务编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 事务所处阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Idle,
    Validating,
    Preparing,
    Applying,
    Aborting,
}

/// 截断到 [`COMMENT_MAX_LEN`] 个字符。
pub(crate) fn truncate_comment(comment: &str) -> String {
    comment.chars().take(COMMENT_MAX_LEN).collect()
}

/// 调用单个配置类回调。
pub(crate) fn dispatch(
    event: Event,
    operation: Operation,
    descriptor: &NodeDescriptor,
    node: &DataNode,
    tree: &DataTree,
    resource: &mut Option<Resource>,
    trace: bool,
) -> NbResult<()> {
    if trace {
        debug!(
            event = event.name(),
            operation = operation.name(),
            path = node.path(),
            value = node.value().unwrap_or("(null)"),
            "northbound callback"
        );
    }

    let Some(callbacks) = descriptor.callbacks() else {
        return Err(NbError::generic(format!(
            "no callbacks registered for `{}`",
            descriptor.path()
        )));
    };
    let mut args = CallbackArgs {
        event,
        node,
        tree,
        resource,
    };
    let result = match operation {
        Operation::Create => callbacks.create(&mut args),
        Operation::Modify => callbacks.modify(&mut args),
        Operation::Delete => callbacks.delete(&mut args),
        Operation::Move => callbacks.moved(&mut args),
        other => Err(NbError::generic(format!("`{other}` is not a configuration callback"))),
    };
    if let Err(err) = &result {
        warn!(
            event = event.name(),
            operation = operation.name(),
            path = node.path(),
            error = %err,
            "error processing callback"
        );
    }
    result
}

/// 进行中的配置事务。
///
/// # 教案式说明
/// - **意图 (Why)**：把"引擎正忙"与"这次提交的全部上下文"绑定到同一个值上；
/// - **契约 (What)**：
///   - 由 [`Northbound::commit_prepare`](crate::Northbound::commit_prepare) 创建，此时已完成 Prepare；
///   - 同一时刻每个引擎至多存在一个事务；
///   - 丢弃未完成的事务会执行 Abort 并释放互斥守卫；
/// - **风险 (Trade-offs)**：回调同步执行，长时间阻塞的回调会拖住整条提交路径。
pub struct Transaction {
    client: Client,
    comment: String,
    config: DataTree,
    previous: Arc<ConfigSnapshot>,
    changes: ChangeSet,
    registry: Arc<NodeRegistry>,
    state: TransactionState,
    trace: bool,
    lock: Option<TransactionLock>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        lock: TransactionLock,
        client: Client,
        comment: &str,
        config: DataTree,
        previous: Arc<ConfigSnapshot>,
        changes: ChangeSet,
        registry: Arc<NodeRegistry>,
        trace: bool,
    ) -> Self {
        Self {
            client,
            comment: truncate_comment(comment),
            config,
            previous,
            changes,
            registry,
            state: TransactionState::Validating,
            trace,
            lock: Some(lock),
        }
    }

    pub fn client(&self) -> Client {
        self.client
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// 事务将要生效的候选配置。
    pub fn config(&self) -> &DataTree {
        &self.config
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 事务开始时的运行配置版本。
    pub fn base_version(&self) -> u64 {
        self.previous.version
    }

    /// 执行 Prepare；失败时已准备的变更保留 `prepare_ok`，由调用方决定中止。
    pub(crate) fn prepare(&mut self) -> NbResult<()> {
        self.state = TransactionState::Preparing;
        let previous = &self.previous.tree;
        let config = &self.config;
        for change in self.changes.iter_mut() {
            let tree = if change.operation == Operation::Delete { previous } else { config };
            dispatch(
                Event::Prepare,
                change.operation,
                &change.descriptor,
                &change.node,
                tree,
                &mut change.resource,
                self.trace,
            )?;
            change.prepare_ok = true;
        }
        Ok(())
    }

    /// 执行 Abort 并释放互斥守卫。
    pub(crate) fn abort(&mut self) {
        if self.lock.is_none() {
            return;
        }
        self.state = TransactionState::Aborting;
        let previous = &self.previous.tree;
        let config = &self.config;
        for change in self.changes.iter_mut().filter(|change| change.prepare_ok) {
            let tree = if change.operation == Operation::Delete { previous } else { config };
            if let Err(err) = dispatch(
                Event::Abort,
                change.operation,
                &change.descriptor,
                &change.node,
                tree,
                &mut change.resource,
                self.trace,
            ) {
                error!(path = change.node.path(), error = %err, "abort callback failed");
            }
            change.resource = None;
        }
        self.finish();
    }

    /// 执行 Apply 与 apply_finish；错误只记录日志。
    pub(crate) fn apply(&mut self) {
        self.state = TransactionState::Applying;
        let previous = &self.previous.tree;
        let config = &self.config;
        for change in self.changes.iter_mut() {
            let tree = if change.operation == Operation::Delete { previous } else { config };
            if let Err(err) = dispatch(
                Event::Apply,
                change.operation,
                &change.descriptor,
                &change.node,
                tree,
                &mut change.resource,
                self.trace,
            ) {
                error!(path = change.node.path(), error = %err, "apply callback failed");
            }
        }
        self.apply_finish();
    }

    /// 收集受影响实例及其祖先上的 `apply_finish`，去重后按 `(优先级, 路径)` 调用。
    fn apply_finish(&self) {
        type Pending = (ChangeKey, Arc<NodeDescriptor>, Arc<DataNode>);
        let mut pending = SSort::new(|a: &Pending, b: &Pending| -> Ordering { a.0.cmp(&b.0) });

        for change in self.changes.iter() {
            let Ok(mut cursor) = DataPath::parse(change.path()).map(Some) else {
                continue;
            };
            if change.operation == Operation::Delete {
                cursor = cursor.and_then(|path| path.parent());
                while let Some(path) = &cursor {
                    if self.config.exists(&path.to_string()) {
                        break;
                    }
                    cursor = path.parent();
                }
            }

            while let Some(path) = cursor {
                if let Some(node) = self.config.find(&path.to_string()) {
                    if let Ok(descriptor) = self.registry.find(node.schema_path()) {
                        if descriptor.implements(Operation::ApplyFinish) {
                            let key = ChangeKey {
                                priority: descriptor.priority(),
                                path: node.path().to_owned(),
                            };
                            pending.add((key, descriptor, Arc::clone(node)));
                        }
                    }
                }
                cursor = path.parent();
            }
        }

        for (key, descriptor, node) in pending.drain() {
            if self.trace {
                debug!(path = %key.path, "northbound apply_finish");
            }
            if let Some(callbacks) = descriptor.callbacks() {
                callbacks.apply_finish(&node, &self.config);
            }
        }
    }

    /// 释放互斥守卫，事务回到空闲状态。
    pub(crate) fn finish(&mut self) {
        self.state = TransactionState::Idle;
        self.lock = None;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.lock.is_some() {
            warn!(client = self.client.name(), "unfinished transaction dropped, aborting");
            self.abort();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("client", &self.client)
            .field("comment", &self.comment)
            .field("state", &self.state)
            .field("changes", &self.changes.len())
            .finish()
    }
}
