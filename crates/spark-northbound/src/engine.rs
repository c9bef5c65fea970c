//! # engine：北向事务引擎
//!
//! ## 意图（Why）
//! - 以显式的 [`Northbound`] 对象承载运行配置、注册表与回滚日志，取代进程级全局状态；
//!   同一进程可以为不同模式各建一个引擎，测试之间互不干扰。
//!
//! ## 契约（What）
//! - `validate` 不加锁，只读运行配置；
//! - `commit_prepare` 成功返回持锁的 [`Transaction`]，调用方必须二选一：
//!   `commit_apply` 或 `commit_abort`（丢弃事务等价于后者）；
//! - 失败分级：Validate/Prepare 的错误返回给调用方，Apply/Abort 的错误只记录日志。
//!
//! ## 风险（Trade-offs）
//! - 互斥不排队，第二个提交者立即得到 `Locked`，重试策略由前端决定。

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::{
    callbacks::{Client, Event, ListEntry, Operation, YangData},
    changeset::ChangeSet,
    config::NorthboundConfig,
    error::{NbError, NbResult},
    oper,
    registry::NodeRegistry,
    rollback::RollbackLog,
    running::{ConfigSnapshot, RunningConfig},
    schema::SchemaProvider,
    transaction::{Transaction, TransactionId, dispatch},
    tree::{DataNode, DataPath, DataTree, schema_path_of},
};

/// 通知订阅者：返回非零值表示处理失败，结果会被累加。
pub type NotificationHook = Box<dyn Fn(&str, &[YangData]) -> i32 + Send + Sync>;

/// 北向配置引擎。
///
/// # 教案式说明
/// - **意图 (Why)**：前端（CLI、gRPC、NETCONF 代理）共享同一个引擎实例，
///   由它串行化配置提交并维护运行配置；
/// - **契约 (What)**：
///   - 构造时校验注册表，存在缺失回调或优先级倒置即拒绝启动；
///   - 运行配置读取无锁，返回的快照在后续提交后仍然有效；
///   - 同一时刻至多一个事务处于非空闲状态；
/// - **风险 (Trade-offs)**：回调在提交线程上同步执行，不支持取消与超时。
pub struct Northbound {
    schema: Arc<dyn SchemaProvider>,
    registry: Arc<NodeRegistry>,
    running: Arc<RunningConfig>,
    rollback: Option<Arc<dyn RollbackLog>>,
    hooks: RwLock<Vec<NotificationHook>>,
    config: NorthboundConfig,
}

impl Northbound {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        registry: NodeRegistry,
        config: NorthboundConfig,
    ) -> NbResult<Self> {
        registry.ensure_valid()?;
        let running = Arc::new(RunningConfig::new(DataTree::new(Arc::clone(&schema))));
        info!(nodes = registry.len(), "northbound engine initialized");
        Ok(Self {
            schema,
            registry: Arc::new(registry),
            running,
            rollback: None,
            hooks: RwLock::new(Vec::new()),
            config,
        })
    }

    /// 挂接回滚日志，并把保留策略同步给它。
    pub fn with_rollback_log(mut self, log: Arc<dyn RollbackLog>) -> Self {
        log.set_max_transactions(self.config.max_transactions);
        self.rollback = Some(log);
        self
    }

    pub fn schema(&self) -> &Arc<dyn SchemaProvider> {
        &self.schema
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &NorthboundConfig {
        &self.config
    }

    pub fn rollback_log(&self) -> Option<&Arc<dyn RollbackLog>> {
        self.rollback.as_ref()
    }

    /// 当前运行配置快照。
    pub fn running(&self) -> Arc<ConfigSnapshot> {
        self.running.load()
    }

    /// 在运行配置中查找节点。
    pub fn get_running(&self, path: &str) -> Option<Arc<DataNode>> {
        self.running.load().tree.find(path).cloned()
    }

    /// 以空运行配置为基础创建新树，通常用作候选配置的起点。
    pub fn empty_config(&self) -> DataTree {
        DataTree::new(Arc::clone(&self.schema))
    }

    /// 按操作语义编辑 `config`。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - 操作必须对该节点合法，否则返回 `Validation`；
    ///   - create/modify 要求最近的列表条目或存在性容器祖先已存在；
    ///   - delete 目标不存在时返回 `NotFound`，调用方可以选择忽略；
    ///   - move 不改变配置；
    ///   - 叶子列表可以用 `value` 代替 `[.='v']` 谓词。
    pub fn edit(
        &self,
        config: &mut DataTree,
        operation: Operation,
        path: &str,
        value: Option<&str>,
    ) -> NbResult<()> {
        let schema_path = schema_path_of(path)?;
        let snode = self
            .schema
            .node(&schema_path)
            .ok_or_else(|| NbError::not_found(path))?;
        if !snode.allows(operation) {
            return Err(NbError::validation(format!(
                "{operation} operation not valid for `{path}`"
            )));
        }

        let mut target = DataPath::parse(path)?;
        if snode.is_leaf_list() && target.last().is_some_and(|seg| seg.self_value().is_none()) {
            if let (Some(value), Some(last)) = (value, target.segments_mut().last_mut()) {
                last.push_predicate(".", value)?;
            }
        }
        let target = target.to_string();

        match operation {
            Operation::Create | Operation::Modify => {
                if let Some(parent) = self.schema.real_parent(&schema_path) {
                    let depth = parent.path.matches('/').count();
                    let segments = DataPath::parse(path)?.segments()[..depth].to_vec();
                    let parent_path = DataPath::from_segments(segments).to_string();
                    if !config.exists(&parent_path) {
                        return Err(NbError::validation(format!(
                            "parent `{parent_path}` of `{path}` does not exist"
                        )));
                    }
                }
                config.edit(&target, value)
            }
            Operation::Delete => config.delete(&target),
            Operation::Move => Ok(()),
            other => Err(NbError::generic(format!("unknown edit operation `{other}`"))),
        }
    }

    /// 校验候选配置：模式约束、差异计算与 Validate 事件回调，不加锁。
    pub fn validate(&self, candidate: &DataTree) -> NbResult<()> {
        candidate.validate()?;
        let running = self.running.load();
        let changes = ChangeSet::diff(&self.registry, &running.tree, candidate)?;
        self.validate_changes(&changes, &running.tree, candidate)
    }

    fn validate_changes(&self, changes: &ChangeSet, running: &DataTree, candidate: &DataTree) -> NbResult<()> {
        for change in changes.iter() {
            let tree = if change.operation == Operation::Delete { running } else { candidate };
            let mut scratch = None;
            dispatch(
                Event::Validate,
                change.operation,
                &change.descriptor,
                &change.node,
                tree,
                &mut scratch,
                self.config.debug,
            )
            .map_err(|err| match err {
                NbError::Validation(_) => err,
                other => NbError::validation(other.to_string()),
            })?;
        }
        Ok(())
    }

    /// 校验并准备提交，成功时返回持锁事务。
    pub fn commit_prepare(&self, candidate: &DataTree, client: Client, comment: &str) -> NbResult<Transaction> {
        candidate.validate()?;
        let running = self.running.load();
        let changes = ChangeSet::diff(&self.registry, &running.tree, candidate)?;
        if changes.is_empty() {
            return Err(NbError::NoChanges);
        }
        self.validate_changes(&changes, &running.tree, candidate)?;

        let lock = self.running.try_lock()?;
        let current = self.running.load();
        let changes = if current.version == running.version {
            changes
        } else {
            debug!(
                from = running.version,
                to = current.version,
                "running configuration moved, recomputing changes"
            );
            let changes = ChangeSet::diff(&self.registry, &current.tree, candidate)?;
            if changes.is_empty() {
                return Err(NbError::NoChanges);
            }
            self.validate_changes(&changes, &current.tree, candidate)?;
            changes
        };

        let mut transaction = Transaction::new(
            lock,
            client,
            comment,
            candidate.clone(),
            current,
            changes,
            Arc::clone(&self.registry),
            self.config.debug,
        );
        if let Err(err) = transaction.prepare() {
            transaction.abort();
            return Err(err);
        }
        Ok(transaction)
    }

    /// 中止已准备的事务。
    pub fn commit_abort(&self, mut transaction: Transaction) {
        transaction.abort();
    }

    /// 应用已准备的事务并替换运行配置；`persist` 为真时写入回滚日志。
    pub fn commit_apply(&self, mut transaction: Transaction, persist: bool) -> Option<TransactionId> {
        transaction.apply();
        let version = self.running.replace(transaction.config().clone());
        debug!(version, changes = transaction.changes().len(), "running configuration replaced");

        let id = match (&self.rollback, persist) {
            (Some(log), true) => match log.save(transaction.client(), transaction.comment(), transaction.config()) {
                Ok(id) => Some(id),
                Err(err) => {
                    error!(error = %err, "failed to save transaction");
                    None
                }
            },
            _ => None,
        };
        transaction.finish();
        id
    }

    /// 一步完成 prepare 与 apply。
    pub fn commit(
        &self,
        candidate: &DataTree,
        client: Client,
        comment: &str,
        persist: bool,
    ) -> NbResult<Option<TransactionId>> {
        let transaction = self.commit_prepare(candidate, client, comment)?;
        Ok(self.commit_apply(transaction, persist))
    }

    /// 把运行配置恢复到回滚日志中的某次提交。
    pub fn rollback(&self, id: TransactionId, client: Client) -> NbResult<Option<TransactionId>> {
        let log = self
            .rollback
            .as_ref()
            .ok_or_else(|| NbError::generic("rollback log is not configured"))?;
        let record = log.load(id)?;
        let config = DataTree::from_json(Arc::clone(&self.schema), &record.configuration)?;
        self.commit(&config, client, &format!("Rollback to transaction {id}"), true)
    }

    /// 调用 RPC 或 action 节点的回调。
    pub fn rpc(&self, path: &str, input: &[YangData]) -> NbResult<Vec<YangData>> {
        let descriptor = self.registry.find(path)?;
        if !descriptor.schema().allows(Operation::Rpc) {
            return Err(NbError::validation(format!("`{path}` is not an rpc")));
        }
        let callbacks = descriptor
            .callbacks()
            .ok_or_else(|| NbError::generic(format!("no callbacks registered for `{path}`")))?;
        callbacks.rpc(path, input)
    }

    /// 展开 `path` 下的状态数据。
    pub fn oper_get(&self, path: &str) -> NbResult<Vec<YangData>> {
        let path = DataPath::parse(path)?;
        oper::get(&self.registry, self.schema.as_ref(), &path)
    }

    /// 定位状态列表条目的句柄。
    pub fn lookup_entry(&self, path: &str) -> NbResult<Option<ListEntry>> {
        let path = DataPath::parse(path)?;
        oper::lookup_entry(&self.registry, self.schema.as_ref(), &path)
    }

    pub fn subscribe_notifications(&self, hook: impl Fn(&str, &[YangData]) -> i32 + Send + Sync + 'static) {
        self.hooks.write().push(Box::new(hook));
    }

    /// 把通知发给全部订阅者，返回各订阅者结果之和。
    pub fn notification_send(&self, path: &str, arguments: &[YangData]) -> i32 {
        if self.config.debug {
            debug!(path, "northbound notification");
        }
        self.hooks
            .read()
            .iter()
            .map(|hook| hook(path, arguments))
            .fold(0i32, i32::wrapping_add)
    }

    /// 先序拼接各节点 `cli_show` 的输出；默认值叶子只在 `show_defaults` 时参与。
    pub fn show_config(&self, config: &DataTree, show_defaults: bool) -> String {
        let mut out = String::new();
        for node in config.iter() {
            if node.is_default() && !show_defaults {
                continue;
            }
            let Ok(descriptor) = self.registry.find(node.schema_path()) else {
                continue;
            };
            if let Some(text) = descriptor
                .callbacks()
                .and_then(|callbacks| callbacks.cli_show(node, show_defaults))
            {
                out.push_str(&text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl fmt::Debug for Northbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Northbound")
            .field("version", &self.running.version())
            .field("locked", &self.running.is_locked())
            .field("nodes", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}
