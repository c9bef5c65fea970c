//! # spark-northbound
//!
//! ## 定位与职责（Why）
//! - 作为路由守护进程套件的北向配置引擎，负责把运行配置安全地迁移到新的期望状态：
//!   校验 → 准备 → 应用 | 中止，多阶段事务保证守护进程要么完整接受变更，要么保持原状；
//! - 配置以带模式校验的数据树表示，通过路径表达式寻址，差异按优先级派发给各守护进程注册的回调。
//!
//! ## 架构嵌入（Where）
//! - `schema` 与 `tree` 提供模式事实与数据树原语；
//! - `registry` 把模式节点映射到回调与优先级，`changeset` 把结构差异翻译为回调操作；
//! - `engine` 与 `transaction` 实现事务状态机，`candidate` 为远程前端维护候选会话；
//! - `rollback` 保存已提交配置，`oper` 展开状态数据。
//!
//! ## 并发模型（Trade-offs）
//! - 每个引擎同一时刻只允许一个事务，互斥以原子标志加 RAII 守卫实现，不排队；
//! - 运行配置由 `arc-swap` 发布，读者从不阻塞提交者；
//! - 回调在提交线程上同步执行，没有取消与超时。

/// 守护进程实现的回调契约。
///
/// - **契约定位 (What)**：[`NbCallbacks`] 以能力位图声明实现了哪些操作，注册表据此校验；
/// - **风险提示 (Trade-offs)**：声明与实现不一致会在事务运行期暴露为 `Generic` 错误。
pub mod callbacks;

/// 候选会话管理。
pub mod candidate;

/// 回调操作集合的构建。
pub mod changeset;

/// 引擎运行参数。
pub mod config;

/// 事务引擎入口。
pub mod engine;

/// 错误类型与稳定错误码。
///
/// - **意图说明 (Why)**：统一描述事务、候选会话与注册表的失败；
/// - **契约定位 (What)**：使用 `thiserror::Error` 派生，每个变体对应一个 `northbound.*` 错误码。
pub mod error;

mod oper;

/// 节点注册表。
pub mod registry;

/// 回滚日志。
pub mod rollback;

/// 运行配置快照。
pub mod running;

/// 模式提供者契约与参考实现。
pub mod schema;

/// 事务状态机。
pub mod transaction;

/// 数据树、路径与结构差异。
pub mod tree;

pub use callbacks::{
    CallbackArgs, Capabilities, Client, Event, ListEntry, NbCallbacks, Operation, Resource, YangData,
};
pub use candidate::{CandidateId, CandidateManager, CommitPhase, LoadType};
pub use changeset::{Change, ChangeKey, ChangeSet};
pub use config::NorthboundConfig;
pub use engine::{Northbound, NotificationHook};
pub use error::{NbError, NbResult};
pub use registry::{CallbackBinding, NodeDescriptor, NodeRegistry, ValidationReport};
pub use rollback::{MemoryRollbackLog, RollbackLog, RollbackRecord};
pub use running::ConfigSnapshot;
pub use schema::{ConfigClass, LeafSpec, LeafType, NodeKind, Schema, SchemaBuilder, SchemaNode, SchemaProvider};
pub use transaction::{Transaction, TransactionId, TransactionState};
pub use tree::{DataNode, DataPath, DataTree, Delta, PathSegment};
