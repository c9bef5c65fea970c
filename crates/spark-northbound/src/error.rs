//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为北向配置引擎对外暴露的错误语义提供集中定义，前端（CLI、gRPC、NETCONF 代理）据此映射各自的状态码；
//! - 区分"可恢复并向调用方报告"（校验、准备阶段）与"只记录日志"（应用、中止阶段）两个层级，
//!   后者从不以 `NbError` 的形式离开引擎。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`；
//! - 每个变体对应一个稳定错误码（[`NbError::code`]），供日志与前端映射使用。

use thiserror::Error;

/// 北向引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合事务生命周期、候选会话与注册表校验中的失败，
///   让调用方用一次 `match` 决定重试、回滚还是上报；
/// - **契约 (What)**：
///   - 变体均为 `Send + Sync + 'static`，可跨线程传播；
///   - `NoChanges` 不是故障，表示候选与运行配置一致，前端通常将其视为成功；
///   - `Locked` 表示已有事务在途，引擎不排队，由调用方决定是否稍后重试；
/// - **设计权衡 (Trade-offs)**：上下文以 `String` 保存，牺牲少量分配换取可读性。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum NbError {
    /// 无法归入其他类别的失败，例如回调返回的通用错误。
    #[error("northbound operation failed: {0}")]
    Generic(String),

    /// 候选配置与运行配置没有差异。
    #[error("no configuration changes to commit")]
    NoChanges,

    /// 路径在配置树或注册表中不存在。
    ///
    /// - **契约 (What)**：`path` 为请求访问的数据路径或模式路径；
    /// - **风险 (Trade-offs)**：删除类编辑可以选择忽略该错误（"尽力删除"语义）。
    #[error("`{path}` not found")]
    NotFound { path: String },

    /// 已有事务处于非空闲状态。
    #[error("another configuration transaction is in progress")]
    Locked,

    /// 模式校验或 Validate 阶段回调拒绝了候选配置。
    #[error("validation failed: {0}")]
    Validation(String),

    /// 资源耗尽：准备阶段分配失败，或候选会话标识用尽。
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// 内部状态不一致，例如注册表校验失败或重复的模式路径。
    #[error("internal inconsistency: {0}")]
    Inconsistency(String),
}

impl NbError {
    pub fn generic(detail: impl Into<String>) -> Self {
        NbError::Generic(detail.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        NbError::NotFound { path: path.into() }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        NbError::Validation(detail.into())
    }

    pub fn resource(detail: impl Into<String>) -> Self {
        NbError::ResourceExhausted(detail.into())
    }

    pub fn inconsistency(detail: impl Into<String>) -> Self {
        NbError::Inconsistency(detail.into())
    }

    /// 稳定错误码。
    ///
    /// - **契约 (What)**：返回值在版本间保持不变，可用于告警规则与前端状态码映射；
    /// - **执行 (How)**：按变体直接映射为 `northbound.*` 命名空间下的静态字符串。
    pub fn code(&self) -> &'static str {
        match self {
            NbError::Generic(_) => "northbound.generic",
            NbError::NoChanges => "northbound.no_changes",
            NbError::NotFound { .. } => "northbound.not_found",
            NbError::Locked => "northbound.locked",
            NbError::Validation(_) => "northbound.validation",
            NbError::ResourceExhausted(_) => "northbound.resource",
            NbError::Inconsistency(_) => "northbound.inconsistency",
        }
    }

    /// 是否为"调用方可以修正后重试"的错误。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NbError::NoChanges | NbError::Locked | NbError::Validation(_) | NbError::NotFound { .. }
        )
    }
}

/// 引擎内部的统一结果别名。
pub type NbResult<T> = Result<T, NbError>;
