//! 引擎运行参数：从 TOML 片段加载，缺省字段取默认值。

use serde::{Deserialize, Serialize};

use crate::error::{NbError, NbResult};

/// 节点描述符的默认优先级，数值越小越先执行。
pub const DEFAULT_PRIORITY: u32 = u32::MAX / 2;

/// 回滚日志默认保留的事务数。
pub const DEFAULT_MAX_TRANSACTIONS: usize = 20;

/// 事务注释的最大字符数，超出部分截断。
pub const COMMENT_MAX_LEN: usize = 80;

/// 北向引擎配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把调试开关与回滚保留策略从代码常量提升为部署参数；
/// - **契约 (What)**：
///   - `debug` 打开后，每次回调派发都会输出一条 `debug` 级别的结构化日志；
///   - `max_transactions` 交给回滚日志执行保留策略；
///   - `default_priority` 经 `NodeRegistry::from_config` 写入未显式绑定优先级的描述符；
/// - **风险 (Trade-offs)**：配置在引擎创建时读取一次，运行期修改需重建引擎。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NorthboundConfig {
    pub debug: bool,
    pub max_transactions: usize,
    pub default_priority: u32,
}

impl Default for NorthboundConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

impl NorthboundConfig {
    /// 解析 TOML 文本，例如：
    ///
    /// ```toml
    /// debug = true
    /// max_transactions = 50
    /// ```
    pub fn from_toml_str(raw: &str) -> NbResult<Self> {
        toml::from_str(raw).map_err(|err| NbError::generic(format!("invalid northbound config: {err}")))
    }
}
