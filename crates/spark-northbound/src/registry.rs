//! # registry：模式节点到回调的旁路索引
//!
//! ## 意图（Why）
//! - 模式对象本身保持只读，节点描述符以模式路径为键存放在独立的有序表中；
//! - 启动期一次性构建并校验，之后只读共享，事务路径上不再加锁。
//!
//! ## 契约（What）
//! - [`NodeRegistry::build`] 按给定模块顺序遍历模式，为每个节点创建默认优先级的描述符；
//! - [`NodeRegistry::load_callbacks`] 绑定回调与优先级，未知路径记录告警后跳过；
//! - [`NodeRegistry::validate`] 报告缺失回调、多余回调与优先级倒置；
//!   前两者之外的多余回调只告警，不计入错误数。

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::{error, warn};

use crate::{
    callbacks::{NbCallbacks, Operation},
    config::{DEFAULT_PRIORITY, NorthboundConfig},
    error::{NbError, NbResult},
    schema::{SchemaNode, SchemaProvider},
    tree::schema_path_of,
};

/// 单个模式节点的描述符。
#[derive(Clone)]
pub struct NodeDescriptor {
    schema: SchemaNode,
    parent: Option<String>,
    parent_list: Option<String>,
    priority: u32,
    callbacks: Option<Arc<dyn NbCallbacks>>,
}

impl NodeDescriptor {
    pub fn path(&self) -> &str {
        &self.schema.path
    }

    pub fn module(&self) -> &str {
        &self.schema.module
    }

    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// 最近的列表或存在性容器祖先的模式路径。
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn parent_list(&self) -> Option<&str> {
        self.parent_list.as_deref()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn callbacks(&self) -> Option<&Arc<dyn NbCallbacks>> {
        self.callbacks.as_ref()
    }

    /// 已绑定的回调声明支持 `operation`。
    pub fn implements(&self, operation: Operation) -> bool {
        self.callbacks
            .as_ref()
            .is_some_and(|callbacks| callbacks.capabilities().supports(operation))
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("path", &self.schema.path)
            .field("parent", &self.parent)
            .field("parent_list", &self.parent_list)
            .field("priority", &self.priority)
            .field("callbacks", &self.callbacks.as_ref().map(|cb| cb.capabilities()))
            .finish()
    }
}

/// 守护进程启动时提交的回调绑定。
#[derive(Clone)]
pub struct CallbackBinding {
    pub path: String,
    pub priority: Option<u32>,
    pub callbacks: Arc<dyn NbCallbacks>,
}

impl CallbackBinding {
    pub fn new(path: impl Into<String>, callbacks: Arc<dyn NbCallbacks>) -> Self {
        Self {
            path: path.into(),
            priority: None,
            callbacks,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// 注册表校验结果。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// 模式允许但未实现的必需回调。
    pub missing: Vec<(String, Operation)>,
    /// 已实现但模式不允许的回调，仅告警。
    pub unneeded: Vec<(String, Operation)>,
    /// 优先级数值小于父节点的节点。
    pub priority_inversions: Vec<String>,
}

impl ValidationReport {
    /// 存在错误的节点数；同一节点的多项错误只计一次。
    pub fn error_count(&self) -> usize {
        let mut paths: Vec<&str> = self
            .missing
            .iter()
            .map(|(path, _)| path.as_str())
            .chain(self.priority_inversions.iter().map(String::as_str))
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths.len()
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }
}

/// 节点注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：把"节点 → 回调/优先级/祖先"的映射集中到一处，供变更集构建与状态查询共享；
/// - **契约 (What)**：
///   - 描述符以 `Arc` 发放，从不复制其身份；
///   - `find` 接受模式路径或带谓词的数据路径；
/// - **风险 (Trade-offs)**：构建后再调用 `load_callbacks` 会对已发放的描述符写时复制，
///   只应在启动阶段、引擎创建之前使用。
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Arc<NodeDescriptor>>,
    order: Vec<String>,
}

impl NodeRegistry {
    pub fn build(schema: &dyn SchemaProvider, modules: &[&str]) -> NbResult<Self> {
        Self::build_with_priority(schema, modules, DEFAULT_PRIORITY)
    }

    /// 按部署配置构建注册表，未显式绑定优先级的节点取 `config.default_priority`。
    pub fn from_config(
        schema: &dyn SchemaProvider,
        modules: &[&str],
        config: &NorthboundConfig,
    ) -> NbResult<Self> {
        Self::build_with_priority(schema, modules, config.default_priority)
    }

    /// 以指定默认优先级构建注册表。
    pub fn build_with_priority(
        schema: &dyn SchemaProvider,
        modules: &[&str],
        default_priority: u32,
    ) -> NbResult<Self> {
        let mut registry = Self::default();
        for module in modules {
            let nodes = schema
                .module_nodes(module)
                .ok_or_else(|| NbError::not_found(*module))?;
            for snode in nodes {
                if registry.nodes.contains_key(&snode.path) {
                    return Err(NbError::inconsistency(format!(
                        "schema node `{}` registered twice",
                        snode.path
                    )));
                }
                let descriptor = NodeDescriptor {
                    schema: snode.clone(),
                    parent: schema.real_parent(&snode.path).map(|p| p.path.clone()),
                    parent_list: schema.parent_list(&snode.path).map(|p| p.path.clone()),
                    priority: default_priority,
                    callbacks: None,
                };
                registry.order.push(snode.path.clone());
                registry.nodes.insert(snode.path.clone(), Arc::new(descriptor));
            }
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按模式路径或数据路径查找描述符。
    pub fn find(&self, path: &str) -> NbResult<Arc<NodeDescriptor>> {
        let lookup = if path.contains('[') {
            schema_path_of(path)?
        } else {
            path.to_owned()
        };
        self.nodes
            .get(&lookup)
            .cloned()
            .ok_or_else(|| NbError::not_found(path))
    }

    /// 按模式遍历顺序迭代全部描述符。
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeDescriptor>> + '_ {
        self.order.iter().filter_map(|path| self.nodes.get(path))
    }

    pub fn load_callbacks(&mut self, bindings: impl IntoIterator<Item = CallbackBinding>) {
        for binding in bindings {
            let Some(slot) = self.nodes.get_mut(&binding.path) else {
                warn!(path = %binding.path, "unknown data path, callbacks ignored");
                continue;
            };
            let descriptor = Arc::make_mut(slot);
            descriptor.callbacks = Some(binding.callbacks);
            if let Some(priority) = binding.priority {
                descriptor.priority = priority;
            }
        }
    }

    /// 检查回调完整性与优先级顺序，并为每项发现输出日志。
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for descriptor in self.iter() {
            let path = descriptor.path();
            for operation in Operation::ALL {
                let valid = descriptor.schema.allows(operation);
                let implemented = descriptor.implements(operation);
                if !valid && implemented {
                    error!(path, callback = operation.name(), "unneeded callback");
                    report.unneeded.push((path.to_owned(), operation));
                }
                if valid && !implemented && !operation.is_optional() {
                    error!(path, callback = operation.name(), "missing callback");
                    report.missing.push((path.to_owned(), operation));
                }
            }

            let Some(parent) = descriptor.parent().and_then(|p| self.nodes.get(p)) else {
                continue;
            };
            if descriptor.priority < parent.priority {
                error!(
                    path,
                    priority = descriptor.priority,
                    parent_priority = parent.priority,
                    "node has higher priority than its parent"
                );
                report.priority_inversions.push(path.to_owned());
            }
        }
        report
    }

    /// [`validate`](Self::validate) 的快速失败版本。
    pub fn ensure_valid(&self) -> NbResult<()> {
        let report = self.validate();
        match report.error_count() {
            0 => Ok(()),
            count => Err(NbError::inconsistency(format!(
                "failed to validate northbound callbacks: {count} error(s)"
            ))),
        }
    }
}
