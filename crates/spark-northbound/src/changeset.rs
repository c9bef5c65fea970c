//! # changeset：从结构差异到回调操作
//!
//! ## 契约（What）
//! - 新建叶子/叶子列表条目：可 create 则 create，否则可 modify 则 modify，否则丢弃（列表键）；
//! - 新建容器/列表条目：可 create 时为其生成 create，随后无论如何都遍历其后代，
//!   为每个非默认叶子生成 create/modify，并递归进入嵌套容器与列表；
//! - 删除：生成 delete，节点取自旧树；不可删除的非存在性容器改为下探其子节点；
//! - 变化：生成 modify，节点取自新树；
//! - 用户排序条目的移动不产生回调。
//!
//! 变更按 `(优先级, 数据路径)` 升序存放，构建过程不修改任何输入树。

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::warn;

use crate::{
    callbacks::{Operation, Resource},
    error::NbResult,
    registry::{NodeDescriptor, NodeRegistry},
    schema::NodeKind,
    tree::{DataNode, DataTree, Delta},
};

/// 变更集排序键。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeKey {
    pub priority: u32,
    pub path: String,
}

/// 针对单个数据节点的一次回调操作。
pub struct Change {
    pub operation: Operation,
    pub descriptor: Arc<NodeDescriptor>,
    /// 删除取自旧树，其余取自新树。
    pub node: Arc<DataNode>,
    pub resource: Option<Resource>,
    /// Prepare 阶段已成功，Abort 只发给这些变更。
    pub prepare_ok: bool,
}

impl Change {
    pub fn path(&self) -> &str {
        self.node.path()
    }
}

impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Change")
            .field("operation", &self.operation)
            .field("path", &self.node.path())
            .field("priority", &self.descriptor.priority())
            .field("prepare_ok", &self.prepare_ok)
            .finish()
    }
}

/// 按 `(优先级, 路径)` 有序的变更集合。
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: BTreeMap<ChangeKey, Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算把 `old` 变为 `new` 所需的全部回调操作。
    pub fn diff(registry: &NodeRegistry, old: &DataTree, new: &DataTree) -> NbResult<Self> {
        let mut set = Self::new();
        for delta in old.diff(new) {
            match delta {
                Delta::Created(node) => set.add_created(registry, &node)?,
                Delta::Deleted(node) => set.add_deleted(registry, &node)?,
                Delta::Changed { new, .. } => {
                    let descriptor = registry.find(new.schema_path())?;
                    if descriptor.schema().allows(Operation::Modify) {
                        set.insert(Operation::Modify, descriptor, new);
                    }
                }
                Delta::Moved(_) => {}
            }
        }
        Ok(set)
    }

    /// 追加一项变更；同一 `(优先级, 路径)` 已存在时保留先到者。
    pub fn add(&mut self, registry: &NodeRegistry, operation: Operation, node: &Arc<DataNode>) -> NbResult<()> {
        let descriptor = registry.find(node.schema_path())?;
        self.insert(operation, descriptor, Arc::clone(node));
        Ok(())
    }

    fn insert(&mut self, operation: Operation, descriptor: Arc<NodeDescriptor>, node: Arc<DataNode>) {
        let key = ChangeKey {
            priority: descriptor.priority(),
            path: node.path().to_owned(),
        };
        if self.changes.contains_key(&key) {
            warn!(path = %key.path, operation = operation.name(), "duplicate change ignored");
            return;
        }
        self.changes.insert(
            key,
            Change {
                operation,
                descriptor,
                node,
                resource: None,
                prepare_ok: false,
            },
        );
    }

    fn add_created(&mut self, registry: &NodeRegistry, node: &Arc<DataNode>) -> NbResult<()> {
        let descriptor = registry.find(node.schema_path())?;
        let schema = descriptor.schema().clone();
        match &schema.kind {
            NodeKind::Leaf(_) | NodeKind::LeafList { .. } => {
                if node.is_default() {
                    return Ok(());
                }
                if schema.allows(Operation::Create) {
                    self.insert(Operation::Create, descriptor, Arc::clone(node));
                } else if schema.allows(Operation::Modify) {
                    self.insert(Operation::Modify, descriptor, Arc::clone(node));
                }
            }
            NodeKind::Container { .. } | NodeKind::List { .. } => {
                if schema.allows(Operation::Create) {
                    self.insert(Operation::Create, descriptor, Arc::clone(node));
                }
                for child in node.children() {
                    self.add_created(registry, child)?;
                }
            }
            NodeKind::Rpc | NodeKind::Action => {}
        }
        Ok(())
    }

    fn add_deleted(&mut self, registry: &NodeRegistry, node: &Arc<DataNode>) -> NbResult<()> {
        let descriptor = registry.find(node.schema_path())?;
        if descriptor.schema().allows(Operation::Delete) {
            self.insert(Operation::Delete, descriptor, Arc::clone(node));
            return Ok(());
        }
        if matches!(descriptor.schema().kind, NodeKind::Container { presence: false }) {
            for child in node.children() {
                self.add_deleted(registry, child)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// 按执行顺序迭代。
    pub fn iter(&self) -> impl Iterator<Item = &Change> + '_ {
        self.changes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Change> + '_ {
        self.changes.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChangeKey> + '_ {
        self.changes.keys()
    }
}
