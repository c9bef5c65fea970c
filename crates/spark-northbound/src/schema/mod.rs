//! # schema：模式提供者契约
//!
//! ## 意图（Why）
//! - 引擎只需要少量结构事实：节点类型、是否可写、列表键、默认值、父子关系；
//!   把这些事实收敛到 [`SchemaProvider`] trait，真实部署可以接入任意 YANG 编译器；
//! - [`Schema`] 与 [`SchemaBuilder`] 是仓库自带的参考实现，测试与小型守护进程可直接使用。
//!
//! ## 契约（What）
//! - 模式路径形如 `/module:top/child/leaf`：首段携带模块前缀，后续段省略；
//! - 数据路径在模式路径的基础上为列表条目附加 `[key='v']` 谓词，叶子列表条目使用 `[.='v']`；
//! - [`SchemaNode::allows`] 给出各回调操作的合法性规则，注册表校验与编辑检查都以它为准。

mod builder;

use std::fmt;

pub use builder::{Schema, SchemaBuilder};

use crate::callbacks::Operation;

/// 节点的配置属性。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigClass {
    /// 可写配置节点。
    Writable,
    /// 只读状态节点。
    ReadOnly,
    /// 既非配置也非状态，例如 RPC。
    None,
}

/// 叶子取值类型。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafType {
    String,
    Boolean,
    /// 无值叶子，存在即表示"真"。
    Empty,
    Unsigned { max: u64 },
    Signed { min: i64, max: i64 },
    Enumeration(Vec<String>),
}

impl LeafType {
    /// 校验取值；`Empty` 类型不接受任何值，其余类型必须携带值。
    pub fn check(&self, value: Option<&str>) -> Result<(), String> {
        match (self, value) {
            (LeafType::Empty, None) => Ok(()),
            (LeafType::Empty, Some(v)) => Err(format!("empty leaf does not take a value (got `{v}`)")),
            (_, None) => Err("missing value".to_owned()),
            (LeafType::String, Some(_)) => Ok(()),
            (LeafType::Boolean, Some("true" | "false")) => Ok(()),
            (LeafType::Boolean, Some(v)) => Err(format!("`{v}` is not a boolean")),
            (LeafType::Unsigned { max }, Some(v)) => match v.parse::<u64>() {
                Ok(n) if n <= *max => Ok(()),
                Ok(n) => Err(format!("{n} exceeds maximum {max}")),
                Err(_) => Err(format!("`{v}` is not an unsigned integer")),
            },
            (LeafType::Signed { min, max }, Some(v)) => match v.parse::<i64>() {
                Ok(n) if (*min..=*max).contains(&n) => Ok(()),
                Ok(n) => Err(format!("{n} is outside [{min}, {max}]")),
                Err(_) => Err(format!("`{v}` is not an integer")),
            },
            (LeafType::Enumeration(names), Some(v)) => {
                if names.iter().any(|name| name == v) {
                    Ok(())
                } else {
                    Err(format!("`{v}` is not one of {names:?}"))
                }
            }
        }
    }
}

/// 叶子的附加属性。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafSpec {
    pub ty: LeafType,
    pub mandatory: bool,
    pub default: Option<String>,
    /// 由 [`SchemaBuilder::build`] 根据所在列表的键声明填写。
    pub is_key: bool,
    /// 父节点是 choice 的 case 分支。
    pub in_case: bool,
}

impl LeafSpec {
    pub fn new(ty: LeafType) -> Self {
        Self {
            ty,
            mandatory: false,
            default: None,
            is_key: false,
            in_case: false,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn in_case(mut self) -> Self {
        self.in_case = true;
        self
    }
}

/// 节点类型。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Container { presence: bool },
    List { keys: Vec<String>, user_ordered: bool },
    Leaf(LeafSpec),
    LeafList { ty: LeafType, user_ordered: bool },
    Rpc,
    Action,
}

/// 单个模式节点。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaNode {
    pub path: String,
    pub name: String,
    pub module: String,
    pub parent: Option<String>,
    pub kind: NodeKind,
    pub config: ConfigClass,
}

impl SchemaNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, NodeKind::List { .. })
    }

    pub fn is_leaf_list(&self) -> bool {
        matches!(self.kind, NodeKind::LeafList { .. })
    }

    pub fn is_presence(&self) -> bool {
        matches!(self.kind, NodeKind::Container { presence: true })
    }

    pub fn is_user_ordered(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::List { user_ordered: true, .. } | NodeKind::LeafList { user_ordered: true, .. }
        )
    }

    pub fn leaf(&self) -> Option<&LeafSpec> {
        match &self.kind {
            NodeKind::Leaf(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn keys(&self) -> &[String] {
        match &self.kind {
            NodeKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    /// 该节点是否允许挂载 `operation` 回调。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - create：可写，且为 empty 叶子、存在性容器、列表或叶子列表；
    ///   - modify：可写的非 empty、非键叶子；
    ///   - delete：可写，且为 case 分支下的叶子、无默认值的可选非键叶子、存在性容器、列表或叶子列表；
    ///   - move：可写的用户排序列表或叶子列表；
    ///   - apply_finish：任意可写节点；
    ///   - get_elem：只读叶子或只读存在性容器；get_next/get_keys：只读列表；
    ///   - lookup_entry：任意列表；rpc：RPC 或 action 节点。
    pub fn allows(&self, operation: Operation) -> bool {
        let writable = self.config == ConfigClass::Writable;
        let read_only = self.config == ConfigClass::ReadOnly;

        match operation {
            Operation::Create => {
                writable
                    && match &self.kind {
                        NodeKind::Leaf(spec) => spec.ty == LeafType::Empty,
                        NodeKind::Container { presence } => *presence,
                        NodeKind::List { .. } | NodeKind::LeafList { .. } => true,
                        NodeKind::Rpc | NodeKind::Action => false,
                    }
            }
            Operation::Modify => {
                writable
                    && matches!(&self.kind, NodeKind::Leaf(spec) if spec.ty != LeafType::Empty && !spec.is_key)
            }
            Operation::Delete => {
                writable
                    && match &self.kind {
                        NodeKind::Leaf(spec) => {
                            spec.in_case || !(spec.mandatory || spec.default.is_some() || spec.is_key)
                        }
                        NodeKind::Container { presence } => *presence,
                        NodeKind::List { .. } | NodeKind::LeafList { .. } => true,
                        NodeKind::Rpc | NodeKind::Action => false,
                    }
            }
            Operation::Move => writable && self.is_user_ordered(),
            Operation::ApplyFinish => writable,
            Operation::GetElem => read_only && (self.is_leaf() || self.is_presence()),
            Operation::GetNext | Operation::GetKeys => read_only && self.is_list(),
            Operation::LookupEntry => self.is_list(),
            Operation::Rpc => {
                self.config == ConfigClass::None
                    && matches!(self.kind, NodeKind::Rpc | NodeKind::Action)
            }
        }
    }
}

/// 模式提供者：引擎所需结构事实的唯一来源。
///
/// # 教案式说明
/// - **意图 (Why)**：引擎、注册表与数据树都通过此 trait 读取模式，便于替换为外部 YANG 库；
/// - **契约 (What)**：
///   - `node` 以模式路径精确查找；
///   - `children(None)` 返回所有顶层节点，`children(Some(path))` 返回直接子节点，均按定义顺序；
///   - `module_nodes` 以先序深度优先返回某模块的全部节点，模块未知时返回 `None`；
/// - **风险 (Trade-offs)**：返回 `Vec` 带来少量分配，换取对象安全的 trait。
pub trait SchemaProvider: Send + Sync + fmt::Debug {
    fn node(&self, path: &str) -> Option<&SchemaNode>;

    fn children(&self, parent: Option<&str>) -> Vec<&SchemaNode>;

    fn module_nodes(&self, module: &str) -> Option<Vec<&SchemaNode>>;

    fn operation_is_valid(&self, operation: Operation, path: &str) -> bool {
        self.node(path).is_some_and(|node| node.allows(operation))
    }

    fn default_value(&self, path: &str) -> Option<&str> {
        self.node(path)?.leaf()?.default.as_deref()
    }

    fn key_names(&self, path: &str) -> &[String] {
        self.node(path).map(SchemaNode::keys).unwrap_or(&[])
    }

    /// 最近的列表或存在性容器祖先。
    fn real_parent(&self, path: &str) -> Option<&SchemaNode> {
        let mut cursor = self.node(path)?.parent.as_deref();
        while let Some(parent_path) = cursor {
            let parent = self.node(parent_path)?;
            if parent.is_list() || parent.is_presence() {
                return Some(parent);
            }
            cursor = parent.parent.as_deref();
        }
        None
    }

    /// 最近的列表祖先。
    fn parent_list(&self, path: &str) -> Option<&SchemaNode> {
        let mut cursor = self.node(path)?.parent.as_deref();
        while let Some(parent_path) = cursor {
            let parent = self.node(parent_path)?;
            if parent.is_list() {
                return Some(parent);
            }
            cursor = parent.parent.as_deref();
        }
        None
    }
}
